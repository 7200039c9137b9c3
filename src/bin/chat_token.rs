use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use clap::Parser;
use ragchat::guard::auth::mint_token;
use ragchat::Result;

/// Mint a short-lived bearer token for the chat endpoint
#[derive(Parser)]
#[command(name = "chat-token")]
#[command(version)]
struct Args {
    /// HS256 signing secret
    #[arg(long, env = "CHAT_JWT_SECRET", default_value = "", hide_env_values = true)]
    secret: String,

    /// Token issuer (`iss`)
    #[arg(long, env = "CHAT_JWT_ISSUER", default_value = "alicanteabout.com")]
    issuer: String,

    /// Token audience (`aud`)
    #[arg(long, env = "CHAT_JWT_AUDIENCE", default_value = "alicanteabout-chat")]
    audience: String,

    /// Lifetime in seconds
    #[arg(long, env = "CHAT_JWT_TTL", default_value = "120")]
    ttl: i64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let issued_at = Utc::now().timestamp();
    let token = mint_token(&args.secret, &args.issuer, &args.audience, issued_at, args.ttl)?;
    let expires_at = issued_at
        .checked_add(args.ttl)
        .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0))
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();

    println!("{token}");
    println!("expires_at={expires_at}");
    println!("expires_in={}s", args.ttl);
    Ok(())
}
