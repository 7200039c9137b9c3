use clap::Parser;
use clap::Subcommand;
use ragchat::config::AppConfig;
use ragchat::corpus;
use ragchat::database::Database;
use ragchat::embeddings::Embedder;
use ragchat::embeddings::EmbeddingClient;
use ragchat::rag::index::normalize;
use ragchat::rag::prompts::build_search_prompt;
use ragchat::rag::PromptPolicy;
use ragchat::rag::Retriever;
use ragchat::RagChatError;
use ragchat::Result;
use tracing::info;

#[derive(Parser)]
#[command(name = "ragchat")]
#[command(about = "Retrieval-augmented chat over a pre-embedded site corpus")]
#[command(version)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat API server
    Serve {
        /// Listen address, overriding `server.addr`
        #[arg(long)]
        addr: Option<String>,
    },
    /// Embed a question and print the closest corpus chunks
    Search {
        /// The question to search for
        question: String,
        /// Number of chunks to print
        #[arg(short = 'k', long, default_value = "5")]
        k: usize,
        /// Also print the prompt that would be sent to the model
        #[arg(long)]
        prompt: bool,
    },
    /// Create the chat log table
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load()?;

    // Initialize logging
    if cli.verbose {
        ragchat::logging::init_logging_with_level("debug")?;
    } else {
        ragchat::logging::init_logging_with_config(&config.logging)?;
    }
    info!("Configuration loaded successfully");

    match cli.command {
        Commands::Serve { addr } => {
            if let Some(addr) = addr {
                config.server.addr = addr;
            }
            ragchat::api::serve(&config).await?;
        }
        Commands::Search {
            question,
            k,
            prompt,
        } => {
            handle_search(&config, &question, k, prompt).await?;
        }
        Commands::InitDb => {
            if config.database.url.trim().is_empty() {
                return Err(RagChatError::ConfigError(
                    "database.url (or CHAT_DB_DSN) is required for init-db".to_string(),
                ));
            }
            let database = Database::from_config(&config.database).await?;
            if database.is_schema_initialized().await? {
                println!("💡 chat_logs table already exists");
            }
            database.init_schema().await?;
            println!("✅ chat_logs table ready");
        }
    }

    Ok(())
}

async fn handle_search(config: &AppConfig, question: &str, k: usize, prompt: bool) -> Result<()> {
    let index = corpus::load_index(config)?;
    let embedder = EmbeddingClient::from_app_config(config)?;

    let mut query = embedder.embed(question).await?;
    normalize(&mut query);
    let hits = index.search(&query, k);

    println!("🔍 Top {} results for: {}", hits.len(), question);
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} ({})",
            rank + 1,
            hit.score,
            hit.chunk.title,
            hit.chunk.url
        );
    }

    if prompt {
        let policy = PromptPolicy::from_config(config);
        println!("\n--- prompt ---\n{}", build_search_prompt(&policy, question, &hits));
    }
    Ok(())
}
