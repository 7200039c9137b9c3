//! HS256 bearer tokens for the chat endpoint
//!
//! Tokens are compact JWTs signed with a shared secret. Verification is
//! stateless; [`mint_token`] produces tokens the gate accepts.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// Why a token was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid token")]
    Malformed,
    #[error("invalid signature")]
    Signature,
    #[error("invalid algorithm")]
    Algorithm,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("invalid issuer")]
    Issuer,
    #[error("invalid audience")]
    Audience,
    #[error("jwt not configured")]
    NotConfigured,
    #[error("invalid ttl")]
    InvalidTtl,
}

/// `aud` may be a single string or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Self::One(aud) => aud == expected,
            Self::Many(list) => list.iter().any(|aud| aud == expected),
        }
    }
}

/// The registered claims the gate looks at; anything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthClaims {
    pub iss: Option<String>,
    pub aud: Option<Audience>,
    pub iat: Option<i64>,
    pub exp: Option<i64>,
}

impl AuthClaims {
    fn from_payload(payload: &Map<String, Value>) -> Result<Self, AuthError> {
        let numeric = |key: &str| -> Result<Option<i64>, AuthError> {
            match payload.get(key) {
                None => Ok(None),
                Some(value) => value
                    .as_i64()
                    .or_else(|| value.as_f64().map(|f| f as i64))
                    .map(Some)
                    .ok_or(AuthError::Malformed),
            }
        };

        let aud = match payload.get("aud") {
            Some(Value::String(s)) => Some(Audience::One(s.clone())),
            Some(Value::Array(items)) => Some(Audience::Many(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            )),
            _ => None,
        };

        Ok(Self {
            iss: payload.get("iss").and_then(Value::as_str).map(str::to_string),
            aud,
            iat: numeric("iat")?,
            exp: numeric("exp")?,
        })
    }
}

#[derive(Deserialize)]
struct Header {
    #[serde(default)]
    alg: String,
}

/// Stateless verifier for chat bearer tokens
#[derive(Debug, Clone)]
pub struct CredentialGate {
    secret: String,
    issuer: Option<String>,
    audience: Option<String>,
    leeway: Duration,
}

impl CredentialGate {
    /// Empty issuer or audience disables that check.
    pub fn new(secret: impl Into<String>, issuer: &str, audience: &str, leeway: Duration) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            secret: secret.into(),
            issuer: non_empty(issuer),
            audience: non_empty(audience),
            leeway,
        }
    }

    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self::new(
            config.auth.jwt_secret.clone(),
            &config.auth.issuer,
            &config.auth.audience,
            config.auth_leeway(),
        )
    }

    pub fn is_configured(&self) -> bool {
        !self.secret.is_empty()
    }

    pub fn verify(&self, token: &str) -> Result<AuthClaims, AuthError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    /// Verify a token as of `now` (Unix seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<AuthClaims, AuthError> {
        if !self.is_configured() {
            return Err(AuthError::NotConfigured);
        }

        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };

        let header: Header = decode_json(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(AuthError::Algorithm);
        }
        let payload: Map<String, Value> = decode_json(payload_b64)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::Signature)?;

        let claims = AuthClaims::from_payload(&payload)?;
        let leeway = self.leeway.as_secs() as i64;
        if let Some(exp) = claims.exp {
            if now > exp.saturating_add(leeway) {
                return Err(AuthError::Expired);
            }
        }
        if let Some(iat) = claims.iat {
            if iat > now.saturating_add(leeway) {
                return Err(AuthError::NotYetValid);
            }
        }
        if let Some(issuer) = &self.issuer {
            if claims.iss.as_deref() != Some(issuer.as_str()) {
                return Err(AuthError::Issuer);
            }
        }
        if let Some(audience) = &self.audience {
            if !claims.aud.as_ref().is_some_and(|aud| aud.contains(audience)) {
                return Err(AuthError::Audience);
            }
        }
        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|_| AuthError::NotConfigured)
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed)
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let mut fields = header.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Some(token),
        _ => None,
    }
}

/// Mint a token valid from `issued_at` (Unix seconds) for `ttl_secs`.
pub fn mint_token(
    secret: &str,
    issuer: &str,
    audience: &str,
    issued_at: i64,
    ttl_secs: i64,
) -> Result<String, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::NotConfigured);
    }
    if ttl_secs <= 0 {
        return Err(AuthError::InvalidTtl);
    }
    let expires_at = issued_at
        .checked_add(ttl_secs)
        .ok_or(AuthError::InvalidTtl)?;

    let header = serde_json::json!({ "alg": ALGORITHM, "typ": "JWT" });
    let payload = serde_json::json!({
        "iss": issuer,
        "aud": audience,
        "iat": issued_at,
        "exp": expires_at,
    });
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    );

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::NotConfigured)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{signing_input}.{signature}"))
}
