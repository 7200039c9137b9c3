//! Request gates applied before any retrieval work
//!
//! - [`auth`]: HS256 bearer-token verification and minting
//! - [`rate_limit`]: per-client fixed-window admission control
//! - [`language`]: stop-word language heuristic

pub mod auth;
pub mod language;
pub mod rate_limit;

pub use auth::AuthClaims;
pub use auth::AuthError;
pub use auth::CredentialGate;
pub use language::LanguageGate;
pub use language::LanguageVerdict;
pub use language::StopWords;
pub use rate_limit::Admission;
pub use rate_limit::AdmissionController;
