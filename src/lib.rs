pub mod api;
pub mod audit;
pub mod chat;
pub mod config;
pub mod corpus;
pub mod database;
pub mod embeddings;
pub mod errors;
pub mod guard;
pub mod llm;
pub mod logging;
pub mod models;
pub mod rag;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod errors_tests;

pub use config::AppConfig;
pub use errors::*;
