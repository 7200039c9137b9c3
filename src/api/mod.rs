//! HTTP surface of the chat service

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;

pub use handlers::AppState;
pub use routes::chat_router;
pub use server::serve;
