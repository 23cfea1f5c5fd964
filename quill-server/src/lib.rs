//! HTTP and WebSocket adapters for the Quill collaboration core

pub mod api;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;
pub mod types;
pub mod ws;

pub use api::build_router;
pub use server::QuillServer;
pub use state::AppState;
