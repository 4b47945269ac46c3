//! HTTP API module.
//!
//! Axum router, request/response types and the SSE activity feed.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server, AppState};
pub use types::*;
