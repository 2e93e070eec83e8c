//! HTTP API server for Tempo.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, Backends};
