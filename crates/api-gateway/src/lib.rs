//! HTTP API for LLM Deploy
//!
//! This crate exposes the model lifecycle over REST: deploy, query, status
//! and undeploy, plus a host resource report and a service descriptor.

pub mod error;
pub mod handlers;
pub mod rest;
pub mod routes;

// Re-export commonly used types
pub use error::ApiError;
pub use handlers::AppState;
pub use rest::{shutdown_signal, RestApi};
pub use routes::create_router;
