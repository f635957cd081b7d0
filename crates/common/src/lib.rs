//! Common utilities and types for LLM Deploy
//!
//! This crate provides shared functionality used across the deployment service,
//! including the error taxonomy, wire models, and classification helpers.

pub mod error;
pub mod models;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{Error, Result};
pub use models::*;
pub use types::*;
