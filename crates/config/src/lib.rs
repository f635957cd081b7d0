//! Configuration management for LLM Deploy
//!
//! This crate provides layered configuration for the deployment service:
//! built-in defaults, an optional file, and environment overrides.

pub mod manager;
pub mod settings;
pub mod validation;

// Re-export commonly used types
pub use manager::{ConfigError, ConfigManager, ENV_PREFIX};
pub use settings::{
    BackendSettings, CorsSettings, LoggingSettings, ModelSettings, ServerSettings, ServiceSettings,
};
pub use validation::ConfigValidator;
