//! Error types for the common crate
//!
//! This module defines the error taxonomy shared by the lifecycle manager
//! and the HTTP layer. Each variant maps onto exactly one client or server
//! failure class.

use thiserror::Error;

/// Result type for LLM Deploy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for LLM Deploy operations
#[derive(Error, Debug)]
pub enum Error {
    /// A deploy is already in progress
    #[error("Model is currently loading. Please wait.")]
    AlreadyLoading,

    /// A model already occupies the slot
    #[error("Model is already loaded. Use /undeploy to unload first.")]
    AlreadyLoaded,

    /// The slot is empty
    #[error("No model is currently loaded. Please deploy a model first.")]
    NoModelLoaded,

    /// A query arrived while a deploy was in flight
    #[error("Model is currently loading. Please wait.")]
    ModelLoading,

    /// The backend could not produce a usable tokenizer or model
    #[error("{0}")]
    ModelLoad(String),

    /// The backend failed while tokenizing or generating
    #[error("Generation error: {0}")]
    Generation(String),

    /// The backend failed while releasing the loaded handles
    #[error("Undeploy error: {0}")]
    Undeploy(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the error was caused by the caller rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::AlreadyLoading
                | Error::AlreadyLoaded
                | Error::NoModelLoaded
                | Error::ModelLoading
                | Error::InvalidArgument(_)
        )
    }

    /// Returns true if the error is a lifecycle precondition violation
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::AlreadyLoading | Error::AlreadyLoaded | Error::NoModelLoaded | Error::ModelLoading
        )
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::InvalidArgument(errors.to_string())
    }
}
