//! Model lifecycle management for LLM Deploy
//!
//! This crate provides the single-slot lifecycle manager, the capability
//! traits an external model backend must satisfy, load planning with its
//! fallbacks, and a backend that drives a separate inference worker.

pub mod backend;
pub mod hints;
pub mod manager;
pub mod plan;
pub mod remote;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export commonly used types
pub use backend::{
    BackendError, BackendErrorKind, BackendResult, GenerationParams, LoadedModel, ModelBackend,
    ModelHandle, ModelLoadOptions, PipelineOptions, TextGenerator, TokenizerHandle,
    TokenizerOptions,
};
pub use manager::{DeployTicket, ModelLifecycleManager};
pub use plan::{resolve_device, LoadPlan};
pub use remote::RemoteBackend;
