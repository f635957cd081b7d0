//! Hardware probing for LLM Deploy
//!
//! This crate provides a snapshot of host resources and derives model
//! recommendations and per-model requirement checks from it.

pub mod capabilities;
pub mod recommendations;

// Re-export commonly used types
pub use capabilities::{CpuInfo, DiskInfo, MemoryInfo, SystemResources};
pub use recommendations::{
    check_model, recommend, MemoryVerdict, ModelRequirements, Recommendations,
};
