//! Common types for LLM Deploy
//!
//! This module defines small value types shared across the service.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Device a model runs on
///
/// The service is CPU-only, so there is a single device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Host CPU
    #[default]
    Cpu,
}

impl Device {
    /// Returns the canonical device string
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weight precision requested from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 32-bit floating point
    Float32,
    /// 16-bit floating point
    Float16,
    /// bfloat16
    Bfloat16,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Float32 => write!(f, "float32"),
            Precision::Float16 => write!(f, "float16"),
            Precision::Bfloat16 => write!(f, "bfloat16"),
        }
    }
}

/// Size category of a model, inferred from its identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSizeCategory {
    /// Below one billion parameters
    Small,
    /// 1B-3B parameters
    Medium,
    /// 7B-13B parameters
    Large,
    /// 20B parameters and up
    XLarge,
}

impl ModelSizeCategory {
    /// Minimum system memory in GB for this category
    pub fn min_memory_gb(&self) -> u64 {
        match self {
            ModelSizeCategory::Small => 4,
            ModelSizeCategory::Medium => 8,
            ModelSizeCategory::Large => 16,
            ModelSizeCategory::XLarge => 32,
        }
    }
}

impl fmt::Display for ModelSizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSizeCategory::Small => write!(f, "small"),
            ModelSizeCategory::Medium => write!(f, "medium"),
            ModelSizeCategory::Large => write!(f, "large"),
            ModelSizeCategory::XLarge => write!(f, "xlarge"),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-field output
    #[default]
    Pretty,
    /// Single-line output
    Compact,
    /// Structured JSON lines
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}
