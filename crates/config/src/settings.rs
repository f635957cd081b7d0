//! Typed service settings
//!
//! Every section carries serde defaults so that a partial file, or no file
//! at all, still yields a complete configuration.

use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use common::LogFormat;

/// Top-level service settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// HTTP listener
    pub server: ServerSettings,

    /// Model loading
    pub model: ModelSettings,

    /// Inference worker connection
    pub backend: BackendSettings,

    /// Log output
    pub logging: LoggingSettings,

    /// Cross-origin policy
    pub cors: CorsSettings,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerSettings {
    /// Returns the `host:port` bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Model loading settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Device used when a request does not name one
    pub default_device: String,

    /// Folder large models offload weights into
    pub offload_folder: PathBuf,

    /// Size of the loader worker pool; the slot admits exactly one
    pub loader_workers: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            default_device: "cpu".to_string(),
            offload_folder: PathBuf::from("offload"),
            loader_workers: 1,
        }
    }
}

/// Inference worker connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Base URL of the inference worker process
    pub worker_url: String,

    /// Per-request timeout; loads of large models can take tens of minutes
    pub request_timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            worker_url: "http://127.0.0.1:8100".to_string(),
            request_timeout_secs: 3600,
        }
    }
}

impl BackendSettings {
    /// Returns the request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,

    /// Output format
    pub format: LogFormat,

    /// Directory for daily rolling log files; stdout when unset
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            directory: None,
        }
    }
}

/// Cross-origin policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    /// Allowed origins; `*` allows any
    pub allow_origins: Vec<String>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
        }
    }
}

impl CorsSettings {
    /// Returns true if any origin is allowed
    pub fn allows_any_origin(&self) -> bool {
        self.allow_origins.iter().any(|origin| origin == "*")
    }
}
