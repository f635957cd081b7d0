//! Configuration manager
//!
//! Layers serde defaults, an optional configuration file and environment
//! variables into a validated [`ServiceSettings`].

use std::path::{Path, PathBuf};
use config::{Config, Environment, File};
use thiserror::Error;
use tracing::{debug, info};

use crate::settings::ServiceSettings;
use crate::validation::ConfigValidator;

/// Prefix for environment overrides, e.g. `LLM_DEPLOY_SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "LLM_DEPLOY";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A source could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Settings were read but violate an invariant
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Owns the effective service settings
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// Effective settings
    settings: ServiceSettings,

    /// File the settings were read from, if any
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Loads settings from `path` (or the default location) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Loads settings using a custom environment prefix
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        let source_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|candidate| candidate.exists()),
        };

        let mut builder = Config::builder();

        if let Some(path) = &source_path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("cors.allow_origins"),
        );

        let settings: ServiceSettings = builder.build()?.try_deserialize()?;
        ConfigValidator::validate(&settings)?;

        debug!(?settings, "Configuration loaded");

        Ok(Self {
            settings,
            source_path,
        })
    }

    /// Wraps already-built settings, validating them
    pub fn from_settings(settings: ServiceSettings) -> Result<Self, ConfigError> {
        ConfigValidator::validate(&settings)?;
        Ok(Self {
            settings,
            source_path: None,
        })
    }

    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("llm-deploy").join("config.toml"))
    }

    /// Gets the effective settings
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Gets the file the settings were read from
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Applies command-line overrides on top of file and environment values
    pub fn apply_overrides(
        &mut self,
        host: Option<String>,
        port: Option<u16>,
        worker_url: Option<String>,
    ) -> Result<(), ConfigError> {
        let mut settings = self.settings.clone();

        if let Some(host) = host {
            settings.server.host = host;
        }
        if let Some(port) = port {
            settings.server.port = port;
        }
        if let Some(worker_url) = worker_url {
            settings.backend.worker_url = worker_url;
        }

        ConfigValidator::validate(&settings)?;
        self.settings = settings;

        Ok(())
    }
}
