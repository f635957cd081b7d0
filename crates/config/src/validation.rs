//! Configuration validation

use reqwest::Url;

use crate::manager::ConfigError;
use crate::settings::ServiceSettings;

/// Validates loaded settings
pub struct ConfigValidator;

impl ConfigValidator {
    /// Checks invariants the service relies on
    pub fn validate(settings: &ServiceSettings) -> Result<(), ConfigError> {
        if settings.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }

        if settings.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".into()));
        }

        if settings.model.loader_workers != 1 {
            return Err(ConfigError::Invalid(format!(
                "model.loader_workers must be 1 (single model slot), got {}",
                settings.model.loader_workers
            )));
        }

        if settings.model.default_device != "cpu" {
            tracing::warn!(
                device = %settings.model.default_device,
                "Only the cpu device is supported, default_device will be ignored"
            );
        }

        let url = settings.backend.worker_url.as_str();
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {}
            Ok(_) => {
                return Err(ConfigError::Invalid(format!(
                    "backend.worker_url must be an http(s) URL, got '{}'",
                    url
                )))
            }
            Err(e) => {
                return Err(ConfigError::Invalid(format!(
                    "backend.worker_url '{}' is not a valid URL: {}",
                    url, e
                )))
            }
        }

        if settings.backend.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "backend.request_timeout_secs must be non-zero".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ConfigValidator::validate(&ServiceSettings::default()).is_ok());
    }

    #[test]
    fn test_rejects_multiple_loader_workers() {
        let mut settings = ServiceSettings::default();
        settings.model.loader_workers = 4;
        assert!(ConfigValidator::validate(&settings).is_err());
    }

    #[test]
    fn test_rejects_bad_worker_url() {
        let mut settings = ServiceSettings::default();
        settings.backend.worker_url = "localhost:8100".into();
        assert!(ConfigValidator::validate(&settings).is_err());

        settings.backend.worker_url = "ftp://localhost:8100".into();
        assert!(ConfigValidator::validate(&settings).is_err());
    }

    #[test]
    fn test_rejects_malformed_worker_host() {
        let mut settings = ServiceSettings::default();
        settings.backend.worker_url = "http://".into();
        assert!(ConfigValidator::validate(&settings).is_err());

        settings.backend.worker_url = "http://bad host:8100".into();
        assert!(ConfigValidator::validate(&settings).is_err());

        settings.backend.worker_url = "https://worker.internal:8100/".into();
        assert!(ConfigValidator::validate(&settings).is_ok());
    }

    #[test]
    fn test_rejects_zero_port() {
        let mut settings = ServiceSettings::default();
        settings.server.port = 0;
        assert!(ConfigValidator::validate(&settings).is_err());
    }
}
