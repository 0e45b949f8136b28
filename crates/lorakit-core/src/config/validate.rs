//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let tagging = &self.tagging;
        if !(0.0..=1.0).contains(&tagging.threshold) {
            return Err(ConfigError::ValidationError(
                "tagging.threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if tagging.image_size == 0 {
            return Err(ConfigError::ValidationError(
                "tagging.image_size must be > 0".into(),
            ));
        }
        if tagging.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "tagging.batch_size must be > 0".into(),
            ));
        }
        if tagging.worker_count == 0 {
            return Err(ConfigError::ValidationError(
                "tagging.worker_count must be > 0".into(),
            ));
        }
        if tagging.caption_extension.is_empty() {
            return Err(ConfigError::ValidationError(
                "tagging.caption_extension must not be empty".into(),
            ));
        }
        if tagging.supported_formats.is_empty() {
            return Err(ConfigError::ValidationError(
                "tagging.supported_formats must list at least one extension".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError(
                "logging.format must be \"pretty\" or \"json\"".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.tagging.worker_count = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker_count"));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.tagging.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_validate_rejects_invalid_threshold() {
        let mut config = Config::default();
        config.tagging.threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("threshold"));

        config.tagging.threshold = -0.1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.format"));
    }
}
