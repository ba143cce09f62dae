//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse configuration from TOML text without validating it.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Read and parse a TOML file without validating it.
///
/// Lets callers layer overrides on top before calling [`validate_config`].
pub fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_valid_file() {
        let path = std::env::temp_dir().join(format!("flick-api-{}.toml", std::process::id()));
        fs::write(
            &path,
            r#"
            [listener]
            bind_address = "127.0.0.1:4100"

            [rate_limit]
            requests_per_second = 5.5
            enabled = false
            "#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:4100");
        assert_eq!(config.rate_limit.requests_per_second, 5.5);
        assert!(!config.rate_limit.enabled);

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn read_defers_validation_to_caller() {
        let path = std::env::temp_dir().join(format!("flick-api-zero-{}.toml", std::process::id()));
        fs::write(&path, "[rate_limit]\nburst = 0\n").unwrap();

        let mut config = read_config(&path).unwrap();
        assert_eq!(config.rate_limit.burst, 0);
        assert!(matches!(load_config(&path), Err(ConfigError::Validation(_))));

        // An override applied between read and validate fixes it.
        config.rate_limit.burst = 3;
        assert!(validate_config(&config).is_ok());

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn unknown_environment_is_parse_error() {
        let err = parse_config(r#"environment = "qa""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = ConfigError::Validation(vec![
            ValidationError {
                field: "rate_limit.burst",
                message: "must be at least 1".into(),
            },
            ValidationError {
                field: "shutdown.timeout_secs",
                message: "must be greater than 0".into(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: rate_limit.burst: must be at least 1, shutdown.timeout_secs: must be greater than 0"
        );
    }
}
