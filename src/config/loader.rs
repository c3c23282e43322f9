//! Configuration loading from disk and environment.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{AppConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },

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

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load configuration for the process.
///
/// Starts from the TOML file when one is given (defaults otherwise), applies
/// environment overrides, then validates the result.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => AppConfig::default(),
    };

    let env: HashMap<String, String> = std::env::vars().collect();
    apply_env_overrides(&mut config, &env)?;

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay environment variables onto a configuration.
pub fn apply_env_overrides(
    config: &mut AppConfig,
    env: &HashMap<String, String>,
) -> Result<(), ConfigError> {
    if let Some(port) = env.get("PORT") {
        if port.parse::<u16>().is_err() {
            return Err(ConfigError::Env {
                var: "PORT",
                message: format!("'{}' is not a port number", port),
            });
        }
        config.listener.set_port(port);
    }
    if let Some(url) = env.get("DEPENDENCY_BASE_URL") {
        config.dependency.base_url = url.clone();
    }
    if let Some(endpoint) = env.get("STORAGE_ENDPOINT") {
        config.storage.endpoint = endpoint.clone();
    }
    if let Some(username) = env.get("STORAGE_USERNAME") {
        config.storage.username = username.clone();
    }
    if let Some(password) = env.get("STORAGE_PASSWORD") {
        config.storage.password = password.clone();
    }
    if let Some(endpoint) = env.get("TRACE_COLLECTOR_ENDPOINT") {
        config.observability.trace_collector_endpoint = Some(endpoint.clone());
    }
    if let Some(level) = env.get("LOG_LEVEL") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        config.observability.log_format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(ConfigError::Env {
                    var: "LOG_FORMAT",
                    message: format!("unknown format '{}'", other),
                })
            }
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            &env(&[
                ("PORT", "3000"),
                ("DEPENDENCY_BASE_URL", "http://10.0.0.5:8000"),
                ("STORAGE_ENDPOINT", "couchbase://db"),
                ("LOG_FORMAT", "JSON"),
            ]),
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.dependency.base_url, "http://10.0.0.5:8000");
        assert_eq!(config.storage.endpoint, "couchbase://db");
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_bad_port_rejected() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, &env(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "PORT", .. }));
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("product-service-{}.toml", uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[retry]\nmax_retries = 5\n\n[circuit_breaker]\nopen_timeout_ms = 2500"
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.circuit_breaker.open_timeout_ms, 2500);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_invalid_file_reports_validation() {
        let path = std::env::temp_dir().join(format!("product-service-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[circuit_breaker]\nfailure_ratio = 0.0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("circuit_breaker.failure_ratio"));

        fs::remove_file(&path).unwrap();
    }
}
