//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
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

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const STRANGLER: &str = r#"
        [circuit_breaker]
        failure_threshold = 5
        reset_timeout_secs = 60

        [[backends]]
        id = "new-billing"
        url = "http://new-billing-microservice.local/api"

        [[backends]]
        id = "legacy-sap"
        url = "http://sap-legacy-system.local/api"
        failure_threshold = 3

        [[routes]]
        name = "invoices"
        pattern = "/api/v1/invoices/<invoice_id>"
        backend = "new-billing"
        migrated = true
        strip_prefix = "/api/v1"

        [[routes]]
        name = "orders"
        pattern = "/api/v1/orders/<order_id>"
        backend = "legacy-sap"
        strip_prefix = "/api/v1"
    "#;

    #[test]
    fn test_parse_minimal_file() {
        let config = parse_config(STRANGLER).unwrap();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.routes.len(), 2);
        assert!(config.routes[0].migrated);
        assert!(!config.routes[1].migrated);
        assert_eq!(config.backends[1].failure_threshold, Some(3));
        // Defaults fill everything not given.
        assert_eq!(config.timeouts.backend_secs, 2);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(STRANGLER.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.routes[1].backend, "legacy-sap");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            load_config(Path::new("/definitely/not/here.toml")),
            Err(ConfigError::Io(_))
        ));
        assert!(matches!(parse_config("routes = 7"), Err(ConfigError::Parse(_))));

        let err = parse_config(
            r#"
            [[routes]]
            name = "orders"
            pattern = "/orders/*"
            backend = "ghost"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown backend 'ghost'"));
    }
}
