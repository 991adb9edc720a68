//! Engine Configuration
//!
//! Loads engine-wide defaults from a YAML file. Every field is optional.
//!
//! # Example YAML Format
//!
//! ```yaml
//! retry:
//!   max_attempts: 3
//!   wait_ms: 500
//! edges: reject          # or: overwrite (default)
//! max_concurrency: 8     # cap for parallel batch steps; unbounded if omitted
//! ```

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::execution::retry::RetryPolicy;

use super::graph::EdgePolicy;

/// Engine-wide defaults applied by builders.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Retry policy handed to steps through `with_retry`
    pub retry: RetryPolicy,

    /// Handling of duplicate action keys at graph construction
    pub edges: EdgePolicy,

    /// Maximum concurrent items in a parallel batch step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

impl EngineConfig {
    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::Invalid(
                "max_concurrency must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parses and validates configuration from a YAML string.
pub fn parse_config(yaml: &str) -> Result<EngineConfig, ConfigError> {
    // An empty document means "all defaults"
    if yaml.trim().is_empty() {
        return Ok(EngineConfig::default());
    }

    let config: EngineConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    debug!("Parsed engine config: {:?}", config);
    Ok(config)
}

/// Loads configuration from a YAML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config = parse_config(&content)?;
    info!("Loaded engine config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_parse_full_config() {
        let yaml = "retry:\n  max_attempts: 3\n  wait_ms: 500\nedges: reject\nmax_concurrency: 8\n";
        let config = parse_config(yaml).unwrap();

        assert_eq!(config.retry, RetryPolicy::new(3, Duration::from_millis(500)));
        assert_eq!(config.edges, EdgePolicy::Reject);
        assert_eq!(config.max_concurrency, Some(8));
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.edges, EdgePolicy::Overwrite);
        assert!(config.max_concurrency.is_none());
    }

    #[test]
    fn test_partial_config() {
        let config = parse_config("retry:\n  max_attempts: 2\n").unwrap();
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.wait, Duration::ZERO);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = parse_config("retry:\n  max_attempts: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(parse_config("max_concurrency: 0\n").is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse_config("retries: 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("engine.yaml");
        std::fs::write(&path, "edges: overwrite\nmax_concurrency: 2\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.max_concurrency, Some(2));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/engine.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
