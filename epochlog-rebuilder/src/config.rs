//! Rebuilder configuration
//!
//! Configuration loaded from environment variables and command line.

use std::time::Duration;
use thiserror::Error;

use epochlog_metadata::MissingNodePolicy;

use crate::planner::PlannerConfig;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Rebuilder configuration
#[derive(Debug, Clone)]
pub struct RebuilderConfig {
    /// Maximum concurrent planning computations
    pub max_concurrent: usize,

    /// Handling of nodeset shards whose node is not in the cluster
    pub missing_nodes: MissingNodePolicy,

    /// Retention in seconds; data older than this is not rebuilt
    pub retention_secs: Option<u64>,
}

impl Default for RebuilderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            missing_nodes: MissingNodePolicy::Reject,
            retention_secs: None,
        }
    }
}

impl RebuilderConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_concurrent = match lookup("REBUILDER_MAX_CONCURRENT") {
            Some(v) => match v.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid("REBUILDER_MAX_CONCURRENT", &v)),
            },
            None => defaults.max_concurrent,
        };

        let missing_nodes = match lookup("REBUILDER_MISSING_NODES") {
            Some(v) => v
                .parse::<MissingNodePolicy>()
                .map_err(|_| invalid("REBUILDER_MISSING_NODES", &v))?,
            None => defaults.missing_nodes,
        };

        let retention_secs = match lookup("REBUILDER_RETENTION_SECS") {
            Some(v) => Some(
                v.parse::<u64>()
                    .map_err(|_| invalid("REBUILDER_RETENTION_SECS", &v))?,
            ),
            None => defaults.retention_secs,
        };

        Ok(Self {
            max_concurrent,
            missing_nodes,
            retention_secs,
        })
    }

    /// Get retention as Duration
    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs.map(Duration::from_secs)
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            missing_nodes: self.missing_nodes,
            retention: self.retention(),
        }
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue(key.to_string(), value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RebuilderConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.missing_nodes, MissingNodePolicy::Reject);
        assert!(config.retention().is_none());
    }

    #[test]
    fn test_config_from_values() {
        let config = RebuilderConfig::from_lookup(lookup(&[
            ("REBUILDER_MAX_CONCURRENT", "16"),
            ("REBUILDER_MISSING_NODES", "exclude-but-count"),
            ("REBUILDER_RETENTION_SECS", "3600"),
        ]))
        .unwrap();
        assert_eq!(config.max_concurrent, 16);
        assert_eq!(config.missing_nodes, MissingNodePolicy::ExcludeButCount);
        assert_eq!(config.retention(), Some(Duration::from_secs(3600)));

        let planner = config.planner_config();
        assert_eq!(planner.missing_nodes, MissingNodePolicy::ExcludeButCount);
        assert_eq!(planner.retention, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("REBUILDER_MAX_CONCURRENT", "0"),
            ("REBUILDER_MAX_CONCURRENT", "many"),
            ("REBUILDER_MISSING_NODES", "ignore"),
            ("REBUILDER_RETENTION_SECS", "-1"),
        ] {
            let err = RebuilderConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
            assert!(err.to_string().contains(key), "{}", err);
        }
    }
}
