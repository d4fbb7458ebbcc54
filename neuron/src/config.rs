//! Top-level configuration for the client.
//!
//! This module aggregates configuration for:
//!
//! - proof-of-work registration (`RegistrationConfig`),
//! - weight commit-reveal (`WeightsConfig`),
//! - the metrics exporter (enable flag + listen address),
//! - the devnet ledger used by the demo binary (`DevnetConfig`).
//!
//! Every section has defaults and may be omitted from a config file.
//! [`NeuronConfig::from_env`] layers environment overrides on top.

use std::env;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::DevnetConfig;
use crate::registration::RegistrationConfig;
use crate::weights::WeightsConfig;

/// Path of a JSON config file.
pub const CONFIG_ENV: &str = "NEURON_CONFIG";
/// Overrides `metrics.listen_addr`.
pub const METRICS_ADDR_ENV: &str = "NEURON_METRICS_ADDR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9899"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuronConfig {
    pub registration: RegistrationConfig,
    pub weights: WeightsConfig,
    pub metrics: MetricsConfig,
    pub devnet: DevnetConfig,
}

impl NeuronConfig {
    /// Loads a JSON config file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, overlaid with `NEURON_CONFIG` and `NEURON_METRICS_ADDR`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = match lookup(CONFIG_ENV) {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        if let Some(value) = lookup(METRICS_ADDR_ENV) {
            cfg.metrics.listen_addr = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: METRICS_ADDR_ENV,
                value,
            })?;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_default_independently() {
        let cfg: NeuronConfig = serde_json::from_str(
            r#"{
                "registration": { "update_interval_ms": 250 },
                "metrics": { "enabled": false }
            }"#,
        )
        .expect("parse");
        assert_eq!(cfg.registration.update_interval_ms, 250);
        assert_eq!(cfg.registration.max_attempts, 3);
        assert!(!cfg.metrics.enabled);
        assert_eq!(cfg.metrics.listen_addr, MetricsConfig::default().listen_addr);
        assert_eq!(cfg.weights, WeightsConfig::default());
        assert_eq!(cfg.devnet, DevnetConfig::default());
    }

    #[test]
    fn env_overrides_metrics_address() {
        let cfg = NeuronConfig::from_lookup(|var| {
            (var == METRICS_ADDR_ENV).then(|| "0.0.0.0:9000".to_string())
        })
        .expect("config");
        assert_eq!(cfg.metrics.listen_addr, "0.0.0.0:9000".parse().unwrap());
    }

    #[test]
    fn bad_env_value_is_reported() {
        let err = NeuronConfig::from_lookup(|var| {
            (var == METRICS_ADDR_ENV).then(|| "not-an-address".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = NeuronConfig::from_json_file("/nonexistent/neuron.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
