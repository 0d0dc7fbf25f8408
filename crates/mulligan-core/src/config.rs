//! Core configuration.
//!
//! Loaded from TOML or from `MULLIGAN_*` environment variables; every field
//! has a compile-time default so partial configuration is fine.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::txn::RollbackPolicy;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid rollback policy {0:?} (expected lazy or best_effort)")]
    InvalidPolicy(String),

    #[error("invalid value {value:?} for {var}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Configuration consumed by coordinators, graphs, and the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// How coordinators reverse work on rollback.
    pub rollback_policy: RollbackPolicy,
    /// Maximum transaction nesting depth. Negative means unbounded.
    pub max_txn_depth: i64,
    /// Concurrency ceiling for dispatched graph nodes.
    pub max_concurrent_actions: usize,
}

impl CoreConfig {
    pub const DEFAULT_MAX_TXN_DEPTH: i64 = 1;
    pub const DEFAULT_MAX_CONCURRENT_ACTIONS: usize = 8;

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Build a config from the environment.
    ///
    /// Reads `MULLIGAN_ROLLBACK_POLICY`, `MULLIGAN_MAX_TXN_DEPTH`, and
    /// `MULLIGAN_MAX_CONCURRENT_ACTIONS`; unset variables take their
    /// defaults, present-but-invalid values are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(value) = env::var("MULLIGAN_ROLLBACK_POLICY") {
            config.rollback_policy = RollbackPolicy::from_str(&value)
                .map_err(|_| ConfigError::InvalidPolicy(value))?;
        }
        if let Ok(value) = env::var("MULLIGAN_MAX_TXN_DEPTH") {
            config.max_txn_depth = value.parse().map_err(|_| ConfigError::InvalidNumber {
                var: "MULLIGAN_MAX_TXN_DEPTH",
                value,
            })?;
        }
        if let Ok(value) = env::var("MULLIGAN_MAX_CONCURRENT_ACTIONS") {
            config.max_concurrent_actions =
                value.parse().map_err(|_| ConfigError::InvalidNumber {
                    var: "MULLIGAN_MAX_CONCURRENT_ACTIONS",
                    value,
                })?;
        }
        Ok(config)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            rollback_policy: RollbackPolicy::Lazy,
            max_txn_depth: Self::DEFAULT_MAX_TXN_DEPTH,
            max_concurrent_actions: Self::DEFAULT_MAX_CONCURRENT_ACTIONS,
        }
    }
}
