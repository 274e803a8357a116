// SPDX-License-Identifier: MIT
//! Table configuration loaded from `SPDF_*` environment variables

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::identity::{IdentitySource, TokenSource, UuidSource};
use crate::table::DEFAULT_ID_ATTEMPTS;

/// Data slots per table when nothing is configured
pub const DEFAULT_DATA_CAPACITY: usize = 32;

/// How data stream ids are generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Hyphenated v4 UUIDs
    #[default]
    Uuid,
    /// Random `0-9A-Z` tokens
    Token,
}

impl FromStr for IdStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uuid" => Ok(IdStrategy::Uuid),
            "token" => Ok(IdStrategy::Token),
            other => Err(ConfigError::UnknownIdStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("SPDF_ID_STRATEGY must be 'uuid' or 'token', got '{0}'")]
    UnknownIdStrategy(String),

    #[error("SPDF_ID_ATTEMPTS must be at least 1")]
    NoIdAttempts,

    #[error("SPDF_DATA_CAPACITY {0} leaves no room for the reserved slots")]
    CapacityTooLarge(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub data_capacity: usize,
    pub id_attempts: usize,
    pub id_strategy: IdStrategy,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            data_capacity: DEFAULT_DATA_CAPACITY,
            id_attempts: DEFAULT_ID_ATTEMPTS,
            id_strategy: IdStrategy::default(),
        }
    }
}

impl TableConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            data_capacity: std::env::var("SPDF_DATA_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.data_capacity),
            id_attempts: std::env::var("SPDF_ID_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.id_attempts),
            id_strategy: match std::env::var("SPDF_ID_STRATEGY") {
                Ok(s) => s.parse()?,
                Err(_) => defaults.id_strategy,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id_attempts == 0 {
            return Err(ConfigError::NoIdAttempts);
        }

        if self.data_capacity > usize::MAX - crate::table::RESERVED_SLOTS {
            return Err(ConfigError::CapacityTooLarge(self.data_capacity));
        }

        Ok(())
    }

    pub fn identity_source(&self) -> Arc<dyn IdentitySource> {
        match self.id_strategy {
            IdStrategy::Uuid => Arc::new(UuidSource::new()),
            IdStrategy::Token => Arc::new(TokenSource::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TableConfig::default();
        assert_eq!(config.data_capacity, 32);
        assert_eq!(config.id_attempts, DEFAULT_ID_ATTEMPTS);
        assert_eq!(config.id_strategy, IdStrategy::Uuid);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = TableConfig {
            id_attempts: 0,
            ..TableConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoIdAttempts));
    }

    #[test]
    fn test_validate_rejects_overflowing_capacity() {
        let config = TableConfig {
            data_capacity: usize::MAX,
            ..TableConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_id_strategy_parse() {
        assert_eq!("uuid".parse::<IdStrategy>(), Ok(IdStrategy::Uuid));
        assert_eq!(" TOKEN ".parse::<IdStrategy>(), Ok(IdStrategy::Token));
        assert!("snowflake".parse::<IdStrategy>().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: TableConfig =
            serde_json::from_str(r#"{"data_capacity": 4, "id_strategy": "token"}"#).unwrap();
        assert_eq!(config.data_capacity, 4);
        assert_eq!(config.id_strategy, IdStrategy::Token);
        assert_eq!(config.id_attempts, DEFAULT_ID_ATTEMPTS);
    }

    #[test]
    fn test_identity_source_matches_strategy() {
        let token = TableConfig {
            id_strategy: IdStrategy::Token,
            ..TableConfig::default()
        };
        let id = token.identity_source().next_id();
        assert_eq!(id.as_str().len(), TokenSource::DEFAULT_LEN);

        let uuid = TableConfig::default().identity_source().next_id();
        assert_eq!(uuid.as_str().len(), 36);
    }
}
