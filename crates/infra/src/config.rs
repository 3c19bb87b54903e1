//! Configuration loading and representation.

use std::env;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Postgres connection settings, present only when persistent stores are enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub bind_addr: String,
    pub database: Option<DatabaseConfig>,
}

impl LedgerConfig {
    pub const DEFAULT_BIND_ADDR: &'static str = "0.0.0.0:8080";
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

    /// Create config from environment variables:
    ///
    /// - `BIND_ADDR` (default `0.0.0.0:8080`)
    /// - `USE_PERSISTENT_STORES` (default `false`)
    /// - `DATABASE_URL` (required when persistent)
    /// - `DATABASE_MAX_CONNECTIONS` (default 10, must be > 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`LedgerConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_BIND_ADDR.to_string());

        let use_persistent = match lookup("USE_PERSISTENT_STORES") {
            Some(raw) => raw.trim().parse::<bool>().map_err(|e| ConfigError::Invalid {
                name: "USE_PERSISTENT_STORES",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => false,
        };

        let database = if use_persistent {
            let url = lookup("DATABASE_URL")
                .filter(|s| !s.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;

            let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
                Some(raw) => raw.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                    name: "DATABASE_MAX_CONNECTIONS",
                    value: raw.clone(),
                    reason: e.to_string(),
                })?,
                None => Self::DEFAULT_MAX_CONNECTIONS,
            };
            if max_connections == 0 {
                return Err(ConfigError::Invalid {
                    name: "DATABASE_MAX_CONNECTIONS",
                    value: "0".to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }

            Some(DatabaseConfig {
                url,
                max_connections,
            })
        } else {
            None
        };

        Ok(Self {
            bind_addr,
            database,
        })
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            bind_addr: Self::DEFAULT_BIND_ADDR.to_string(),
            database: None,
        }
    }
}
