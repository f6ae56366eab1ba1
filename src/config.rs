//! Configuration file parsing
//!
//! Reads pg-migration-gen.toml configuration files. CLI flags override
//! file values; the file path itself can come from the
//! `PG_MIGRATION_GEN_CONFIG` environment variable.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::db::{ConnectionSettings, PoolSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub migrations: MigrationsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the discrete fields.
    pub url: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    pub password: Option<String>,

    #[serde(default = "default_dbname")]
    pub dbname: String,

    /// disable, prefer or require.
    #[serde(default = "default_sslmode")]
    pub sslmode: String,

    /// Maximum open connections in the target-database pool.
    #[serde(default = "default_pool_max_open")]
    pub pool_max_open: usize,

    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_pool_wait_secs")]
    pub pool_wait_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: None,
            dbname: default_dbname(),
            sslmode: default_sslmode(),
            pool_max_open: default_pool_max_open(),
            pool_wait_secs: default_pool_wait_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Directory holding the annotated Rust declarations.
    #[serde(default = "default_package")]
    pub package: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            package: default_package(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationsConfig {
    /// Directory migration pairs are written into.
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.pool_max_open == 0 {
            return Err(ConfigError::Validation(
                "database.pool_max_open must be at least 1".to_string(),
            ));
        }
        match self.database.sslmode.as_str() {
            "disable" | "prefer" | "require" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "database.sslmode `{other}` is not one of disable, prefer, require"
            ))),
        }
    }

    /// Connection settings described by the file alone.
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            url: self.database.url.clone(),
            host: self.database.host.clone(),
            port: self.database.port,
            user: self.database.user.clone(),
            password: self.database.password.clone(),
            dbname: self.database.dbname.clone(),
            sslmode: self.database.sslmode.clone(),
        }
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_open: self.database.pool_max_open,
            wait_timeout_secs: self.database.pool_wait_secs,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_dbname() -> String {
    "postgres".to_string()
}

fn default_sslmode() -> String {
    "prefer".to_string()
}

fn default_pool_max_open() -> usize {
    4
}

fn default_pool_wait_secs() -> u64 {
    30
}

fn default_package() -> PathBuf {
    PathBuf::from("src/models")
}

fn default_output() -> PathBuf {
    PathBuf::from("db/migrations")
}
