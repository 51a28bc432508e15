//! Configuration management for dash-query.
//!
//! Handles loading configuration from TOML files and environment variables.
//! The warehouse token is only ever read from the environment.

use crate::error::{DashError, Result};
use crate::query::ExecutorOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Main configuration structure for dash-query.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Warehouse connection settings.
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Executor behavior.
    #[serde(default)]
    pub executor: ExecutorConfig,
}

/// Warehouse (Snowflake SQL API) settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Account URL, e.g. `https://acme-xy12345.snowflakecomputing.com`.
    pub account_url: Option<String>,

    pub database: Option<String>,

    pub schema: Option<String>,

    /// Virtual warehouse that runs the statements.
    pub warehouse: Option<String>,

    pub role: Option<String>,

    /// Statement timeout, also the upper bound for polling.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delay between polls of a statement that is still running.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Value of the `X-Snowflake-Authorization-Token-Type` header.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Bearer token; populated from `SNOWFLAKE_TOKEN` only.
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_token_type() -> String {
    "OAUTH".to_string()
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            account_url: None,
            database: None,
            schema: None,
            warehouse: None,
            role: None,
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            token_type: default_token_type(),
            token: None,
        }
    }
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("account_url", &self.account_url)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("timeout_secs", &self.timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("token_type", &self.token_type)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl WarehouseConfig {
    /// Fills unset fields from `SNOWFLAKE_*` environment variables.
    pub fn apply_env_defaults(&mut self) {
        self.apply_defaults_from(|key| std::env::var(key).ok());
    }

    fn apply_defaults_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fields = [
            (&mut self.account_url, "SNOWFLAKE_ACCOUNT_URL"),
            (&mut self.database, "SNOWFLAKE_DATABASE"),
            (&mut self.schema, "SNOWFLAKE_SCHEMA"),
            (&mut self.warehouse, "SNOWFLAKE_WAREHOUSE"),
            (&mut self.role, "SNOWFLAKE_ROLE"),
            (&mut self.token, "SNOWFLAKE_TOKEN"),
        ];
        for (field, key) in fields {
            if field.is_none() {
                *field = lookup(key);
            }
        }
    }

    /// Parses and checks the account URL.
    pub fn base_url(&self) -> Result<Url> {
        let raw = self.account_url.as_deref().ok_or_else(|| {
            DashError::config("Warehouse account_url is required (or set SNOWFLAKE_ACCOUNT_URL)")
        })?;

        let url = Url::parse(raw)
            .map_err(|e| DashError::config(format!("Invalid account_url '{raw}': {e}")))?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(DashError::config(format!(
                "Invalid scheme '{}' in account_url. Expected 'https'",
                url.scheme()
            )));
        }

        Ok(url)
    }

    /// Returns the token or a configuration error naming the variable.
    pub fn require_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| DashError::config("SNOWFLAKE_TOKEN environment variable not set"))
    }

    /// Returns a display-safe string (no token) for logs.
    pub fn display_string(&self) -> String {
        let account = self.account_url.as_deref().unwrap_or("<no account>");
        let database = self.database.as_deref().unwrap_or("?");
        let schema = self.schema.as_deref().unwrap_or("?");
        format!("{database}.{schema} @ {account}")
    }
}

/// Executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Cancel superseded fetches instead of letting them run out.
    #[serde(default = "default_cancel_superseded")]
    pub cancel_superseded: bool,
}

fn default_cancel_superseded() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            cancel_superseded: default_cancel_superseded(),
        }
    }
}

impl ExecutorConfig {
    pub fn options(&self) -> ExecutorOptions {
        ExecutorOptions::default().with_cancel_superseded(self.cancel_superseded)
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dash-query")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file; a missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| DashError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            DashError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}
