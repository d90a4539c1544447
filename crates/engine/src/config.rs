//! Index configuration via `keyspan.toml`
//!
//! Holds the default operation timeout applied by every indexed collection
//! opened from a [`Database`](crate::Database), and the retry count for
//! retried transactions. Calls that take explicit [`OpOptions`] ignore the
//! timeout.

use keyspan_core::{Error, OpOptions, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "keyspan.toml";

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_max_retries() -> usize {
    3
}

/// Configuration loaded from `keyspan.toml`
///
/// # Example
///
/// ```toml
/// # Timeout for operations without explicit options, in milliseconds
/// default_timeout_ms = 15000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Default timeout in milliseconds (default: 15000)
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Retry attempts used by `Database::transaction_with_retry` (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl IndexConfig {
    /// The default timeout as a `Duration`
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Fresh options carrying the default timeout
    pub fn default_options(&self) -> OpOptions {
        OpOptions::new(self.default_timeout())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# keyspan configuration
#
# Timeout for operations called without explicit options, in milliseconds.
default_timeout_ms = 15000

# Conflict retries for Database::transaction_with_retry.
max_retries = 3
"#
    }

    /// Parse config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: IndexConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    fn validate(&self) -> Result<()> {
        if self.default_timeout_ms == 0 {
            return Err(Error::Config(
                "default_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
