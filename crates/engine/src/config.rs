//! Engine configuration.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration.
//!
//! # Example
//!
//! ```toml
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 5
//! max_delay_ms = 200
//!
//! [registry]
//! cache_enabled = true
//!
//! [queue]
//! default_page_size = 50
//! max_page_size = 500
//!
//! [tickets]
//! max_ttl_minutes = 10080
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub registry: RegistryConfig,
    pub queue: QueueConfig,
    pub tickets: TicketConfig,
}

/// `[retry]`: bounded retry of transient storage failures and OCC conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5,
            max_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub cache_enabled: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TicketConfig {
    /// Upper bound for a ticket's time-to-live. Default one week.
    pub max_ttl_minutes: u32,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            max_ttl_minutes: 7 * 24 * 60,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Upper bound for `tickets.max_ttl_minutes`: one hundred years.
pub const TTL_CEILING_MINUTES: u32 = 100 * 366 * 24 * 60;

// ── Functions ─────────────────────────────────────────────────────────────────

impl EngineConfig {
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return invalid("retry.base_delay_ms must not exceed retry.max_delay_ms");
        }
        if self.queue.default_page_size == 0 {
            return invalid("queue.default_page_size must be at least 1");
        }
        if self.queue.default_page_size > self.queue.max_page_size {
            return invalid("queue.default_page_size must not exceed queue.max_page_size");
        }
        if self.tickets.max_ttl_minutes == 0 {
            return invalid("tickets.max_ttl_minutes must be at least 1");
        }
        if self.tickets.max_ttl_minutes > TTL_CEILING_MINUTES {
            return invalid("tickets.max_ttl_minutes must not exceed one hundred years");
        }
        Ok(())
    }
}
