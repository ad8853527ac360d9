//! Configuration for the media server control plane
//!
//! Configuration is read from a JSON or TOML file and then overridden by
//! `RMEDIA_*` environment variables. Durations are expressed in
//! milliseconds so both formats stay flat and readable.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::types::{Error, Result};
use crate::logging::LoggingConfig;

/// Main configuration for a media server instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum number of live media objects (pipelines, elements and ports)
    pub max_objects: usize,
    /// Retention period applied when `create` does not specify one
    pub default_retention_ms: u64,
    /// Interval between garbage collector sweeps
    pub gc_interval_ms: u64,
    /// How long destroyed ids are remembered so racing destroys stay idempotent
    pub tombstone_ttl_ms: u64,
    /// Event dispatch settings
    pub dispatch: DispatchConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Event dispatch worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of routing workers; each destination hashes to one of them
    /// and gets its own delivery lane there
    pub workers: usize,
    /// Bounded length of each worker queue and of each destination lane; a
    /// full queue drops the notification
    pub queue_capacity: usize,
    /// Upper bound for a single delivery attempt
    pub delivery_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_objects: 10_000,
            default_retention_ms: 120_000,
            gc_interval_ms: 30_000,
            tombstone_ttl_ms: 60_000,
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().clamp(1, 8),
            queue_capacity: 1024,
            delivery_timeout_ms: 5_000,
        }
    }
}

impl DispatchConfig {
    /// Delivery timeout as a `Duration`
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl ServerConfig {
    /// Default retention as a `Duration`
    pub fn default_retention(&self) -> Duration {
        Duration::from_millis(self.default_retention_ms)
    }

    /// GC interval as a `Duration`
    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }

    /// Tombstone lifetime as a `Duration`
    pub fn tombstone_ttl(&self) -> Duration {
        Duration::from_millis(self.tombstone_ttl_ms)
    }

    /// Load configuration from a `.json` or `.toml` file, then apply
    /// environment overrides and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let config: ServerConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") => toml::from_str(&contents)?,
            other => {
                return Err(Error::Config(format!(
                    "Unsupported configuration format: {:?}",
                    other
                )))
            }
        };

        config.with_env_overrides()?.validated()
    }

    /// Build configuration from defaults and environment variables only
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()?.validated()
    }

    /// Apply `RMEDIA_*` environment overrides
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("Invalid value for {}: {}", key, value)))
        }

        if let Some(v) = lookup("RMEDIA_MAX_OBJECTS") {
            self.max_objects = parse("RMEDIA_MAX_OBJECTS", v)?;
        }
        if let Some(v) = lookup("RMEDIA_DEFAULT_RETENTION_MS") {
            self.default_retention_ms = parse("RMEDIA_DEFAULT_RETENTION_MS", v)?;
        }
        if let Some(v) = lookup("RMEDIA_GC_INTERVAL_MS") {
            self.gc_interval_ms = parse("RMEDIA_GC_INTERVAL_MS", v)?;
        }
        if let Some(v) = lookup("RMEDIA_TOMBSTONE_TTL_MS") {
            self.tombstone_ttl_ms = parse("RMEDIA_TOMBSTONE_TTL_MS", v)?;
        }
        if let Some(v) = lookup("RMEDIA_DISPATCH_WORKERS") {
            self.dispatch.workers = parse("RMEDIA_DISPATCH_WORKERS", v)?;
        }
        if let Some(v) = lookup("RMEDIA_DISPATCH_QUEUE_CAPACITY") {
            self.dispatch.queue_capacity = parse("RMEDIA_DISPATCH_QUEUE_CAPACITY", v)?;
        }
        if let Some(v) = lookup("RMEDIA_DELIVERY_TIMEOUT_MS") {
            self.dispatch.delivery_timeout_ms = parse("RMEDIA_DELIVERY_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("RMEDIA_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("RMEDIA_LOG_JSON") {
            self.logging.json = parse("RMEDIA_LOG_JSON", v)?;
        }

        Ok(self)
    }

    /// Check value ranges
    pub fn validated(self) -> Result<Self> {
        if self.max_objects == 0 {
            return Err(Error::Config("max_objects must be greater than zero".into()));
        }
        if self.gc_interval_ms == 0 {
            return Err(Error::Config("gc_interval_ms must be greater than zero".into()));
        }
        if self.dispatch.workers == 0 {
            return Err(Error::Config("dispatch.workers must be greater than zero".into()));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(Error::Config("dispatch.queue_capacity must be greater than zero".into()));
        }
        crate::logging::parse_log_level(&self.logging.level)?;
        Ok(self)
    }
}
