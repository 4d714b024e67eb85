//! Configuration Module
//!
//! Handles loading engine configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_TTL_SECS};
use crate::error::{OrmError, Result};
use crate::mapper::{MapperKind, NamingStrategy};

/// Default sweep interval for expired entries, in seconds
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Engine configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults. Caching stays off unless explicitly enabled.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Install a default cacher
    pub cache_enabled: bool,
    /// Maximum number of entries the default cacher can hold
    pub cache_capacity: usize,
    /// Entry lifetime in seconds; 0 keeps entries until evicted
    pub cache_ttl_secs: u64,
    /// Interval of the sweep started by `Engine::spawn_cleanup`, in seconds
    pub cleanup_interval_secs: u64,
    pub mapper: MapperKind,
    /// Prepended to every table name
    pub table_prefix: Option<String>,
    pub show_sql: bool,
    pub show_err: bool,
    pub show_warn: bool,
    pub show_debug: bool,
}

impl EngineConfig {
    /// Creates a new EngineConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `ORM_CACHE_ENABLED` - Install a default cacher (default: false)
    /// - `ORM_CACHE_CAPACITY` - Maximum cached entries (default: 1000)
    /// - `ORM_CACHE_TTL` - Entry lifetime in seconds, 0 for none (default: 3600)
    /// - `ORM_CACHE_CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `ORM_MAPPER` - `same`, `snake` or `gonic` (default: snake)
    /// - `ORM_TABLE_PREFIX` - Table name prefix (default: none)
    /// - `ORM_SHOW_SQL`, `ORM_SHOW_ERR`, `ORM_SHOW_WARN`, `ORM_SHOW_DEBUG` - Logging toggles
    ///
    /// # Errors
    /// `InvalidConfiguration` when a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            cache_enabled: env_bool("ORM_CACHE_ENABLED", defaults.cache_enabled)?,
            cache_capacity: env_parse("ORM_CACHE_CAPACITY", defaults.cache_capacity)?,
            cache_ttl_secs: env_parse("ORM_CACHE_TTL", defaults.cache_ttl_secs)?,
            cleanup_interval_secs: env_parse(
                "ORM_CACHE_CLEANUP_INTERVAL",
                defaults.cleanup_interval_secs,
            )?,
            mapper: match env::var("ORM_MAPPER") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.mapper,
            },
            table_prefix: env::var("ORM_TABLE_PREFIX").ok().filter(|p| !p.is_empty()),
            show_sql: env_bool("ORM_SHOW_SQL", defaults.show_sql)?,
            show_err: env_bool("ORM_SHOW_ERR", defaults.show_err)?,
            show_warn: env_bool("ORM_SHOW_WARN", defaults.show_warn)?,
            show_debug: env_bool("ORM_SHOW_DEBUG", defaults.show_debug)?,
        })
    }

    /// Checks values that would otherwise fail later, at first use.
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(OrmError::InvalidConfiguration(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(OrmError::InvalidConfiguration(
                "cleanup interval must be at least 1 second".to_string(),
            ));
        }
        self.table_strategy().validate()
    }

    /// `None` when entries never expire.
    pub fn ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }

    pub fn table_strategy(&self) -> NamingStrategy {
        self.mapper.into_strategy(self.table_prefix.as_deref())
    }

    pub fn column_strategy(&self) -> NamingStrategy {
        self.mapper.into_strategy(None)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_enabled: false,
            cache_capacity: DEFAULT_CAPACITY,
            cache_ttl_secs: DEFAULT_TTL_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            mapper: MapperKind::default(),
            table_prefix: None,
            show_sql: false,
            show_err: false,
            show_warn: false,
            show_debug: false,
        }
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            OrmError::InvalidConfiguration(format!("{} has invalid value '{}'", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(OrmError::InvalidConfiguration(format!(
                "{} has invalid value '{}'",
                name, raw
            ))),
        },
        Err(_) => Ok(default),
    }
}
