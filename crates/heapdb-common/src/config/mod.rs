//! Engine configuration.
//!
//! An [`EngineConfig`] fixes the page size, the buffer pool capacity, and
//! the lock wait policy for the lifetime of a buffer pool. It can be
//! loaded from TOML, built in code, or taken from defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_LOCK_POLL_INTERVAL_MS, DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_PAGE_SIZE,
    DEFAULT_POOL_PAGES, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
use crate::error::{DbError, DbResult};

/// Engine configuration.
///
/// # Example
///
/// ```rust
/// use heapdb_common::config::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .pool_pages(8)
///     .lock_timeout_ms(500)
///     .build()
///     .unwrap();
/// assert_eq!(config.pool_pages, 8);
/// assert_eq!(config.page_size, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Size of every page, in bytes.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum number of resident pages in the buffer pool.
    #[serde(default = "default_pool_pages")]
    pub pool_pages: usize,

    /// Maximum time a lock request waits before the transaction aborts.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Interval between deadlock checks while a lock request waits.
    #[serde(default = "default_lock_poll_interval_ms")]
    pub lock_poll_interval_ms: u64,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_pool_pages() -> usize {
    DEFAULT_POOL_PAGES
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_lock_poll_interval_ms() -> u64 {
    DEFAULT_LOCK_POLL_INTERVAL_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            pool_pages: default_pool_pages(),
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_poll_interval_ms: default_lock_poll_interval_ms(),
        }
    }
}

impl EngineConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: &Path) -> DbResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(content: &str) -> DbResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| DbError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Converts configuration to a TOML string.
    pub fn to_toml(&self) -> DbResult<String> {
        toml::to_string_pretty(self).map_err(|e| DbError::invalid_config(e.to_string()))
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> DbResult<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks that every setting is usable.
    pub fn validate(&self) -> DbResult<()> {
        if self.pool_pages == 0 {
            return Err(DbError::invalid_config("pool_pages must be positive"));
        }
        if self.page_size < MIN_PAGE_SIZE {
            return Err(DbError::invalid_config(format!(
                "page_size must be at least {MIN_PAGE_SIZE} bytes, got {}",
                self.page_size
            )));
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(DbError::invalid_config(format!(
                "page_size must be at most {MAX_PAGE_SIZE} bytes, got {}",
                self.page_size
            )));
        }
        if self.lock_poll_interval_ms == 0 {
            return Err(DbError::invalid_config(
                "lock_poll_interval_ms must be positive",
            ));
        }
        if self.lock_poll_interval_ms > self.lock_timeout_ms {
            return Err(DbError::invalid_config(format!(
                "lock_poll_interval_ms ({}) exceeds lock_timeout_ms ({})",
                self.lock_poll_interval_ms, self.lock_timeout_ms
            )));
        }
        Ok(())
    }

    /// Returns the lock timeout as a duration.
    #[inline]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Returns the lock poll interval as a duration.
    #[inline]
    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    /// Creates a builder for configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }
}

/// Builder for engine configuration.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    /// Sets the buffer pool capacity.
    pub fn pool_pages(mut self, pages: usize) -> Self {
        self.config.pool_pages = pages;
        self
    }

    /// Sets the lock timeout in milliseconds.
    pub fn lock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.lock_timeout_ms = ms;
        self
    }

    /// Sets the lock poll interval in milliseconds.
    pub fn lock_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.lock_poll_interval_ms = ms;
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> DbResult<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.pool_pages, 50);
        assert_eq!(config.lock_timeout(), Duration::from_secs(30));
        assert_eq!(config.lock_poll_interval(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::builder()
            .page_size(1024)
            .pool_pages(2)
            .lock_timeout_ms(200)
            .lock_poll_interval_ms(10)
            .build()
            .unwrap();

        assert_eq!(config.page_size, 1024);
        assert_eq!(config.pool_pages, 2);
        assert_eq!(config.lock_timeout_ms, 200);
        assert_eq!(config.lock_poll_interval_ms, 10);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = EngineConfig::builder().pool_pages(0).build().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfig);

        assert!(EngineConfig::builder().page_size(64).build().is_err());
        // Larger pages would number slots beyond 16 bits.
        assert!(EngineConfig::builder().page_size(1 << 19).build().is_err());
        assert!(EngineConfig::builder()
            .page_size(MAX_PAGE_SIZE)
            .build()
            .is_ok());
        assert!(EngineConfig::builder()
            .lock_poll_interval_ms(0)
            .build()
            .is_err());
        assert!(EngineConfig::builder()
            .lock_timeout_ms(50)
            .lock_poll_interval_ms(100)
            .build()
            .is_err());
    }

    #[test]
    fn test_toml_partial() {
        let config = EngineConfig::from_toml("pool_pages = 4\n").unwrap();
        assert_eq!(config.pool_pages, 4);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);

        assert!(EngineConfig::from_toml("pool_pages = 0\n").is_err());
        assert!(EngineConfig::from_toml("pool_pages = \"many\"\n").is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("heapdb.toml");

        let config = EngineConfig::builder()
            .pool_pages(16)
            .lock_timeout_ms(1500)
            .build()
            .unwrap();
        config.save(&path).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
