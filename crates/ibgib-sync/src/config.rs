//! Client configuration
//!
//! Loaded from TOML; every field has a default so partial files work.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sync client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL for content fetch (`GET <base>/<id>`)
    pub base_json_path: String,
    /// Ids refreshed within this window are skipped by the sync queues
    pub refresh_cooldown_ms: u64,
    /// Period of background queue flushes
    pub flush_interval_ms: u64,
    /// Lifetime of untouched affordance nodes
    pub virtual_expiry_ms: u64,
    /// Attempts to find a queue callback before giving up
    pub callback_retry_attempts: u32,
    /// Delay between those attempts
    pub callback_retry_delay_ms: u64,
    /// Content cache capacity (entries)
    pub content_cache_capacity: u64,
    /// Enables file-backed persistence of content and latest pointers
    pub persist_dir: Option<PathBuf>,
    /// Salt prefix for hash verification
    pub hash_salt: String,
    /// Offer follow-on affordances for confirmed content
    pub show_affordances: bool,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_json_path: "http://localhost:4000/ibgib/json/".to_string(),
            refresh_cooldown_ms: 600_000,
            flush_interval_ms: 5_000,
            virtual_expiry_ms: 5_000,
            callback_retry_attempts: 5,
            callback_retry_delay_ms: 50,
            content_cache_capacity: 10_000,
            persist_dir: None,
            hash_salt: String::new(),
            show_affordances: true,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML
    ///
    /// # Errors
    /// [`SyncError::Config`] on malformed input
    pub fn from_toml_str(s: &str) -> Result<Self, SyncError> {
        toml::from_str(s).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// [`SyncError::Config`] if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
            .map_err(|e| SyncError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// With base JSON path
    #[inline]
    #[must_use]
    pub fn with_base_json_path(mut self, base: impl Into<String>) -> Self {
        self.base_json_path = base.into();
        self
    }

    /// With refresh cooldown
    #[inline]
    #[must_use]
    pub fn with_refresh_cooldown_ms(mut self, ms: u64) -> Self {
        self.refresh_cooldown_ms = ms;
        self
    }

    /// With flush interval
    #[inline]
    #[must_use]
    pub fn with_flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    /// With virtual node expiry
    #[inline]
    #[must_use]
    pub fn with_virtual_expiry_ms(mut self, ms: u64) -> Self {
        self.virtual_expiry_ms = ms;
        self
    }

    /// With persistence directory
    #[inline]
    #[must_use]
    pub fn with_persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }

    /// With affordances on or off
    #[inline]
    #[must_use]
    pub fn with_affordances(mut self, show: bool) -> Self {
        self.show_affordances = show;
        self
    }

    #[inline]
    #[must_use]
    pub fn refresh_cooldown(&self) -> Duration {
        Duration::from_millis(self.refresh_cooldown_ms)
    }

    #[inline]
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    #[inline]
    #[must_use]
    pub fn virtual_expiry(&self) -> Duration {
        Duration::from_millis(self.virtual_expiry_ms)
    }

    #[inline]
    #[must_use]
    pub fn callback_retry_delay(&self) -> Duration {
        Duration::from_millis(self.callback_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn partial_toml_uses_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            base_json_path = "https://www.ibgib.com/ibgib/json/"
            refresh_cooldown_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.base_json_path, "https://www.ibgib.com/ibgib/json/");
        assert_eq!(config.refresh_cooldown(), Duration::from_secs(1));
        assert_eq!(config.flush_interval_ms, 5_000);
        assert!(config.show_affordances);
        assert_eq!(config.persist_dir, None);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = SyncConfig::from_toml_str("refresh_cooldown_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "persist_dir = \"/tmp/ibgib\"\nlog_json = true").unwrap();

        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.persist_dir, Some(PathBuf::from("/tmp/ibgib")));
        assert!(config.log_json);
    }

    #[test]
    fn missing_file_is_config_error() {
        assert!(matches!(
            SyncConfig::load("/definitely/not/here.toml"),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn builder() {
        let config = SyncConfig::new()
            .with_refresh_cooldown_ms(10)
            .with_virtual_expiry_ms(20)
            .with_affordances(false);
        assert_eq!(config.refresh_cooldown_ms, 10);
        assert_eq!(config.virtual_expiry(), Duration::from_millis(20));
        assert!(!config.show_affordances);
    }
}
