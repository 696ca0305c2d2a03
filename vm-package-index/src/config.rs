//! # Configuration Management
//!
//! Settings for the index engine. The [`IndexConfig`] struct groups them into
//! sections:
//!
//! - [`RemoteConfig`]: upstream index URL, HTTP timeout, cache TTLs, crawl depth
//! - [`StorageConfig`]: local and remote distribution directories
//! - [`StoreConfig`]: key prefix and optional Redis URL
//! - [`HistoryConfig`]: length of the recent-upload log
//! - [`LimitsConfig`]: upload size limit
//!
//! ## Loading Configuration
//!
//! Settings files are TOML or JSON, chosen by extension. Every field has a
//! default, so a settings file only needs the values it overrides:
//!
//! ```rust,no_run
//! # use vm_package_index::config::IndexConfig;
//! // Load from file with fallback to defaults
//! let config = IndexConfig::load_or_default("index.toml")?;
//!
//! // Load the file named by VM_PACKAGE_INDEX_SETTINGS, if any
//! let config = IndexConfig::from_env()?;
//! # Ok::<(), vm_package_index::error::IndexError>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IndexError, IndexResult};

/// Environment variable naming the settings file.
pub const SETTINGS_ENV_VAR: &str = "VM_PACKAGE_INDEX_SETTINGS";

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
    pub store: StoreConfig,
    pub history: HistoryConfig,
    pub limits: LimitsConfig,
}

/// Upstream index and cache behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Root of the upstream "simple" index
    pub index_url: String,
    /// Timeout applied to every upstream request
    pub timeout_secs: u64,
    /// How long a cached version listing is kept at all
    pub versions_long_ttl_secs: u64,
    /// How long a cached version listing is considered fresh
    pub versions_short_ttl_secs: u64,
    /// How many levels of project pages a crawl may follow
    pub max_depth: u32,
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            index_url: "https://pypi.org/simple".to_string(),
            timeout_secs: 20,
            versions_long_ttl_secs: 86_400,
            versions_short_ttl_secs: 600,
            max_depth: 2,
            user_agent: format!("vm-package-index/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn long_ttl(&self) -> Duration {
        Duration::from_secs(self.versions_long_ttl_secs)
    }

    pub fn short_ttl(&self) -> Duration {
        Duration::from_secs(self.versions_short_ttl_secs)
    }
}

/// Distribution directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Uploaded distributions
    pub local_dir: PathBuf,
    /// Distributions cached from the upstream index
    pub remote_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("vm-package-index");
        Self {
            local_dir: base.join("local"),
            remote_dir: base.join("remote"),
        }
    }
}

/// Key-value store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix for every key the engine writes
    pub key_prefix: String,
    /// `redis://` URL; the in-memory store is used when unset
    pub redis_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "pkg-index.".to_string(),
            redis_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Number of recent uploads kept
    pub size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { size: 20 }
    }
}

/// Upload limits configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum upload size in megabytes
    pub max_upload_size_mb: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: 100,
        }
    }
}

impl IndexConfig {
    /// Load configuration from a TOML or JSON file.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: Self = if is_json {
            serde_json::from_str(&contents)?
        } else {
            toml::from_str(&contents).map_err(|e| {
                IndexError::BadRequest(format!("Invalid settings file {}: {e}", path.display()))
            })?
        };
        debug!(path = %path.display(), "Loaded index settings");
        Ok(config)
    }

    /// Load configuration from file with fallback to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load the file named by [`SETTINGS_ENV_VAR`], or defaults when unset.
    pub fn from_env() -> IndexResult<Self> {
        match std::env::var_os(SETTINGS_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::load(PathBuf::from(path)),
            _ => Ok(Self::default()),
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> IndexResult<()> {
        if self.remote.versions_short_ttl_secs >= self.remote.versions_long_ttl_secs {
            return Err(IndexError::BadRequest(format!(
                "versions_short_ttl_secs ({}) must be shorter than versions_long_ttl_secs ({})",
                self.remote.versions_short_ttl_secs, self.remote.versions_long_ttl_secs
            )));
        }
        if self.remote.timeout_secs == 0 {
            return Err(IndexError::BadRequest(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.history.size == 0 {
            return Err(IndexError::BadRequest(
                "history size must be greater than zero".to_string(),
            ));
        }
        url::Url::parse(&self.remote.index_url).map_err(|e| {
            IndexError::BadRequest(format!("Invalid index_url '{}': {e}", self.remote.index_url))
        })?;
        Ok(())
    }

    /// Get the maximum upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> usize {
        self.limits.max_upload_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.remote.index_url, "https://pypi.org/simple");
        assert_eq!(config.remote.long_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.remote.short_ttl(), Duration::from_secs(600));
        assert_eq!(config.remote.timeout(), Duration::from_secs(20));
        assert_eq!(config.remote.max_depth, 2);
        assert_eq!(config.store.key_prefix, "pkg-index.");
        assert_eq!(config.history.size, 20);
        assert_eq!(config.max_upload_size_bytes(), 100 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.toml");
        fs::write(
            &path,
            "[remote]\nindex_url = \"http://mirror.local/simple\"\nmax_depth = 1\n\n[history]\nsize = 5\n",
        )
        .unwrap();

        let config = IndexConfig::load(&path).unwrap();
        assert_eq!(config.remote.index_url, "http://mirror.local/simple");
        assert_eq!(config.remote.max_depth, 1);
        assert_eq!(config.remote.timeout_secs, 20);
        assert_eq!(config.history.size, 5);
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_load_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.json");
        fs::write(&path, r#"{"store": {"key_prefix": "test."}}"#).unwrap();

        let config = IndexConfig::load(&path).unwrap();
        assert_eq!(config.store.key_prefix, "test.");
        assert_eq!(config.remote, RemoteConfig::default());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = IndexConfig::load_or_default(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, IndexConfig::default());
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.toml");
        fs::write(&path, "[remote\n").unwrap();
        assert!(matches!(
            IndexConfig::load(&path),
            Err(IndexError::BadRequest(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = IndexConfig::default();
        config.remote.versions_short_ttl_secs = config.remote.versions_long_ttl_secs;
        assert!(config.validate().is_err());

        let mut config = IndexConfig::default();
        config.remote.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = IndexConfig::default();
        config.remote.index_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
