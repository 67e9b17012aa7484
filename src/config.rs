use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level refgraph configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path for the usage database.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

/// Rescan and debounce settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// A full rescan is forced once the last one is older than this.
    #[serde(default = "default_rescan_interval_days")]
    pub rescan_interval_days: u64,
    /// Disable to rely on incremental updates only (first-run and
    /// schema-recovery rescans still happen).
    #[serde(default = "default_periodic_rescan")]
    pub periodic_rescan: bool,
    /// Window used by [`BatchDebouncer`](crate::batch::BatchDebouncer) to
    /// coalesce rapid-fire change events into one batch.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_db_path() -> String {
    ".refgraph/usages.db".to_string()
}

fn default_rescan_interval_days() -> u64 {
    7
}

fn default_periodic_rescan() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    1000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            rescan_interval_days: default_rescan_interval_days(),
            periodic_rescan: default_periodic_rescan(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Resolve the database path relative to a base directory.
    pub fn resolve_db_path(&self, base: &Path) -> PathBuf {
        base.join(&self.store.db_path)
    }
}
