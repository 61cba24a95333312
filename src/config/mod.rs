//! Configuration module for visflow
//!
//! This module handles engine configuration:
//! - Worker pool sizing and event polling
//! - Evaluation policy (`break_on_error`)
//! - Default delegate selection per modifier type
//! - Log filter used by the demo binary
//!
//! # App Data Location
//!
//! The default configuration file lives in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.visflow.engine/`
//! - **macOS**: `~/Library/Application Support/dev.visflow.engine/`
//! - **Windows**: `%APPDATA%\dev.visflow.engine\`
//!
//! # Files
//!
//! - `engine.toml` - Default configuration, read by [`EngineConfig::load_or_default`]
//! - Any `.json` or `.toml` file passed to [`EngineConfig::load`]
//!
//! # Example
//!
//! ```ignore
//! use visflow::config::EngineConfig;
//!
//! let mut config = EngineConfig::load_or_default();
//! config.worker_threads = 2;
//! config.save("engine.toml")?;
//! ```

use crate::error::{EngineError, EngineResult};
use crate::pipeline::time::TICKS_PER_SECOND;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.visflow.engine";

/// Default configuration filename
pub const CONFIG_FILE: &str = "engine.toml";

/// Default interval between event polls while waiting on a future
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Default log filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,visflow=debug";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default configuration file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== File Format ====================

/// On-disk representation, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Format for `path`. Anything that is not `.json` is read as TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigFormat::Json => write!(f, "JSON"),
            ConfigFormat::Toml => write!(f, "TOML"),
        }
    }
}

// ==================== Engine Config ====================

/// Engine configuration. Every field has a default so partial files load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// File format version
    pub version: u32,

    /// Background worker threads; 0 uses the available parallelism
    pub worker_threads: usize,

    /// Interval between event polls while blocking on a future
    pub poll_interval_ms: u64,

    /// Skip modifiers whose input carries an error status
    pub break_on_error: bool,

    /// Animation ticks per frame for frame-based sources
    pub ticks_per_frame: i32,

    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub log_filter: String,

    /// Modifier class name -> delegate class name picked at construction
    pub default_delegates: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut default_delegates = BTreeMap::new();
        default_delegates.insert(
            "ScalePropertyModifier".to_string(),
            "ParticlesScaleDelegate".to_string(),
        );

        Self {
            version: 1,
            worker_threads: 0,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            break_on_error: false,
            ticks_per_frame: TICKS_PER_SECOND / 10,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            default_delegates,
        }
    }
}

impl EngineConfig {
    /// Number of worker threads to spawn
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Load a config file (JSON or TOML, by extension)
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let format = ConfigFormat::from_path(path);
        let parsed = match format {
            ConfigFormat::Json => serde_json::from_str(&content).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| {
            EngineError::Config(format!("Failed to parse {} config {:?}: {}", format, path, e))
        })
    }

    /// Load the default config file, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = config_path() else {
            tracing::warn!("Could not determine config path, using defaults");
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to `path` (JSON or TOML, by extension)
    pub fn save(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = match ConfigFormat::from_path(path) {
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| EngineError::Serialization(e.to_string()))?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| EngineError::Serialization(e.to_string()))?
            }
        };

        std::fs::write(path, content).map_err(|e| {
            EngineError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

// ==================== Tests ====================
