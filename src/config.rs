use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::download::metadata::{CompressionMode, SqliteMode};
use crate::map::ResolutionTier;

/// Environment variable pointing at an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "CIRCLES_CATALOG_CONFIG";

/// Root configuration for the catalog reader.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub images: ImageCacheConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// Load configuration from an explicit path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Find a configuration file: `CIRCLES_CATALOG_CONFIG` first, then
    /// `./config/default.toml`. Falls back to defaults when neither exists.
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "failed to read the current working directory".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the downloaded snapshot files.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the data directory.
    ///
    /// - Linux: ~/.local/share/circles-catalog/databases
    /// - macOS: ~/Library/Application Support/circles-catalog/databases
    /// - Windows: %APPDATA%\circles-catalog\databases
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(env::temp_dir);
        path.push("circles-catalog");
        path.push("databases");
        path
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "NetworkConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "NetworkConfig::default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub sqlite_mode: SqliteMode,
    #[serde(default)]
    pub compression: CompressionMode,
}

impl NetworkConfig {
    fn default_endpoint() -> String {
        "https://api1.circle.ms".to_string()
    }

    fn default_timeout() -> u64 {
        60
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            timeout_secs: Self::default_timeout(),
            sqlite_mode: SqliteMode::default(),
            compression: CompressionMode::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageCacheConfig {
    /// Share of available memory the decoded image LRU may occupy.
    #[serde(default = "ImageCacheConfig::default_fraction")]
    pub memory_fraction: f64,
    /// Floor for the budget when memory detection reports very little.
    #[serde(default = "ImageCacheConfig::default_min_budget")]
    pub min_budget_bytes: usize,
}

impl ImageCacheConfig {
    fn default_fraction() -> f64 {
        0.125
    }

    fn default_min_budget() -> usize {
        16 * 1024 * 1024
    }
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            memory_fraction: Self::default_fraction(),
            min_budget_bytes: Self::default_min_budget(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "CatalogConfig::default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub resolution: ResolutionTier,
}

impl CatalogConfig {
    fn default_page_size() -> usize {
        50
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_size: Self::default_page_size(),
            resolution: ResolutionTier::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
