//! Configuration for roadmap-progress

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::RoadmapError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("roadmap-progress")
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the database and this config file
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// SQLite file name inside `storage_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Maximum pooled SQLite connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a writer waits for the SQLite lock
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Only assigned reviewers may see and review a roadmap's submissions
    #[serde(default)]
    pub strict_review_scoping: bool,
}

fn default_database_file() -> String {
    "roadmap.db".to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8095
}

fn default_pool_size() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            database_file: default_database_file(),
            http_host: default_http_host(),
            http_port: default_http_port(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            strict_review_scoping: false,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RoadmapError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RoadmapError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RoadmapError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| RoadmapError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join(&self.database_file)
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    /// `host:port` the HTTP server binds to
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("http_port = 9000\nstrict_review_scoping = true").unwrap();
        assert_eq!(config.http_port, 9000);
        assert!(config.strict_review_scoping);
        assert_eq!(config.database_file, "roadmap.db");
        assert_eq!(config.pool_size, 8);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            storage_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        config.save(config.config_path()).unwrap();

        let loaded = Config::load(config.config_path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.database_path(), dir.path().join("roadmap.db"));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "http_port = \"not a number\"").unwrap();
        assert!(matches!(Config::load(&path), Err(RoadmapError::Config(_))));
    }
}
