//! # Configuration
//!
//! Runtime settings for the server and the CLI.
//!
//! Settings come from three layers, later layers winning:
//! 1. Built-in defaults
//! 2. An optional `pagetree.toml` file (`--config`)
//! 3. Environment variables
//!
//! CLI flags are applied on top by the command layer.
//!
//! ## Environment Variables
//!
//! - `PAGETREE_API_KEY`: API key for the HTTP server (empty disables auth)
//! - `PAGETREE_RATE_LIMIT`: Requests per second (0 disables rate limiting)
//! - `PAGETREE_CORS_ORIGINS`: Comma-separated origins, or "*" for all
//!
//! ## Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [storage]
//! database = "site.db"
//! backend = "redb"
//!
//! [[parked]]
//! slug = "error"
//! title = "Not found"
//! type = "errorPage"
//! ```

use clap::ValueEnum;
use pagetree_core::{ParkSpec, TreeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Maximum accepted size of a configuration file (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Default rate limit: 100 requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

// =============================================================================
// BACKEND
// =============================================================================

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// ACID database (redb).
    #[default]
    Redb,
    /// Snapshot file, rewritten after every change.
    File,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redb => f.write_str("redb"),
            Self::File => f.write_str("file"),
        }
    }
}

// =============================================================================
// SECTIONS
// =============================================================================

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests per second. 0 disables rate limiting.
    pub rate_limit: u32,
    /// Allowed CORS origins. `None` means localhost only; `["*"]` allows all.
    pub cors_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
    pub backend: Backend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("pagetree.db"),
            backend: Backend::Redb,
        }
    }
}

/// `[auth]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub api_key: Option<String>,
}

// =============================================================================
// CONFIG
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    /// Extra parked pages created under the root at startup.
    pub parked: Vec<ParkSpec>,
}

impl Config {
    /// Load configuration from an optional file, then apply the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, TreeError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, TreeError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            TreeError::Store(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(TreeError::Serialization(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            TreeError::Store(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, TreeError> {
        toml::from_str(text)
            .map_err(|e| TreeError::Serialization(format!("Invalid config: {}", e)))
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("PAGETREE_API_KEY") {
            self.auth.api_key = Some(key).filter(|k| !k.is_empty());
        }

        if let Some(raw) = lookup("PAGETREE_RATE_LIMIT") {
            match raw.trim().parse::<u32>() {
                Ok(rps) => self.server.rate_limit = rps,
                Err(e) => tracing::warn!("Ignoring PAGETREE_RATE_LIMIT='{}': {}", raw, e),
            }
        }

        if let Some(raw) = lookup("PAGETREE_CORS_ORIGINS") {
            let origins: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            self.server.cors_origins = Some(origins);
        }
    }

    /// The configured API key, if any non-empty key is set.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.auth.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.rate_limit, DEFAULT_RATE_LIMIT);
        assert_eq!(config.storage.backend, Backend::Redb);
        assert!(config.api_key().is_none());
        assert!(config.parked.is_empty());
    }

    #[test]
    fn parses_partial_toml() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000

            [storage]
            backend = "file"

            [[parked]]
            slug = "error"
            type = "errorPage"
            published = false
            "#,
        )
        .expect("parse");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.storage.backend, Backend::File);
        assert_eq!(config.parked.len(), 1);
        assert_eq!(config.parked[0].node_type, "errorPage");
        assert!(!config.parked[0].published);
    }

    #[test]
    fn invalid_toml_is_serialization_error() {
        let err = Config::from_toml("[server\nport = ").expect_err("invalid");
        assert!(matches!(err, TreeError::Serialization(_)));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::from_toml("[auth]\napi_key = \"from-file\"").expect("parse");
        config.apply_env(env(&[
            ("PAGETREE_API_KEY", "from-env"),
            ("PAGETREE_RATE_LIMIT", "0"),
            ("PAGETREE_CORS_ORIGINS", "https://a.example, https://b.example"),
        ]));
        assert_eq!(config.api_key(), Some("from-env"));
        assert_eq!(config.server.rate_limit, 0);
        assert_eq!(
            config.server.cors_origins,
            Some(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
    }

    #[test]
    fn empty_api_key_disables_auth() {
        let mut config = Config::default();
        config.apply_env(env(&[("PAGETREE_API_KEY", "")]));
        assert!(config.api_key().is_none());
    }

    #[test]
    fn bad_rate_limit_is_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("PAGETREE_RATE_LIMIT", "fast")]));
        assert_eq!(config.server.rate_limit, DEFAULT_RATE_LIMIT);
    }

    #[test]
    fn from_file_reads_disk() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("pagetree.toml");
        std::fs::write(&path, "[server]\nhost = \"0.0.0.0\"\n").expect("write");
        let config = Config::from_file(&path).expect("load");
        assert_eq!(config.server.host, "0.0.0.0");

        let missing = Config::from_file(&temp.path().join("missing.toml"));
        assert!(matches!(missing, Err(TreeError::Store(_))));
    }
}
