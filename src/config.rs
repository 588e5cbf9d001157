use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::graph::{KinshipPolicy, DEFAULT_KINSHIP_RADIUS};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub familytree: FamilyTreeConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FamilyTreeConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Graph engine limits
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Parent hops walked from each endpoint when looking for a shared ancestor.
    #[serde(default = "default_kinship_radius")]
    pub kinship_radius: usize,
    /// Upper bound on persons collected into one ancestry tree.
    #[serde(default = "default_max_ancestors")]
    pub max_ancestors: usize,
    /// Upper bound on generations walked from the root.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Per-request traversal deadline; 0 disables it.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kinship_radius: default_kinship_radius(),
            max_ancestors: default_max_ancestors(),
            max_depth: default_max_depth(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl EngineConfig {
    pub fn kinship_policy(&self) -> KinshipPolicy {
        KinshipPolicy::new(self.kinship_radius)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

/// SQLite tuning
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
            migrations_dir: default_migrations_dir(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_kinship_radius() -> usize {
    DEFAULT_KINSHIP_RADIUS
}

fn default_max_ancestors() -> usize {
    10_000
}

fn default_max_depth() -> usize {
    256
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    5001
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in FAMILYTREE_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("FAMILYTREE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.familytree.db_path.as_os_str().is_empty() {
            anyhow::bail!("familytree.db_path must not be empty");
        }

        if let Some(parent) = self.familytree.db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                anyhow::bail!(
                    "Directory for db_path does not exist: {}",
                    parent.display()
                );
            }
        }

        if self.engine.kinship_radius < DEFAULT_KINSHIP_RADIUS {
            anyhow::bail!(
                "engine.kinship_radius must be at least {} (grandparents)",
                DEFAULT_KINSHIP_RADIUS
            );
        }

        if self.engine.max_ancestors == 0 {
            anyhow::bail!("engine.max_ancestors must be greater than 0");
        }

        if self.engine.max_depth == 0 {
            anyhow::bail!("engine.max_depth must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.familytree.db_path
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.database.migrations_dir
    }
}
