//! Configuration settings for the registrar server.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `portal.session_cookie`.
pub const SESSION_COOKIE_ENV: &str = "REGISTRAR_SESSION_COOKIE";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub portal: PortalConfig,
    pub cache: CacheConfig,
    pub export: ExportConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations or use defaults, then
    /// apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_paths = [
            // Current directory
            PathBuf::from("config.toml"),
            PathBuf::from("registrar.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("registrar/config.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".registrar/config.toml"))
                .unwrap_or_default(),
        ];

        let mut config = None;
        for path in &config_paths {
            if path.is_file() {
                tracing::info!("Loading config from: {}", path.display());
                config = Some(Self::from_file(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            tracing::info!("No config file found, using defaults");
            Config::default()
        });
        config.apply_env();
        Ok(config)
    }

    /// Load from an explicit path, or fall back to [`Config::load`].
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let mut config = Self::from_file(path)?;
                config.apply_env();
                Ok(config)
            }
            None => Self::load(),
        }
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(cookie) = std::env::var(SESSION_COOKIE_ENV) {
            if !cookie.trim().is_empty() {
                self.portal.session_cookie = Some(cookie);
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.portal.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("portal.base_url".to_string()).into());
        }
        if self.portal.page_size == 0 {
            return Err(ConfigError::Invalid("portal.page_size must be > 0".to_string()).into());
        }
        if self.portal.timeout_secs == 0 {
            return Err(ConfigError::Invalid("portal.timeout_secs must be > 0".to_string()).into());
        }
        if self.cache.availability_ttl_secs == 0 {
            return Err(
                ConfigError::Invalid("cache.availability_ttl_secs must be > 0".to_string()).into(),
            );
        }
        if self.cache.max_availability_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_availability_entries must be > 0".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Expand the export directory path.
    pub fn export_dir(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.export.directory);
        PathBuf::from(expanded.as_ref())
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Transport type: "stdio" or "http"
    pub transport: TransportType,
    /// HTTP port (only used when transport is "http")
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: TransportType::Stdio,
            http_port: 8080,
        }
    }
}

/// Transport type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Stdio,
    Http,
}

/// Academic portal connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
    /// Cookie header of an authenticated portal session.
    pub session_cookie: Option<String>,
    pub timeout_secs: u64,
    /// Page size for the first grade query.
    pub page_size: u32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://jw.hitsz.edu.cn".to_string(),
            session_cookie: None,
            timeout_secs: 30,
            page_size: 100,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Freshness window for classroom availability snapshots.
    pub availability_ttl_secs: u64,
    /// Maximum number of availability snapshots kept at once.
    pub max_availability_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            availability_ttl_secs: 300,
            max_availability_entries: 256,
        }
    }
}

impl CacheConfig {
    pub fn availability_ttl(&self) -> Duration {
        Duration::from_secs(self.availability_ttl_secs)
    }
}

/// CSV export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory for relative export file names. Tilde-expanded.
    pub directory: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: "~".to_string(),
        }
    }
}
