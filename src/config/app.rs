//! Main application configuration
//!
//! This module defines the primary configuration structures for the warboard
//! service, including environment variable and TOML file loading and validation.

use crate::config::rating::RatingConfig;
use crate::types::SeasonNumber;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub storage: StorageSettings,
    pub sheet: SheetSettings,
    pub rating: RatingConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Host the HTTP server binds to
    pub http_host: String,
    /// Port for the dashboard API, health and metrics endpoints
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Where ledger records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            other => Err(anyhow!("Unknown storage backend: {}", other)),
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Directory holding record files and season archives
    pub data_dir: PathBuf,
}

/// Roster sheet import settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetSettings {
    /// Exported roster sheet (CSV)
    pub roster_csv: Option<PathBuf>,
    /// Exported kill-streak sheet (CSV)
    pub streaks_csv: Option<PathBuf>,
    /// Season whose counts come from the roster sheet
    pub import_season: SeasonNumber,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "warboard".to_string(),
            log_level: "info".to_string(),
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            shutdown_timeout_seconds: 10,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Default for SheetSettings {
    fn default() -> Self {
        Self {
            roster_csv: None,
            streaks_csv: None,
            import_season: 60,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables override it
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HTTP_HOST") {
            self.service.http_host = host;
        }
        if let Ok(port) = env::var("HTTP_PORT") {
            self.service.http_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HTTP_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Storage settings
        if let Ok(backend) = env::var("WARBOARD_STORAGE") {
            self.storage.backend = backend.parse()?;
        }
        if let Ok(dir) = env::var("WARBOARD_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }

        // Sheet settings
        if let Ok(path) = env::var("WARBOARD_ROSTER_CSV") {
            self.sheet.roster_csv = Some(PathBuf::from(path));
        }
        if let Ok(path) = env::var("WARBOARD_STREAKS_CSV") {
            self.sheet.streaks_csv = Some(PathBuf::from(path));
        }
        if let Ok(season) = env::var("IMPORT_SEASON") {
            self.sheet.import_season = season
                .parse()
                .map_err(|_| anyhow!("Invalid IMPORT_SEASON value: {}", season))?;
        }

        // Rating settings
        if let Ok(multiplier) = env::var("SOLO_RATE_MULTIPLIER") {
            self.rating.solo_rate_multiplier = multiplier
                .parse()
                .map_err(|_| anyhow!("Invalid SOLO_RATE_MULTIPLIER value: {}", multiplier))?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.storage.backend == StorageBackend::File
        && config.storage.data_dir.as_os_str().is_empty()
    {
        return Err(anyhow!("Data directory cannot be empty for file storage"));
    }

    config.rating.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.sheet.import_season, 60);
        assert_eq!(config.storage.backend, StorageBackend::File);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = AppConfig::default();
        config.service.http_port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(
            "Memory".parse::<StorageBackend>().unwrap(),
            StorageBackend::Memory
        );
        assert!("redis".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_from_file_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[service]
http_port = 9100

[storage]
backend = "memory"

[rating]
solo_rate_multiplier = 1.2
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.service.http_port, 9100);
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.rating.solo_rate_multiplier, 1.2);
        assert_eq!(config.rating.node_offset, 12.0);
    }

    #[test]
    fn test_from_file_missing() {
        let result = AppConfig::from_file(Path::new("/nonexistent/warboard.toml"));
        assert!(result.is_err());
    }
}
