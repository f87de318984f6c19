//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults and a handful of
//! environment overrides for containerised deployments.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::blob::config::{BlobBackend, BlobConfig};
use crate::metadata::config::{MetadataBackend, MetadataConfig};
use crate::metadata::DEFAULT_LIST_LIMIT;
use crate::service::download::DOWNLOAD_CHUNK_SIZE;
use crate::service::MAX_PAYLOAD_SIZE;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "FILE_STORAGE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Blob storage configuration
    pub storage: BlobConfig,
    /// Metadata configuration
    pub metadata: MetadataConfig,
    /// Payload and paging limits
    pub limits: LimitsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address both servers bind to
    pub host: String,
    /// Port of the JSON/HTTP server
    pub http_port: u16,
    /// Port of the gRPC server
    pub grpc_port: u16,
    /// Number of HTTP worker threads
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: 8080,
            grpc_port: 50051,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest payload accepted by one upload, in bytes
    pub max_payload_size: usize,
    /// Size of each chunk sent by a download, in bytes
    pub download_chunk_size: usize,
    /// Page size of a listing when the caller does not set one
    pub list_limit: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            download_chunk_size: DOWNLOAD_CHUNK_SIZE,
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

/// Outcome of [`AppConfig::load`].
///
/// Loading runs before logging is configured, so what it has to say is kept
/// here and written out by [`LoadReport::log`] afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub path: String,
    pub file_found: bool,
    pub warnings: Vec<String>,
}

impl LoadReport {
    pub fn log(&self) {
        if self.file_found {
            info!("Loaded configuration from {}", self.path);
        } else {
            warn!("Config file {} not found, using defaults", self.path);
        }
        for warning in &self.warnings {
            warn!("{}", warning);
        }
    }
}

impl AppConfig {
    /// Load configuration from file, use defaults if not found, then apply
    /// environment overrides
    pub fn load() -> Result<(Self, LoadReport), Box<dyn std::error::Error>> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let file = Self::from_file(&path)?;
        let file_found = file.is_some();
        let mut config = file.unwrap_or_default();
        let warnings = config.apply_env_overrides();
        Ok((
            config,
            LoadReport {
                path,
                file_found,
                warnings,
            },
        ))
    }

    /// Read a YAML configuration file, or `None` when it does not exist
    pub fn from_file(config_path: &str) -> Result<Option<Self>, Box<dyn std::error::Error>> {
        if !Path::new(config_path).exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(config_path)?;
        Ok(Some(serde_yaml::from_str(&content)?))
    }

    /// Override backends and ports from the environment.
    ///
    /// Invalid values are ignored and returned as warnings.
    pub fn apply_env_overrides(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Ok(value) = std::env::var("STORAGE_BACKEND") {
            match value.parse::<BlobBackend>() {
                Ok(backend) => self.storage.backend = backend,
                Err(e) => warnings.push(format!("Ignoring STORAGE_BACKEND: {}", e)),
            }
        }
        if let Ok(value) = std::env::var("METADATA_BACKEND") {
            match value.parse::<MetadataBackend>() {
                Ok(backend) => self.metadata.backend = backend,
                Err(e) => warnings.push(format!("Ignoring METADATA_BACKEND: {}", e)),
            }
        }
        if let Some(port) = port_from_env("HTTP_PORT", &mut warnings) {
            self.server.http_port = port;
        }
        if let Some(port) = port_from_env("GRPC_PORT", &mut warnings) {
            self.server.grpc_port = port;
        }
        warnings
    }
}

fn port_from_env(name: &str, warnings: &mut Vec<String>) -> Option<u16> {
    let value = std::env::var(name).ok()?;
    match value.parse::<u16>() {
        Ok(port) => Some(port),
        Err(e) => {
            warnings.push(format!("Ignoring {}={}: {}", name, value, e));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        for name in [CONFIG_PATH_ENV, "STORAGE_BACKEND", "METADATA_BACKEND", "HTTP_PORT", "GRPC_PORT"] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.server.grpc_port, 50051);
        assert_eq!(config.limits.max_payload_size, 128 * 1024 * 1024);
        assert_eq!(config.limits.download_chunk_size, 64 * 1024);
        assert_eq!(config.limits.list_limit, 100);
        assert_eq!(config.logging.config_file, "server_log.yaml");
        assert_eq!(config.storage.backend, BlobBackend::Local);
        assert_eq!(config.metadata.backend, MetadataBackend::SQLite);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "
server:
  http_port: 9000
storage:
  backend: Mock
limits:
  max_payload_size: 1024
";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.server.grpc_port, 50051);
        assert_eq!(config.storage.backend, BlobBackend::Mock);
        assert_eq!(config.storage.base_path, "./data/storage");
        assert_eq!(config.limits.max_payload_size, 1024);
        assert_eq!(config.limits.download_chunk_size, DOWNLOAD_CHUNK_SIZE);
    }

    #[test]
    #[serial]
    fn test_load_from_env_path() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "metadata:\n  backend: Mock\nserver:\n  grpc_port: 6000\n").unwrap();
        std::env::set_var(CONFIG_PATH_ENV, &path);

        let (config, report) = AppConfig::load().unwrap();
        assert_eq!(config.metadata.backend, MetadataBackend::Mock);
        assert_eq!(config.server.grpc_port, 6000);
        assert!(report.file_found);
        assert_eq!(report.path, path.to_string_lossy());
        assert!(report.warnings.is_empty());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        clear_env();
        std::env::set_var(CONFIG_PATH_ENV, "/nonexistent/file-storage.yaml");
        std::env::set_var("HTTP_PORT", "eighty");
        let (config, report) = AppConfig::load().unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(
            report,
            LoadReport {
                path: "/nonexistent/file-storage.yaml".to_string(),
                file_found: false,
                warnings: vec!["Ignoring HTTP_PORT=eighty: invalid digit found in string".to_string()],
            }
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("STORAGE_BACKEND", "mock");
        std::env::set_var("METADATA_BACKEND", "MOCK");
        std::env::set_var("HTTP_PORT", "18080");
        std::env::set_var("GRPC_PORT", "not-a-port");

        let mut config = AppConfig::default();
        let warnings = config.apply_env_overrides();
        assert_eq!(config.storage.backend, BlobBackend::Mock);
        assert_eq!(config.metadata.backend, MetadataBackend::Mock);
        assert_eq!(config.server.http_port, 18080);
        assert_eq!(config.server.grpc_port, 50051);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Ignoring GRPC_PORT=not-a-port"));

        std::env::set_var("STORAGE_BACKEND", "s3");
        std::env::remove_var("GRPC_PORT");
        let warnings = config.apply_env_overrides();
        assert_eq!(config.storage.backend, BlobBackend::Mock);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Ignoring STORAGE_BACKEND"));
        clear_env();
    }
}
