//! Configuration for metadata storage backends

use crate::error::Result;
use crate::metadata::{mock_store::MockMetadataStore, sqlite_store::SQLiteMetadataStore, MetadataStore};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Available metadata storage backends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum MetadataBackend {
    #[default]
    SQLite,
    Mock,
}

impl std::str::FromStr for MetadataBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(MetadataBackend::SQLite),
            "mock" => Ok(MetadataBackend::Mock),
            _ => Err(format!("Unknown metadata backend: {}", s)),
        }
    }
}

/// Metadata backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetadataConfig {
    /// Metadata backend type
    pub backend: MetadataBackend,
    /// Database file path
    pub db_path: String,
    /// Enable WAL mode
    pub wal_mode: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: MetadataBackend::default(),
            db_path: "./data/metadata.db".to_string(),
            wal_mode: true,
        }
    }
}

impl MetadataConfig {
    /// Create a metadata store instance based on the configuration
    pub fn create_store(&self) -> Result<Arc<dyn MetadataStore>> {
        match self.backend {
            MetadataBackend::SQLite => {
                info!("Using SQLite metadata backend with db_path: {}, wal_mode: {}", self.db_path, self.wal_mode);
                Ok(Arc::new(SQLiteMetadataStore::new(self)?))
            }
            MetadataBackend::Mock => {
                info!("Using mock metadata backend");
                Ok(Arc::new(MockMetadataStore::new()))
            }
        }
    }
}
