//! Configuration for blob storage backends

use crate::blob::{local_store::LocalBlobStore, mock_store::MockBlobStore, BlobStore};
use crate::error::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Available blob storage backends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum BlobBackend {
    #[default]
    Local,
    Mock,
}

impl std::str::FromStr for BlobBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(BlobBackend::Local),
            "mock" => Ok(BlobBackend::Mock),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

/// Blob storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlobConfig {
    /// Storage backend type
    pub backend: BlobBackend,
    /// Base path for stored blobs
    pub base_path: String,
    /// Staging path for blobs being written
    pub temp_path: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            backend: BlobBackend::default(),
            base_path: "./data/storage".to_string(),
            temp_path: "./data/temp".to_string(),
        }
    }
}

impl BlobConfig {
    /// Create a blob store instance based on the configuration
    pub fn create_store(&self) -> Result<Arc<dyn BlobStore>> {
        match self.backend {
            BlobBackend::Local => Ok(Arc::new(LocalBlobStore::new(self)?)),
            BlobBackend::Mock => {
                info!("Using mock blob storage backend");
                Ok(Arc::new(MockBlobStore::new()))
            }
        }
    }
}
