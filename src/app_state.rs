//! Application State Management
//!
//! This module provides the application state shared by the HTTP handlers and
//! the gRPC service, wiring the configured backends into one [`FileService`].

use log::info;
use std::sync::Arc;

use crate::blob::{mock_store::MockBlobStore, BlobStore};
use crate::config::AppConfig;
use crate::error::Result;
use crate::metadata::{mock_store::MockMetadataStore, MetadataStore};
use crate::service::FileService;

/// Application state containing the file service and its configuration
#[derive(Clone)]
pub struct AppState {
    pub file_service: Arc<FileService>,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state from configuration
    pub fn from_config(config: AppConfig) -> Result<Self> {
        info!("Initializing application state with configuration");

        let blobs = config.storage.create_store()?;
        let metadata = config.metadata.create_store()?;

        info!("Application state initialized successfully");
        Ok(Self::with_stores(config, metadata, blobs))
    }

    /// Build the state around already constructed stores
    pub fn with_stores(config: AppConfig, metadata: Arc<dyn MetadataStore>, blobs: Arc<dyn BlobStore>) -> Self {
        let file_service = FileService::new(metadata, blobs).with_limits(config.limits.clone());
        Self {
            file_service: Arc::new(file_service),
            config,
        }
    }

    /// Create application state for testing with mock backends
    pub fn new_for_testing() -> Self {
        Self::with_stores(
            AppConfig::default(),
            Arc::new(MockMetadataStore::new()),
            Arc::new(MockBlobStore::new()),
        )
    }
}
