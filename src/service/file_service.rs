//! Coordination of the metadata store and the blob store
//!
//! Every operation that touches both stores goes through [`FileService`], which
//! owns the ordering between the two and the compensation when the second step
//! fails. A record always points at a blob that was completely written, or at
//! no blob at all.

use bytes::Bytes;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::blob::{BlobInfo, BlobReader, BlobStore};
use crate::config::LimitsConfig;
use crate::error::{FileStoreError, Result};
use crate::metadata::{check_filter_key, parse_id, FileRecord, FileUpdate, ListOptions, MetadataStore, NewFile};

/// A fully assembled payload ready to be written to the blob store
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub data: Bytes,
    pub content_type: String,
}

impl Payload {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Service shared by the gRPC and HTTP transports
#[derive(Clone)]
pub struct FileService {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    limits: LimitsConfig,
}

impl FileService {
    pub fn new(metadata: Arc<dyn MetadataStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            metadata,
            blobs,
            limits: LimitsConfig::default(),
        }
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Records whose metadata contains every pair of `filter`
    pub async fn list(&self, filter: &HashMap<String, String>, options: &ListOptions) -> Result<Vec<FileRecord>> {
        for key in filter.keys() {
            check_filter_key(key)?;
        }
        let mut options = options.clone();
        if options.limit <= 0 {
            options.limit = self.limits.list_limit;
        }
        debug!(
            "Listing files with {} filter pairs, limit {}, page {}",
            filter.len(),
            options.limit,
            options.page
        );
        self.metadata.list(filter, &options).await
    }

    pub async fn get(&self, id: &str) -> Result<FileRecord> {
        parse_id(id)?;
        self.metadata.get_by_id(id).await
    }

    /// Insert a record and, when a payload is supplied, write it and link it.
    ///
    /// If the payload cannot be stored or linked the record is removed again,
    /// so a failed create leaves nothing behind.
    pub async fn create(&self, file: NewFile, payload: Option<Payload>) -> Result<FileRecord> {
        if file.name.trim().is_empty() {
            return Err(FileStoreError::InvalidArgument("File name is required".to_string()));
        }
        let payload = payload.filter(|p| !p.is_empty());
        if payload.as_ref().is_some_and(|p| p.content_type.is_empty()) {
            return Err(FileStoreError::MissingContentType);
        }

        let id = self.metadata.insert(&file).await?;
        info!("Created file record {} ({})", id, file.name);

        if let Some(payload) = payload {
            if let Err(e) = self.link_payload(&id, &file.name, payload).await {
                error!("Failed to attach content to file {}: {}", id, e);
                if let Err(cleanup) = self.metadata.delete_by_id(&id).await {
                    error!("Could not remove record {} after failed upload: {}", id, cleanup);
                }
                return Err(e);
            }
        }

        self.metadata.get_by_id(&id).await
    }

    /// Apply a partial update and, when a payload is supplied, swap the linked blob.
    ///
    /// The new blob is linked before the old one is deleted. If linking fails
    /// the record keeps its previous blob and the overwritten fields are put
    /// back.
    pub async fn update(&self, id: &str, update: FileUpdate, payload: Option<Payload>) -> Result<FileRecord> {
        if id.is_empty() {
            return Err(FileStoreError::IdentifierRequired);
        }
        parse_id(id)?;
        if update.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(FileStoreError::InvalidArgument("File name cannot be empty".to_string()));
        }
        let payload = payload.filter(|p| !p.is_empty());
        if payload.as_ref().is_some_and(|p| p.content_type.is_empty()) {
            return Err(FileStoreError::MissingContentType);
        }

        // Blob links only change through a payload
        let update = FileUpdate { blob_ref: None, ..update };
        let previous = match &payload {
            Some(_) => Some(self.metadata.get_by_id(id).await?),
            None => None,
        };
        self.metadata.update_fields(id, &update).await?;
        let record = self.metadata.get_by_id(id).await?;

        let (payload, previous) = match (payload, previous) {
            (Some(payload), Some(previous)) => (payload, previous),
            _ => {
                info!("Updated fields of file {}", id);
                return Ok(record);
            }
        };

        let info = match self.link_payload(id, &record.name, payload).await {
            Ok(info) => info,
            Err(e) => {
                self.restore_fields(id, &update, &previous).await;
                return Err(e);
            }
        };
        if record.has_blob() {
            if let Err(e) = self.blobs.delete(&record.blob_ref).await {
                warn!(
                    "Replaced blob {} of file {} could not be deleted and is orphaned: {}",
                    record.blob_ref, id, e
                );
            }
        }
        info!("Replaced content of file {} with blob {}", id, info.blob_ref);

        self.metadata.get_by_id(id).await
    }

    /// Delete the record, then its blob.
    ///
    /// Once the record is gone the file no longer exists for clients, so a blob
    /// that cannot be removed is only logged.
    pub async fn delete(&self, id: &str) -> Result<()> {
        parse_id(id)?;
        let record = self.metadata.get_by_id(id).await?;
        self.metadata.delete_by_id(id).await?;

        if record.has_blob() {
            if let Err(e) = self.blobs.delete(&record.blob_ref).await {
                warn!("Blob {} of deleted file {} is orphaned: {}", record.blob_ref, id, e);
            }
        }
        info!("Deleted file {}", id);
        Ok(())
    }

    /// Resolve a record to a reader over its linked payload
    pub async fn open_content(&self, id: &str) -> Result<(FileRecord, BlobInfo, BlobReader)> {
        let record = self.get(id).await?;
        if !record.has_blob() {
            return Err(FileStoreError::NotFound(format!("File {} has no content", id)));
        }

        match self.blobs.open_read(&record.blob_ref).await {
            Ok((info, reader)) => Ok((record, info, reader)),
            Err(e) => {
                warn!("Failed to open blob {} of file {}: {}", record.blob_ref, id, e);
                Err(FileStoreError::NotFound(format!("Content of file {} not found", id)))
            }
        }
    }

    /// Recompute the checksum of the linked payload and compare it with the
    /// one recorded when it was written
    pub async fn verify_content(&self, id: &str) -> Result<bool> {
        let record = self.get(id).await?;
        if !record.has_blob() {
            return Err(FileStoreError::NotFound(format!("File {} has no content", id)));
        }
        let intact = self.blobs.verify(&record.blob_ref).await?;
        if !intact {
            warn!("Checksum mismatch for blob {} of file {}", record.blob_ref, id);
        }
        Ok(intact)
    }

    /// Put back the fields a failed replace overwrote
    async fn restore_fields(&self, id: &str, applied: &FileUpdate, previous: &FileRecord) {
        let restore = FileUpdate {
            name: applied.name.as_ref().map(|_| previous.name.clone()),
            description: applied.description.as_ref().map(|_| previous.description.clone()),
            metadata: applied.metadata.as_ref().map(|_| previous.metadata.clone()),
            blob_ref: None,
        };
        if restore.is_empty() {
            return;
        }
        if let Err(e) = self.metadata.update_fields(id, &restore).await {
            error!("Could not restore fields of file {} after failed replace: {}", id, e);
        }
    }

    /// Write a payload and point the record at it, removing the blob again if
    /// the record cannot be updated
    async fn link_payload(&self, id: &str, filename: &str, payload: Payload) -> Result<BlobInfo> {
        let info = self
            .blobs
            .write(id, filename, payload.data, &payload.content_type)
            .await?;
        debug!("Stored {} bytes for file {} as blob {}", info.length, id, info.blob_ref);

        if let Err(e) = self.metadata.update_fields(id, &FileUpdate::link_blob(&info.blob_ref)).await {
            if let Err(cleanup) = self.blobs.delete(&info.blob_ref).await {
                error!("Unlinked blob {} for file {} is orphaned: {}", info.blob_ref, id, cleanup);
            }
            return Err(e);
        }
        Ok(info)
    }
}
