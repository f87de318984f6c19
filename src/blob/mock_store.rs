//! Mock blob storage implementation for testing

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use log::info;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::blob::{checksum, BlobInfo, BlobReader, BlobStore};
use crate::error::{FileStoreError, Result};

/// A blob store that keeps payloads in memory.
/// Useful for testing without disk I/O operations; the fault switches fail
/// individual operations on demand.
pub struct MockBlobStore {
    blobs: Mutex<HashMap<String, (BlobInfo, Bytes)>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    fn blobs(&self) -> MutexGuard<'_, HashMap<String, (BlobInfo, Bytes)>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Whether a blob with this reference is stored
    pub fn contains(&self, blob_ref: &str) -> bool {
        self.blobs().contains_key(blob_ref)
    }

    pub fn blob_count(&self) -> usize {
        self.blobs().len()
    }

    /// Overwrite the stored bytes without touching the recorded checksum
    pub fn corrupt(&self, blob_ref: &str, data: &[u8]) {
        if let Some(entry) = self.blobs().get_mut(blob_ref) {
            entry.1 = Bytes::copy_from_slice(data);
        }
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn write(&self, file_id: &str, filename: &str, data: Bytes, content_type: &str) -> Result<BlobInfo> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FileStoreError::Internal("injected blob write failure".to_string()));
        }

        let info = BlobInfo {
            blob_ref: Uuid::new_v4().to_string(),
            file_id: file_id.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            length: data.len() as u64,
            md5: checksum(&data),
            uploaded_at: Utc::now(),
        };
        info!("Mock: stored blob {} with size {}", info.blob_ref, info.length);
        self.blobs().insert(info.blob_ref.clone(), (info.clone(), data));
        Ok(info)
    }

    async fn stat(&self, blob_ref: &str) -> Result<BlobInfo> {
        self.blobs()
            .get(blob_ref)
            .map(|(info, _)| info.clone())
            .ok_or_else(|| FileStoreError::NotFound(format!("Blob {} does not exist", blob_ref)))
    }

    async fn open_read(&self, blob_ref: &str) -> Result<(BlobInfo, BlobReader)> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(FileStoreError::Internal("injected blob read failure".to_string()));
        }

        let (info, data) = self
            .blobs()
            .get(blob_ref)
            .cloned()
            .ok_or_else(|| FileStoreError::NotFound(format!("Blob {} does not exist", blob_ref)))?;
        Ok((info, Box::new(Cursor::new(data))))
    }

    async fn delete(&self, blob_ref: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(FileStoreError::Internal("injected blob delete failure".to_string()));
        }

        self.blobs()
            .remove(blob_ref)
            .map(|_| info!("Mock: deleted blob {}", blob_ref))
            .ok_or_else(|| FileStoreError::NotFound(format!("Blob {} does not exist", blob_ref)))
    }
}
