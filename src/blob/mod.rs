//! Blob Storage Layer Abstraction
//!
//! Binary payloads are stored apart from the file records and addressed by an
//! opaque blob reference that the store assigns on write. Each blob carries a
//! small amount of store-side metadata (content type, length, MD5) computed
//! once at write time for auditing.

pub mod config;
pub mod local_store;
pub mod mock_store;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Result;

/// Store-side metadata recorded alongside each payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlobInfo {
    pub blob_ref: String,
    /// Record the blob was written for
    pub file_id: String,
    pub filename: String,
    pub content_type: String,
    pub length: u64,
    /// Hex MD5 of the whole payload
    pub md5: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Sequential reader over a stored payload
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Calculate MD5 checksum for data
pub fn checksum(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

/// Trait defining the blob storage interface
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a payload and return its metadata, including the new blob reference
    async fn write(&self, file_id: &str, filename: &str, data: Bytes, content_type: &str) -> Result<BlobInfo>;

    /// Metadata of a stored blob, `NotFound` when absent
    async fn stat(&self, blob_ref: &str) -> Result<BlobInfo>;

    /// Open a stored blob for reading
    async fn open_read(&self, blob_ref: &str) -> Result<(BlobInfo, BlobReader)>;

    /// Remove a blob, `NotFound` when absent
    async fn delete(&self, blob_ref: &str) -> Result<()>;

    /// Recompute the checksum of a stored blob and compare it with the one
    /// recorded at write time
    async fn verify(&self, blob_ref: &str) -> Result<bool> {
        let (info, mut reader) = self.open_read(blob_ref).await?;
        let mut data = Vec::with_capacity(info.length as usize);
        reader.read_to_end(&mut data).await?;
        Ok(data.len() as u64 == info.length && checksum(&data) == info.md5)
    }
}

/// Read a whole blob into memory
pub async fn read_all(store: &dyn BlobStore, blob_ref: &str) -> Result<(BlobInfo, Vec<u8>)> {
    let (info, mut reader) = store.open_read(blob_ref).await?;
    let mut data = Vec::with_capacity(info.length as usize);
    reader.read_to_end(&mut data).await?;
    Ok((info, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_hex_md5() {
        assert_eq!(checksum(b"hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(checksum(b"").len(), 32);
    }
}
