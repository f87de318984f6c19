//! Local filesystem blob storage implementation
//!
//! Each blob is one `<blob_ref>.bin` file under the base path with a
//! `<blob_ref>.json` sidecar holding its [`BlobInfo`]. Payloads are first
//! written under the temp path and renamed into place, so a reader never sees
//! a partially written blob. The temp path must be on the same filesystem as
//! the base path.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

use crate::blob::config::BlobConfig;
use crate::blob::{checksum, BlobInfo, BlobReader, BlobStore};
use crate::error::{FileStoreError, Result};

/// Local filesystem blob storage implementation
pub struct LocalBlobStore {
    base_path: PathBuf,
    temp_path: PathBuf,
}

impl LocalBlobStore {
    /// Create the store, making sure both directories exist
    pub fn new(config: &BlobConfig) -> Result<Self> {
        let base_path = PathBuf::from(&config.base_path);
        let temp_path = PathBuf::from(&config.temp_path);
        std::fs::create_dir_all(&base_path)?;
        std::fs::create_dir_all(&temp_path)?;
        info!(
            "Using local blob storage with base_path: {}, temp_path: {}",
            base_path.display(),
            temp_path.display()
        );
        Ok(Self { base_path, temp_path })
    }

    /// Blob references are UUIDs; anything else never reaches the filesystem
    fn checked_ref(blob_ref: &str) -> Result<Uuid> {
        Uuid::parse_str(blob_ref).map_err(|_| FileStoreError::MalformedId(blob_ref.to_string()))
    }

    fn data_path(&self, blob_ref: &Uuid) -> PathBuf {
        self.base_path.join(format!("{}.bin", blob_ref))
    }

    fn info_path(&self, blob_ref: &Uuid) -> PathBuf {
        self.base_path.join(format!("{}.json", blob_ref))
    }

    fn not_found(blob_ref: &str, e: std::io::Error) -> FileStoreError {
        if e.kind() == ErrorKind::NotFound {
            FileStoreError::NotFound(format!("Blob {} does not exist", blob_ref))
        } else {
            FileStoreError::Io(e)
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn write(&self, file_id: &str, filename: &str, data: Bytes, content_type: &str) -> Result<BlobInfo> {
        let id = Uuid::new_v4();
        let info = BlobInfo {
            blob_ref: id.to_string(),
            file_id: file_id.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            length: data.len() as u64,
            md5: checksum(&data),
            uploaded_at: Utc::now(),
        };

        let staged = self.temp_path.join(format!("{}.part", id));
        fs::write(&staged, &data).await?;
        if let Err(e) = fs::rename(&staged, self.data_path(&id)).await {
            let _ = fs::remove_file(&staged).await;
            return Err(e.into());
        }
        if let Err(e) = fs::write(self.info_path(&id), serde_json::to_vec(&info)?).await {
            let _ = fs::remove_file(self.data_path(&id)).await;
            return Err(e.into());
        }

        debug!("Written blob {} with size {}", info.blob_ref, info.length);
        Ok(info)
    }

    async fn stat(&self, blob_ref: &str) -> Result<BlobInfo> {
        let id = Self::checked_ref(blob_ref)?;
        let raw = fs::read(self.info_path(&id))
            .await
            .map_err(|e| Self::not_found(blob_ref, e))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn open_read(&self, blob_ref: &str) -> Result<(BlobInfo, BlobReader)> {
        let info = self.stat(blob_ref).await?;
        let id = Self::checked_ref(blob_ref)?;
        let file = fs::File::open(self.data_path(&id))
            .await
            .map_err(|e| Self::not_found(blob_ref, e))?;
        Ok((info, Box::new(file)))
    }

    async fn delete(&self, blob_ref: &str) -> Result<()> {
        let id = Self::checked_ref(blob_ref)?;
        let data = fs::remove_file(self.data_path(&id)).await;
        let sidecar = fs::remove_file(self.info_path(&id)).await;

        match (data, sidecar) {
            (Ok(()), Ok(())) => {
                info!("Deleted blob {}", blob_ref);
                Ok(())
            }
            (Err(e), Err(_)) => Err(Self::not_found(blob_ref, e)),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => {
                warn!("Blob {} was only partially present on delete: {}", blob_ref, e);
                Ok(())
            }
        }
    }
}
