//! Server-streaming download
//!
//! The content type goes out first, then the payload in fixed-size chunks.
//! A spawned task reads the blob and feeds a bounded channel, so a slow
//! client only ever holds a few chunks in memory.

use bytes::Bytes;
use log::{debug, warn};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::blob::BlobReader;
use crate::error::{FileStoreError, Result};
use crate::service::file_service::FileService;

/// Chunk size used when none is configured (64 KiB)
pub const DOWNLOAD_CHUNK_SIZE: usize = 1 << 16;

const CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadMessage {
    ContentType(String),
    Chunk(Bytes),
}

pub type DownloadStream = ReceiverStream<Result<DownloadMessage>>;

/// Resolve a file and start streaming its payload.
///
/// Lookup failures are returned before any message is produced. A read error
/// once streaming has started ends the stream with a `NotFound` item.
pub async fn download(service: &FileService, id: &str) -> Result<DownloadStream> {
    let (record, info, reader) = service.open_content(id).await?;
    let chunk_size = service.limits().download_chunk_size.max(1);
    debug!(
        "Streaming file {} ({} bytes, {}) in chunks of {}",
        record.id, info.length, info.content_type, chunk_size
    );

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(pump(record.id, info.content_type, reader, chunk_size, tx));
    Ok(ReceiverStream::new(rx))
}

async fn pump(
    file_id: String,
    content_type: String,
    mut reader: BlobReader,
    chunk_size: usize,
    tx: mpsc::Sender<Result<DownloadMessage>>,
) {
    if tx.send(Ok(DownloadMessage::ContentType(content_type))).await.is_err() {
        return;
    }

    let mut sent = 0usize;
    loop {
        let mut buf = Vec::with_capacity(chunk_size);
        match (&mut reader).take(chunk_size as u64).read_to_end(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                sent += n;
                if tx.send(Ok(DownloadMessage::Chunk(Bytes::from(buf)))).await.is_err() {
                    debug!("Client dropped download of file {} after {} bytes", file_id, sent);
                    return;
                }
            }
            Err(e) => {
                warn!("Failed reading content of file {}: {}", file_id, e);
                let _ = tx
                    .send(Err(FileStoreError::NotFound(format!("Content of file {} not found", file_id))))
                    .await;
                return;
            }
        }
    }
    debug!("Finished streaming file {}, {} bytes", file_id, sent);
}

/// Collect a download stream into its content type and payload
pub async fn collect(mut stream: DownloadStream) -> Result<(String, Vec<u8>)> {
    use futures::StreamExt;

    let mut content_type = String::new();
    let mut data = Vec::new();
    while let Some(message) = stream.next().await {
        match message? {
            DownloadMessage::ContentType(ct) => content_type = ct,
            DownloadMessage::Chunk(chunk) => data.extend_from_slice(&chunk),
        }
    }
    Ok((content_type, data))
}
