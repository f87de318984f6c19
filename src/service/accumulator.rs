//! Call-scoped buffer that assembles streamed chunks into one payload

use bytes::{Bytes, BytesMut};
use log::warn;

use crate::error::{FileStoreError, Result};
use crate::service::file_service::Payload;

/// Largest payload a single upload may carry (128 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 128 << 20;

/// Accumulates `(chunk, content type)` messages in arrival order.
///
/// Owned by exactly one upload or replace call and dropped with it.
#[derive(Debug)]
pub struct ChunkAccumulator {
    data: BytesMut,
    content_type: String,
    size: usize,
    limit: usize,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::with_limit(MAX_PAYLOAD_SIZE)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: BytesMut::new(),
            content_type: String::new(),
            size: 0,
            limit,
        }
    }

    /// Append one chunk.
    ///
    /// A non-empty content type replaces the recorded one. A chunk that would
    /// push the total past the limit fails with `PayloadTooLarge` and none of
    /// its bytes are kept.
    pub fn write(&mut self, chunk: &[u8], content_type: Option<&str>) -> Result<()> {
        if let Some(content_type) = content_type.filter(|ct| !ct.is_empty()) {
            self.content_type = content_type.to_string();
        }

        if chunk.is_empty() {
            return Ok(());
        }

        let size = self.size + chunk.len();
        if size > self.limit {
            warn!("Rejecting chunk: payload would grow to {} bytes, limit is {}", size, self.limit);
            return Err(FileStoreError::PayloadTooLarge { size, limit: self.limit });
        }

        self.size = size;
        self.data.extend_from_slice(chunk);
        Ok(())
    }

    /// Bytes accepted so far
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn content_type(&self) -> Option<&str> {
        if self.content_type.is_empty() {
            None
        } else {
            Some(&self.content_type)
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Hand the accumulated bytes over as a payload, leaving the buffer empty
    pub fn take_payload(&mut self) -> Payload {
        self.size = 0;
        let data: Bytes = self.data.split().freeze();
        Payload {
            data,
            content_type: std::mem::take(&mut self.content_type),
        }
    }
}

impl Default for ChunkAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
