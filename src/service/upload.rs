//! Client-streaming upload and replace
//!
//! A client sends a sequence of messages. Each one carries either a file
//! descriptor or a content chunk, in any order. Descriptors overwrite each
//! other and chunks are appended. Nothing touches a store until the stream
//! ends, so an abandoned stream leaves no trace.

use bytes::Bytes;
use futures::{pin_mut, Stream, StreamExt};
use log::{debug, error, info};
use std::collections::HashMap;

use crate::error::{FileStoreError, Result};
use crate::metadata::{FileRecord, FileUpdate, NewFile};
use crate::service::accumulator::ChunkAccumulator;
use crate::service::file_service::FileService;

/// Record fields a client sends ahead of, between or after its chunks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileDescriptor {
    /// Target record; ignored on upload, required on replace
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl FileDescriptor {
    fn into_new_file(self) -> NewFile {
        NewFile {
            name: self.name,
            description: self.description.unwrap_or_default(),
            metadata: self.metadata,
        }
    }

    /// Empty name and metadata mean "leave unchanged"
    fn into_update(self) -> (String, FileUpdate) {
        let update = FileUpdate {
            name: Some(self.name).filter(|name| !name.is_empty()),
            description: self.description,
            metadata: Some(self.metadata).filter(|metadata| !metadata.is_empty()),
            blob_ref: None,
        };
        (self.id, update)
    }
}

/// One message of an upload stream
#[derive(Debug, Clone, PartialEq)]
pub enum UploadMessage {
    Descriptor(FileDescriptor),
    Data {
        chunk: Bytes,
        content_type: Option<String>,
    },
}

impl UploadMessage {
    pub fn data(chunk: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        UploadMessage::Data {
            chunk: chunk.into(),
            content_type: content_type.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Create,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    AwaitingDescriptor,
    AccumulatingChunks,
    Finalizing,
    Done,
    Failed,
}

/// State of one upload or replace call
pub struct UploadSession<'a> {
    service: &'a FileService,
    mode: UploadMode,
    phase: UploadPhase,
    descriptor: Option<FileDescriptor>,
    accumulator: ChunkAccumulator,
}

impl<'a> UploadSession<'a> {
    pub fn new(service: &'a FileService, mode: UploadMode) -> Self {
        Self {
            service,
            mode,
            phase: UploadPhase::AwaitingDescriptor,
            descriptor: None,
            accumulator: ChunkAccumulator::with_limit(service.limits().max_payload_size),
        }
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    /// Feed one message into the session
    pub fn handle(&mut self, message: UploadMessage) -> Result<()> {
        match message {
            UploadMessage::Descriptor(descriptor) => {
                if self.descriptor.is_some() {
                    debug!("Descriptor sent again, keeping the latest");
                }
                self.descriptor = Some(descriptor);
                if self.phase == UploadPhase::AwaitingDescriptor {
                    self.phase = UploadPhase::AccumulatingChunks;
                }
                Ok(())
            }
            UploadMessage::Data { chunk, content_type } => {
                let result = self.accumulator.write(&chunk, content_type.as_deref());
                if result.is_err() {
                    self.phase = UploadPhase::Failed;
                }
                result
            }
        }
    }

    /// Drain a message stream into the session and finalize it
    pub async fn run<S>(&mut self, messages: S) -> Result<FileRecord>
    where
        S: Stream<Item = Result<UploadMessage>>,
    {
        pin_mut!(messages);
        while let Some(message) = messages.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    error!("Error reading upload stream: {}", e);
                    self.phase = UploadPhase::Failed;
                    return Err(e);
                }
            };
            self.handle(message)?;
        }
        self.finalize().await
    }

    /// Validate what was received and commit it through the file service
    pub async fn finalize(&mut self) -> Result<FileRecord> {
        self.phase = UploadPhase::Finalizing;
        let result = match self.mode {
            UploadMode::Create => self.commit_upload().await,
            UploadMode::Replace => self.commit_replace().await,
        };
        self.phase = match result {
            Ok(_) => UploadPhase::Done,
            Err(_) => UploadPhase::Failed,
        };
        result
    }

    async fn commit_upload(&mut self) -> Result<FileRecord> {
        let descriptor = self.descriptor.take().ok_or(FileStoreError::MissingFile)?;
        if self.accumulator.is_empty() {
            return Err(FileStoreError::MissingContent);
        }
        if self.accumulator.content_type().is_none() {
            return Err(FileStoreError::MissingContentType);
        }

        let payload = self.accumulator.take_payload();
        debug!("Upload of {} complete, {} bytes received", descriptor.name, payload.len());
        let record = self.service.create(descriptor.into_new_file(), Some(payload)).await?;
        info!("Uploaded file {} as {}", record.name, record.id);
        Ok(record)
    }

    async fn commit_replace(&mut self) -> Result<FileRecord> {
        let descriptor = self.descriptor.take().ok_or(FileStoreError::MissingFile)?;
        if descriptor.id.is_empty() {
            return Err(FileStoreError::IdentifierRequired);
        }
        if !self.accumulator.is_empty() && self.accumulator.content_type().is_none() {
            return Err(FileStoreError::MissingContentType);
        }

        let payload = if self.accumulator.is_empty() {
            None
        } else {
            Some(self.accumulator.take_payload())
        };
        let (id, update) = descriptor.into_update();
        self.service.update(&id, update, payload).await
    }
}

/// Create a new file from a message stream
pub async fn upload<S>(service: &FileService, messages: S) -> Result<FileRecord>
where
    S: Stream<Item = Result<UploadMessage>>,
{
    UploadSession::new(service, UploadMode::Create).run(messages).await
}

/// Update an existing file from a message stream, replacing its content when
/// chunks were sent
pub async fn replace<S>(service: &FileService, messages: S) -> Result<FileRecord>
where
    S: Stream<Item = Result<UploadMessage>>,
{
    UploadSession::new(service, UploadMode::Replace).run(messages).await
}
