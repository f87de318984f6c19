//! Service layer shared by both transports

pub mod accumulator;
pub mod download;
pub mod file_service;
pub mod upload;

#[cfg(test)]
mod comprehensive_test;

pub use accumulator::{ChunkAccumulator, MAX_PAYLOAD_SIZE};
pub use download::{download, DownloadMessage, DownloadStream};
pub use file_service::{FileService, Payload};
pub use upload::{replace, upload, FileDescriptor, UploadMessage, UploadMode, UploadPhase, UploadSession};
