//! Error types shared by the stores, the orchestrators and both transports

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Result type for file storage operations
pub type Result<T> = std::result::Result<T, FileStoreError>;

/// Coarse error classes exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    IdentifierRequired,
    Internal,
}

/// Error types for file storage operations
#[derive(Error, Debug)]
pub enum FileStoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File was never passed")]
    MissingFile,

    #[error("File content never passed")]
    MissingContent,

    #[error("File content type never passed")]
    MissingContentType,

    #[error("Payload is too large: {size} > {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Malformed identifier: {0}")]
    MalformedId(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File ID is required when updating a file")]
    IdentifierRequired,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FileStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FileStoreError::NotFound(_) => ErrorKind::NotFound,
            FileStoreError::MissingFile
            | FileStoreError::MissingContent
            | FileStoreError::MissingContentType
            | FileStoreError::PayloadTooLarge { .. }
            | FileStoreError::MalformedId(_)
            | FileStoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            FileStoreError::IdentifierRequired => ErrorKind::IdentifierRequired,
            FileStoreError::Internal(_)
            | FileStoreError::Io(_)
            | FileStoreError::Sql(_)
            | FileStoreError::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<FileStoreError> for tonic::Status {
    fn from(e: FileStoreError) -> Self {
        let message = e.to_string();
        match e.kind() {
            ErrorKind::NotFound => tonic::Status::not_found(message),
            ErrorKind::InvalidArgument | ErrorKind::IdentifierRequired => {
                tonic::Status::invalid_argument(message)
            }
            ErrorKind::Internal => tonic::Status::internal(message),
        }
    }
}

impl ResponseError for FileStoreError {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument | ErrorKind::IdentifierRequired => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
