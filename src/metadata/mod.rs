//! Metadata Storage Layer Abstraction
//!
//! File records (name, description, tags, blob reference, timestamps) live
//! here, independently of the binary payloads they point at. Backends
//! implement [`MetadataStore`] so the services never see SQL or maps directly.

pub mod config;
pub mod mock_store;
pub mod sqlite_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{FileStoreError, Result};

/// Default page size when a caller does not ask for one
pub const DEFAULT_LIST_LIMIT: i64 = 100;

/// Metadata description of a stored file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    /// Identifier assigned by the metadata store on insert
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Free-form tags, used for filtering
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Reference to the linked payload in the blob store, empty when none is attached
    #[serde(default)]
    pub blob_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Whether a payload has been linked to this record
    pub fn has_blob(&self) -> bool {
        !self.blob_ref.is_empty()
    }
}

/// Fields supplied when inserting a new record
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewFile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Partial update of a record: only the fields that are `Some` overwrite
/// stored values, everything else is left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
    #[serde(skip)]
    pub blob_ref: Option<String>,
}

impl FileUpdate {
    /// An update that only re-links the record to a new blob
    pub fn link_blob(blob_ref: impl Into<String>) -> Self {
        Self {
            blob_ref: Some(blob_ref.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.metadata.is_none()
            && self.blob_ref.is_none()
    }

    /// Apply the supplied fields to a record and bump `updated_at`
    pub fn apply_to(&self, record: &mut FileRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(metadata) = &self.metadata {
            record.metadata = metadata.clone();
        }
        if let Some(blob_ref) = &self.blob_ref {
            record.blob_ref = blob_ref.clone();
        }
        record.updated_at = Utc::now();
    }
}

/// Column a listing is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Name => "name",
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = FileStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "created_at" => Ok(SortField::CreatedAt),
            "updated_at" => Ok(SortField::UpdatedAt),
            "name" => Ok(SortField::Name),
            _ => Err(FileStoreError::InvalidArgument(format!("Unknown sort field: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Pagination and ordering for [`MetadataStore::list`]
#[derive(Debug, Clone, PartialEq)]
pub struct ListOptions {
    pub limit: i64,
    /// Zero-based page; `limit * page` records are skipped
    pub page: i64,
    pub order_by: SortField,
    pub direction: SortDirection,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            page: 0,
            order_by: SortField::default(),
            direction: SortDirection::default(),
        }
    }
}

impl ListOptions {
    /// Number of records to skip, ignoring a page without a positive limit.
    /// Saturates instead of overflowing on client-supplied values.
    pub fn offset(&self) -> i64 {
        if self.limit > 0 && self.page > 0 {
            self.limit.saturating_mul(self.page)
        } else {
            0
        }
    }

    /// Effective limit; non-positive values fall back to the default
    pub fn effective_limit(&self) -> i64 {
        if self.limit > 0 {
            self.limit
        } else {
            DEFAULT_LIST_LIMIT
        }
    }
}

/// Validate an identifier handed in by a client
pub fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| FileStoreError::MalformedId(id.to_string()))
}

/// Check a metadata key used as a list filter.
///
/// Filter keys are limited to ASCII letters, digits, `_`, `-`, `.` and `:`.
/// Stored metadata keys are not restricted.
pub fn check_filter_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if valid {
        Ok(())
    } else {
        Err(FileStoreError::InvalidArgument(format!("Invalid metadata key: {:?}", key)))
    }
}

/// Generate a fresh record identifier
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Trait defining the metadata storage interface
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// List records whose metadata contains every pair in `filter`
    async fn list(&self, filter: &HashMap<String, String>, options: &ListOptions) -> Result<Vec<FileRecord>>;

    /// Fetch one record, `NotFound` when absent
    async fn get_by_id(&self, id: &str) -> Result<FileRecord>;

    /// Insert a record and return the identifier the store assigned
    async fn insert(&self, file: &NewFile) -> Result<String>;

    /// Apply a partial update, `NotFound` when absent
    async fn update_fields(&self, id: &str, update: &FileUpdate) -> Result<()>;

    /// Delete one record, `NotFound` when absent
    async fn delete_by_id(&self, id: &str) -> Result<()>;
}
