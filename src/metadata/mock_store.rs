//! In-memory implementation of MetadataStore for testing

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{FileStoreError, Result};
use crate::metadata::{
    new_id, FileRecord, FileUpdate, ListOptions, MetadataStore, NewFile, SortDirection, SortField,
};

/// Mock implementation of MetadataStore for testing.
///
/// Fault switches let tests fail specific steps of a multi-step write.
pub struct MockMetadataStore {
    records: Mutex<HashMap<String, FileRecord>>,
    fail_blob_link: AtomicBool,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MockMetadataStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            fail_blob_link: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, FileRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every update that sets a blob reference fail
    pub fn set_fail_blob_link(&self, fail: bool) {
        self.fail_blob_link.store(fail, Ordering::SeqCst);
    }

    /// Make every field update fail
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn record_count(&self) -> usize {
        self.records().len()
    }
}

impl Default for MockMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_filter(record: &FileRecord, filter: &HashMap<String, String>) -> bool {
    filter
        .iter()
        .all(|(key, value)| record.metadata.get(key) == Some(value))
}

#[async_trait]
impl MetadataStore for MockMetadataStore {
    async fn list(&self, filter: &HashMap<String, String>, options: &ListOptions) -> Result<Vec<FileRecord>> {
        let mut results: Vec<FileRecord> = self
            .records()
            .values()
            .filter(|record| matches_filter(record, filter))
            .cloned()
            .collect();

        results.sort_by(|a, b| {
            let ordering = match options.order_by {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortField::Name => a.name.cmp(&b.name),
            }
            .then_with(|| a.id.cmp(&b.id));
            match options.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });

        Ok(results
            .into_iter()
            .skip(options.offset() as usize)
            .take(options.effective_limit() as usize)
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<FileRecord> {
        self.records()
            .get(id)
            .cloned()
            .ok_or_else(|| FileStoreError::NotFound(format!("Document with ID: {} does not exist", id)))
    }

    async fn insert(&self, file: &NewFile) -> Result<String> {
        let now = Utc::now();
        let id = new_id();
        let record = FileRecord {
            id: id.clone(),
            name: file.name.clone(),
            description: file.description.clone(),
            metadata: file.metadata.clone(),
            blob_ref: String::new(),
            created_at: now,
            updated_at: now,
        };
        self.records().insert(id.clone(), record);
        debug!("Mock: inserted record {}", id);
        Ok(id)
    }

    async fn update_fields(&self, id: &str, update: &FileUpdate) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst)
            || (update.blob_ref.is_some() && self.fail_blob_link.load(Ordering::SeqCst))
        {
            warn!("Mock: injected update failure for record {}", id);
            return Err(FileStoreError::Internal(format!("injected update failure for {}", id)));
        }

        let mut records = self.records();
        let record = records
            .get_mut(id)
            .ok_or_else(|| FileStoreError::NotFound(format!("Document with ID: {} does not exist", id)))?;
        update.apply_to(record);
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(FileStoreError::Internal(format!("injected delete failure for {}", id)));
        }

        self.records()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| FileStoreError::NotFound(format!("Document with ID: {} does not exist", id)))
    }
}
