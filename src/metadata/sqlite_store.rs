//! SQLite implementation of MetadataStore
//!
//! The connection sits behind a mutex and every statement runs on tokio's
//! blocking pool, so callers on the async runtime never block a worker.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{FileStoreError, Result};
use crate::metadata::config::MetadataConfig;
use crate::metadata::{check_filter_key, new_id, FileRecord, FileUpdate, ListOptions, MetadataStore, NewFile, SortDirection};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    metadata TEXT NOT NULL DEFAULT '{}',
    blob_ref TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const SELECT_COLUMNS: &str = "SELECT id, name, description, metadata, blob_ref, created_at, updated_at FROM files";

/// Fixed-width timestamps so that text ordering matches time ordering
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| FileStoreError::Internal(format!("Invalid timestamp {:?}: {}", value, e)))
}

/// Row as stored, before JSON and timestamp decoding
struct RawRow {
    id: String,
    name: String,
    description: String,
    metadata: String,
    blob_ref: String,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            metadata: row.get(3)?,
            blob_ref: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<FileRecord> {
        Ok(FileRecord {
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            name: self.name,
            description: self.description,
            blob_ref: self.blob_ref,
        })
    }
}

/// JSON path addressing one metadata key. The key alphabet of
/// [`check_filter_key`] needs no escaping inside a quoted path label.
fn metadata_path(key: &str) -> Result<String> {
    check_filter_key(key)?;
    Ok(format!("$.\"{}\"", key))
}

/// SQLite implementation of MetadataStore
pub struct SQLiteMetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl SQLiteMetadataStore {
    /// Open (or create) the database named in the configuration
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        let path = Path::new(&config.db_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening SQLite metadata store at {}", path.display());
        let conn = Connection::open(path)?;
        if config.wal_mode {
            let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!("SQLite journal mode: {}", mode);
        }
        Self::with_connection(conn)
    }

    /// Private in-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(SCHEMA, [])?;
        conn.execute("CREATE INDEX IF NOT EXISTS files_created_at ON files (created_at)", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|e| FileStoreError::Internal(format!("Metadata task failed: {}", e)))?
    }
}

#[async_trait]
impl MetadataStore for SQLiteMetadataStore {
    async fn list(&self, filter: &HashMap<String, String>, options: &ListOptions) -> Result<Vec<FileRecord>> {
        let mut keys: Vec<&String> = filter.keys().collect();
        keys.sort();

        let mut clauses = Vec::with_capacity(keys.len());
        let mut values = Vec::with_capacity(keys.len() * 2);
        for key in keys {
            clauses.push("json_extract(metadata, ?) = ?");
            values.push(metadata_path(key)?);
            values.push(filter[key].clone());
        }

        let direction = match options.direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        let mut sql = SELECT_COLUMNS.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY {} {}, id {} LIMIT {} OFFSET {}",
            options.order_by.column(),
            direction,
            direction,
            options.effective_limit(),
            options.offset()
        ));
        debug!("Listing files: {}", sql);

        self.run(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), RawRow::from_row)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?.into_record()?);
            }
            Ok(records)
        })
        .await
    }

    async fn get_by_id(&self, id: &str) -> Result<FileRecord> {
        let id = id.to_string();
        self.run(move |conn| {
            let row = conn
                .query_row(&format!("{} WHERE id = ?1", SELECT_COLUMNS), params![id], RawRow::from_row)
                .optional()?;
            match row {
                Some(row) => row.into_record(),
                None => Err(FileStoreError::NotFound(format!("Document with ID: {} does not exist", id))),
            }
        })
        .await
    }

    async fn insert(&self, file: &NewFile) -> Result<String> {
        let id = new_id();
        let now = format_timestamp(&Utc::now());
        let metadata = serde_json::to_string(&file.metadata)?;
        let name = file.name.clone();
        let description = file.description.clone();
        let inserted = id.clone();

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO files (id, name, description, metadata, blob_ref, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, '', ?5, ?5)",
                params![inserted, name, description, metadata, now],
            )?;
            Ok(())
        })
        .await?;

        debug!("Inserted file record {}", id);
        Ok(id)
    }

    async fn update_fields(&self, id: &str, update: &FileUpdate) -> Result<()> {
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        if let Some(name) = &update.name {
            assignments.push("name = ?");
            values.push(name.clone());
        }
        if let Some(description) = &update.description {
            assignments.push("description = ?");
            values.push(description.clone());
        }
        if let Some(metadata) = &update.metadata {
            assignments.push("metadata = ?");
            values.push(serde_json::to_string(metadata)?);
        }
        if let Some(blob_ref) = &update.blob_ref {
            assignments.push("blob_ref = ?");
            values.push(blob_ref.clone());
        }
        assignments.push("updated_at = ?");
        values.push(format_timestamp(&Utc::now()));
        values.push(id.to_string());

        let sql = format!("UPDATE files SET {} WHERE id = ?", assignments.join(", "));
        let id = id.to_string();
        self.run(move |conn| {
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            if changed == 0 {
                return Err(FileStoreError::NotFound(format!("Document with ID: {} does not exist", id)));
            }
            Ok(())
        })
        .await
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.run(move |conn| {
            let changed = conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(FileStoreError::NotFound(format!("Document with ID: {} does not exist", id)));
            }
            Ok(())
        })
        .await
    }
}
