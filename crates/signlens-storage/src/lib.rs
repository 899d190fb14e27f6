//! signlens-storage: SQLite-based persistence for scan results.
//!
//! Stores analyzed business records as JSON and generated videos as blobs.
//! Writes are fire-and-forget from the workflow's point of view.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;

use signlens_types::BusinessRecord;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Record encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Key-value record store plus blob store, as seen by the workflow.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Save or replace the record stored under `id`.
    async fn save_record(&self, id: &str, record: &BusinessRecord) -> Result<()>;
    /// Store the video generated for record `id`.
    async fn upload_video(&self, id: &str, video: Bytes) -> Result<()>;
}

/// A record as read back from storage.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub record: BusinessRecord,
    /// Unix millis.
    pub created_at: i64,
    pub has_video: bool,
}

/// Generate a fresh record id.
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS businesses (
        id TEXT PRIMARY KEY,
        business_name TEXT NOT NULL,
        category TEXT NOT NULL,
        record_json TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS videos (
        id TEXT PRIMARY KEY,
        data BLOB NOT NULL,
        size INTEGER NOT NULL,
        uploaded_at INTEGER NOT NULL
    );";

/// SQLite-backed [`RecordStore`].
pub struct SignLensStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SignLensStorage {
    /// Open (or create) the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Storage opened: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get a record by id.
    pub async fn get_record(&self, id: &str) -> Result<Option<StoredRecord>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let row = conn
                .query_row(
                    "SELECT b.id, b.record_json, b.created_at, v.id IS NOT NULL
                     FROM businesses b LEFT JOIN videos v ON v.id = b.id
                     WHERE b.id = ?1",
                    rusqlite::params![id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, bool>(3)?,
                        ))
                    },
                )
                .optional()?;
            row.map(decode_row).transpose()
        })
        .await?
    }

    /// List records, newest first.
    pub async fn list_records(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT b.id, b.record_json, b.created_at, v.id IS NOT NULL
                 FROM businesses b LEFT JOIN videos v ON v.id = b.id
                 ORDER BY b.created_at DESC, b.rowid DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(decode_row).collect::<Result<Vec<_>>>()
        })
        .await?
    }

    /// Get the stored video bytes for a record.
    pub async fn get_video(&self, id: &str) -> Result<Option<Bytes>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let data = conn
                .query_row(
                    "SELECT data FROM videos WHERE id = ?1",
                    rusqlite::params![id],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?;
            Ok(data.map(Bytes::from))
        })
        .await?
    }
}

fn decode_row((id, json, created_at, has_video): (String, String, i64, bool)) -> Result<StoredRecord> {
    Ok(StoredRecord {
        id,
        record: serde_json::from_str(&json)?,
        created_at,
        has_video,
    })
}

#[async_trait]
impl RecordStore for SignLensStorage {
    async fn save_record(&self, id: &str, record: &BusinessRecord) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        let json = serde_json::to_string(record)?;
        let name = record.business_name.clone();
        let category = record.category.clone();
        let now = chrono::Utc::now().timestamp_millis();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO businesses (id, business_name, category, record_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    business_name = excluded.business_name,
                    category = excluded.category,
                    record_json = excluded.record_json",
                rusqlite::params![id, name, category, json, now],
            )?;
            tracing::debug!(id, "Record saved");
            Ok(())
        })
        .await?
    }

    async fn upload_video(&self, id: &str, video: Bytes) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        let now = chrono::Utc::now().timestamp_millis();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT OR REPLACE INTO videos (id, data, size, uploaded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, video.as_ref(), video.len() as i64, now],
            )?;
            tracing::debug!(id, size = video.len(), "Video stored");
            Ok(())
        })
        .await?
    }
}
