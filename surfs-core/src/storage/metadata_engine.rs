use crate::error::{Result, SurfsError};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Current state of a file as held by the metadata store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    /// 0 means the file was never written
    pub version: u64,
    /// Block hashes whose concatenated bytes reproduce the file
    pub hash_list: Vec<String>,
    /// Set by a delete; the version is kept so numbering stays monotonic
    #[serde(default)]
    pub deleted: bool,
}

impl FileRecord {
    /// The record of a filename that has never been written
    pub fn absent(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            version: 0,
            hash_list: Vec::new(),
            deleted: false,
        }
    }

    /// True when there is live content behind this record
    pub fn exists(&self) -> bool {
        self.version > 0 && !self.deleted
    }
}

/// Key-value storage for file records, keyed by filename
#[async_trait]
pub trait MetadataEngine: Send + Sync {
    async fn get(&self, filename: &str) -> Result<Option<FileRecord>>;

    /// Replace the record for `record.filename` in a single step
    async fn set(&self, record: &FileRecord) -> Result<()>;
}

/// Process-lifetime metadata storage
#[derive(Debug, Default)]
pub struct MemoryMetadataEngine {
    files: RwLock<HashMap<String, FileRecord>>,
}

impl MemoryMetadataEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataEngine for MemoryMetadataEngine {
    async fn get(&self, filename: &str) -> Result<Option<FileRecord>> {
        Ok(self.files.read().await.get(filename).cloned())
    }

    async fn set(&self, record: &FileRecord) -> Result<()> {
        self.files
            .write()
            .await
            .insert(record.filename.clone(), record.clone());
        Ok(())
    }
}

/// Durable metadata storage in a SQLite database.
///
/// Runs with `synchronous = FULL` so a returned `set` has reached disk.
pub struct SqliteMetadataEngine {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetadataEngine {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "synchronous", "FULL")?;

        let engine = Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
        };
        engine.init_schema()?;

        tracing::debug!("Opened metadata database at {:?}", engine.db_path);
        Ok(engine)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    fn init_schema(&self) -> Result<()> {
        let conn = lock_conn(&self.conn)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                filename TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                hash_list TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        Ok(())
    }

    /// Run a blocking closure against the connection off the async runtime
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            f(&conn)
        })
        .await
        .map_err(|error| SurfsError::Internal(format!("metadata task failed: {}", error)))?
    }
}

fn lock_conn(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| SurfsError::Internal("metadata connection lock poisoned".to_string()))
}

#[async_trait]
impl MetadataEngine for SqliteMetadataEngine {
    async fn get(&self, filename: &str) -> Result<Option<FileRecord>> {
        let filename = filename.to_string();

        self.with_conn(move |conn| {
            let row: Option<(i64, String, bool)> = conn
                .query_row(
                    "SELECT version, hash_list, deleted FROM files WHERE filename = ?1",
                    [&filename],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            match row {
                Some((version, hash_list_json, deleted)) => {
                    let hash_list: Vec<String> = serde_json::from_str(&hash_list_json)?;
                    Ok(Some(FileRecord {
                        filename,
                        version: version as u64,
                        hash_list,
                        deleted,
                    }))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, record: &FileRecord) -> Result<()> {
        let record = record.clone();

        self.with_conn(move |conn| {
            let hash_list_json = serde_json::to_string(&record.hash_list)?;
            conn.execute(
                "INSERT OR REPLACE INTO files (filename, version, hash_list, deleted)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.filename,
                    record.version as i64,
                    hash_list_json,
                    record.deleted,
                ],
            )?;
            Ok(())
        })
        .await
    }
}

/// Selects a metadata engine backend by name
#[derive(Debug, Clone, Default)]
pub struct MetadataEngineBuilder {
    backend: Option<String>,
    data_dir: Option<PathBuf>,
}

impl MetadataEngineBuilder {
    /// Database file name used inside the data directory
    pub const DB_FILE: &'static str = "metadata.db";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn build(&self) -> Result<Arc<dyn MetadataEngine>> {
        let backend = self
            .backend
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match backend.as_str() {
            "memory" => Ok(Arc::new(MemoryMetadataEngine::new())),
            "sqlite" => {
                let data_dir = self.data_dir.clone().ok_or_else(|| {
                    SurfsError::Config(
                        "data directory is required for sqlite backend".to_string(),
                    )
                })?;

                Ok(Arc::new(SqliteMetadataEngine::open(
                    data_dir.join(Self::DB_FILE),
                )?))
            }
            "" => Err(SurfsError::Config(
                "metadata engine backend cannot be empty".to_string(),
            )),
            other => Err(SurfsError::Config(format!(
                "unsupported metadata engine backend: {}",
                other
            ))),
        }
    }
}
