use crate::rpc::{BlockStoreApi, MetadataStoreApi, ModifyOutcome};
use crate::storage::{FileRecord, MetadataEngine};
use crate::{Result, SurfsError};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Number of lock stripes guarding per-filename commits
pub const LOCK_STRIPES: usize = 64;

/// Default number of in-flight presence checks per commit
pub const DEFAULT_PRESENCE_CHECK_CONCURRENCY: usize = 16;

/// Metadata store service.
///
/// Maps filenames to `(version, hash list)` records. A commit must name
/// version `current + 1` and may only reference blocks the block store
/// already holds. The version check, the presence checks and the write run
/// under a lock striped by filename, so two writers proposing the same
/// version can never both succeed.
pub struct MetadataStore {
    engine: Arc<dyn MetadataEngine>,
    block_store: Arc<dyn BlockStoreApi>,
    locks: Vec<Mutex<()>>,
    presence_check_concurrency: usize,
}

impl MetadataStore {
    pub fn new(engine: Arc<dyn MetadataEngine>, block_store: Arc<dyn BlockStoreApi>) -> Self {
        Self {
            engine,
            block_store,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            presence_check_concurrency: DEFAULT_PRESENCE_CHECK_CONCURRENCY,
        }
    }

    pub fn with_presence_check_concurrency(mut self, concurrency: usize) -> Self {
        self.presence_check_concurrency = concurrency.max(1);
        self
    }

    fn lock_for(&self, filename: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        filename.hash(&mut hasher);
        &self.locks[(hasher.finish() as usize) % self.locks.len()]
    }

    async fn current(&self, filename: &str) -> Result<FileRecord> {
        Ok(self
            .engine
            .get(filename)
            .await?
            .unwrap_or_else(|| FileRecord::absent(filename)))
    }

    /// Hashes from `hash_list` the block store does not hold, in list order
    async fn missing_blocks(&self, hash_list: &[String]) -> Result<Vec<String>> {
        let presence: Vec<bool> = stream::iter(hash_list.to_vec())
            .map(|hash| {
                let block_store = self.block_store.clone();
                async move { block_store.has_block(&hash).await }
            })
            .buffered(self.presence_check_concurrency)
            .try_collect()
            .await?;

        Ok(hash_list
            .iter()
            .zip(presence)
            .filter(|(_, present)| !present)
            .map(|(hash, _)| hash.clone())
            .collect())
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() {
        return Err(SurfsError::InvalidRequest(
            "filename cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn is_next_version(current: &FileRecord, proposed: u64) -> bool {
    current.version.checked_add(1) == Some(proposed)
}

#[async_trait]
impl MetadataStoreApi for MetadataStore {
    async fn read_file(&self, filename: &str) -> Result<FileRecord> {
        tracing::debug!(filename = %filename, "reading file");
        self.current(filename).await
    }

    async fn modify_file(
        &self,
        filename: &str,
        version: u64,
        hash_list: Vec<String>,
    ) -> Result<ModifyOutcome> {
        tracing::debug!(
            filename = %filename,
            version,
            hashes = hash_list.len(),
            "modifying file"
        );
        validate_filename(filename)?;

        let _guard = self.lock_for(filename).lock().await;

        let current = self.current(filename).await?;
        if !is_next_version(&current, version) {
            tracing::debug!(
                filename = %filename,
                version,
                current_version = current.version,
                "version conflict"
            );
            return Ok(ModifyOutcome::VersionConflict);
        }

        let missing = self.missing_blocks(&hash_list).await?;
        if !missing.is_empty() {
            tracing::debug!(
                filename = %filename,
                version,
                "did not modify file; missing {} blocks",
                missing.len()
            );
            return Ok(ModifyOutcome::MissingBlocks(missing));
        }

        self.engine
            .set(&FileRecord {
                filename: filename.to_string(),
                version,
                hash_list,
                deleted: false,
            })
            .await?;

        tracing::debug!(filename = %filename, version, "modified file successfully");
        Ok(ModifyOutcome::Committed)
    }

    async fn delete_file(&self, filename: &str, version: u64) -> Result<bool> {
        tracing::debug!(filename = %filename, version, "deleting file");
        validate_filename(filename)?;

        let _guard = self.lock_for(filename).lock().await;

        let current = self.current(filename).await?;
        if !is_next_version(&current, version) {
            tracing::debug!(
                filename = %filename,
                version,
                current_version = current.version,
                "version conflict on delete"
            );
            return Ok(false);
        }

        self.engine
            .set(&FileRecord {
                filename: filename.to_string(),
                version,
                hash_list: Vec::new(),
                deleted: true,
            })
            .await?;

        tracing::debug!(filename = %filename, version, "deleted file");
        Ok(true)
    }

    async fn get_version(&self, filename: &str) -> Result<u64> {
        tracing::debug!(filename = %filename, "getting version");
        Ok(self.current(filename).await?.version)
    }
}
