//! Service interfaces shared by the in-process stores and their HTTP clients

pub mod client;
pub mod protocol;

pub use client::{BlockStoreClient, MetadataStoreClient};

use crate::Result;
use crate::storage::FileRecord;
use async_trait::async_trait;
use bytes::Bytes;

/// Operations exposed by the block store
#[async_trait]
pub trait BlockStoreApi: Send + Sync {
    /// Persist `data` under `hash`. Storing a block twice is a no-op.
    async fn store_block(&self, hash: &str, data: Bytes) -> Result<()>;

    async fn has_block(&self, hash: &str) -> Result<bool>;

    async fn get_block(&self, hash: &str) -> Result<Option<Bytes>>;
}

/// Result of a metadata commit attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifyOutcome {
    Committed,
    /// The proposed version was not current + 1
    VersionConflict,
    /// These hashes, in hash-list order, are not in the block store yet
    MissingBlocks(Vec<String>),
}

/// Operations exposed by the metadata store
#[async_trait]
pub trait MetadataStoreApi: Send + Sync {
    /// Current record for a filename; a never-written file has version 0
    async fn read_file(&self, filename: &str) -> Result<FileRecord>;

    async fn modify_file(
        &self,
        filename: &str,
        version: u64,
        hash_list: Vec<String>,
    ) -> Result<ModifyOutcome>;

    async fn delete_file(&self, filename: &str, version: u64) -> Result<bool>;

    async fn get_version(&self, filename: &str) -> Result<u64>;
}
