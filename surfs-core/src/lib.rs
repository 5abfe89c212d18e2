//! Surfs Core - content-addressed file storage
//!
//! Files are split into fixed-size blocks named by the Base64 SHA256 of their
//! bytes. Two services cooperate:
//! - the block store keeps block bytes keyed by hash
//! - the metadata store maps filenames to versioned hash lists, accepting a
//!   new version only when it is exactly current + 1 and every referenced
//!   block is already stored
//!
//! Both services run over an in-memory or durable engine.

pub mod block_store;
pub mod chunker;
pub mod error;
pub mod metadata_store;
pub mod operations;
pub mod rpc;
pub mod storage;

pub use block_store::BlockStore;
pub use chunker::{Block, Chunker, DEFAULT_BLOCK_SIZE, compute_hash, verify_hash};
pub use error::{Result, SurfsError};
pub use metadata_store::{DEFAULT_PRESENCE_CHECK_CONCURRENCY, MetadataStore};
pub use operations::{
    DEFAULT_MAX_ATTEMPTS, DeleteFileOperation, DeleteFileOperationRequest,
    DeleteFileOperationResult, DownloadFileOperation, DownloadFileOperationRequest,
    DownloadFileOperationResult, UploadFileOperation, UploadFileOperationRequest,
    UploadFileOperationResult,
};
pub use rpc::{
    BlockStoreApi, BlockStoreClient, MetadataStoreApi, MetadataStoreClient, ModifyOutcome,
};
pub use storage::{
    BlockEngine, BlockEngineBuilder, DiskBlockEngine, FileRecord, MemoryBlockEngine,
    MemoryMetadataEngine, MetadataEngine, MetadataEngineBuilder, SqliteMetadataEngine,
};
