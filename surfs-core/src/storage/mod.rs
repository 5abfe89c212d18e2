//! Storage engines for Surfs
//!
//! Each store sits on a small key-value engine with an in-memory and a
//! durable variant, selected by name at startup.

pub mod block_engine;
pub mod metadata_engine;

pub use block_engine::{BlockEngine, BlockEngineBuilder, DiskBlockEngine, MemoryBlockEngine};
pub use metadata_engine::{
    FileRecord, MemoryMetadataEngine, MetadataEngine, MetadataEngineBuilder, SqliteMetadataEngine,
};
