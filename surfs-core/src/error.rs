use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurfsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Version conflict on {filename}: version {version} was rejected")]
    VersionConflict { filename: String, version: u64 },

    #[error("Gave up on {filename} after {attempts} attempts with blocks still missing")]
    ExceededRetries { filename: String, attempts: u32 },

    #[error("Block missing from block store: {0}")]
    BlockMissing(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SurfsError>;

