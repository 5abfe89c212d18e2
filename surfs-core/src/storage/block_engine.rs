use crate::chunker::decode_hash;
use crate::error::{Result, SurfsError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use ulid::Ulid;

/// Key-value storage for block bytes, keyed by block hash.
///
/// Implementations must only report a hash as present once its bytes are
/// completely and durably written.
#[async_trait]
pub trait BlockEngine: Send + Sync {
    async fn get(&self, hash: &str) -> Result<Option<Bytes>>;

    async fn contains(&self, hash: &str) -> Result<bool>;

    async fn set(&self, hash: &str, data: Bytes) -> Result<()>;
}

/// Process-lifetime block storage
#[derive(Debug, Default)]
pub struct MemoryBlockEngine {
    blocks: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlockEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockEngine for MemoryBlockEngine {
    async fn get(&self, hash: &str) -> Result<Option<Bytes>> {
        Ok(self.blocks.read().await.get(hash).cloned())
    }

    async fn contains(&self, hash: &str) -> Result<bool> {
        Ok(self.blocks.read().await.contains_key(hash))
    }

    async fn set(&self, hash: &str, data: Bytes) -> Result<()> {
        self.blocks
            .write()
            .await
            .entry(hash.to_string())
            .or_insert(data);
        Ok(())
    }
}

/// Durable block storage with one file per block.
///
/// Blocks live at `blocks/{hex[..2]}/{hex}` where `hex` is the hex form of
/// the decoded SHA256 digest, so the on-disk name is a pure function of the
/// hash.
#[derive(Debug, Clone)]
pub struct DiskBlockEngine {
    base_path: PathBuf,
}

impl DiskBlockEngine {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(base_path.join("blocks"))?;
        Ok(Self { base_path })
    }

    /// Get the base path for the store
    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    /// Path a block with this hash lives at, or `None` if the hash is malformed
    fn block_path(&self, hash: &str) -> Option<PathBuf> {
        let hex = hex::encode(decode_hash(hash)?);
        // Use first 2 chars as subdirectory to avoid too many files in one dir
        let prefix = hex[..2].to_string();
        Some(self.base_path.join("blocks").join(prefix).join(hex))
    }
}

#[async_trait]
impl BlockEngine for DiskBlockEngine {
    async fn get(&self, hash: &str) -> Result<Option<Bytes>> {
        let Some(path) = self.block_path(hash) else {
            return Ok(None);
        };

        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn contains(&self, hash: &str) -> Result<bool> {
        match self.block_path(hash) {
            Some(path) => Ok(fs::try_exists(&path).await?),
            None => Ok(false),
        }
    }

    async fn set(&self, hash: &str, data: Bytes) -> Result<()> {
        let path = self.block_path(hash).ok_or_else(|| {
            SurfsError::InvalidRequest(format!("malformed block hash: {}", hash))
        })?;

        if fs::try_exists(&path).await? {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Unique temp name so concurrent writers of the same block never share a file
        let temp_path = temp_path_for(&path);
        let guard = TempFileGuard::new(temp_path.clone());
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        match fs::rename(&temp_path, &path).await {
            Ok(()) => guard.disarm(),
            Err(error) => {
                drop(guard);
                // Another writer got there first with identical content
                if fs::try_exists(&path).await? {
                    return Ok(());
                }
                return Err(error.into());
            }
        }

        tracing::trace!(hash = %hash, path = ?path, size = data.len(), "wrote block file");
        Ok(())
    }
}

/// Removes a temp file on drop unless it was renamed into place.
///
/// Covers every early return in [`DiskBlockEngine::set`] as well as a
/// cancelled write.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{}.tmp", name, Ulid::new()))
}

/// Selects a block engine backend by name
#[derive(Debug, Clone, Default)]
pub struct BlockEngineBuilder {
    backend: Option<String>,
    data_dir: Option<PathBuf>,
}

impl BlockEngineBuilder {
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

    fn resolve_backend(&self) -> Result<String> {
        let backend = self
            .backend
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if backend.is_empty() {
            return Err(SurfsError::Config(
                "block engine backend cannot be empty".to_string(),
            ));
        }

        Ok(backend)
    }

    pub fn build(&self) -> Result<Arc<dyn BlockEngine>> {
        let backend = self.resolve_backend()?;

        match backend.as_str() {
            "memory" => Ok(Arc::new(MemoryBlockEngine::new())),
            "disk" => {
                let data_dir = self.data_dir.clone().ok_or_else(|| {
                    SurfsError::Config("data directory is required for disk backend".to_string())
                })?;

                tracing::debug!("using block data directory: {:?}", data_dir);
                Ok(Arc::new(DiskBlockEngine::new(data_dir)?))
            }
            other => Err(SurfsError::Config(format!(
                "unsupported block engine backend: {}",
                other
            ))),
        }
    }
}
