use crate::rpc::{BlockStoreApi, MetadataStoreApi};
use crate::{Result, SurfsError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use ulid::Ulid;

/// Reassembles a stored file into a local path
#[derive(Clone)]
pub struct DownloadFileOperation {
    metadata: Arc<dyn MetadataStoreApi>,
    blocks: Arc<dyn BlockStoreApi>,
}

#[derive(Debug, Clone)]
pub struct DownloadFileOperationRequest {
    pub filename: String,
    /// A file path, or an existing directory to write `filename`'s base name into
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFileOperationResult {
    pub version: u64,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl DownloadFileOperation {
    pub fn new(metadata: Arc<dyn MetadataStoreApi>, blocks: Arc<dyn BlockStoreApi>) -> Self {
        Self { metadata, blocks }
    }

    pub async fn run(
        &self,
        request: DownloadFileOperationRequest,
    ) -> Result<DownloadFileOperationResult> {
        let DownloadFileOperationRequest {
            filename,
            destination,
        } = request;

        let record = self.metadata.read_file(&filename).await?;
        if !record.exists() {
            return Err(SurfsError::NotFound(filename));
        }

        let path = resolve_destination(&filename, &destination).await?;
        let temp_path = temp_sibling(&path)?;

        tracing::debug!(
            filename = %filename,
            version = record.version,
            path = ?path,
            "downloading file"
        );

        let written = match self.write_blocks(&record.hash_list, &temp_path).await {
            Ok(written) => written,
            Err(error) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(error);
            }
        };

        if let Err(error) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(error.into());
        }

        Ok(DownloadFileOperationResult {
            version: record.version,
            path,
            size_bytes: written,
        })
    }

    async fn write_blocks(&self, hash_list: &[String], path: &Path) -> Result<u64> {
        let mut file = fs::File::create(path).await?;
        let mut written = 0u64;

        for hash in hash_list {
            let data = self
                .blocks
                .get_block(hash)
                .await?
                .ok_or_else(|| SurfsError::BlockMissing(hash.clone()))?;
            file.write_all(&data).await?;
            written += data.len() as u64;
        }

        file.sync_all().await?;
        Ok(written)
    }
}

/// Writing into a directory keeps the stored file's base name
async fn resolve_destination(filename: &str, destination: &Path) -> Result<PathBuf> {
    let is_dir = fs::metadata(destination)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);

    if !is_dir {
        return Ok(destination.to_path_buf());
    }

    let base_name = Path::new(filename).file_name().ok_or_else(|| {
        SurfsError::InvalidRequest(format!("cannot derive a file name from {}", filename))
    })?;
    Ok(destination.join(base_name))
}

fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| SurfsError::InvalidRequest(format!("invalid destination: {:?}", path)))?;
    Ok(path.with_file_name(format!(
        ".{}.{}.tmp",
        name.to_string_lossy(),
        Ulid::new()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_store::BlockStore;
    use crate::chunker::Chunker;
    use crate::metadata_store::MetadataStore;
    use crate::operations::{UploadFileOperation, UploadFileOperationRequest};
    use crate::storage::{BlockEngine, MemoryBlockEngine, MemoryMetadataEngine};
    use bytes::Bytes;

    struct Fixture {
        metadata: Arc<MetadataStore>,
        blocks: Arc<BlockStore>,
        block_engine: Arc<MemoryBlockEngine>,
    }

    impl Fixture {
        fn new() -> Self {
            let block_engine = Arc::new(MemoryBlockEngine::new());
            let blocks = Arc::new(BlockStore::new(block_engine.clone()));
            let metadata = Arc::new(MetadataStore::new(
                Arc::new(MemoryMetadataEngine::new()),
                blocks.clone(),
            ));
            Self {
                metadata,
                blocks,
                block_engine,
            }
        }

        async fn upload(&self, filename: &str, data: Vec<u8>, block_size: usize) {
            UploadFileOperation::new(self.metadata.clone(), self.blocks.clone())
                .run(UploadFileOperationRequest {
                    filename: filename.to_string(),
                    chunker: Chunker::new(data, block_size).unwrap(),
                })
                .await
                .unwrap();
        }

        fn download(&self) -> DownloadFileOperation {
            DownloadFileOperation::new(self.metadata.clone(), self.blocks.clone())
        }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_download_round_trip() {
        let fixture = Fixture::new();
        let data = sample(10_000);
        fixture.upload("docs/report.bin", data.clone(), 4096).await;

        let temp_dir = tempfile::tempdir().unwrap();
        let destination = temp_dir.path().join("copy.bin");
        let result = fixture
            .download()
            .run(DownloadFileOperationRequest {
                filename: "docs/report.bin".to_string(),
                destination: destination.clone(),
            })
            .await
            .unwrap();

        assert_eq!(result.version, 1);
        assert_eq!(result.path, destination);
        assert_eq!(result.size_bytes, 10_000);
        assert_eq!(std::fs::read(&destination).unwrap(), data);
    }

    #[tokio::test]
    async fn test_download_into_directory_uses_base_name() {
        let fixture = Fixture::new();
        fixture.upload("docs/report.bin", sample(100), 16).await;

        let temp_dir = tempfile::tempdir().unwrap();
        let result = fixture
            .download()
            .run(DownloadFileOperationRequest {
                filename: "docs/report.bin".to_string(),
                destination: temp_dir.path().to_path_buf(),
            })
            .await
            .unwrap();

        assert_eq!(result.path, temp_dir.path().join("report.bin"));
        assert_eq!(std::fs::read(&result.path).unwrap(), sample(100));
    }

    #[tokio::test]
    async fn test_download_empty_file() {
        let fixture = Fixture::new();
        fixture.upload("empty", Vec::new(), 16).await;

        let temp_dir = tempfile::tempdir().unwrap();
        let destination = temp_dir.path().join("empty");
        let result = fixture
            .download()
            .run(DownloadFileOperationRequest {
                filename: "empty".to_string(),
                destination: destination.clone(),
            })
            .await
            .unwrap();

        assert_eq!(result.size_bytes, 0);
        assert!(std::fs::read(&destination).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_missing_and_deleted_files() {
        let fixture = Fixture::new();
        let temp_dir = tempfile::tempdir().unwrap();
        let destination = temp_dir.path().join("out");

        let result = fixture
            .download()
            .run(DownloadFileOperationRequest {
                filename: "ghost".to_string(),
                destination: destination.clone(),
            })
            .await;
        assert!(matches!(result, Err(SurfsError::NotFound(_))));

        fixture.upload("f", sample(10), 4).await;
        assert!(fixture.metadata.delete_file("f", 2).await.unwrap());

        let result = fixture
            .download()
            .run(DownloadFileOperationRequest {
                filename: "f".to_string(),
                destination: destination.clone(),
            })
            .await;
        assert!(matches!(result, Err(SurfsError::NotFound(_))));
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_download_reports_missing_block() {
        let fixture = Fixture::new();
        let hash = crate::chunker::compute_hash(b"abcd");
        fixture
            .block_engine
            .set(&hash, Bytes::from_static(b"abcd"))
            .await
            .unwrap();
        fixture
            .metadata
            .modify_file("f", 1, vec![hash])
            .await
            .unwrap();

        // Swap in a block store that has lost the block
        let empty_blocks = Arc::new(BlockStore::new(Arc::new(MemoryBlockEngine::new())));
        let operation = DownloadFileOperation::new(fixture.metadata.clone(), empty_blocks);

        let temp_dir = tempfile::tempdir().unwrap();
        let destination = temp_dir.path().join("out");
        let result = operation
            .run(DownloadFileOperationRequest {
                filename: "f".to_string(),
                destination: destination.clone(),
            })
            .await;

        assert!(matches!(result, Err(SurfsError::BlockMissing(_))));
        assert!(!destination.exists());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
