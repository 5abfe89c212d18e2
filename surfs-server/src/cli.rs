use crate::config::Config;
use anyhow::{Context, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use surfs_core::{
    BlockStoreClient, Chunker, DeleteFileOperation, DeleteFileOperationRequest,
    DownloadFileOperation, DownloadFileOperationRequest, MetadataStoreApi, MetadataStoreClient,
    SurfsError, UploadFileOperation, UploadFileOperationRequest,
};

/// Printed for a missing or deleted file
pub const NOT_FOUND_MESSAGE: &str = "Not found";

/// What a client command reports back on success
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    Created { version: u64 },
    Downloaded,
    Deleted,
    Version(u64),
    NotFound,
}

impl CommandOutput {
    /// Text shown to the user, if any
    pub fn message(&self) -> Option<String> {
        match self {
            CommandOutput::Created { version } => Some(format!("OK {}", version)),
            CommandOutput::Downloaded => None,
            CommandOutput::Deleted => Some("OK".to_string()),
            CommandOutput::Version(version) => Some(version.to_string()),
            CommandOutput::NotFound => Some(NOT_FOUND_MESSAGE.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, CommandOutput::NotFound)
    }
}

/// Connections to a running block store and metadata store
pub struct Client {
    metadata: Arc<MetadataStoreClient>,
    blocks: Arc<BlockStoreClient>,
    config: Config,
}

impl Client {
    pub fn connect(config: Config) -> anyhow::Result<Self> {
        let timeout = config.client.request_timeout();
        let metadata = MetadataStoreClient::new(&config.metadata_store.address(), timeout)?;
        let blocks = BlockStoreClient::new(&config.block_store.address(), timeout)?;

        tracing::debug!(
            metadata = %metadata.base_url(),
            blocks = %blocks.base_url(),
            "connected client"
        );

        Ok(Self {
            metadata: Arc::new(metadata),
            blocks: Arc::new(blocks),
            config,
        })
    }

    pub async fn create(&self, source: &Path, destination: &str) -> anyhow::Result<CommandOutput> {
        validate_filename(destination)?;
        if !source.is_file() {
            bail!("source {} is not a readable file", source.display());
        }

        let chunker = Chunker::from_path(source, self.config.client.chunk_size)
            .with_context(|| format!("failed to read {}", source.display()))?;

        let result = UploadFileOperation::new(self.metadata.clone(), self.blocks.clone())
            .with_max_attempts(self.config.client.max_attempts)
            .run(UploadFileOperationRequest {
                filename: destination.to_string(),
                chunker,
            })
            .await?;

        tracing::info!(
            "Created {} at version {} ({} blocks uploaded)",
            destination,
            result.version,
            result.blocks_uploaded
        );
        Ok(CommandOutput::Created {
            version: result.version,
        })
    }

    pub async fn read(&self, source: &str, destination: &Path) -> anyhow::Result<CommandOutput> {
        validate_filename(source)?;
        validate_destination(destination)?;

        let result = DownloadFileOperation::new(self.metadata.clone(), self.blocks.clone())
            .run(DownloadFileOperationRequest {
                filename: source.to_string(),
                destination: destination.to_path_buf(),
            })
            .await;

        match result {
            Ok(result) => {
                tracing::info!(
                    "Read {} version {} into {:?} ({} bytes)",
                    source,
                    result.version,
                    result.path,
                    result.size_bytes
                );
                Ok(CommandOutput::Downloaded)
            }
            Err(SurfsError::NotFound(_)) => Ok(CommandOutput::NotFound),
            Err(error) => Err(error.into()),
        }
    }

    pub async fn delete(&self, filename: &str) -> anyhow::Result<CommandOutput> {
        validate_filename(filename)?;

        let result = DeleteFileOperation::new(self.metadata.clone())
            .run(DeleteFileOperationRequest {
                filename: filename.to_string(),
            })
            .await;

        match result {
            Ok(result) => {
                tracing::info!("Deleted {} at version {}", filename, result.version);
                Ok(CommandOutput::Deleted)
            }
            Err(SurfsError::NotFound(_)) => Ok(CommandOutput::NotFound),
            Err(error) => Err(error.into()),
        }
    }

    pub async fn get_version(&self, filename: &str) -> anyhow::Result<CommandOutput> {
        validate_filename(filename)?;
        let version = self.metadata.get_version(filename).await?;
        Ok(CommandOutput::Version(version))
    }
}

fn validate_filename(filename: &str) -> anyhow::Result<()> {
    if filename.trim().is_empty() {
        bail!("file name cannot be empty");
    }
    Ok(())
}

/// The destination must be an existing directory or a path inside one
fn validate_destination(destination: &Path) -> anyhow::Result<()> {
    if destination.is_dir() {
        return Ok(());
    }

    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !parent.is_dir() {
        bail!(
            "destination directory {} does not exist",
            parent.display()
        );
    }
    Ok(())
}
