use crate::chunker::Chunker;
use crate::rpc::{BlockStoreApi, MetadataStoreApi, ModifyOutcome};
use crate::{Result, SurfsError};
use futures_util::{StreamExt, TryStreamExt, stream};
use std::collections::HashSet;
use std::sync::Arc;

/// Default bound on missing-block upload rounds per upload
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default number of blocks uploaded in parallel
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 8;

/// Creates or replaces a file: commits the hash list and uploads whatever
/// blocks the metadata store reports missing. At most `max_attempts` upload
/// rounds run, each followed by another commit.
#[derive(Clone)]
pub struct UploadFileOperation {
    metadata: Arc<dyn MetadataStoreApi>,
    blocks: Arc<dyn BlockStoreApi>,
    max_attempts: u32,
    upload_concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct UploadFileOperationRequest {
    pub filename: String,
    pub chunker: Chunker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFileOperationResult {
    pub version: u64,
    /// Commit attempts made, including the successful one
    pub attempts: u32,
    pub blocks_uploaded: usize,
}

impl UploadFileOperation {
    pub fn new(metadata: Arc<dyn MetadataStoreApi>, blocks: Arc<dyn BlockStoreApi>) -> Self {
        Self {
            metadata,
            blocks,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_upload_concurrency(mut self, concurrency: usize) -> Self {
        self.upload_concurrency = concurrency.max(1);
        self
    }

    pub async fn run(&self, request: UploadFileOperationRequest) -> Result<UploadFileOperationResult> {
        let UploadFileOperationRequest { filename, chunker } = request;

        let hash_list = chunker.hash_list()?;
        let current = self.metadata.get_version(&filename).await?;
        let version = current.checked_add(1).ok_or_else(|| {
            SurfsError::Internal(format!("version overflow for {}", filename))
        })?;

        tracing::debug!(
            filename = %filename,
            version,
            blocks = hash_list.len(),
            "uploading file"
        );

        let mut blocks_uploaded = 0;
        let mut attempts = 0;
        let mut upload_rounds = 0;
        loop {
            attempts += 1;
            match self
                .metadata
                .modify_file(&filename, version, hash_list.clone())
                .await?
            {
                ModifyOutcome::Committed => {
                    tracing::debug!(filename = %filename, version, attempts, "upload committed");
                    return Ok(UploadFileOperationResult {
                        version,
                        attempts,
                        blocks_uploaded,
                    });
                }
                ModifyOutcome::VersionConflict => {
                    return Err(SurfsError::VersionConflict { filename, version });
                }
                ModifyOutcome::MissingBlocks(missing) => {
                    // Every upload round is followed by a commit, so stop before uploading
                    // blocks that no commit would use
                    if upload_rounds == self.max_attempts {
                        break;
                    }
                    upload_rounds += 1;

                    tracing::debug!(
                        filename = %filename,
                        round = upload_rounds,
                        "uploading {} missing blocks",
                        missing.len()
                    );
                    blocks_uploaded += self.upload_missing(&chunker, &missing).await?;
                }
            }
        }

        tracing::warn!(
            filename = %filename,
            upload_rounds,
            "upload did not converge"
        );
        Err(SurfsError::ExceededRetries {
            filename,
            attempts: upload_rounds,
        })
    }

    /// Upload each distinct missing block once, returning how many were sent.
    ///
    /// Blocks are read from the chunker as they are needed, so at most
    /// `upload_concurrency` of them are held in memory at a time.
    async fn upload_missing(&self, chunker: &Chunker, missing: &[String]) -> Result<usize> {
        let mut wanted: HashSet<&str> = missing.iter().map(String::as_str).collect();

        let pending = chunker.blocks().filter(|block| match block {
            Ok(block) => wanted.remove(block.hash.as_str()),
            Err(_) => true,
        });
        let uploaded = stream::iter(pending)
            .map(|block| {
                let blocks = self.blocks.clone();
                async move {
                    let block = block?;
                    blocks.store_block(&block.hash, block.data).await
                }
            })
            .buffer_unordered(self.upload_concurrency)
            .try_fold(0, |uploaded, ()| async move { Ok(uploaded + 1) })
            .await?;

        if let Some(unknown) = wanted.into_iter().next() {
            return Err(SurfsError::Internal(format!(
                "metadata store reported a block this file does not contain: {}",
                unknown
            )));
        }

        Ok(uploaded)
    }
}
