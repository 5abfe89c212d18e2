use crate::rpc::MetadataStoreApi;
use crate::{Result, SurfsError};
use std::sync::Arc;

#[derive(Clone)]
pub struct DeleteFileOperation {
    metadata: Arc<dyn MetadataStoreApi>,
}

#[derive(Debug, Clone)]
pub struct DeleteFileOperationRequest {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFileOperationResult {
    /// Version the tombstone was written at
    pub version: u64,
}

impl DeleteFileOperation {
    pub fn new(metadata: Arc<dyn MetadataStoreApi>) -> Self {
        Self { metadata }
    }

    pub async fn run(&self, request: DeleteFileOperationRequest) -> Result<DeleteFileOperationResult> {
        let DeleteFileOperationRequest { filename } = request;

        let record = self.metadata.read_file(&filename).await?;
        if !record.exists() {
            return Err(SurfsError::NotFound(filename));
        }

        let version = record.version + 1;
        if !self.metadata.delete_file(&filename, version).await? {
            return Err(SurfsError::VersionConflict { filename, version });
        }

        tracing::debug!(filename = %filename, version, "deleted file");
        Ok(DeleteFileOperationResult { version })
    }
}
