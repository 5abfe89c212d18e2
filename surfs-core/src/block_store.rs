use crate::chunker::verify_hash;
use crate::rpc::BlockStoreApi;
use crate::storage::BlockEngine;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Block store service: content-addressed, add-only block storage
pub struct BlockStore {
    engine: Arc<dyn BlockEngine>,
}

impl BlockStore {
    pub fn new(engine: Arc<dyn BlockEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl BlockStoreApi for BlockStore {
    async fn store_block(&self, hash: &str, data: Bytes) -> Result<()> {
        tracing::debug!(hash = %hash, size = data.len(), "storing block");

        verify_hash(&data, hash)?;

        if self.engine.contains(hash).await? {
            tracing::debug!(hash = %hash, "block already present");
            return Ok(());
        }

        self.engine.set(hash, data).await
    }

    async fn has_block(&self, hash: &str) -> Result<bool> {
        let present = self.engine.contains(hash).await?;
        tracing::trace!(hash = %hash, present, "checked block");
        Ok(present)
    }

    async fn get_block(&self, hash: &str) -> Result<Option<Bytes>> {
        tracing::debug!(hash = %hash, "fetching block");
        self.engine.get(hash).await
    }
}
