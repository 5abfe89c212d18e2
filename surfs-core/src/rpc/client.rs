use super::protocol::*;
use super::{BlockStoreApi, MetadataStoreApi, ModifyOutcome};
use crate::storage::FileRecord;
use crate::{Result, SurfsError};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Default per-request timeout for both clients
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| SurfsError::Http(error.to_string()))
}

fn base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

/// Turn a non-success response into the matching error, keeping the server's message
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|payload| payload.error)
        .unwrap_or(body);

    if status == reqwest::StatusCode::BAD_REQUEST {
        return Err(SurfsError::InvalidRequest(message));
    }

    Err(SurfsError::Http(format!(
        "request failed: status={} error={}",
        status, message
    )))
}

/// HTTP client for a remote block store
#[derive(Debug, Clone)]
pub struct BlockStoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl BlockStoreClient {
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url(address),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

#[async_trait]
impl BlockStoreApi for BlockStoreClient {
    async fn store_block(&self, hash: &str, data: Bytes) -> Result<()> {
        let response = self
            .client
            .put(self.url(ENDPOINT_BLOCKS))
            .query(&[("hash", hash)])
            .body(data)
            .send()
            .await
            .map_err(|error| SurfsError::Http(error.to_string()))?;

        let payload: StoreBlockResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|error| SurfsError::Http(error.to_string()))?;

        if !payload.success {
            return Err(SurfsError::Http(format!(
                "block store refused block {}",
                hash
            )));
        }

        Ok(())
    }

    async fn has_block(&self, hash: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url(ENDPOINT_HAS_BLOCK))
            .query(&[("hash", hash)])
            .send()
            .await
            .map_err(|error| SurfsError::Http(error.to_string()))?;

        let payload: HasBlockResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|error| SurfsError::Http(error.to_string()))?;

        Ok(payload.success)
    }

    async fn get_block(&self, hash: &str) -> Result<Option<Bytes>> {
        let response = self
            .client
            .get(self.url(ENDPOINT_BLOCKS))
            .query(&[("hash", hash)])
            .send()
            .await
            .map_err(|error| SurfsError::Http(error.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let data = ensure_success(response)
            .await?
            .bytes()
            .await
            .map_err(|error| SurfsError::Http(error.to_string()))?;

        Ok(Some(data))
    }
}

/// HTTP client for a remote metadata store
#[derive(Debug, Clone)]
pub struct MetadataStoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl MetadataStoreClient {
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url(address),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<Req, Resp>(&self, endpoint: &str, request: &Req) -> Result<Resp>
    where
        Req: serde::Serialize + Sync,
        Resp: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, endpoint))
            .json(request)
            .send()
            .await
            .map_err(|error| SurfsError::Http(error.to_string()))?;

        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|error| SurfsError::Http(error.to_string()))
    }
}

#[async_trait]
impl MetadataStoreApi for MetadataStoreClient {
    async fn read_file(&self, filename: &str) -> Result<FileRecord> {
        let request = ReadFileRequest {
            filename: filename.to_string(),
        };
        let response: ReadFileResponse = self.post(ENDPOINT_READ_FILE, &request).await?;
        Ok(response.into_record(filename))
    }

    async fn modify_file(
        &self,
        filename: &str,
        version: u64,
        hash_list: Vec<String>,
    ) -> Result<ModifyOutcome> {
        let request = ModifyFileRequest {
            filename: filename.to_string(),
            version,
            hash_list,
        };
        let response: ModifyFileResponse = self.post(ENDPOINT_MODIFY_FILE, &request).await?;
        Ok(response.into())
    }

    async fn delete_file(&self, filename: &str, version: u64) -> Result<bool> {
        let request = DeleteFileRequest {
            filename: filename.to_string(),
            version,
        };
        let response: DeleteFileResponse = self.post(ENDPOINT_DELETE_FILE, &request).await?;
        Ok(response.success)
    }

    async fn get_version(&self, filename: &str) -> Result<u64> {
        let request = GetVersionRequest {
            filename: filename.to_string(),
        };
        let response: GetVersionResponse = self.post(ENDPOINT_GET_VERSION, &request).await?;
        Ok(response.version)
    }
}
