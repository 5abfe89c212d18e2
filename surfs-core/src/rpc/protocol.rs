//! JSON bodies exchanged between the services and their clients

use super::ModifyOutcome;
use crate::storage::FileRecord;
use serde::{Deserialize, Serialize};

pub const ENDPOINT_HEALTH: &str = "/health";
pub const ENDPOINT_BLOCKS: &str = "/blocks";
pub const ENDPOINT_HAS_BLOCK: &str = "/blocks/has";
pub const ENDPOINT_READ_FILE: &str = "/files/read";
pub const ENDPOINT_MODIFY_FILE: &str = "/files/modify";
pub const ENDPOINT_DELETE_FILE: &str = "/files/delete";
pub const ENDPOINT_GET_VERSION: &str = "/files/version";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashQuery {
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreBlockResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasBlockResponse {
    pub success: bool,
}

/// Body of a 404 from the block fetch endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBlockMissResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileRequest {
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileResponse {
    pub version: u64,
    #[serde(default)]
    pub hash_list: Vec<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl ReadFileResponse {
    pub fn into_record(self, filename: &str) -> FileRecord {
        FileRecord {
            filename: filename.to_string(),
            version: self.version,
            hash_list: self.hash_list,
            deleted: self.deleted,
        }
    }
}

impl From<FileRecord> for ReadFileResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            version: record.version,
            hash_list: record.hash_list,
            deleted: record.deleted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyFileRequest {
    pub filename: String,
    pub version: u64,
    #[serde(default)]
    pub hash_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyFileResponse {
    pub success: bool,
    #[serde(default)]
    pub missing_hash_list: Vec<String>,
}

impl From<ModifyOutcome> for ModifyFileResponse {
    fn from(outcome: ModifyOutcome) -> Self {
        match outcome {
            ModifyOutcome::Committed => Self {
                success: true,
                missing_hash_list: Vec::new(),
            },
            ModifyOutcome::VersionConflict => Self {
                success: false,
                missing_hash_list: Vec::new(),
            },
            ModifyOutcome::MissingBlocks(missing) => Self {
                success: false,
                missing_hash_list: missing,
            },
        }
    }
}

impl From<ModifyFileResponse> for ModifyOutcome {
    fn from(response: ModifyFileResponse) -> Self {
        if response.success {
            ModifyOutcome::Committed
        } else if response.missing_hash_list.is_empty() {
            ModifyOutcome::VersionConflict
        } else {
            ModifyOutcome::MissingBlocks(response.missing_hash_list)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFileRequest {
    pub filename: String,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFileResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVersionRequest {
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVersionResponse {
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modify_outcome_wire_mapping() {
        for outcome in [
            ModifyOutcome::Committed,
            ModifyOutcome::VersionConflict,
            ModifyOutcome::MissingBlocks(vec!["hash3".to_string(), "hash4".to_string()]),
        ] {
            let response = ModifyFileResponse::from(outcome.clone());
            assert_eq!(ModifyOutcome::from(response), outcome);
        }
    }

    #[test]
    fn test_conflict_has_no_missing_list() {
        let body: ModifyFileResponse = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert_eq!(ModifyOutcome::from(body), ModifyOutcome::VersionConflict);
    }
}
