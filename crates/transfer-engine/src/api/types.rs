//! # API Types
//!
//! Request and response bodies of the transfer endpoints. Field names are
//! camelCase on the wire; binary payloads travel as lowercase hex.

use crate::domain::entities::TaskSummary;
use crate::domain::errors::TransferError;
use serde::{Deserialize, Serialize};
use shared_types::{BlockHash, DownloadTaskId, FileHash, PaymentId, PeerAddress};

/// Status of a successful response.
pub const STATUS_OK: u32 = 0;

/// Envelope of every response. `status` is 0 on success, otherwise the
/// error's status code; HTTP status stays OK either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(result: T) -> Self {
        Self {
            status: STATUS_OK,
            message: "success".to_string(),
            result: Some(result),
        }
    }

    pub fn error(err: &TransferError) -> Self {
        Self {
            status: err.status_code(),
            message: err.to_string(),
            result: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

impl<T> From<Result<T, TransferError>> for ApiResponse<T> {
    fn from(result: Result<T, TransferError>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(err) => Self::error(&err),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadTaskRequest {
    pub peer_addr: PeerAddress,
    pub file_hash: FileHash,
    /// Hex-encoded file prefix.
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadTaskResponse {
    /// False when an in-progress task already existed.
    pub create_state: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutBlocksRequest {
    pub peer_addr: PeerAddress,
    pub file_hash: FileHash,
    pub hashes: Vec<BlockHash>,
    pub indexes: Vec<u64>,
    /// Hex-encoded block bytes, aligned with `hashes`.
    pub blocks: Vec<String>,
    /// Hex-encoded proof tags, aligned with `hashes`.
    pub tags: Vec<String>,
    #[serde(default)]
    pub tx_hash: String,
}

/// Hash/index pairs, aligned by position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRefs {
    pub hashes: Vec<BlockHash>,
    pub indexes: Vec<u64>,
}

impl BlockRefs {
    pub fn push(&mut self, hash: &str, index: u64) {
        self.hashes.push(hash.to_string());
        self.indexes.push(index);
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Blocks that were not stored, with one reason per block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedBlocks {
    pub hashes: Vec<BlockHash>,
    pub indexes: Vec<u64>,
    pub infos: Vec<String>,
}

impl FailedBlocks {
    pub fn push(&mut self, hash: &str, index: u64, info: impl Into<String>) {
        self.hashes.push(hash.to_string());
        self.indexes.push(index);
        self.infos.push(info.into());
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutBlocksResponse {
    /// Blocks the task already held; not stored again.
    pub have_been: BlockRefs,
    pub put_success: BlockRefs,
    pub put_error: FailedBlocks,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePaymentRequest {
    pub hashes: Vec<BlockHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePaymentResponse {
    pub payment_id: PaymentId,
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadBlocksRequest {
    pub peer_addr: PeerAddress,
    pub file_hash: FileHash,
    pub tx_hash: String,
    pub hashes: Vec<BlockHash>,
    pub indexes: Vec<u64>,
    pub payment_id: PaymentId,
    pub download_task_id: DownloadTaskId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadBlocksResponse {
    pub hashes: Vec<BlockHash>,
    pub blocks: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDownloadTaskRequest {
    pub peer_addr: PeerAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDownloadTaskResponse {
    pub task_id: DownloadTaskId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedManifestRequest {
    pub peer_addr: PeerAddress,
    pub file_hash: FileHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedManifestResponse {
    pub hashes: Vec<BlockHash>,
    pub indexes: Vec<u64>,
    /// Hex-encoded file prefix.
    pub prefix: String,
}

/// Complete or delete an upload task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTaskRequest {
    pub peer_addr: PeerAddress,
    pub file_hash: FileHash,
    /// `"0"` doing, `"1"` done. Required for delete.
    #[serde(default)]
    pub task_state: Option<String>,
}

/// Complete or delete a download task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTaskRequest {
    pub peer_addr: PeerAddress,
    pub task_id: DownloadTaskId,
    #[serde(default)]
    pub task_state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksRequest {
    pub peer_addr: PeerAddress,
    pub task_state: String,
}

pub type ListTasksResponse = Vec<TaskSummary>;
