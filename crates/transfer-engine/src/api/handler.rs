//! # Transfer API Handler
//!
//! Request-level operations on top of `TransferService`: validation,
//! hex decoding, block persistence and response shaping. Every outcome is
//! an `ApiResponse`; failures are reported in the body, never as panics.

use super::types::*;
use crate::domain::entities::TransferredBlock;
use crate::domain::errors::TransferError;
use crate::domain::keys::TaskPartition;
use crate::ports::outbound::{BlockPayload, BlockRepository, KeyValueStore, PaymentChain, RecordSerializer};
use crate::service::TransferService;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{content_hash, validate_content_hash, validate_peer_address};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Transport-level failures of [`handle_api_query`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiQueryError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),
}

/// Handler for the transfer endpoints.
pub struct TransferApiHandler<KV, S, C, B>
where
    KV: KeyValueStore,
    S: RecordSerializer,
    C: PaymentChain,
    B: BlockRepository,
{
    service: Arc<TransferService<KV, S, C>>,
    blocks: Arc<B>,
}

impl<KV, S, C, B> TransferApiHandler<KV, S, C, B>
where
    KV: KeyValueStore,
    S: RecordSerializer,
    C: PaymentChain,
    B: BlockRepository,
{
    pub fn new(service: Arc<TransferService<KV, S, C>>, blocks: Arc<B>) -> Self {
        Self { service, blocks }
    }

    pub fn service(&self) -> &TransferService<KV, S, C> {
        &self.service
    }

    /// `{peerAddr, fileHash, prefix}` → `{createState}`.
    pub fn create_upload_task(&self, request: CreateUploadTaskRequest) -> ApiResponse<CreateUploadTaskResponse> {
        self.try_create_upload_task(request).into()
    }

    fn try_create_upload_task(&self, request: CreateUploadTaskRequest) -> Result<CreateUploadTaskResponse, TransferError> {
        require(&request.peer_addr, "peerAddr")?;
        require(&request.file_hash, "fileHash")?;
        let prefix = decode_hex(&request.prefix, "prefix")?;

        let created = self
            .service
            .uploads()
            .create_if_absent(&request.peer_addr, &request.file_hash, prefix)?;
        Ok(CreateUploadTaskResponse { create_state: created })
    }

    /// Filter out blocks the task already holds, store the rest and record
    /// them on the upload task.
    ///
    /// Per-block failures land in `putError`. A repository failure stops
    /// the batch: the failing block and every block not yet attempted are
    /// reported there, earlier successes stay recorded. If the task ledger
    /// cannot be updated, the blocks written in this batch move from
    /// `putSuccess` to `putError` so the uploader resends them.
    pub fn accept_uploaded_blocks(&self, request: PutBlocksRequest) -> ApiResponse<PutBlocksResponse> {
        self.try_accept_uploaded_blocks(request).into()
    }

    fn try_accept_uploaded_blocks(&self, request: PutBlocksRequest) -> Result<PutBlocksResponse, TransferError> {
        require(&request.peer_addr, "peerAddr")?;
        require(&request.file_hash, "fileHash")?;
        let count = request.hashes.len();
        if request.indexes.len() != count || request.blocks.len() != count || request.tags.len() != count {
            return Err(TransferError::parameter(format!(
                "hashes, indexes, blocks and tags must have equal length ({}, {}, {}, {})",
                count,
                request.indexes.len(),
                request.blocks.len(),
                request.tags.len()
            )));
        }
        if !request.tx_hash.is_empty() {
            debug!(tx_hash = %request.tx_hash, "[transfer] upload batch references transaction");
        }

        let peer = request.peer_addr.as_str();
        let file_hash = request.file_hash.as_str();
        let partition = self.service.uploads().reconcile(peer, file_hash, &request.hashes)?;

        let mut response = PutBlocksResponse::default();
        for &i in &partition.held {
            response.have_been.push(&request.hashes[i], request.indexes[i]);
        }

        let mut stored = Vec::with_capacity(partition.missing.len());
        let mut pending = partition.missing.iter().copied();
        while let Some(i) = pending.next() {
            let (hash, index) = (&request.hashes[i], request.indexes[i]);

            let payload = match decode_payload(&request.blocks[i], &request.tags[i]) {
                Ok(payload) => payload,
                Err(err) => {
                    response.put_error.push(hash, index, err.to_string());
                    continue;
                }
            };

            let computed = content_hash(&payload.data);
            if &computed != hash {
                let err = TransferError::BlockIntegrity {
                    claimed: hash.clone(),
                    computed,
                };
                warn!(peer, file_hash, index, "[transfer] ⚠️ {}", err);
                response.put_error.push(hash, index, err.to_string());
                continue;
            }

            if let Err(err) = self.blocks.put_block(hash, &payload) {
                let err = TransferError::from(err);
                warn!(peer, file_hash, index, error = %err, "[transfer] ❌ block write failed, halting batch");
                response.put_error.push(hash, index, err.to_string());
                for rest in pending.by_ref() {
                    response
                        .put_error
                        .push(&request.hashes[rest], request.indexes[rest], "not attempted: batch halted");
                }
                break;
            }

            response.put_success.push(hash, index);
            stored.push(TransferredBlock::new(hash.clone(), index).held_by(peer));
        }

        if !stored.is_empty() {
            if let Err(err) = self.service.uploads().record_blocks(peer, file_hash, &stored) {
                // The payloads are on disk but the task does not list them.
                warn!(peer, file_hash, error = %err, "[transfer] ❌ ledger update failed after block writes");
                response.put_success = BlockRefs::default();
                for block in &stored {
                    response.put_error.push(&block.hash, block.index, err.to_string());
                }
            }
        }

        info!(
            peer,
            file_hash,
            have_been = response.have_been.len(),
            stored = response.put_success.len(),
            failed = response.put_error.len(),
            "[transfer] 📦 upload batch processed"
        );
        Ok(response)
    }

    /// `{hashes}` → `{paymentId, amount}`.
    pub fn issue_payment(&self, request: IssuePaymentRequest) -> ApiResponse<IssuePaymentResponse> {
        self.service
            .payments()
            .issue_ticket(&request.hashes)
            .map(|quote| IssuePaymentResponse {
                payment_id: quote.payment_id,
                amount: quote.amount_due,
            })
            .into()
    }

    /// Release paid-for blocks.
    ///
    /// All requested hashes must be covered by the ticket and the payment
    /// proven on chain; otherwise nothing is returned. Blocks are recorded
    /// on the download task and the ticket spent before the payload is
    /// handed back.
    pub async fn download_blocks(&self, request: DownloadBlocksRequest) -> ApiResponse<DownloadBlocksResponse> {
        self.try_download_blocks(request).await.into()
    }

    async fn try_download_blocks(&self, request: DownloadBlocksRequest) -> Result<DownloadBlocksResponse, TransferError> {
        require(&request.peer_addr, "peerAddr")?;
        require(&request.tx_hash, "txHash")?;
        if request.hashes.is_empty() {
            return Err(TransferError::parameter("hashes must not be empty"));
        }
        if request.hashes.len() != request.indexes.len() {
            return Err(TransferError::parameter(format!(
                "hashes and indexes must have equal length ({}, {})",
                request.hashes.len(),
                request.indexes.len()
            )));
        }
        for hash in &request.hashes {
            validate_content_hash(hash)?;
        }

        self.service
            .payments()
            .authorize_release(request.payment_id, &request.tx_hash, &request.hashes)
            .await?;

        let mut payloads = Vec::with_capacity(request.hashes.len());
        for hash in &request.hashes {
            let payload = self
                .blocks
                .get_block(hash)?
                .ok_or_else(|| TransferError::BlockUnavailable(hash.clone()))?;
            payloads.push(payload);
        }

        let delivered: Vec<TransferredBlock> = request
            .hashes
            .iter()
            .zip(&request.indexes)
            .map(|(hash, &index)| TransferredBlock::new(hash.clone(), index).held_by(request.peer_addr.clone()))
            .collect();
        let file_hash = (!request.file_hash.is_empty()).then_some(request.file_hash.as_str());
        self.service.downloads().record_blocks(
            request.download_task_id,
            &request.peer_addr,
            file_hash,
            &delivered,
            request.payment_id,
        )?;

        info!(
            peer = %request.peer_addr,
            task_id = request.download_task_id,
            payment_id = request.payment_id,
            blocks = payloads.len(),
            "[transfer] 📤 blocks released"
        );
        Ok(DownloadBlocksResponse {
            hashes: request.hashes,
            blocks: payloads.iter().map(|p| hex::encode(&p.data)).collect(),
            tags: payloads.iter().map(|p| hex::encode(&p.tag)).collect(),
        })
    }

    /// `{peerAddr}` → `{taskId}`.
    pub fn create_download_task(&self, request: CreateDownloadTaskRequest) -> ApiResponse<CreateDownloadTaskResponse> {
        self.service
            .downloads()
            .create(&request.peer_addr)
            .map(|task_id| CreateDownloadTaskResponse { task_id })
            .into()
    }

    /// `{peerAddr, fileHash}` → `{hashes, indexes, prefix}` in canonical order.
    pub fn ordered_manifest(&self, request: OrderedManifestRequest) -> ApiResponse<OrderedManifestResponse> {
        self.service
            .uploads()
            .ordered_manifest(&request.peer_addr, &request.file_hash)
            .map(|manifest| OrderedManifestResponse {
                hashes: manifest.hashes,
                indexes: manifest.indexes,
                prefix: hex::encode(manifest.prefix),
            })
            .into()
    }

    pub fn complete_upload(&self, request: UploadTaskRequest) -> ApiResponse<bool> {
        self.service
            .uploads()
            .complete(&request.peer_addr, &request.file_hash)
            .map(|_| true)
            .into()
    }

    pub fn delete_upload(&self, request: UploadTaskRequest) -> ApiResponse<bool> {
        required_partition(request.task_state.as_deref())
            .and_then(|partition| {
                self.service
                    .uploads()
                    .delete(&request.peer_addr, &request.file_hash, partition)
            })
            .into()
    }

    pub fn list_uploads(&self, request: ListTasksRequest) -> ApiResponse<ListTasksResponse> {
        TaskPartition::from_task_state(&request.task_state)
            .and_then(|partition| self.service.uploads().list(&request.peer_addr, partition))
            .into()
    }

    pub fn complete_download(&self, request: DownloadTaskRequest) -> ApiResponse<bool> {
        self.service
            .downloads()
            .complete(&request.peer_addr, request.task_id)
            .map(|_| true)
            .into()
    }

    pub fn delete_download(&self, request: DownloadTaskRequest) -> ApiResponse<bool> {
        required_partition(request.task_state.as_deref())
            .and_then(|partition| {
                self.service
                    .downloads()
                    .delete(&request.peer_addr, request.task_id, partition)
            })
            .into()
    }

    pub fn list_downloads(&self, request: ListTasksRequest) -> ApiResponse<ListTasksResponse> {
        TaskPartition::from_task_state(&request.task_state)
            .and_then(|partition| self.service.downloads().list(&request.peer_addr, partition))
            .into()
    }
}

/// Route a JSON request body to the matching endpoint.
///
/// Malformed bodies are answered with a `ParameterError` response; only an
/// unknown method is an `Err`.
pub async fn handle_api_query<KV, S, C, B>(
    handler: &TransferApiHandler<KV, S, C, B>,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value, ApiQueryError>
where
    KV: KeyValueStore,
    S: RecordSerializer,
    C: PaymentChain,
    B: BlockRepository,
{
    let response = match method {
        "transfer_createUploadTask" => respond(params, |r| handler.create_upload_task(r)),
        "transfer_putBlocks" => respond(params, |r| handler.accept_uploaded_blocks(r)),
        "transfer_issuePayment" => respond(params, |r| handler.issue_payment(r)),
        "transfer_createDownloadTask" => respond(params, |r| handler.create_download_task(r)),
        "transfer_orderedManifest" => respond(params, |r| handler.ordered_manifest(r)),
        "transfer_completeUpload" => respond(params, |r| handler.complete_upload(r)),
        "transfer_deleteUpload" => respond(params, |r| handler.delete_upload(r)),
        "transfer_listUploads" => respond(params, |r| handler.list_uploads(r)),
        "transfer_completeDownload" => respond(params, |r| handler.complete_download(r)),
        "transfer_deleteDownload" => respond(params, |r| handler.delete_download(r)),
        "transfer_listDownloads" => respond(params, |r| handler.list_downloads(r)),
        "transfer_downloadBlocks" => match parse::<DownloadBlocksRequest>(params) {
            Ok(request) => to_json(&handler.download_blocks(request).await),
            Err(response) => response,
        },
        other => return Err(ApiQueryError::MethodNotFound(other.to_string())),
    };
    Ok(response)
}

fn respond<Req, Resp>(params: serde_json::Value, call: impl FnOnce(Req) -> ApiResponse<Resp>) -> serde_json::Value
where
    Req: DeserializeOwned,
    Resp: Serialize,
{
    match parse::<Req>(params) {
        Ok(request) => to_json(&call(request)),
        Err(response) => response,
    }
}

fn parse<Req: DeserializeOwned>(params: serde_json::Value) -> Result<Req, serde_json::Value> {
    serde_json::from_value(params).map_err(|e| {
        let err = TransferError::parameter(format!("malformed request body: {e}"));
        to_json(&ApiResponse::<()>::error(&err))
    })
}

fn to_json<T: Serialize>(response: &ApiResponse<T>) -> serde_json::Value {
    serde_json::to_value(response).unwrap_or_else(|e| {
        serde_json::json!({
            "status": TransferError::StoreIo { message: String::new() }.status_code(),
            "message": format!("cannot encode response: {e}"),
        })
    })
}

fn require(value: &str, field: &str) -> Result<(), TransferError> {
    if value.is_empty() {
        return Err(TransferError::parameter(format!("{field} is required")));
    }
    if field == "peerAddr" {
        validate_peer_address(value)?;
    }
    Ok(())
}

fn required_partition(task_state: Option<&str>) -> Result<TaskPartition, TransferError> {
    let state = task_state.ok_or_else(|| TransferError::parameter("taskState is required"))?;
    TaskPartition::from_task_state(state)
}

fn decode_hex(value: &str, field: &str) -> Result<Vec<u8>, TransferError> {
    hex::decode(value).map_err(|e| TransferError::parameter(format!("{field} is not valid hex: {e}")))
}

fn decode_payload(block: &str, tag: &str) -> Result<BlockPayload, TransferError> {
    Ok(BlockPayload {
        data: decode_hex(block, "block")?,
        tag: decode_hex(tag, "tag")?,
    })
}
