//! # Transfer Flow
//!
//! A seller node receives blocks from an uploader, then sells them to a
//! buyer who pays on chain. Every step goes through `handle_api_query`
//! with JSON bodies, the way a host's HTTP layer would drive it.
//!
//! ```text
//! uploader ─createUploadTask/putBlocks─→ seller
//! buyer ─issuePayment─→ seller ─paymentId─→ buyer ─pays─→ chain
//! buyer ─createDownloadTask/downloadBlocks─→ seller ─verify─→ chain
//! ```

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use shared_types::{content_hash, BLOCK_SIZE_BYTES};
    use std::sync::Arc;
    use transfer_engine::adapters::{
        BincodeRecordSerializer, FixedTimeSource, InMemoryBlockRepository, InMemoryKVStore, InMemoryPaymentChain,
        ScriptedIdSource,
    };
    use transfer_engine::{handle_api_query, TransferApiHandler, TransferConfig, TransferDependencies, TransferService};

    type Seller =
        TransferApiHandler<InMemoryKVStore, BincodeRecordSerializer, InMemoryPaymentChain, InMemoryBlockRepository>;

    const UPLOADER: &str = "AQr_uploader";
    const BUYER: &str = "AQr_buyer";
    const FILE: &str = "file-7f3a";

    struct Market {
        seller: Seller,
        chain: Arc<InMemoryPaymentChain>,
    }

    fn market() -> Market {
        let chain = Arc::new(InMemoryPaymentChain::new());
        let service = TransferService::new(
            TransferDependencies {
                kv_store: InMemoryKVStore::new(),
                serializer: BincodeRecordSerializer,
                chain: Arc::clone(&chain),
                time_source: Arc::new(FixedTimeSource::new(1_700_000_000)),
                id_source: Arc::new(ScriptedIdSource::sequential()),
            },
            TransferConfig::default(),
        );
        Market {
            seller: TransferApiHandler::new(Arc::new(service), Arc::new(InMemoryBlockRepository::new())),
            chain,
        }
    }

    async fn call(seller: &Seller, method: &str, params: Value) -> Value {
        handle_api_query(seller, method, params).await.unwrap()
    }

    /// Blocks `0..count` of a file: (hash, hex data, hex tag).
    fn file_blocks(count: u8) -> Vec<(String, String, String)> {
        (0..count)
            .map(|i| {
                let data = vec![i; 64];
                (content_hash(&data), hex::encode(&data), hex::encode([0x7a, i]))
            })
            .collect()
    }

    fn put_body(blocks: &[(String, String, String)], indexes: &[u64]) -> Value {
        json!({
            "peerAddr": UPLOADER,
            "fileHash": FILE,
            "hashes": blocks.iter().map(|b| b.0.clone()).collect::<Vec<_>>(),
            "indexes": indexes,
            "blocks": blocks.iter().map(|b| b.1.clone()).collect::<Vec<_>>(),
            "tags": blocks.iter().map(|b| b.2.clone()).collect::<Vec<_>>(),
            "txHash": "0xupload",
        })
    }

    async fn upload_file(m: &Market, blocks: &[(String, String, String)]) {
        let created = call(
            &m.seller,
            "transfer_createUploadTask",
            json!({"peerAddr": UPLOADER, "fileHash": FILE, "prefix": "0badf00d"}),
        )
        .await;
        assert_eq!(created["result"]["createState"], true);

        // Blocks arrive out of order.
        let indexes: Vec<u64> = (0..blocks.len() as u64).rev().collect();
        let reversed: Vec<_> = blocks.iter().rev().cloned().collect();
        let put = call(&m.seller, "transfer_putBlocks", put_body(&reversed, &indexes)).await;
        assert_eq!(put["status"], 0);
        assert_eq!(put["result"]["putSuccess"]["hashes"].as_array().unwrap().len(), blocks.len());
    }

    async fn buy(m: &Market, hashes: &[String], tx_hash: &str) -> (u64, u64) {
        let quote = call(&m.seller, "transfer_issuePayment", json!({"hashes": hashes})).await;
        let payment_id = quote["result"]["paymentId"].as_u64().unwrap();
        assert_eq!(quote["result"]["amount"].as_u64().unwrap(), hashes.len() as u64 * BLOCK_SIZE_BYTES);
        m.chain.record_payment(tx_hash, payment_id as u32);

        let task = call(&m.seller, "transfer_createDownloadTask", json!({"peerAddr": BUYER})).await;
        (payment_id, task["result"]["taskId"].as_u64().unwrap())
    }

    fn download_body(hashes: &[String], payment_id: u64, task_id: u64, tx_hash: &str) -> Value {
        json!({
            "peerAddr": BUYER,
            "fileHash": FILE,
            "txHash": tx_hash,
            "hashes": hashes,
            "indexes": (0..hashes.len() as u64).collect::<Vec<_>>(),
            "paymentId": payment_id,
            "downloadTaskId": task_id,
        })
    }

    #[tokio::test]
    async fn test_full_purchase_flow() {
        let m = market();
        let blocks = file_blocks(3);
        upload_file(&m, &blocks).await;

        // The manifest comes back in file order.
        let manifest = call(
            &m.seller,
            "transfer_orderedManifest",
            json!({"peerAddr": UPLOADER, "fileHash": FILE}),
        )
        .await;
        assert_eq!(manifest["result"]["indexes"], json!([0, 1, 2]));
        assert_eq!(manifest["result"]["hashes"][0], blocks[0].0);
        assert_eq!(manifest["result"]["prefix"], "0badf00d");

        let hashes: Vec<String> = blocks.iter().map(|b| b.0.clone()).collect();
        let (payment_id, task_id) = buy(&m, &hashes, "0xpay1").await;

        let delivered = call(
            &m.seller,
            "transfer_downloadBlocks",
            download_body(&hashes, payment_id, task_id, "0xpay1"),
        )
        .await;
        assert_eq!(delivered["status"], 0, "{delivered}");
        let data: Vec<String> = serde_json::from_value(delivered["result"]["blocks"].clone()).unwrap();
        assert_eq!(data, blocks.iter().map(|b| b.1.clone()).collect::<Vec<_>>());
        assert_eq!(delivered["result"]["tags"][2], blocks[2].2);

        // Both sides close out their tasks.
        let upload_done = call(
            &m.seller,
            "transfer_completeUpload",
            json!({"peerAddr": UPLOADER, "fileHash": FILE}),
        )
        .await;
        assert_eq!(upload_done["result"], true);
        let download_done = call(
            &m.seller,
            "transfer_completeDownload",
            json!({"peerAddr": BUYER, "taskId": task_id}),
        )
        .await;
        assert_eq!(download_done["result"], true);

        let done = call(&m.seller, "transfer_listDownloads", json!({"peerAddr": BUYER, "taskState": "1"})).await;
        let done = done["result"].as_array().unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0]["blockCount"], 3);
        assert_eq!(done[0]["fileHash"], FILE);

        let doing = call(&m.seller, "transfer_listUploads", json!({"peerAddr": UPLOADER, "taskState": "0"})).await;
        assert!(doing["result"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reupload_skips_held_blocks() {
        let m = market();
        let blocks = file_blocks(2);
        upload_file(&m, &blocks).await;

        let again = call(&m.seller, "transfer_putBlocks", put_body(&blocks, &[0, 1])).await;
        assert_eq!(again["result"]["haveBeen"]["hashes"].as_array().unwrap().len(), 2);
        assert!(again["result"]["putSuccess"]["hashes"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ticket_cannot_be_spent_twice() {
        let m = market();
        let blocks = file_blocks(2);
        upload_file(&m, &blocks).await;
        let hashes: Vec<String> = blocks.iter().map(|b| b.0.clone()).collect();
        let (payment_id, task_id) = buy(&m, &hashes, "0xpay2").await;

        let body = download_body(&hashes, payment_id, task_id, "0xpay2");
        assert_eq!(call(&m.seller, "transfer_downloadBlocks", body.clone()).await["status"], 0);

        let replay = call(&m.seller, "transfer_downloadBlocks", body).await;
        assert_eq!(replay["status"], 40003);
    }

    #[tokio::test]
    async fn test_partial_coverage_serves_nothing() {
        let m = market();
        let blocks = file_blocks(3);
        upload_file(&m, &blocks).await;
        let hashes: Vec<String> = blocks.iter().map(|b| b.0.clone()).collect();

        // Pay for two blocks, ask for three.
        let (payment_id, task_id) = buy(&m, &hashes[..2], "0xpay3").await;
        let refused = call(
            &m.seller,
            "transfer_downloadBlocks",
            download_body(&hashes, payment_id, task_id, "0xpay3"),
        )
        .await;
        assert_eq!(refused["status"], 40003);
        assert!(refused.get("result").is_none());

        // The ticket is untouched and still pays for what it covers.
        let served = call(
            &m.seller,
            "transfer_downloadBlocks",
            download_body(&hashes[..2], payment_id, task_id, "0xpay3"),
        )
        .await;
        assert_eq!(served["status"], 0);
    }

    #[tokio::test]
    async fn test_payment_for_another_ticket_is_rejected() {
        let m = market();
        let blocks = file_blocks(1);
        upload_file(&m, &blocks).await;
        let hashes = vec![blocks[0].0.clone()];

        let (payment_id, task_id) = buy(&m, &hashes, "0xpay4").await;
        // A second ticket's transaction does not pay for the first.
        let (_, _) = buy(&m, &hashes, "0xpay5").await;

        let refused = call(
            &m.seller,
            "transfer_downloadBlocks",
            download_body(&hashes, payment_id, task_id, "0xpay5"),
        )
        .await;
        assert_eq!(refused["status"], 40003);
    }
}
