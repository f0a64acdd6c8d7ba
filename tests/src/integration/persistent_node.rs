//! # Persistent Node
//!
//! A fully wired `TransferNode` over a temporary data directory: file task
//! store, block files on disk and the JSON-RPC chain client pointed at a
//! canned chain endpoint.

#[cfg(test)]
mod tests {
    use node_runtime::{NodeConfig, TransferNode};
    use serde_json::{json, Value};
    use shared_types::content_hash;
    use std::path::Path;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const UPLOADER: &str = "AQr_uploader";
    const BUYER: &str = "AQr_buyer";
    const FILE: &str = "file-disk";

    fn node_at(dir: &Path, rpc_url: Option<String>) -> TransferNode {
        let mut config = NodeConfig::default();
        config.storage.data_dir = dir.to_path_buf();
        if let Some(url) = rpc_url {
            config.chain.rpc_url = url;
            config.chain.request_timeout_secs = 5;
        }
        TransferNode::build(config).unwrap()
    }

    /// Chain endpoint answering every request with `body`.
    async fn chain_answering(body: Value) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                // Headers and a small JSON body arrive well within one buffer.
                loop {
                    let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                    read += n;
                    let text = String::from_utf8_lossy(&buf[..read]);
                    if n == 0 || (text.contains("\r\n\r\n") && text.trim_end().ends_with('}')) {
                        break;
                    }
                }
                let body = body.to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        url
    }

    fn blocks(count: u8) -> Vec<(String, Vec<u8>)> {
        (0..count)
            .map(|i| {
                let data = vec![0xd0 | i; 128];
                (content_hash(&data), data)
            })
            .collect()
    }

    async fn upload(node: &TransferNode, blocks: &[(String, Vec<u8>)]) {
        node.query(
            "transfer_createUploadTask",
            json!({"peerAddr": UPLOADER, "fileHash": FILE, "prefix": "cafe"}),
        )
        .await;
        let put = node
            .query(
                "transfer_putBlocks",
                json!({
                    "peerAddr": UPLOADER,
                    "fileHash": FILE,
                    "hashes": blocks.iter().map(|b| b.0.clone()).collect::<Vec<_>>(),
                    "indexes": (0..blocks.len() as u64).collect::<Vec<_>>(),
                    "blocks": blocks.iter().map(|b| hex::encode(&b.1)).collect::<Vec<_>>(),
                    "tags": blocks.iter().map(|_| "00".to_string()).collect::<Vec<_>>(),
                }),
            )
            .await;
        assert_eq!(put["status"], 0, "{put}");
    }

    #[tokio::test]
    async fn test_completed_upload_survives_restart() {
        let dir = tempdir().unwrap();
        let stored = blocks(3);
        {
            let node = node_at(dir.path(), None);
            upload(&node, &stored).await;
            let done = node
                .query("transfer_completeUpload", json!({"peerAddr": UPLOADER, "fileHash": FILE}))
                .await;
            assert_eq!(done["result"], true);
        }

        let node = node_at(dir.path(), None);
        let listed = node
            .query("transfer_listUploads", json!({"peerAddr": UPLOADER, "taskState": "1"}))
            .await;
        let listed = listed["result"].as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["blockCount"], 3);

        // The manifest of a completed task is still served, in file order.
        let manifest = node
            .query("transfer_orderedManifest", json!({"peerAddr": UPLOADER, "fileHash": FILE}))
            .await;
        assert_eq!(manifest["result"]["indexes"], json!([0, 1, 2]));
        assert_eq!(manifest["result"]["prefix"], "cafe");

        assert!(dir.path().join("blocks").join(&stored[0].0[..2]).exists());
    }

    #[tokio::test]
    async fn test_deleted_upload_is_gone_after_restart() {
        let dir = tempdir().unwrap();
        {
            let node = node_at(dir.path(), None);
            upload(&node, &blocks(1)).await;
            let deleted = node
                .query(
                    "transfer_deleteUpload",
                    json!({"peerAddr": UPLOADER, "fileHash": FILE, "taskState": "0"}),
                )
                .await;
            assert_eq!(deleted["status"], 0);
        }

        let node = node_at(dir.path(), None);
        let doing = node
            .query("transfer_listUploads", json!({"peerAddr": UPLOADER, "taskState": "0"}))
            .await;
        assert!(doing["result"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_paid_download_reads_blocks_from_disk() {
        let dir = tempdir().unwrap();
        let stored = blocks(2);
        let hashes: Vec<String> = stored.iter().map(|b| b.0.clone()).collect();

        // Issue the ticket first so the chain answer can carry its id.
        let (payment_id, task_id) = {
            let node = node_at(dir.path(), None);
            upload(&node, &stored).await;
            let quote = node.query("transfer_issuePayment", json!({"hashes": hashes})).await;
            let task = node.query("transfer_createDownloadTask", json!({"peerAddr": BUYER})).await;
            (
                quote["result"]["paymentId"].as_u64().unwrap(),
                task["result"]["taskId"].as_u64().unwrap(),
            )
        };

        let rpc_url = chain_answering(json!({
            "jsonrpc": "2.0", "id": 1,
            "result": {
                "txHash": "0xpaid", "blockIndex": 7,
                "notifications": [{"contractAddress": "0xpay", "states": {"paymentId": payment_id}}]
            }
        }))
        .await;
        let node = node_at(dir.path(), Some(rpc_url));

        let delivered = node
            .query(
                "transfer_downloadBlocks",
                json!({
                    "peerAddr": BUYER,
                    "fileHash": FILE,
                    "txHash": "0xpaid",
                    "hashes": hashes,
                    "indexes": [0, 1],
                    "paymentId": payment_id,
                    "downloadTaskId": task_id,
                }),
            )
            .await;
        assert_eq!(delivered["status"], 0, "{delivered}");
        assert_eq!(delivered["result"]["blocks"][1], hex::encode(&stored[1].1));

        let listed = node
            .query("transfer_listDownloads", json!({"peerAddr": BUYER, "taskState": "0"}))
            .await;
        assert_eq!(listed["result"][0]["blockCount"], 2);
    }

    #[tokio::test]
    async fn test_unreachable_chain_is_an_internal_error() {
        let dir = tempdir().unwrap();
        let stored = blocks(1);
        let hashes = vec![stored[0].0.clone()];

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let node = node_at(dir.path(), Some(dead_url));
        upload(&node, &stored).await;
        let quote = node.query("transfer_issuePayment", json!({"hashes": hashes})).await;
        let task = node.query("transfer_createDownloadTask", json!({"peerAddr": BUYER})).await;

        let refused = node
            .query(
                "transfer_downloadBlocks",
                json!({
                    "peerAddr": BUYER,
                    "fileHash": FILE,
                    "txHash": "0xany",
                    "hashes": hashes,
                    "indexes": [0],
                    "paymentId": quote["result"]["paymentId"],
                    "downloadTaskId": task["result"]["taskId"],
                }),
            )
            .await;
        assert_eq!(refused["status"], 50004);
    }
}
