//! # Peer Network
//!
//! Broadcast semantics against the in-memory transport, then two real
//! nodes talking framed TCP on loopback.
//!
//! ```text
//! node A ──TcpPeerTransport──→ serve(node B)
//!        ├─ TRANSFER_PROTOCOL request → B's transfer API → reply
//!        └─ ANNOUNCE_PROTOCOL one-way → B logs the announcement
//! ```

#[cfg(test)]
mod tests {
    use node_runtime::server::{serve, TRANSFER_PROTOCOL};
    use node_runtime::{NodeConfig, TransferNode};
    use parking_lot::Mutex;
    use peer_broadcast::{
        BroadcastConfig, BroadcastCoordinator, BroadcastError, InMemoryTransport, NetworkMessage, PeerBehavior,
        PeerOutcome, ResultCallback,
    };
    use serde_json::{json, Value};
    use shared_types::content_hash;
    use std::net::SocketAddr;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tokio::net::TcpListener;
    use tokio::sync::watch;

    const SELLER: &str = "AQr_seller";

    fn collecting() -> (ResultCallback, Arc<Mutex<Vec<(String, Option<Vec<u8>>)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ResultCallback = Arc::new(move |reply: Option<Vec<u8>>, peer: &str| {
            sink.lock().push((peer.to_string(), reply));
        });
        (callback, seen)
    }

    #[tokio::test]
    async fn test_one_refusing_peer_fails_the_broadcast_but_not_the_others() {
        let transport = InMemoryTransport::new()
            .with_peer("a", PeerBehavior::Reply(b"ok-a".to_vec()))
            .with_peer("b", PeerBehavior::RefuseConnect)
            .with_peer("c", PeerBehavior::Reply(b"ok-c".to_vec()));
        let config = BroadcastConfig {
            max_concurrency: 2,
            ..BroadcastConfig::for_testing()
        };
        let coordinator = BroadcastCoordinator::new(Arc::new(transport), config);
        let (on_result, seen) = collecting();
        let targets = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let err = coordinator
            .broadcast(&targets, NetworkMessage::new("/dfs/announce/1.0.0", vec![1]), true, || false, on_result)
            .await
            .unwrap_err();

        assert_eq!(err, BroadcastError::BroadcastFailed { failed: 1, total: 3 });
        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), Some(b"ok-a".to_vec())),
                ("c".to_string(), Some(b"ok-c".to_vec())),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_after_first_reply_skips_remaining_batches() {
        let transport = InMemoryTransport::new()
            .with_peer("a", PeerBehavior::Reply(b"have it".to_vec()))
            .with_peer("b", PeerBehavior::Reply(b"have it".to_vec()))
            .with_peer("c", PeerBehavior::Reply(b"have it".to_vec()));
        let transport = Arc::new(transport);
        let config = BroadcastConfig {
            max_concurrency: 1,
            ..BroadcastConfig::for_testing()
        };
        let coordinator = BroadcastCoordinator::new(Arc::clone(&transport), config);
        let (on_result, seen) = collecting();
        let targets = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let watcher = Arc::clone(&seen);
        let report = coordinator
            .broadcast(
                &targets,
                NetworkMessage::new("/dfs/announce/1.0.0", vec![]),
                true,
                move || !watcher.lock().is_empty(),
                on_result,
            )
            .await
            .unwrap();

        assert!(report.stopped_early());
        assert_eq!(report.attempted(), 1);
        assert_eq!(transport.connect_attempts("b"), 0);
    }

    struct RunningNode {
        node: Arc<TransferNode>,
        addr: SocketAddr,
        shutdown: watch::Sender<bool>,
        _dir: TempDir,
    }

    fn config_in(dir: &Path) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.storage.data_dir = dir.to_path_buf();
        config.broadcast = BroadcastConfig {
            request_timeout: Duration::from_secs(5),
            ..BroadcastConfig::for_testing()
        };
        config
    }

    async fn start_seller() -> RunningNode {
        let dir = tempdir().unwrap();
        let node = Arc::new(TransferNode::build(config_in(dir.path())).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, rx) = watch::channel(false);
        tokio::spawn(serve(listener, Arc::clone(&node), rx));
        RunningNode {
            node,
            addr,
            shutdown,
            _dir: dir,
        }
    }

    fn client_knowing(peers: &[(&str, SocketAddr)]) -> (TransferNode, TempDir) {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.network.peers = peers.iter().map(|(name, addr)| (name.to_string(), *addr)).collect();
        (TransferNode::build(config).unwrap(), dir)
    }

    async fn dead_address() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn test_remote_call_creates_task_on_peer() {
        let seller = start_seller().await;
        let (client, _dir) = client_knowing(&[(SELLER, seller.addr)]);

        let reply = client
            .call_peer(
                SELLER,
                "transfer_createUploadTask",
                json!({"peerAddr": "AQr_client", "fileHash": "remote-file"}),
            )
            .await
            .unwrap();
        assert_eq!(reply["status"], 0);
        assert_eq!(reply["result"]["createState"], true);

        // A second call reuses the connection and sees the existing task.
        let again = client
            .call_peer(
                SELLER,
                "transfer_createUploadTask",
                json!({"peerAddr": "AQr_client", "fileHash": "remote-file"}),
            )
            .await
            .unwrap();
        assert_eq!(again["result"]["createState"], false);

        let listed = seller
            .node
            .query("transfer_listUploads", json!({"peerAddr": "AQr_client", "taskState": "0"}))
            .await;
        assert_eq!(listed["result"].as_array().map(Vec::len), Some(1));

        let _ = seller.shutdown.send(true);
    }

    #[tokio::test]
    async fn test_remote_errors_come_back_as_responses() {
        let seller = start_seller().await;
        let (client, _dir) = client_knowing(&[(SELLER, seller.addr)]);

        let unknown = client.call_peer(SELLER, "transfer_nope", Value::Null).await.unwrap();
        assert_eq!(unknown["status"], 40001);

        let missing = client
            .call_peer(
                SELLER,
                "transfer_orderedManifest",
                json!({"peerAddr": "AQr_client", "fileHash": "never-uploaded"}),
            )
            .await
            .unwrap();
        assert_eq!(missing["status"], 40004);

        let _ = seller.shutdown.send(true);
    }

    #[tokio::test]
    async fn test_call_to_unknown_peer_fails_to_connect() {
        let (client, _dir) = client_knowing(&[]);
        let err = client.call_peer("AQr_stranger", "transfer_listUploads", Value::Null).await.unwrap_err();
        assert!(matches!(err, node_runtime::NodeError::Peer(BroadcastError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_announcement_reaches_listening_peer_and_reports_dead_one() {
        let seller = start_seller().await;
        let dead = dead_address().await;
        let (client, _dir) = client_knowing(&[(SELLER, seller.addr), ("AQr_offline", dead)]);
        let hashes = vec![content_hash(b"block-0"), content_hash(b"block-1")];

        let err = client.announce_blocks("file-announced", &hashes).await.unwrap_err();
        assert_eq!(err, BroadcastError::BroadcastFailed { failed: 1, total: 2 });

        let (only_seller, _dir2) = client_knowing(&[(SELLER, seller.addr)]);
        let report = only_seller.announce_blocks("file-announced", &hashes).await.unwrap().unwrap();
        assert_eq!(report.delivered(), 1);
        assert!(matches!(report.outcome(SELLER), Some(PeerOutcome::Delivered { reply: None })));

        let _ = seller.shutdown.send(true);
    }

    #[tokio::test]
    async fn test_query_broadcast_collects_replies_from_every_seller() {
        let first = start_seller().await;
        let second = start_seller().await;
        let (client, _dir) = client_knowing(&[("AQr_s1", first.addr), ("AQr_s2", second.addr)]);
        let (on_result, seen) = collecting();

        let call = json!({"method": "transfer_createDownloadTask", "params": {"peerAddr": "AQr_client"}});
        let report = client
            .broadcast()
            .broadcast(
                &["AQr_s1".to_string(), "AQr_s2".to_string()],
                NetworkMessage::new(TRANSFER_PROTOCOL, serde_json::to_vec(&call).unwrap()),
                true,
                || false,
                on_result,
            )
            .await
            .unwrap();

        assert_eq!(report.delivered(), 2);
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        for (_, reply) in seen.iter() {
            let reply: Value = serde_json::from_slice(reply.as_deref().unwrap()).unwrap();
            assert_eq!(reply["status"], 0);
            assert!(reply["result"]["taskId"].is_u64());
        }

        let _ = first.shutdown.send(true);
        let _ = second.shutdown.send(true);
    }
}
