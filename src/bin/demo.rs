// Demo binary: boots an in-process 3-peer cluster over `LocalTransport`,
// waits for a leader, submits a few commands, and prints what each peer
// applies.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use consensus_raft::{ApplyMsg, LocalCluster, MemoryPersister, Peer, PeerHandle, Persister, RaftConfig, Transport};

const PEER_COUNT: usize = 3;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = consensus_raft::VERSION, peers = PEER_COUNT, "starting raft demo cluster");

    let cluster = LocalCluster::new(PEER_COUNT);
    let config = RaftConfig::fast_for_tests();

    let mut handles: Vec<PeerHandle> = Vec::with_capacity(PEER_COUNT);
    let mut applied: Vec<mpsc::Receiver<ApplyMsg>> = Vec::with_capacity(PEER_COUNT);

    for i in 0..PEER_COUNT {
        let persister: Arc<dyn Persister> = Arc::new(MemoryPersister::new());
        let transport: Arc<dyn Transport> = Arc::new(cluster.handle_for(i));
        let (apply_tx, apply_rx) = mpsc::channel(config.apply_queue_capacity);

        let handle = Peer::spawn(PEER_COUNT, i, persister, transport, apply_tx, config.clone()).await;
        cluster.register(i, handle.clone());
        handles.push(handle);
        applied.push(apply_rx);
    }

    let leader = match find_leader(&handles).await {
        Some(index) => index,
        None => {
            tracing::error!("no leader elected within the demo's timeout");
            return;
        }
    };
    tracing::info!(self_index = leader, "leader elected");

    for command in [b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()] {
        let (index, term, is_leader) = handles[leader].start(command).await;
        tracing::info!(index, term, is_leader, "submitted command");
    }

    for (i, rx) in applied.iter_mut().enumerate() {
        let mut delivered = Vec::new();
        while delivered.len() < 3 {
            match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
                Ok(Some(msg)) => delivered.push(msg),
                _ => break,
            }
        }
        tracing::info!(self_index = i, ?delivered, "delivered entries");
    }

    for handle in &handles {
        handle.kill();
    }
}

async fn find_leader(handles: &[PeerHandle]) -> Option<usize> {
    for _ in 0..50 {
        for (i, handle) in handles.iter().enumerate() {
            let (_, is_leader) = handle.get_state().await;
            if is_leader {
                return Some(i);
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    None
}
