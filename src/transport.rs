// Peer transport capability.
//
// The consensus core only assumes a capability that can asynchronously call
// a named method on a named peer, may return "unreachable", and may drop or
// duplicate messages; its wire format is out of scope. `Transport` is that
// seam. `LocalTransport` is an in-process reference implementation used by
// the integration tests and the demo binary: peers are plain async trait
// objects registered into a shared hub, and a partition is simulated by
// marking a peer's index as disconnected.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::rpc::{AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply};
use crate::state::PeerIndex;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer is unreachable")]
    Unreachable,
}

/// What a peer exposes to the transport so other peers can reach its RPC
/// handlers. `Peer` implements this; see `peer.rs`.
#[async_trait]
pub trait PeerEndpoint: Send + Sync {
    async fn request_vote(&self, args: RequestVoteArgs) -> RequestVoteReply;
    async fn append_entries(&self, args: AppendEntriesArgs) -> AppendEntriesReply;
}

/// What the replication and election drivers use to call other peers.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request_vote(
        &self,
        target: PeerIndex,
        args: RequestVoteArgs,
    ) -> Result<RequestVoteReply, TransportError>;

    async fn append_entries(
        &self,
        target: PeerIndex,
        args: AppendEntriesArgs,
    ) -> Result<AppendEntriesReply, TransportError>;
}

struct LocalHub {
    endpoints: Mutex<Vec<Option<Arc<dyn PeerEndpoint>>>>,
    disconnected: Mutex<HashSet<PeerIndex>>,
}

/// A shared, in-process cluster of `peer_count` link-addressable slots. Each
/// peer gets its own `LocalTransport` handle (via `handle_for`) pointing at
/// this one hub, and registers its endpoint once it is constructed.
#[derive(Clone)]
pub struct LocalCluster {
    hub: Arc<LocalHub>,
}

impl LocalCluster {
    pub fn new(peer_count: usize) -> Self {
        Self {
            hub: Arc::new(LocalHub {
                endpoints: Mutex::new(vec![None; peer_count]),
                disconnected: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn handle_for(&self, self_index: PeerIndex) -> LocalTransport {
        LocalTransport {
            hub: self.hub.clone(),
            self_index,
        }
    }

    pub fn register(&self, index: PeerIndex, endpoint: Arc<dyn PeerEndpoint>) {
        self.hub.endpoints.lock()[index] = Some(endpoint);
    }

    /// Simulate a partition: `index` can neither reach nor be reached by
    /// any other peer until `reconnect` is called.
    pub fn disconnect(&self, index: PeerIndex) {
        self.hub.disconnected.lock().insert(index);
    }

    pub fn reconnect(&self, index: PeerIndex) {
        self.hub.disconnected.lock().remove(&index);
    }
}

/// One peer's view of a `LocalCluster`: knows its own index so that a call
/// out of or into a disconnected peer fails as "unreachable" in either
/// direction.
#[derive(Clone)]
pub struct LocalTransport {
    hub: Arc<LocalHub>,
    self_index: PeerIndex,
}

impl LocalTransport {
    fn reachable(&self, target: PeerIndex) -> bool {
        let disconnected = self.hub.disconnected.lock();
        !disconnected.contains(&self.self_index) && !disconnected.contains(&target)
    }

    fn endpoint(&self, target: PeerIndex) -> Option<Arc<dyn PeerEndpoint>> {
        self.hub.endpoints.lock()[target].clone()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn request_vote(
        &self,
        target: PeerIndex,
        args: RequestVoteArgs,
    ) -> Result<RequestVoteReply, TransportError> {
        if !self.reachable(target) {
            return Err(TransportError::Unreachable);
        }
        let endpoint = self.endpoint(target).ok_or(TransportError::Unreachable)?;
        Ok(endpoint.request_vote(args).await)
    }

    async fn append_entries(
        &self,
        target: PeerIndex,
        args: AppendEntriesArgs,
    ) -> Result<AppendEntriesReply, TransportError> {
        if !self.reachable(target) {
            return Err(TransportError::Unreachable);
        }
        let endpoint = self.endpoint(target).ok_or(TransportError::Unreachable)?;
        Ok(endpoint.append_entries(args).await)
    }
}
