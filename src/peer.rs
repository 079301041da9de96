// Main loop and peer API surface.
//
// `PeerShared` is the state every other module borrows: the single lock
// guarding `PeerState`, and handles to the persister, transport, apply
// queue and event channels. `Peer` implements `PeerEndpoint` so a transport
// can call back into the RPC handlers; `PeerHandle` is the `Arc<Peer>` an
// application holds to submit commands and observe leadership.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::apply::ApplyMsg;
use crate::config::RaftConfig;
use crate::election;
use crate::error::Result;
use crate::events::Events;
use crate::handlers;
use crate::log::{LogIndex, Term};
use crate::persist::{Persister, PersistentState};
use crate::replication;
use crate::rpc::{AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply};
use crate::state::{PeerIndex, PeerState, Role};
use crate::transport::{PeerEndpoint, Transport};

/// Everything the RPC handlers, election driver, replication driver and
/// main loop all need a reference to. Held behind an `Arc` so every
/// background task can share it without a lifetime.
pub struct PeerShared {
    pub self_index: PeerIndex,
    pub peer_count: usize,
    pub state: AsyncMutex<PeerState>,
    pub persister: Arc<dyn Persister>,
    pub transport: Arc<dyn Transport>,
    pub apply_tx: mpsc::Sender<ApplyMsg>,
    pub events: Arc<Events>,
    pub config: RaftConfig,
    /// Serializes apply-pump runs so two concurrent triggers (an
    /// AppendEntries success and a leader's own commit advancement, say)
    /// never race to deliver the same index twice.
    apply_lock: AsyncMutex<()>,
}

impl PeerShared {
    /// Persist the durable triple. Called while still holding `state`'s
    /// lock: a save is never allowed to race a second mutation of the same
    /// fields.
    pub async fn persist_locked(&self, state: &PeerState) -> Result<()> {
        let blob = state.persistent_snapshot().encode();
        self.persister.save(blob).await
    }

    /// Deliver every entry in `(last_applied, commit_index]` via
    /// `apply::drain_committed`, never holding `state`'s lock across the
    /// queue send. Serialized through `apply_lock` so two concurrent
    /// triggers never race to drain overlapping ranges.
    pub async fn maybe_apply(&self) -> Result<()> {
        let _guard = self.apply_lock.lock().await;
        let (log, commit_index, last_applied) = {
            let state = self.state.lock().await;
            if state.last_applied >= state.commit_index {
                return Ok(());
            }
            (state.log.clone(), state.commit_index, state.last_applied)
        };

        let new_last_applied =
            crate::apply::drain_committed(&log, commit_index, last_applied, &self.apply_tx).await?;

        let mut state = self.state.lock().await;
        if new_last_applied > state.last_applied {
            state.last_applied = new_last_applied;
        }
        Ok(())
    }
}

/// One consensus peer. Implements `PeerEndpoint` so a `Transport` can
/// deliver inbound RPCs into `handlers`.
pub struct Peer {
    shared: Arc<PeerShared>,
}

/// What callers hold: an `Arc<Peer>`, cloneable for registration with a
/// transport and for use from the application alongside the peer's own
/// background tasks.
pub type PeerHandle = Arc<Peer>;

impl Peer {
    /// Construct a peer, restoring persisted state if any is present, and
    /// spawn its main loop.
    pub async fn spawn(
        peer_count: usize,
        self_index: PeerIndex,
        persister: Arc<dyn Persister>,
        transport: Arc<dyn Transport>,
        apply_tx: mpsc::Sender<ApplyMsg>,
        config: RaftConfig,
    ) -> PeerHandle {
        let mut state = PeerState::new(peer_count);
        if let Ok(Some(blob)) = persister.load().await {
            match PersistentState::decode(&blob) {
                Ok(persisted) => state.restore(persisted),
                Err(err) => {
                    tracing::error!(self_index, %err, "persisted state failed to decode");
                    panic!("corrupt persistent state for peer {self_index}: {err}");
                }
            }
        }

        let shared = Arc::new(PeerShared {
            self_index,
            peer_count,
            state: AsyncMutex::new(state),
            persister,
            transport,
            apply_tx,
            events: Events::new(),
            config,
            apply_lock: AsyncMutex::new(()),
        });

        tokio::spawn(run_main_loop(shared.clone()));

        Arc::new(Peer { shared })
    }

    /// Appends `command` to the log if this peer is currently leader.
    /// Returns `(index, term, is_leader)`.
    pub async fn start(&self, command: Vec<u8>) -> (LogIndex, Term, bool) {
        let mut state = self.shared.state.lock().await;
        if state.role != Role::Leader {
            return (0, state.current_term, false);
        }
        let entry = state.append_command(command);
        let _ = self.shared.persist_locked(&state).await;
        tracing::debug!(
            self_index = self.shared.self_index,
            index = entry.index,
            term = entry.term,
            "accepted client command"
        );
        (entry.index, entry.term, true)
    }

    pub async fn get_state(&self) -> (Term, bool) {
        let state = self.shared.state.lock().await;
        (state.current_term, state.role == Role::Leader)
    }

    /// Advisory shutdown: signals the main loop and returns immediately
    /// without waiting for it to exit.
    pub fn kill(&self) {
        self.shared.events.signal_shutdown();
    }
}

#[async_trait]
impl PeerEndpoint for Peer {
    async fn request_vote(&self, args: RequestVoteArgs) -> RequestVoteReply {
        handlers::handle_request_vote(&self.shared, args).await
    }

    async fn append_entries(&self, args: AppendEntriesArgs) -> AppendEntriesReply {
        handlers::handle_append_entries(&self.shared, args).await
    }
}

async fn run_main_loop(shared: Arc<PeerShared>) {
    loop {
        let role = shared.state.lock().await.role;
        match role {
            Role::Shutdown => {
                tracing::info!(self_index = shared.self_index, "main loop exiting");
                return;
            }

            Role::Follower => {
                let timeout = shared.config.random_election_timeout();
                tokio::select! {
                    _ = shared.events.append_received.notified() => {}
                    _ = shared.events.vote_granted.notified() => {}
                    _ = shared.events.shutdown.notified() => {
                        shared.state.lock().await.shutdown();
                    }
                    _ = tokio::time::sleep(timeout) => {
                        let mut state = shared.state.lock().await;
                        state.become_candidate(shared.self_index);
                        tracing::info!(
                            self_index = shared.self_index,
                            term = state.current_term,
                            "election timeout elapsed, becoming candidate"
                        );
                        let _ = shared.persist_locked(&state).await;
                    }
                }
            }

            Role::Candidate => {
                election::start_election(&shared).await;

                let timeout = shared.config.random_election_timeout();
                tokio::select! {
                    _ = shared.events.append_received.notified() => {}
                    _ = shared.events.vote_granted.notified() => {}
                    _ = shared.events.became_leader.notified() => {}
                    _ = shared.events.shutdown.notified() => {
                        shared.state.lock().await.shutdown();
                    }
                    _ = tokio::time::sleep(timeout) => {
                        let mut state = shared.state.lock().await;
                        if state.role == Role::Candidate {
                            state.become_candidate(shared.self_index);
                            tracing::info!(
                                self_index = shared.self_index,
                                term = state.current_term,
                                "election timed out with no majority, retrying"
                            );
                            let _ = shared.persist_locked(&state).await;
                        }
                    }
                }
            }

            Role::Leader => {
                replication::replicate_once(&shared).await;
                tokio::select! {
                    _ = shared.events.shutdown.notified() => {
                        shared.state.lock().await.shutdown();
                    }
                    _ = tokio::time::sleep(shared.config.heartbeat_interval) => {}
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::persist::MemoryPersister;
    use crate::transport::TransportError;

    struct UnreachableTransport;

    #[async_trait]
    impl Transport for UnreachableTransport {
        async fn request_vote(
            &self,
            _target: PeerIndex,
            _args: RequestVoteArgs,
        ) -> std::result::Result<RequestVoteReply, TransportError> {
            Err(TransportError::Unreachable)
        }

        async fn append_entries(
            &self,
            _target: PeerIndex,
            _args: AppendEntriesArgs,
        ) -> std::result::Result<AppendEntriesReply, TransportError> {
            Err(TransportError::Unreachable)
        }
    }

    /// A `PeerShared` with an in-memory persister, an unreachable-only
    /// transport, and an apply queue drained in the background — enough
    /// to exercise `handlers` in isolation.
    pub fn shared_fixture(peer_count: usize, self_index: PeerIndex, config: RaftConfig) -> Arc<PeerShared> {
        shared_fixture_with_transport(peer_count, self_index, config, Arc::new(UnreachableTransport))
    }

    /// Same as `shared_fixture`, but with a caller-supplied transport — used
    /// by `election`/`replication` tests that need peers to actually reply.
    pub fn shared_fixture_with_transport(
        peer_count: usize,
        self_index: PeerIndex,
        config: RaftConfig,
        transport: Arc<dyn Transport>,
    ) -> Arc<PeerShared> {
        let (apply_tx, mut apply_rx) = mpsc::channel(config.apply_queue_capacity);
        tokio::spawn(async move { while apply_rx.recv().await.is_some() {} });

        Arc::new(PeerShared {
            self_index,
            peer_count,
            state: AsyncMutex::new(PeerState::new(peer_count)),
            persister: Arc::new(MemoryPersister::new()),
            transport,
            apply_tx,
            events: Events::new(),
            config,
            apply_lock: AsyncMutex::new(()),
        })
    }
}
