// Consensus-Raft - Single-peer Raft consensus core
//
// Implements the Raft consensus algorithm described in "In Search of an
// Understandable Consensus Algorithm" (Ongaro & Ousterhout, 2014): leader
// election, log replication, commit advancement and durable persistence for
// one peer in a fixed-size cluster. Snapshotting, dynamic membership and
// pre-vote are out of scope.

pub mod apply;
pub mod config;
pub mod election;
pub mod error;
pub mod events;
pub mod handlers;
pub mod log;
pub mod peer;
pub mod persist;
pub mod replication;
pub mod rpc;
pub mod state;
pub mod transport;

pub use apply::ApplyMsg;
pub use config::RaftConfig;
pub use error::{RaftError, Result};
pub use log::{Log, LogEntry};
pub use peer::{Peer, PeerHandle};
pub use persist::{FilePersister, MemoryPersister, Persister, PersistentState};
pub use rpc::{AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply};
pub use state::{PeerIndex, Role, Term};
pub use transport::{LocalCluster, LocalTransport, PeerEndpoint, Transport, TransportError};

/// Crate version, mirrored into the demo binary's startup banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
