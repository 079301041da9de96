// RPC message shapes for RequestVote and AppendEntries, per Raft paper
// Figure 2. These are plain data; the `Transport` trait in `transport.rs`
// is what actually moves them between peers.

use serde::{Deserialize, Serialize};

use crate::log::{LogEntry, LogIndex, Term};
use crate::state::PeerIndex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteArgs {
    pub term: Term,
    pub candidate_id: PeerIndex,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteReply {
    pub term: Term,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesArgs {
    pub term: Term,
    pub leader_id: PeerIndex,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesReply {
    pub term: Term,
    pub success: bool,
    /// 0 when `success` is true, or when the follower was simply missing
    /// entries (the "follower's log is too short" case).
    pub conflict_term: Term,
    pub conflict_index: LogIndex,
}
