// Role state
//
// The tagged role variant plus the volatile state attached to each role.
// `PeerState` is the data guarded by the peer's single coarse-grained lock;
// everything in this module is synchronous and does no I/O, so callers can
// mutate it while holding the lock and only need to
// think about suspension points (persistence, RPCs, sleeps) at the call
// sites in `handlers`, `election`, `replication` and `peer`.

use crate::log::{Log, LogEntry, LogIndex};
use crate::persist::PersistentState;

pub type PeerIndex = usize;
pub type Term = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
    Shutdown,
}

/// All mutable state for one peer: the persistent triple (currentTerm,
/// votedFor, log) plus the volatile common and leader-only fields from
/// the Raft paper's Figure 2.
pub struct PeerState {
    pub role: Role,
    pub current_term: Term,
    pub voted_for: Option<PeerIndex>,
    pub log: Log,

    pub commit_index: LogIndex,
    pub last_applied: LogIndex,

    /// Leader-only; indexed by peer index, meaningless while not Leader.
    pub next_index: Vec<LogIndex>,
    pub match_index: Vec<LogIndex>,
}

impl PeerState {
    pub fn new(peer_count: usize) -> Self {
        Self {
            role: Role::Follower,
            current_term: 0,
            voted_for: None,
            log: Log::new(),
            commit_index: 0,
            last_applied: 0,
            next_index: vec![1; peer_count],
            match_index: vec![0; peer_count],
        }
    }

    pub fn restore(&mut self, persisted: PersistentState) {
        self.current_term = persisted.current_term;
        self.voted_for = persisted.voted_for;
        self.log = persisted.log;
    }

    pub fn persistent_snapshot(&self) -> PersistentState {
        PersistentState {
            current_term: self.current_term,
            voted_for: self.voted_for,
            log: self.log.clone(),
        }
    }

    /// The one and only path by which `current_term` advances in response
    /// to observing a higher term. Never call this with `term <
    /// current_term`; the handlers that call it always check that first.
    pub fn become_follower(&mut self, term: Term) {
        self.role = Role::Follower;
        self.current_term = term;
        self.voted_for = None;
    }

    /// Entering Candidate bumps the term and votes for self.
    pub fn become_candidate(&mut self, self_index: PeerIndex) {
        self.role = Role::Candidate;
        self.current_term += 1;
        self.voted_for = Some(self_index);
    }

    /// Entering Leader reinitializes `next_index` to `last_index + 1` for
    /// every peer and zeroes `match_index`, per Figure 2's leader-volatile
    /// state re-init rule.
    pub fn become_leader(&mut self) {
        self.role = Role::Leader;
        let next = self.log.last_index() + 1;
        for n in self.next_index.iter_mut() {
            *n = next;
        }
        for m in self.match_index.iter_mut() {
            *m = 0;
        }
    }

    pub fn shutdown(&mut self) {
        self.role = Role::Shutdown;
    }

    pub fn append_command(&mut self, command: Vec<u8>) -> LogEntry {
        let entry = LogEntry::new(self.current_term, self.log.last_index() + 1, command);
        self.log.append(entry.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn become_candidate_bumps_term_and_votes_self() {
        let mut state = PeerState::new(3);
        state.become_candidate(1);
        assert_eq!(state.current_term, 1);
        assert_eq!(state.voted_for, Some(1));
        assert_eq!(state.role, Role::Candidate);
    }

    #[test]
    fn become_follower_clears_vote() {
        let mut state = PeerState::new(3);
        state.become_candidate(1);
        state.become_follower(5);
        assert_eq!(state.current_term, 5);
        assert_eq!(state.voted_for, None);
        assert_eq!(state.role, Role::Follower);
    }

    #[test]
    fn become_leader_reinitializes_leader_volatile() {
        let mut state = PeerState::new(3);
        state.log.append(LogEntry::new(1, 1, vec![]));
        state.next_index = vec![9, 9, 9];
        state.match_index = vec![9, 9, 9];

        state.become_leader();
        assert_eq!(state.next_index, vec![2, 2, 2]);
        assert_eq!(state.match_index, vec![0, 0, 0]);
        assert_eq!(state.role, Role::Leader);
    }
}
