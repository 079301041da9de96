// Replication driver.
//
// One independent loop per follower, retriggered every heartbeat by the
// main loop's Leader branch. A follower's loop retries immediately on a
// log-inconsistency reply (backing off `nextIndex`) and only gives up for
// this tick on a transport failure or on losing leadership.

use std::sync::Arc;

use crate::log::{LogIndex, Term};
use crate::peer::PeerShared;
use crate::rpc::AppendEntriesArgs;
use crate::state::{PeerIndex, PeerState, Role};

pub async fn replicate_once(shared: &Arc<PeerShared>) {
    let term = {
        let state = shared.state.lock().await;
        if state.role != Role::Leader {
            return;
        }
        state.current_term
    };

    for follower in 0..shared.peer_count {
        if follower == shared.self_index {
            continue;
        }
        let shared = shared.clone();
        tokio::spawn(async move { replicate_to_follower(&shared, follower, term).await });
    }
}

async fn replicate_to_follower(shared: &Arc<PeerShared>, follower: PeerIndex, term: Term) {
    loop {
        let (args, prev_log_index, sent_count) = {
            let state = shared.state.lock().await;
            if state.role != Role::Leader || state.current_term != term {
                return;
            }
            let next_index = state.next_index[follower];
            let prev_log_index = next_index - 1;
            let prev_log_term = state.log.term_at(prev_log_index).unwrap_or(0);
            let entries = state.log.slice_from(next_index);
            let sent_count = entries.len();
            let args = AppendEntriesArgs {
                term,
                leader_id: shared.self_index,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit: state.commit_index,
            };
            (args, prev_log_index, sent_count)
        };

        let reply = match shared.transport.append_entries(follower, args).await {
            Ok(reply) => reply,
            Err(_) => return, // outer heartbeat cadence retries this follower
        };

        let mut state = shared.state.lock().await;

        if reply.term > state.current_term {
            state.become_follower(reply.term);
            let _ = shared.persist_locked(&state).await;
            return;
        }

        // Freshness guard: a reply to a stale term or after losing
        // leadership has nothing left to apply.
        if state.role != Role::Leader || state.current_term != term {
            return;
        }

        if reply.success {
            let match_index = prev_log_index + sent_count as LogIndex;
            state.next_index[follower] = match_index + 1;
            state.match_index[follower] = match_index;
            advance_commit_index(&mut state, shared.self_index, term);
            drop(state);
            let _ = shared.maybe_apply().await;
            return;
        }

        let backed_off = if reply.conflict_term != 0 {
            match last_index_with_term(&state, reply.conflict_term) {
                Some(index) => index + 1,
                None => reply.conflict_index,
            }
        } else {
            reply.conflict_index
        };
        state.next_index[follower] = backed_off.max(1);
        // loop: retry immediately with the backed-off nextIndex
    }
}

/// Highest index in the leader's own log whose term equals `term`, if any.
/// Terms are monotone, so scanning backward from the end stops as soon as
/// an older term is seen.
fn last_index_with_term(state: &PeerState, term: Term) -> Option<LogIndex> {
    let mut index = state.log.last_index();
    while index > 0 {
        match state.log.term_at(index) {
            Some(t) if t == term => return Some(index),
            Some(t) if t < term => return None,
            _ => {}
        }
        index -= 1;
    }
    None
}

/// Commit the median of `matchIndex` (with the leader's own last index
/// standing in for its own slot) when it belongs to the current term — the
/// replicated-to-a-majority rule from Raft §5.3/§5.4, with the Figure 8
/// restriction that a leader never commits an entry from an earlier term by
/// count alone.
fn advance_commit_index(state: &mut PeerState, self_index: PeerIndex, term: Term) {
    if state.role != Role::Leader {
        return;
    }
    let mut sorted = state.match_index.clone();
    sorted[self_index] = state.log.last_index();
    sorted.sort_unstable();
    let median = sorted[sorted.len() / 2];
    if median > state.commit_index && state.log.term_at(median) == Some(term) {
        state.commit_index = median;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::RaftConfig;
    use crate::log::LogEntry;
    use crate::peer::test_support::shared_fixture_with_transport;
    use crate::rpc::{AppendEntriesReply, RequestVoteArgs, RequestVoteReply};
    use crate::transport::{Transport, TransportError};

    use super::*;

    struct AlwaysSucceed;

    #[async_trait]
    impl Transport for AlwaysSucceed {
        async fn request_vote(
            &self,
            _target: PeerIndex,
            args: RequestVoteArgs,
        ) -> Result<RequestVoteReply, TransportError> {
            Ok(RequestVoteReply {
                term: args.term,
                vote_granted: true,
            })
        }

        async fn append_entries(
            &self,
            _target: PeerIndex,
            args: AppendEntriesArgs,
        ) -> Result<AppendEntriesReply, TransportError> {
            Ok(AppendEntriesReply {
                term: args.term,
                success: true,
                conflict_term: 0,
                conflict_index: 0,
            })
        }
    }

    struct RejectOnce;

    #[async_trait]
    impl Transport for RejectOnce {
        async fn request_vote(
            &self,
            _target: PeerIndex,
            args: RequestVoteArgs,
        ) -> Result<RequestVoteReply, TransportError> {
            Ok(RequestVoteReply {
                term: args.term,
                vote_granted: true,
            })
        }

        async fn append_entries(
            &self,
            _target: PeerIndex,
            args: AppendEntriesArgs,
        ) -> Result<AppendEntriesReply, TransportError> {
            if args.prev_log_index == 0 {
                Ok(AppendEntriesReply {
                    term: args.term,
                    success: true,
                    conflict_term: 0,
                    conflict_index: 0,
                })
            } else {
                Ok(AppendEntriesReply {
                    term: args.term,
                    success: false,
                    conflict_term: 0,
                    conflict_index: 1,
                })
            }
        }
    }

    async fn leader_fixture(
        transport: Arc<dyn Transport>,
    ) -> Arc<crate::peer::PeerShared> {
        let shared =
            shared_fixture_with_transport(3, 0, RaftConfig::fast_for_tests(), transport);
        let mut state = shared.state.lock().await;
        state.log.append(LogEntry::new(1, 1, vec![42]));
        state.current_term = 1;
        state.role = Role::Leader;
        state.become_leader();
        drop(state);
        shared
    }

    #[tokio::test]
    async fn successful_replies_advance_commit_index() {
        let shared = leader_fixture(Arc::new(AlwaysSucceed)).await;

        replicate_once(&shared).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = shared.state.lock().await;
        assert_eq!(state.match_index[1], 1);
        assert_eq!(state.match_index[2], 1);
        assert_eq!(state.commit_index, 1);
    }

    #[tokio::test]
    async fn conflict_reply_backs_off_next_index_then_succeeds() {
        let shared = leader_fixture(Arc::new(RejectOnce)).await;
        shared.state.lock().await.next_index = vec![2, 2, 2];

        replicate_once(&shared).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = shared.state.lock().await;
        assert_eq!(state.next_index[1], 2);
        assert_eq!(state.next_index[2], 2);
        assert_eq!(state.commit_index, 1);
    }
}
