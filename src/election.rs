// Election driver.
//
// Broadcasts RequestVote to every other peer and tallies replies. Runs once
// per entry into (or re-entry into) the Candidate role; the main loop calls
// this at the top of each Candidate iteration.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::peer::PeerShared;
use crate::rpc::RequestVoteArgs;
use crate::state::Role;

pub async fn start_election(shared: &Arc<PeerShared>) {
    let (term, last_log_index, last_log_term) = {
        let state = shared.state.lock().await;
        (state.current_term, state.log.last_index(), state.log.last_term())
    };

    tracing::info!(
        self_index = shared.self_index,
        term,
        "broadcasting RequestVote"
    );

    let votes = Arc::new(AtomicUsize::new(1)); // self-vote

    for target in 0..shared.peer_count {
        if target == shared.self_index {
            continue;
        }

        let shared = shared.clone();
        let votes = votes.clone();
        let args = RequestVoteArgs {
            term,
            candidate_id: shared.self_index,
            last_log_index,
            last_log_term,
        };

        tokio::spawn(async move {
            let reply = match shared.transport.request_vote(target, args).await {
                Ok(reply) => reply,
                Err(_) => return,
            };

            let mut state = shared.state.lock().await;

            if reply.term > state.current_term {
                state.become_follower(reply.term);
                let _ = shared.persist_locked(&state).await;
                return;
            }

            // Freshness guard: a vote only counts toward the election that
            // requested it.
            if state.role != Role::Candidate || state.current_term != term || !reply.vote_granted {
                return;
            }

            let count = votes.fetch_add(1, Ordering::SeqCst) + 1;
            if count > shared.peer_count / 2 && state.role == Role::Candidate {
                state.become_leader();
                tracing::info!(self_index = shared.self_index, term, "elected leader");
                shared.events.signal_became_leader();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::RaftConfig;
    use crate::peer::test_support::shared_fixture_with_transport;
    use crate::rpc::{AppendEntriesArgs, AppendEntriesReply, RequestVoteReply};
    use crate::state::PeerIndex;
    use crate::transport::{Transport, TransportError};

    use super::*;

    struct AlwaysGrant;

    #[async_trait]
    impl Transport for AlwaysGrant {
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

    struct HigherTermRefusal;

    #[async_trait]
    impl Transport for HigherTermRefusal {
        async fn request_vote(
            &self,
            _target: PeerIndex,
            args: RequestVoteArgs,
        ) -> Result<RequestVoteReply, TransportError> {
            Ok(RequestVoteReply {
                term: args.term + 1,
                vote_granted: false,
            })
        }

        async fn append_entries(
            &self,
            _target: PeerIndex,
            args: AppendEntriesArgs,
        ) -> Result<AppendEntriesReply, TransportError> {
            Ok(AppendEntriesReply {
                term: args.term,
                success: false,
                conflict_term: 0,
                conflict_index: 0,
            })
        }
    }

    #[tokio::test]
    async fn majority_of_grants_promotes_to_leader() {
        let shared =
            shared_fixture_with_transport(3, 0, RaftConfig::fast_for_tests(), Arc::new(AlwaysGrant));
        shared.state.lock().await.become_candidate(0);

        start_election(&shared).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(shared.state.lock().await.role, Role::Leader);
    }

    #[tokio::test]
    async fn higher_term_in_reply_steps_down() {
        let shared = shared_fixture_with_transport(
            3,
            0,
            RaftConfig::fast_for_tests(),
            Arc::new(HigherTermRefusal),
        );
        shared.state.lock().await.become_candidate(0);
        let candidate_term = shared.state.lock().await.current_term;

        start_election(&shared).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = shared.state.lock().await;
        assert_eq!(state.role, Role::Follower);
        assert!(state.current_term > candidate_term);
    }
}
