// RPC handlers: RequestVote and AppendEntries server-side logic, following
// the rules in Raft paper Figure 2. Both run under the peer's single lock
// from start to finish — the only suspension point is persisting, which is
// allowed to happen while still holding the lock.

use crate::log::LogIndex;
use crate::peer::PeerShared;
use crate::rpc::{AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply};
use crate::state::Role;

pub async fn handle_request_vote(shared: &PeerShared, args: RequestVoteArgs) -> RequestVoteReply {
    let mut state = shared.state.lock().await;

    if args.term > state.current_term {
        state.become_follower(args.term);
    }

    let mut vote_granted = false;
    if args.term >= state.current_term {
        let already_voted_for_other = matches!(state.voted_for, Some(v) if v != args.candidate_id);
        let log_ok = state
            .log
            .is_up_to_date(args.last_log_term, args.last_log_index);

        if !already_voted_for_other && log_ok {
            vote_granted = true;
            state.voted_for = Some(args.candidate_id);
            state.role = Role::Follower;
        }
    }

    let reply = RequestVoteReply {
        term: state.current_term,
        vote_granted,
    };

    // Persist before the reply is observable, per the design's durability
    // rule, and signal the main loop second so a waiter never reads a role
    // the persisted blob doesn't yet reflect.
    let _ = shared.persist_locked(&state).await;
    if vote_granted {
        shared.events.signal_vote_granted();
    }
    drop(state);

    reply
}

pub async fn handle_append_entries(
    shared: &PeerShared,
    args: AppendEntriesArgs,
) -> AppendEntriesReply {
    let mut state = shared.state.lock().await;

    if args.term > state.current_term {
        state.become_follower(args.term);
    }

    if args.term < state.current_term {
        let reply = AppendEntriesReply {
            term: state.current_term,
            success: false,
            conflict_term: 0,
            conflict_index: 0,
        };
        let _ = shared.persist_locked(&state).await;
        drop(state);
        return reply;
    }

    state.role = Role::Follower;
    shared.events.signal_append_received();

    let last_index = state.log.last_index();
    let mut success = false;
    let mut conflict_term: u64 = 0;
    let mut conflict_index: LogIndex = 0;

    if args.prev_log_index > last_index {
        conflict_index = last_index + 1;
    } else {
        match state.log.term_at(args.prev_log_index) {
            Some(term) if term != args.prev_log_term => {
                conflict_term = term;
                conflict_index = state.log.first_index_of_term(term);
            }
            _ => {
                state
                    .log
                    .append_suffix_from(args.prev_log_index, &args.entries);
                success = true;
            }
        }
    }

    if success && args.leader_commit > state.commit_index {
        state.commit_index = args.leader_commit.min(state.log.last_index());
    }

    let reply = AppendEntriesReply {
        term: state.current_term,
        success,
        conflict_term,
        conflict_index,
    };

    let _ = shared.persist_locked(&state).await;
    drop(state);

    if success {
        let _ = shared.maybe_apply().await;
    }

    reply
}
