// Apply pump.
//
// Delivers committed entries to the application in strict index order with
// no gaps, exactly once per accepted commit. Snapshot installation is out of
// scope (§1); `use_snapshot` and `snapshot` are always the default.

use tokio::sync::mpsc;

use crate::log::LogIndex;

/// One committed entry handed to the application. Only `index` and
/// `command` are ever populated by this crate; the snapshot fields are
/// reserved for a future compaction feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyMsg {
    pub index: LogIndex,
    pub command: Vec<u8>,
    pub use_snapshot: bool,
    pub snapshot: Vec<u8>,
}

impl ApplyMsg {
    pub fn command(index: LogIndex, command: Vec<u8>) -> Self {
        Self {
            index,
            command,
            use_snapshot: false,
            snapshot: Vec::new(),
        }
    }
}

/// Drains `[last_applied+1, commit_index]` from `log` and sends each as an
/// `ApplyMsg`, returning the new `last_applied`. Must be called without
/// holding the peer lock across the `send` — the application's queue may
/// block — but the caller is responsible for computing `last_applied`/
/// `commit_index` under the lock and release before calling this; ordering
/// is preserved because only the main actor's task ever calls this for a
/// given peer, never concurrently.
pub async fn drain_committed(
    log: &crate::log::Log,
    commit_index: LogIndex,
    last_applied: LogIndex,
    apply_tx: &mpsc::Sender<ApplyMsg>,
) -> crate::error::Result<LogIndex> {
    let mut applied = last_applied;
    while applied < commit_index {
        applied += 1;
        let entry = log
            .entry(applied)
            .expect("commit_index never exceeds the log's last_index");
        apply_tx
            .send(ApplyMsg::command(applied, entry.command.clone()))
            .await
            .map_err(|_| crate::error::RaftError::ApplyQueueClosed)?;
    }
    Ok(applied)
}
