// Raft Log
//
// Append-only ordered sequence of log entries. Position 0 is a reserved
// sentinel (term 0, empty command) so that real entries start at index 1 and
// an entry's index always equals its offset in the backing vector.

use serde::{Deserialize, Serialize};

pub type LogIndex = u64;
pub type Term = u64;

/// A single entry in the replicated log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct LogEntry {
    pub term: Term,
    pub index: LogIndex,
    pub command: Vec<u8>,
}

impl LogEntry {
    pub fn new(term: Term, index: LogIndex, command: Vec<u8>) -> Self {
        Self {
            term,
            index,
            command,
        }
    }

    fn sentinel() -> Self {
        Self {
            term: 0,
            index: 0,
            command: Vec::new(),
        }
    }
}

/// Ordered, append-only sequence of `LogEntry`, indexed from 1 (index 0 is
/// the sentinel). Truncation only ever removes a contiguous suffix; the
/// prefix is immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Log {
    entries: Vec<LogEntry>,
}

impl Default for Log {
    fn default() -> Self {
        Self::new()
    }
}

impl Log {
    pub fn new() -> Self {
        Self {
            entries: vec![LogEntry::sentinel()],
        }
    }

    pub fn last_index(&self) -> LogIndex {
        self.entries.last().expect("log always has sentinel").index
    }

    pub fn last_term(&self) -> Term {
        self.entries.last().expect("log always has sentinel").term
    }

    /// Entry at `index`, or `None` if `index` is out of range (including the
    /// too-large case; the sentinel at 0 is always present).
    pub fn entry(&self, index: LogIndex) -> Option<&LogEntry> {
        self.entries.get(index as usize)
    }

    pub fn term_at(&self, index: LogIndex) -> Option<Term> {
        self.entry(index).map(|e| e.term)
    }

    /// Append a single entry. Panics if it would create a gap; callers are
    /// expected to only call this with `index == last_index() + 1`, which is
    /// the invariant `Start` and `append_suffix_from` both maintain.
    pub fn append(&mut self, entry: LogEntry) {
        debug_assert_eq!(entry.index, self.last_index() + 1);
        self.entries.push(entry);
    }

    /// Entries at and after `index` (inclusive), e.g. for sending to a
    /// follower whose `nextIndex` is `index`.
    pub fn slice_from(&self, index: LogIndex) -> Vec<LogEntry> {
        if index > self.last_index() {
            return Vec::new();
        }
        self.entries[index as usize..].to_vec()
    }

    /// Drop the suffix starting at `index` (inclusive), keeping `[0, index)`.
    pub fn truncate_from(&mut self, index: LogIndex) {
        self.entries.truncate(index as usize);
    }

    /// First index at which `term` appears, scanning from the front. Terms
    /// are monotone non-decreasing, so a binary search would also work; the
    /// linear scan is the behavior this crate commits to (see DESIGN.md).
    pub fn first_index_of_term(&self, term: Term) -> LogIndex {
        for entry in &self.entries {
            if entry.term == term {
                return entry.index;
            }
        }
        0
    }

    /// Implements the Raft §5.3 log-matching merge: entries are compared
    /// position by position starting at `prev_index + 1`. Only a term
    /// mismatch truncates; a match is left untouched so that a stale,
    /// reordered AppendEntries can never discard entries a later one from
    /// the same term already confirmed.
    pub fn append_suffix_from(&mut self, prev_index: LogIndex, incoming: &[LogEntry]) {
        for (k, new_entry) in incoming.iter().enumerate() {
            let position = prev_index + 1 + k as LogIndex;
            match self.entry(position) {
                None => {
                    self.entries.extend(incoming[k..].iter().cloned());
                    return;
                }
                Some(existing) if existing.term != new_entry.term => {
                    self.truncate_from(position);
                    self.entries.extend(incoming[k..].iter().cloned());
                    return;
                }
                Some(_) => continue,
            }
        }
    }

    pub fn is_up_to_date(&self, candidate_last_term: Term, candidate_last_index: LogIndex) -> bool {
        candidate_last_term > self.last_term()
            || (candidate_last_term == self.last_term() && candidate_last_index >= self.last_index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(term: Term, index: LogIndex) -> LogEntry {
        LogEntry::new(term, index, vec![index as u8])
    }

    #[test]
    fn new_log_has_only_sentinel() {
        let log = Log::new();
        assert_eq!(log.last_index(), 0);
        assert_eq!(log.last_term(), 0);
        assert_eq!(log.entry(0), Some(&LogEntry::sentinel()));
    }

    #[test]
    fn append_grows_last_index() {
        let mut log = Log::new();
        log.append(e(1, 1));
        log.append(e(1, 2));
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.last_term(), 1);
    }

    #[test]
    fn append_suffix_extends_past_end() {
        let mut log = Log::new();
        log.append(e(1, 1));
        log.append_suffix_from(1, &[e(1, 2), e(2, 3)]);
        assert_eq!(log.last_index(), 3);
        assert_eq!(log.last_term(), 2);
    }

    #[test]
    fn append_suffix_does_not_truncate_on_match() {
        // A later AppendEntries for the same term must not discard entries a
        // prior, reordered AppendEntries already confirmed at the same index.
        let mut log = Log::new();
        log.append(e(1, 1));
        log.append(e(1, 2));
        log.append(e(1, 3));

        log.append_suffix_from(0, &[e(1, 1)]);
        assert_eq!(log.last_index(), 3, "matching entry must not truncate the log");
    }

    #[test]
    fn append_suffix_truncates_on_term_mismatch() {
        let mut log = Log::new();
        log.append(e(1, 1));
        log.append(e(1, 2));
        log.append(e(1, 3));

        log.append_suffix_from(1, &[e(2, 2)]);
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.entry(2).unwrap().term, 2);
    }

    #[test]
    fn truncate_from_drops_suffix() {
        let mut log = Log::new();
        log.append(e(1, 1));
        log.append(e(1, 2));
        log.truncate_from(2);
        assert_eq!(log.last_index(), 1);
    }

    #[test]
    fn slice_from_out_of_range_is_empty() {
        let log = Log::new();
        assert!(log.slice_from(5).is_empty());
    }

    #[test]
    fn first_index_of_term_scans_from_front() {
        let mut log = Log::new();
        log.append(e(1, 1));
        log.append(e(1, 2));
        log.append(e(2, 3));
        assert_eq!(log.first_index_of_term(1), 1);
        assert_eq!(log.first_index_of_term(2), 3);
        assert_eq!(log.first_index_of_term(9), 0);
    }

    #[test]
    fn up_to_date_compares_term_then_index() {
        let mut log = Log::new();
        log.append(e(2, 1));
        assert!(log.is_up_to_date(3, 0));
        assert!(log.is_up_to_date(2, 1));
        assert!(!log.is_up_to_date(2, 0));
        assert!(!log.is_up_to_date(1, 99));
    }
}
