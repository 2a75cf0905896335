//! The append-oriented log store (§4.2).
//!
//! Entries are stored contiguously starting at `prev_log_index + 1`; the "prev" position
//! is a virtual sentinel entry that advances when the prefix is trimmed after a snapshot.

use crate::entry::EntryPayload;
use crate::entry::LogEntry;
use crate::ids::LogIndex;
use crate::ids::Term;

/// An ordered, append-oriented sequence of log entries.
///
/// Every operation is pure: it takes `&self` and returns a new `LogStore`, leaving the
/// receiver untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogStore {
    prev_log_index: LogIndex,
    prev_log_term: Term,
    entries: Vec<LogEntry>,
}

impl LogStore {
    /// An empty log whose virtual "prev" entry sits at `(init_index, init_term)`.
    pub fn empty(init_index: LogIndex, init_term: Term) -> Self {
        Self { prev_log_index: init_index, prev_log_term: init_term, entries: Vec::new() }
    }

    pub fn prev_log_index(&self) -> LogIndex {
        self.prev_log_index
    }

    pub fn prev_log_term(&self) -> Term {
        self.prev_log_term
    }

    /// The `(term, index)` of the last stored entry, or the sentinel if the log is empty.
    pub fn last_index(&self) -> (Term, LogIndex) {
        match self.entries.last() {
            Some(e) => (e.term, e.index),
            None => (self.prev_log_term, self.prev_log_index),
        }
    }

    fn offset_of(&self, idx: LogIndex) -> Option<usize> {
        if idx <= self.prev_log_index {
            return None;
        }
        let offset = (idx - self.prev_log_index - 1) as usize;
        if offset >= self.entries.len() {
            None
        } else {
            Some(offset)
        }
    }

    /// Defined for `idx == prev_log_index` (returns `prev_log_term`) and every stored
    /// entry; `None` otherwise.
    pub fn get_term(&self, idx: LogIndex) -> Option<Term> {
        if idx == self.prev_log_index {
            return Some(self.prev_log_term);
        }
        self.offset_of(idx).map(|o| self.entries[o].term)
    }

    /// Entries with index in `[from_inclusive, to_inclusive]`. Out-of-range bounds are
    /// clamped rather than treated as errors; an empty range yields an empty vec.
    pub fn get_range(&self, from_inclusive: LogIndex, to_inclusive: LogIndex) -> Vec<LogEntry> {
        if from_inclusive > to_inclusive {
            return Vec::new();
        }
        let (_, last) = self.last_index();
        let to = to_inclusive.min(last);
        if from_inclusive > to {
            return Vec::new();
        }
        let start = match self.offset_of(from_inclusive) {
            Some(o) => o,
            None => return Vec::new(),
        };
        let end = match self.offset_of(to) {
            Some(o) => o + 1,
            None => self.entries.len(),
        };
        self.entries[start..end].to_vec()
    }

    /// Append a single entry, assigning it `index = last_index + 1`. Returns the new log
    /// and the index just assigned.
    pub fn append(&self, term: Term, payload: EntryPayload) -> (Self, LogIndex) {
        let (_, last) = self.last_index();
        let index = last + 1;
        let mut entries = self.entries.clone();
        entries.push(LogEntry { term, index, payload });
        (Self { prev_log_index: self.prev_log_index, prev_log_term: self.prev_log_term, entries }, index)
    }

    /// Merge an incoming batch of entries (as sent by `AppendEntries`).
    ///
    /// For each incoming entry, if the entry already stored at the same index has a
    /// *different* term, the log is truncated at (and including) that index and every
    /// subsequent incoming entry is installed; an entry that already matches is left
    /// alone. Returns the index of the first conflict detected, if any, so the caller can
    /// tell the configuration tracker to [`drop`](crate::membership::MembershipTracker::drop)
    /// anything appended from that point on.
    ///
    /// Assumes `incoming` is contiguous with no gaps relative to the receiver's log; that
    /// always holds for well-formed `AppendEntries` traffic, which is the only caller.
    pub fn append_many(&self, incoming: Vec<LogEntry>) -> (Self, Option<LogIndex>) {
        if incoming.is_empty() {
            return (self.clone(), None);
        }
        let mut entries = self.entries.clone();
        let mut conflict = None;
        for inc in incoming {
            if inc.index <= self.prev_log_index {
                continue;
            }
            let offset = (inc.index - self.prev_log_index - 1) as usize;
            match entries.get(offset) {
                Some(existing) if existing.term == inc.term => {
                    // Already present and identical; nothing to do.
                }
                Some(_) => {
                    if conflict.is_none() {
                        conflict = Some(inc.index);
                    }
                    entries.truncate(offset);
                    entries.push(inc);
                }
                None => {
                    entries.truncate(offset.min(entries.len()));
                    entries.push(inc);
                }
            }
        }
        (Self { prev_log_index: self.prev_log_index, prev_log_term: self.prev_log_term, entries }, conflict)
    }

    /// Discard every entry with index `<= last_index`; the virtual "prev" sentinel
    /// advances to `(last_index, last_term)`. Used after snapshotting.
    pub fn trim_prefix(&self, last_index: LogIndex, last_term: Term) -> Self {
        if last_index <= self.prev_log_index {
            return self.clone();
        }
        let (_, last) = self.last_index();
        if last_index >= last {
            return Self { prev_log_index: last_index, prev_log_term: last_term, entries: Vec::new() };
        }
        let drop_count = (last_index - self.prev_log_index) as usize;
        let entries = self.entries[drop_count..].to_vec();
        Self { prev_log_index: last_index, prev_log_term: last_term, entries }
    }
}
