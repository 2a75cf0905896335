//! Log entry payloads.

use serde::Deserialize;
use serde::Serialize;

use crate::configuration::Configuration;
use crate::ids::LogIndex;
use crate::ids::Term;

/// The payload carried by a single log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPayload {
    /// Committed by a new leader at the start of its term, purely to discover its commit
    /// index (§8 of the Raft paper).
    Nop,
    /// An opaque client command. The core never interprets the bytes.
    Op(Vec<u8>),
    /// A cluster membership change.
    Config(Configuration),
}

/// A single entry in the replicated log.
///
/// `term` is the term in which the entry was appended; `index` is assigned at append time
/// and is strictly increasing and contiguous from `prev_log_index + 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: Term,
    pub index: LogIndex,
    pub payload: EntryPayload,
}
