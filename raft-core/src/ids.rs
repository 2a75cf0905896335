//! Identifier and index primitives shared across the core.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// A Raft term: a logical epoch, strictly increasing across elections.
pub type Term = u64;

/// A 1-based log position. Index `0` is the sentinel "before the log".
pub type LogIndex = u64;

/// A replica identifier, globally unique within a cluster.
///
/// Opaque to the core beyond equality and ordering: drivers are free to use node names,
/// UUIDs, or socket addresses rendered as strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub String);

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ReplicaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ReplicaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A `(term, index)` pair, ordered lexicographically by term then index.
///
/// Comparing two `LogId`s this way is exactly the "at least as up-to-date" test the Raft
/// paper uses to decide `RequestVote` grants (§5.4.1).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogId {
    pub term: Term,
    pub index: LogIndex,
}

impl LogId {
    pub const fn new(term: Term, index: LogIndex) -> Self {
        Self { term, index }
    }
}
