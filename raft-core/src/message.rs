//! The wire protocol surface (§6): the four Raft RPC message kinds the engine exchanges
//! with peers, plus a driver-level liveness probe that the core never looks at.

use serde::Deserialize;
use serde::Serialize;

use crate::entry::LogEntry;
use crate::error::CodecError;
use crate::error::CodecResult;
use crate::ids::LogIndex;
use crate::ids::ReplicaId;
use crate::ids::Term;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVote {
    pub term: Term,
    pub candidate_id: ReplicaId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResult {
    pub term: Term,
    pub vote_granted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntries {
    pub term: Term,
    pub leader_id: ReplicaId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppendOutcome {
    Success { last_log_index: LogIndex },
    Failure { prev_log_index: LogIndex },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendResult {
    pub term: Term,
    pub result: AppendOutcome,
}

/// A driver-level liveness probe. Outside the core's protocol surface: the engine never
/// produces or consumes one, but it shares the wire type so a driver can multiplex it
/// alongside the four RPC kinds on a single connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub term: Term,
    pub nonce: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub term: Term,
    pub nonce: u64,
}

/// Every message kind a replica may send to or receive from a peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    RequestVote(RequestVote),
    VoteResult(VoteResult),
    AppendEntries(AppendEntries),
    AppendResult(AppendResult),
    Ping(Ping),
    Pong(Pong),
}

impl Message {
    /// Length-prefixed `bincode` encoding, offered purely as a convenience for drivers
    /// that don't already have a serializer of choice. The core's own transition
    /// functions never call this.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let body = bincode::serialize(self)?;
        let mut framed = Vec::with_capacity(body.len() + 4);
        framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
        framed.extend_from_slice(&body);
        Ok(framed)
    }

    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() < 4 {
            return Err(CodecError::Truncated { expected: 4, found: bytes.len() });
        }
        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let body = &bytes[4..];
        if body.len() < len {
            return Err(CodecError::Truncated { expected: len, found: body.len() });
        }
        Ok(bincode::deserialize(&body[..len])?)
    }
}
