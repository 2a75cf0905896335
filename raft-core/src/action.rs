//! The action vocabulary a driver executes in response to a transition (§4.3, §6).
//!
//! Ordering within a single transition's action list is significant: role-change
//! notifications precede sends, `Apply` precedes `Stop`, and `Reset_*` timer directives
//! precede the sends they pertain to. The engine upholds this; drivers must execute the
//! list in order to preserve it.

use serde::Deserialize;
use serde::Serialize;

use crate::configuration::Configuration;
use crate::ids::LogIndex;
use crate::ids::ReplicaId;
use crate::ids::Term;
use crate::message::Message;

/// A directive returned by the engine for an external driver to carry out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Apply these committed `Op` entries, in index order, to the replicated state
    /// machine. `Nop` and `Config` entries never appear here.
    Apply(Vec<(LogIndex, Vec<u8>, Term)>),
    /// This replica just started a new election.
    BecomeCandidate,
    /// This replica is now a follower, optionally of a known leader.
    BecomeFollower(Option<ReplicaId>),
    /// This replica just became leader.
    BecomeLeader,
    /// A configuration entry just committed.
    ChangedConfig,
    /// Reject a client command because this replica is not leader.
    Redirect { leader: Option<ReplicaId>, op: Vec<u8> },
    /// (Re)start the election timer.
    ResetElectionTimeout,
    /// (Re)start the heartbeat timer.
    ResetHeartbeat,
    /// Send a message to a peer.
    Send(ReplicaId, Message),
    /// Stream a snapshot to a peer starting from `from_index`, under the given
    /// configuration metadata.
    SendSnapshot { peer: ReplicaId, from_index: LogIndex, config: Configuration },
    /// This (former) leader just committed a configuration excluding itself and must
    /// halt after the preceding `Apply`, if any, is delivered upward.
    Stop,
}
