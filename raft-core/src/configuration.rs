//! Cluster membership configurations, as they appear on the wire and in the log.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::ids::ReplicaId;

/// A cluster membership, either steady-state or mid-transition.
///
/// `active` members vote and may become leader. `passive` members (learners) only receive
/// replication. During a membership change both the old and new active sets are tracked
/// together so quorums can be computed against both (§4.1 of the design doc).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Configuration {
    /// Steady-state membership.
    Simple {
        active: BTreeSet<ReplicaId>,
        passive: BTreeSet<ReplicaId>,
    },
    /// Joint-consensus membership: quorums require majorities in both `old_active` and
    /// `new_active`.
    Joint {
        old_active: BTreeSet<ReplicaId>,
        new_active: BTreeSet<ReplicaId>,
        passive: BTreeSet<ReplicaId>,
    },
}

impl Configuration {
    /// Construct a steady-state configuration.
    pub fn simple(active: impl IntoIterator<Item = ReplicaId>, passive: impl IntoIterator<Item = ReplicaId>) -> Self {
        Self::Simple {
            active: active.into_iter().collect(),
            passive: passive.into_iter().collect(),
        }
    }
}
