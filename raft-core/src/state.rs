//! The replica state aggregate (§3): persistent fields that must survive restarts, and
//! volatile fields that are recomputed or reset on restart.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::config::RaftCoreConfig;
use crate::configuration::Configuration;
use crate::ids::LogIndex;
use crate::ids::ReplicaId;
use crate::ids::Term;
use crate::log::LogStore;
use crate::membership::MembershipTracker;

/// The role a replica currently plays in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// The full state of a single replica.
///
/// `current_term`, `voted_for`, `log`, `id`, and `membership` are persistent: a driver
/// must durably record them per the contract in §6 before acknowledging certain RPCs.
/// Everything else is volatile and safe to recompute from a cold start as `Role::Follower`
/// with empty maps.
#[derive(Clone, Debug)]
pub struct ReplicaState {
    // -- persistent --
    pub id: ReplicaId,
    pub current_term: Term,
    pub voted_for: Option<ReplicaId>,
    pub log: LogStore,
    pub membership: MembershipTracker,

    // -- volatile --
    pub role: Role,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
    pub leader_id: Option<ReplicaId>,
    pub next_index: BTreeMap<ReplicaId, LogIndex>,
    pub match_index: BTreeMap<ReplicaId, LogIndex>,
    pub snapshot_transfers: BTreeSet<ReplicaId>,
    pub votes: BTreeSet<ReplicaId>,

    /// Pure-core tunables (batching, etc). Not part of the Raft-visible state; carried
    /// alongside it purely so the engine's batching logic has it in scope.
    pub config: Arc<RaftCoreConfig>,
}

impl ReplicaState {
    /// A pristine replica, freshly bootstrapped into `config`, that has never logged
    /// anything.
    pub fn new(id: ReplicaId, config: Configuration) -> Self {
        Self::with_config(id, config, RaftCoreConfig::default())
    }

    pub fn with_config(id: ReplicaId, config: Configuration, core_config: RaftCoreConfig) -> Self {
        let membership = MembershipTracker::make(id.clone(), config);
        Self {
            id,
            current_term: 0,
            voted_for: None,
            log: LogStore::empty(0, 0),
            membership,
            role: Role::Follower,
            commit_index: 0,
            last_applied: 0,
            leader_id: None,
            next_index: BTreeMap::new(),
            match_index: BTreeMap::new(),
            snapshot_transfers: BTreeSet::new(),
            votes: BTreeSet::new(),
            config: Arc::new(core_config),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn is_candidate(&self) -> bool {
        self.role == Role::Candidate
    }

    pub fn is_follower(&self) -> bool {
        self.role == Role::Follower
    }
}
