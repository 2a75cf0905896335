//! The configuration tracker: cluster membership plus the joint-consensus state machine
//! (`Normal -> Transitional -> Joint -> Normal`) described in §4.1.

use std::collections::BTreeSet;

use crate::configuration::Configuration;
use crate::ids::LogIndex;
use crate::ids::ReplicaId;

/// Where the tracker currently sits in the joint-consensus protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Steady state; a single active set.
    Normal,
    /// A joint-config entry has been appended (and is already governing quorums) but has
    /// not yet committed.
    Transitional,
    /// The joint-config entry has committed; a leader must still append the final
    /// `Simple` entry to complete the change.
    Joint,
}

#[derive(Clone, Debug)]
enum TrackerState {
    Normal {
        active: BTreeSet<ReplicaId>,
        passive: BTreeSet<ReplicaId>,
    },
    Transitional {
        old_active: BTreeSet<ReplicaId>,
        join_index: LogIndex,
        new_active: BTreeSet<ReplicaId>,
        passive: BTreeSet<ReplicaId>,
    },
    Joint {
        old_active: BTreeSet<ReplicaId>,
        new_active: BTreeSet<ReplicaId>,
        passive: BTreeSet<ReplicaId>,
    },
}

/// Tracks this replica's view of cluster membership, including in-flight joint-consensus
/// transitions. Every operation is pure: it takes `&self` and returns a fresh value.
#[derive(Clone, Debug)]
pub struct MembershipTracker {
    id: ReplicaId,
    state: TrackerState,
}

impl MembershipTracker {
    /// Initialize a tracker from a `Simple` or `Joint` configuration (e.g. the one a
    /// snapshot carries, or the one a pristine cluster is bootstrapped with).
    pub fn make(id: ReplicaId, config: Configuration) -> Self {
        let state = match config {
            Configuration::Simple { active, passive } => TrackerState::Normal { active, passive },
            Configuration::Joint { old_active, new_active, passive } => {
                TrackerState::Joint { old_active, new_active, passive }
            }
        };
        Self { id, state }
    }

    pub fn status(&self) -> Status {
        match &self.state {
            TrackerState::Normal { .. } => Status::Normal,
            TrackerState::Transitional { .. } => Status::Transitional,
            TrackerState::Joint { .. } => Status::Joint,
        }
    }

    fn active_sets(&self) -> Vec<&BTreeSet<ReplicaId>> {
        match &self.state {
            TrackerState::Normal { active, .. } => vec![active],
            TrackerState::Transitional { old_active, new_active, .. } => vec![old_active, new_active],
            TrackerState::Joint { old_active, new_active, .. } => vec![old_active, new_active],
        }
    }

    fn passive(&self) -> &BTreeSet<ReplicaId> {
        match &self.state {
            TrackerState::Normal { passive, .. } => passive,
            TrackerState::Transitional { passive, .. } => passive,
            TrackerState::Joint { passive, .. } => passive,
        }
    }

    /// All members (active in any set, plus passive) other than self.
    pub fn peers(&self) -> Vec<ReplicaId> {
        let mut members = self.passive().clone();
        for set in self.active_sets() {
            members.extend(set.iter().cloned());
        }
        members.remove(&self.id);
        members.into_iter().collect()
    }

    /// Membership test including passive members.
    pub fn mem(&self, id: &ReplicaId) -> bool {
        self.passive().contains(id) || self.active_sets().iter().any(|set| set.contains(id))
    }

    /// Membership test restricted to active (voting-eligible) members.
    pub fn mem_active(&self, id: &ReplicaId) -> bool {
        self.active_sets().iter().any(|set| set.contains(id))
    }

    /// `voters` has a quorum iff it holds a strict majority of *every* active set currently
    /// in play (both old and new, during a joint phase).
    pub fn has_quorum(&self, voters: &BTreeSet<ReplicaId>) -> bool {
        self.active_sets()
            .iter()
            .all(|set| set.intersection(voters).count() >= quorum(set.len()))
    }

    /// The `N` such that a quorum of active members has `get(id) >= N`: the
    /// `ceil(len/2+1)`-th largest value in each active set, minimum across sets in a joint
    /// phase.
    pub fn quorum_min(&self, get: impl Fn(&ReplicaId) -> i64) -> i64 {
        self.active_sets()
            .iter()
            .map(|set| nth_largest(set, &get))
            .min()
            .unwrap_or(0)
    }

    /// Begin a membership change. Only valid from `Normal`; returns `None` otherwise (a
    /// caller that first checks [`Status::Normal`] via [`status`](Self::status) never hits
    /// that branch).
    pub fn join(
        &self,
        idx: LogIndex,
        new_active: BTreeSet<ReplicaId>,
        passive: Option<BTreeSet<ReplicaId>>,
    ) -> Option<(Self, Configuration)> {
        match &self.state {
            TrackerState::Normal { active, passive: old_passive } => {
                let passive = passive.unwrap_or_else(|| old_passive.clone());
                let target = Configuration::Joint {
                    old_active: active.clone(),
                    new_active: new_active.clone(),
                    passive: passive.clone(),
                };
                let tracker = Self {
                    id: self.id.clone(),
                    state: TrackerState::Transitional {
                        old_active: active.clone(),
                        join_index: idx,
                        new_active,
                        passive,
                    },
                };
                Some((tracker, target))
            }
            _ => None,
        }
    }

    /// Apply a `Config` log entry at `index` as soon as it is appended, regardless of who
    /// appended it: joint consensus takes effect on append, not commit, and that holds
    /// symmetrically for both phases of a change. A `Joint` payload moves the tracker to
    /// `Transitional`; a `Simple` payload completes the change and moves it straight to
    /// `Normal`, overriding whatever phase the tracker was previously in.
    pub fn observe_append(&self, index: LogIndex, config: &Configuration) -> Self {
        let state = match config {
            Configuration::Simple { active, passive } => {
                TrackerState::Normal { active: active.clone(), passive: passive.clone() }
            }
            Configuration::Joint { old_active, new_active, passive } => TrackerState::Transitional {
                old_active: old_active.clone(),
                join_index: index,
                new_active: new_active.clone(),
                passive: passive.clone(),
            },
        };
        Self { id: self.id.clone(), state }
    }

    /// Revert to `Normal` if the joint entry at or after `at_or_after` is being discarded
    /// (a follower truncating its log lost the joint entry before it committed).
    pub fn drop(&self, at_or_after: LogIndex) -> Self {
        match &self.state {
            TrackerState::Transitional { old_active, join_index, passive, .. } if *join_index >= at_or_after => Self {
                id: self.id.clone(),
                state: TrackerState::Normal {
                    active: old_active.clone(),
                    passive: passive.clone(),
                },
            },
            _ => self.clone(),
        }
    }

    /// Advance `Transitional -> Joint` once the joint entry has committed. Returns the
    /// `(new_active, passive)` pair the leader must now replicate as a final `Simple`
    /// entry, if this call performed that transition.
    pub fn commit(&self, idx: LogIndex) -> (Self, Option<(BTreeSet<ReplicaId>, BTreeSet<ReplicaId>)>) {
        match &self.state {
            TrackerState::Transitional { old_active, join_index, new_active, passive } if *join_index <= idx => {
                let wanted = (new_active.clone(), passive.clone());
                let tracker = Self {
                    id: self.id.clone(),
                    state: TrackerState::Joint {
                        old_active: old_active.clone(),
                        new_active: new_active.clone(),
                        passive: passive.clone(),
                    },
                };
                (tracker, Some(wanted))
            }
            _ => (self.clone(), None),
        }
    }

    /// The most recently *committed* configuration (used for snapshot metadata).
    pub fn last_commit(&self) -> Configuration {
        match &self.state {
            TrackerState::Normal { active, passive } => {
                Configuration::Simple { active: active.clone(), passive: passive.clone() }
            }
            TrackerState::Transitional { old_active, passive, .. } => {
                Configuration::Simple { active: old_active.clone(), passive: passive.clone() }
            }
            TrackerState::Joint { old_active, new_active, passive } => Configuration::Joint {
                old_active: old_active.clone(),
                new_active: new_active.clone(),
                passive: passive.clone(),
            },
        }
    }

    /// The configuration currently governing quorum arithmetic. During `Transitional` this
    /// is already the joint config, even though the entry backing it has not committed —
    /// joint consensus takes effect on append, not on commit.
    pub fn current(&self) -> Configuration {
        match &self.state {
            TrackerState::Normal { active, passive } => {
                Configuration::Simple { active: active.clone(), passive: passive.clone() }
            }
            TrackerState::Transitional { old_active, new_active, passive, .. } => Configuration::Joint {
                old_active: old_active.clone(),
                new_active: new_active.clone(),
                passive: passive.clone(),
            },
            TrackerState::Joint { old_active, new_active, passive } => Configuration::Joint {
                old_active: old_active.clone(),
                new_active: new_active.clone(),
                passive: passive.clone(),
            },
        }
    }

    pub fn current_passive(&self) -> BTreeSet<ReplicaId> {
        self.passive().clone()
    }
}

fn quorum(set_len: usize) -> usize {
    set_len / 2 + 1
}

fn nth_largest(set: &BTreeSet<ReplicaId>, get: &impl Fn(&ReplicaId) -> i64) -> i64 {
    if set.is_empty() {
        return 0;
    }
    let mut values: Vec<i64> = set.iter().map(|id| get(id)).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));
    values[quorum(set.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> BTreeSet<ReplicaId> {
        names.iter().map(|n| ReplicaId::from(*n)).collect()
    }

    #[test]
    fn quorum_min_three_node() {
        let tracker = MembershipTracker::make(
            ReplicaId::from("A"),
            Configuration::simple(ids(&["A", "B", "C"]), []),
        );
        let values = [(ReplicaId::from("A"), 5), (ReplicaId::from("B"), 3), (ReplicaId::from("C"), 1)];
        let get = |id: &ReplicaId| values.iter().find(|(i, _)| i == id).map(|(_, v)| *v).unwrap_or(0);
        assert_eq!(tracker.quorum_min(get), 3);
    }

    #[test]
    fn joint_quorum_requires_both_sets() {
        let old = ids(&["A", "B", "C"]);
        let new = ids(&["A", "B", "C", "D"]);
        let tracker = MembershipTracker::make(
            ReplicaId::from("A"),
            Configuration::Joint { old_active: old, new_active: new, passive: BTreeSet::new() },
        );
        // A majority of the old set alone (A, B) is not a majority of the new set (needs 3 of 4).
        assert!(!tracker.has_quorum(&ids(&["A", "B"])));
        assert!(tracker.has_quorum(&ids(&["A", "B", "C"])));
    }

    #[test]
    fn join_then_commit_then_drop() {
        let tracker = MembershipTracker::make(ReplicaId::from("A"), Configuration::simple(ids(&["A", "B", "C"]), []));
        let (transitional, target) = tracker.join(5, ids(&["A", "B", "C", "D"]), None).unwrap();
        assert_eq!(transitional.status(), Status::Transitional);
        assert!(matches!(target, Configuration::Joint { .. }));

        let (joint, wanted) = transitional.commit(5);
        assert_eq!(joint.status(), Status::Joint);
        assert!(wanted.is_some());

        let reverted = transitional.drop(5);
        assert_eq!(reverted.status(), Status::Normal);
    }
}
