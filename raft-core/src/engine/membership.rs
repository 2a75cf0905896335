//! Dynamic cluster membership changes (§4.7): the public `change_config` entry point.
//! The commit-time half of the joint-consensus protocol (advancing `Transitional ->
//! Joint -> Normal`) lives in [`crate::engine::try_commit`], since it is driven by the
//! ordinary commit pipeline rather than a distinct input.

use std::collections::BTreeSet;

use tracing::instrument;

use crate::action::Action;
use crate::configuration::Configuration;
use crate::entry::EntryPayload;
use crate::ids::ReplicaId;
use crate::membership::Status;
use crate::state::ReplicaState;

/// The result of requesting a membership change.
#[derive(Debug)]
pub enum ChangeConfigOutcome {
    /// This replica is not leader; the driver should retry against `leader`, if known.
    Redirect(Option<ReplicaId>),
    /// A membership change is already underway (`Transitional` or `Joint`).
    ChangeInProcess,
    /// The requested membership already matches the last committed configuration.
    AlreadyChanged,
    /// The joint-config entry was appended; the engine has moved into `Transitional`.
    Started { state: ReplicaState, actions: Vec<Action> },
}

/// `change_config` (§4.7). Configuration equality against the already-committed
/// configuration is order-insensitive, since both are compared as sets.
#[instrument(level = "debug", skip(state, new_active, passive), fields(id = %state.id))]
pub fn change_config(
    mut state: ReplicaState,
    new_active: BTreeSet<ReplicaId>,
    passive: Option<BTreeSet<ReplicaId>>,
) -> ChangeConfigOutcome {
    if !state.is_leader() {
        return ChangeConfigOutcome::Redirect(state.leader_id.clone());
    }

    match state.membership.status() {
        Status::Transitional | Status::Joint => return ChangeConfigOutcome::ChangeInProcess,
        Status::Normal => {}
    }

    if matches_committed(&state, &new_active, passive.as_ref()) {
        return ChangeConfigOutcome::AlreadyChanged;
    }

    let (_, last_index) = state.log.last_index();
    let target_index = last_index + 1;
    let (membership, target_config) = match state.membership.join(target_index, new_active, passive) {
        Some(v) => v,
        None => return ChangeConfigOutcome::ChangeInProcess,
    };
    state.membership = membership;

    let (log, _index) = state.log.append(state.current_term, EntryPayload::Config(target_config));
    state.log = log;

    let sends = crate::engine::fanout(&mut state);
    let mut actions = Vec::new();
    if !sends.is_empty() {
        actions.push(Action::ResetHeartbeat);
    }
    actions.extend(sends);

    ChangeConfigOutcome::Started { state, actions }
}

fn matches_committed(state: &ReplicaState, new_active: &BTreeSet<ReplicaId>, passive: Option<&BTreeSet<ReplicaId>>) -> bool {
    match state.membership.last_commit() {
        Configuration::Simple { active, passive: current_passive } => {
            let passive_matches = passive.map(|p| *p == current_passive).unwrap_or(true);
            &active == new_active && passive_matches
        }
        Configuration::Joint { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Configuration;
    use crate::engine::election::election_timeout;
    use crate::engine::election::vote_result;
    use crate::message::VoteResult;

    fn leader_of_three() -> ReplicaState {
        let active: BTreeSet<ReplicaId> = ["A", "B", "C"].iter().map(|s| ReplicaId::from(*s)).collect();
        let state = ReplicaState::new(ReplicaId::from("A"), Configuration::simple(active, []));
        let (state, _) = election_timeout(state);
        let (mut state, _) = vote_result(state, ReplicaId::from("B"), VoteResult { term: 1, vote_granted: true });
        state.leader_id = Some(ReplicaId::from("A"));
        state
    }

    #[test]
    fn starts_a_joint_consensus_change() {
        let state = leader_of_three();
        let new_active: BTreeSet<ReplicaId> = ["A", "B", "C", "D"].iter().map(|s| ReplicaId::from(*s)).collect();
        match change_config(state, new_active, None) {
            ChangeConfigOutcome::Started { state, .. } => {
                assert_eq!(state.membership.status(), Status::Transitional);
            }
            other => panic!("expected Started, got {other:?}"),
        }
    }

    #[test]
    fn rejects_change_already_in_process() {
        let state = leader_of_three();
        let new_active: BTreeSet<ReplicaId> = ["A", "B", "C", "D"].iter().map(|s| ReplicaId::from(*s)).collect();
        let state = match change_config(state, new_active.clone(), None) {
            ChangeConfigOutcome::Started { state, .. } => state,
            _ => panic!("expected Started"),
        };
        match change_config(state, new_active, None) {
            ChangeConfigOutcome::ChangeInProcess => {}
            other => panic!("expected ChangeInProcess, got {other:?}"),
        }
    }

    #[test]
    fn non_leader_is_redirected() {
        let mut state = leader_of_three();
        state.role = crate::state::Role::Follower;
        state.leader_id = Some(ReplicaId::from("B"));
        let new_active: BTreeSet<ReplicaId> = ["A", "B", "C", "D"].iter().map(|s| ReplicaId::from(*s)).collect();
        match change_config(state, new_active, None) {
            ChangeConfigOutcome::Redirect(Some(leader)) => assert_eq!(leader, ReplicaId::from("B")),
            other => panic!("expected Redirect, got {other:?}"),
        }
    }
}
