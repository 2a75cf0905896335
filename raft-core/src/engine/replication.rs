//! Log replication: `AppendEntries`/`AppendResult` handling, heartbeats, and client
//! commands (§4.3, §4.5, §4.6).

use tracing::instrument;
use tracing::trace;

use crate::action::Action;
use crate::engine::build_send;
use crate::engine::observe_term;
use crate::engine::try_commit;
use crate::engine::update_commit_index_if_leader;
use crate::engine::SendOutcome;
use crate::entry::EntryPayload;
use crate::ids::ReplicaId;
use crate::message::AppendEntries;
use crate::message::AppendOutcome;
use crate::message::AppendResult;
use crate::message::Message;
use crate::state::ReplicaState;
use crate::state::Role;

/// `AppendEntries` (§4.3, receiver side).
#[instrument(level = "trace", skip(state, msg), fields(id = %state.id, leader = %msg.leader_id))]
pub fn append_entries(mut state: ReplicaState, msg: AppendEntries) -> (ReplicaState, Vec<Action>) {
    let sender = msg.leader_id.clone();

    let mut actions = observe_term(&mut state, msg.term, Some(sender.clone()));

    if msg.term < state.current_term {
        let (_, last) = state.log.last_index();
        actions.push(failure(&state, sender, last));
        return (state, actions);
    }

    if !state.membership.mem_active(&sender) {
        return (state, actions);
    }

    if state.is_candidate() {
        state.role = Role::Follower;
        state.leader_id = Some(sender.clone());
    } else {
        actions.push(Action::ResetElectionTimeout);
    }

    let mut prev_log_index = msg.prev_log_index;
    let mut prev_log_term = msg.prev_log_term;
    let mut entries = msg.entries;

    // The requested prev position is covered by our own snapshot; try to resync at our
    // snapshot boundary using the term the leader itself reports for it.
    if prev_log_index < state.log.prev_log_index() {
        let boundary = state.log.prev_log_index();
        if let Some(found) = entries.iter().find(|e| e.index == boundary) {
            prev_log_term = found.term;
            prev_log_index = boundary;
            entries.retain(|e| e.index > boundary);
        }
    }

    match state.log.get_term(prev_log_index) {
        None => {
            let (_, last) = state.log.last_index();
            trace!(prev_log_index, "no entry at prev_log_index, asking leader to rewind");
            actions.push(failure(&state, sender, last));
            return (state, actions);
        }
        Some(t) if t != prev_log_term => {
            trace!(prev_log_index, ours = t, theirs = prev_log_term, "term mismatch at prev_log_index");
            actions.push(failure(&state, sender, prev_log_index));
            return (state, actions);
        }
        Some(_) => {}
    }

    // Joint consensus takes effect the moment a `Config` entry is appended, not when it
    // commits (§4.1), so the follower's own tracker must observe any such entry here too —
    // otherwise it would keep rejecting messages from newly-joined peers until the change
    // commits. Snapshot the pre-merge log first so we only replay entries that are
    // genuinely new or that just replaced a conflicting one; an already-stored entry that
    // matches byte-for-byte was already observed the first time it was appended.
    let old_log = state.log.clone();
    let config_candidates: Vec<(crate::ids::LogIndex, crate::configuration::Configuration)> = entries
        .iter()
        .filter_map(|e| match &e.payload {
            EntryPayload::Config(c) => Some((e.index, c.clone())),
            _ => None,
        })
        .collect();

    let (log, conflict) = state.log.append_many(entries);
    state.log = log;
    if let Some(conflict_index) = conflict {
        state.membership = state.membership.drop(conflict_index);
    }
    for (index, config) in config_candidates {
        let freshly_installed = match old_log.get_term(index) {
            None => index > old_log.prev_log_index(),
            Some(old_term) => old_term != state.log.get_term(index).unwrap_or(old_term),
        };
        if freshly_installed {
            state.membership = state.membership.observe_append(index, &config);
        }
    }

    if msg.leader_commit > state.commit_index {
        let (_, last) = state.log.last_index();
        state.commit_index = msg.leader_commit.min(last);
    }
    state.leader_id = Some(sender.clone());

    let (_, last_log_index) = state.log.last_index();
    actions.push(Action::Send(
        sender,
        Message::AppendResult(AppendResult { term: state.current_term, result: AppendOutcome::Success { last_log_index } }),
    ));

    let (state, mut commit_actions) = try_commit(state);
    actions.append(&mut commit_actions);
    (state, actions)
}

fn failure(state: &ReplicaState, to: ReplicaId, prev_log_index: u64) -> Action {
    Action::Send(
        to,
        Message::AppendResult(AppendResult { term: state.current_term, result: AppendOutcome::Failure { prev_log_index } }),
    )
}

/// `AppendResult` (§4.3, leader side).
#[instrument(level = "trace", skip(state, result), fields(id = %state.id, from = %from))]
pub fn append_result(mut state: ReplicaState, from: ReplicaId, result: AppendResult) -> (ReplicaState, Vec<Action>) {
    let mut actions = observe_term(&mut state, result.term, None);

    if result.term < state.current_term || !state.is_leader() {
        return (state, actions);
    }
    if !state.membership.mem_active(&from) {
        return (state, actions);
    }

    match result.result {
        AppendOutcome::Success { last_log_index } => {
            let next = state.next_index.entry(from.clone()).or_insert(1);
            *next = (*next).max(last_log_index + 1);
            let matched = state.match_index.entry(from).or_insert(0);
            *matched = (*matched).max(last_log_index);

            update_commit_index_if_leader(&mut state);
            // A successful response is evidence the peer still acknowledges our
            // leadership; per the leader's use of the election timer to detect
            // isolation (§9), reset it here.
            actions.push(Action::ResetElectionTimeout);

            let (next_state, mut commit_actions) = try_commit(state);
            state = next_state;
            actions.append(&mut commit_actions);
        }
        AppendOutcome::Failure { prev_log_index } => {
            let next = state.next_index.entry(from.clone()).or_insert(1);
            *next = (*next).min(prev_log_index).max(1);

            match build_send(&state, &from) {
                SendOutcome::Entries(action) => actions.push(action),
                SendOutcome::Snapshot(action) => {
                    state.snapshot_transfers.insert(from);
                    actions.push(action);
                }
                SendOutcome::AlreadyTransferring => {}
            }
        }
    }
    (state, actions)
}

/// `heartbeat_timeout` (§4.5): leader only.
#[instrument(level = "trace", skip(state), fields(id = %state.id))]
pub fn heartbeat_timeout(mut state: ReplicaState) -> (ReplicaState, Vec<Action>) {
    let mut actions = vec![Action::ResetHeartbeat];
    if !state.is_leader() {
        return (state, actions);
    }
    actions.extend(crate::engine::fanout(&mut state));
    (state, actions)
}

/// `client_command` (§4.6).
#[instrument(level = "trace", skip(state, op), fields(id = %state.id))]
pub fn client_command(mut state: ReplicaState, op: Vec<u8>) -> (ReplicaState, Vec<Action>) {
    if !state.is_leader() {
        return (state, vec![Action::Redirect { leader: state.leader_id.clone(), op }]);
    }

    let (log, _index) = state.log.append(state.current_term, EntryPayload::Op(op));
    state.log = log;

    let sends = crate::engine::fanout(&mut state);
    let mut actions = Vec::new();
    if !sends.is_empty() {
        actions.push(Action::ResetHeartbeat);
    }
    actions.extend(sends);
    (state, actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Configuration;
    use crate::engine::election::election_timeout;
    use crate::engine::election::vote_result;
    use crate::message::VoteResult;
    use std::collections::BTreeSet;

    fn three_node_cluster() -> ReplicaState {
        let active: BTreeSet<ReplicaId> = ["A", "B", "C"].iter().map(|s| ReplicaId::from(*s)).collect();
        ReplicaState::new(ReplicaId::from("A"), Configuration::simple(active, []))
    }

    #[test]
    fn leader_replicates_client_command_to_peers() {
        let state = three_node_cluster();
        let (state, _) = election_timeout(state);
        let (mut state, _) = vote_result(state, ReplicaId::from("B"), VoteResult { term: 1, vote_granted: true });
        state.leader_id = Some(ReplicaId::from("A"));

        let (state, actions) = client_command(state, b"set x=1".to_vec());
        assert!(state.is_leader());
        assert!(actions.iter().any(|a| matches!(a, Action::ResetHeartbeat)));
        assert!(actions.iter().any(|a| matches!(a, Action::Send(_, Message::AppendEntries(_)))));
    }

    #[test]
    fn follower_redirects_client_command() {
        let mut state = three_node_cluster();
        state.leader_id = Some(ReplicaId::from("B"));
        let (_, actions) = client_command(state, b"op".to_vec());
        match &actions[0] {
            Action::Redirect { leader, .. } => assert_eq!(leader.as_ref().unwrap(), &ReplicaId::from("B")),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn append_entries_truncates_conflicting_suffix() {
        // B has [(1,X,t1), (2,Y,t1), (3,Z,t1)].
        let mut follower = ReplicaState::new(ReplicaId::from("B"), Configuration::simple([ReplicaId::from("A"), ReplicaId::from("B")], []));
        let (log, _) = follower.log.append(1, EntryPayload::Op(b"X".to_vec()));
        let (log, _) = log.append(1, EntryPayload::Op(b"Y".to_vec()));
        let (log, _) = log.append(1, EntryPayload::Op(b"Z".to_vec()));
        follower.log = log;
        follower.current_term = 2;

        let msg = AppendEntries {
            term: 2,
            leader_id: ReplicaId::from("A"),
            prev_log_index: 1,
            prev_log_term: 1,
            entries: vec![crate::entry::LogEntry { term: 2, index: 2, payload: EntryPayload::Op(b"Y-prime".to_vec()) }],
            leader_commit: 0,
        };
        let (state, actions) = append_entries(follower, msg);
        assert_eq!(state.log.last_index(), (2, 2));
        match &actions.last().unwrap() {
            Action::Send(_, Message::AppendResult(r)) => {
                assert_eq!(r.result, AppendOutcome::Success { last_log_index: 2 })
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn stale_term_append_entries_is_rejected_without_mutation() {
        let mut state = three_node_cluster();
        state.current_term = 5;
        let before = state.clone();
        let msg = AppendEntries {
            term: 3,
            leader_id: ReplicaId::from("B"),
            prev_log_index: 0,
            prev_log_term: 0,
            entries: vec![],
            leader_commit: 0,
        };
        let (state, actions) = append_entries(state, msg);
        assert_eq!(state.current_term, before.current_term);
        match &actions[0] {
            Action::Send(_, Message::AppendResult(r)) => {
                assert_eq!(r.term, 5);
                assert!(matches!(r.result, AppendOutcome::Failure { .. }));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn follower_observes_joint_config_entry_before_it_commits() {
        // D is not yet a member of B's tracker; the leader replicates a joint-config
        // entry adding it. B must recognize D as active as soon as the entry is
        // appended, not only once it commits, or D's own RequestVote would be silently
        // ignored in the interim.
        let follower = ReplicaState::new(
            ReplicaId::from("B"),
            Configuration::simple([ReplicaId::from("A"), ReplicaId::from("B"), ReplicaId::from("C")], []),
        );
        assert!(!follower.membership.mem_active(&ReplicaId::from("D")));

        let joint = Configuration::Joint {
            old_active: ["A", "B", "C"].iter().map(|s| ReplicaId::from(*s)).collect(),
            new_active: ["A", "B", "C", "D"].iter().map(|s| ReplicaId::from(*s)).collect(),
            passive: BTreeSet::new(),
        };
        let msg = AppendEntries {
            term: 1,
            leader_id: ReplicaId::from("A"),
            prev_log_index: 0,
            prev_log_term: 0,
            entries: vec![crate::entry::LogEntry { term: 1, index: 1, payload: EntryPayload::Config(joint) }],
            leader_commit: 0,
        };
        let (state, _) = append_entries(follower, msg);
        assert_eq!(state.membership.status(), crate::membership::Status::Transitional);
        assert!(state.membership.mem_active(&ReplicaId::from("D")), "D must count toward quorum immediately on append");
    }
}
