//! Snapshot installation and compaction (§4.6). The core only ever exchanges
//! `(last_index, last_term, config)` metadata; snapshot body bytes are opaque to it and
//! entirely the driver's concern (§6).

use tracing::instrument;
use tracing::trace;

use crate::action::Action;
use crate::configuration::Configuration;
use crate::engine::build_send;
use crate::engine::SendOutcome;
use crate::ids::LogIndex;
use crate::ids::ReplicaId;
use crate::ids::Term;
use crate::log::LogStore;
use crate::membership::MembershipTracker;
use crate::state::ReplicaState;
use crate::state::Role;

/// `install_snapshot` (§4.6). Valid on followers only; a leader or candidate ignores the
/// call and the returned `bool` is `false`.
#[instrument(level = "debug", skip(state, config), fields(id = %state.id, last_index, last_term))]
pub fn install_snapshot(
    mut state: ReplicaState,
    last_term: Term,
    last_index: LogIndex,
    config: Configuration,
) -> (ReplicaState, Vec<Action>, bool) {
    if state.role != Role::Follower {
        trace!(role = ?state.role, "ignoring install_snapshot, not a follower");
        return (state, Vec::new(), false);
    }

    state.membership = MembershipTracker::make(state.id.clone(), config);

    state.log = if state.log.get_term(last_index) == Some(last_term) {
        state.log.trim_prefix(last_index, last_term)
    } else {
        LogStore::empty(last_index, last_term)
    };

    state.commit_index = last_index;
    state.last_applied = last_index;

    (state, Vec::new(), true)
}

/// `snapshot_sent` (§4.6): the driver finished streaming a snapshot to `peer`.
#[instrument(level = "trace", skip(state), fields(id = %state.id, peer = %peer))]
pub fn snapshot_sent(mut state: ReplicaState, peer: ReplicaId, last_index: LogIndex) -> (ReplicaState, Vec<Action>) {
    if !state.is_leader() {
        return (state, Vec::new());
    }
    state.snapshot_transfers.remove(&peer);
    let next = state.next_index.entry(peer.clone()).or_insert(1);
    *next = (*next).max(last_index + 1);

    let mut actions = Vec::new();
    match build_send(&state, &peer) {
        SendOutcome::Entries(action) => actions.push(action),
        SendOutcome::Snapshot(action) => {
            state.snapshot_transfers.insert(peer);
            actions.push(action);
        }
        SendOutcome::AlreadyTransferring => {}
    }
    (state, actions)
}

/// `snapshot_send_failed` (§4.6): no resend is scheduled here; the next heartbeat retries.
#[instrument(level = "trace", skip(state), fields(id = %state.id, peer = %peer))]
pub fn snapshot_send_failed(mut state: ReplicaState, peer: ReplicaId) -> (ReplicaState, Vec<Action>) {
    if !state.is_leader() {
        return (state, Vec::new());
    }
    state.snapshot_transfers.remove(&peer);
    (state, Vec::new())
}

/// `compact_log` (§4.6): leader only, and only with no in-flight snapshot transfers —
/// otherwise a peer mid-transfer could be streamed a prefix that no longer exists.
#[instrument(level = "trace", skip(state), fields(id = %state.id, last_index))]
pub fn compact_log(mut state: ReplicaState, last_index: LogIndex) -> (ReplicaState, Vec<Action>) {
    if !state.is_leader() || !state.snapshot_transfers.is_empty() {
        return (state, Vec::new());
    }
    if let Some(term) = state.log.get_term(last_index) {
        state.log = state.log.trim_prefix(last_index, term);
    }
    (state, Vec::new())
}
