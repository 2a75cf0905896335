//! The transition dispatcher (§4.3): pure `(state, input) -> (state', actions)` functions,
//! split by input family the way the teacher splits its per-RPC handlers into sibling
//! files.

pub mod election;
pub mod membership;
pub mod replication;
pub mod snapshot;

use tracing::trace;

use crate::action::Action;
use crate::configuration::Configuration;
use crate::entry::EntryPayload;
use crate::ids::LogIndex;
use crate::ids::ReplicaId;
use crate::ids::Term;
use crate::message::AppendEntries;
use crate::message::Message;
use crate::state::ReplicaState;
use crate::state::Role;

pub use membership::change_config;
pub use membership::ChangeConfigOutcome;

/// Every input the engine accepts, covering peer messages, timers, client commands, and
/// snapshot events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    RequestVote(crate::message::RequestVote),
    VoteResult { from: ReplicaId, result: crate::message::VoteResult },
    AppendEntries(AppendEntries),
    AppendResult { from: ReplicaId, result: crate::message::AppendResult },
    ElectionTimeout,
    HeartbeatTimeout,
    ClientCommand(Vec<u8>),
    InstallSnapshot { last_term: Term, last_index: LogIndex, config: Configuration },
    SnapshotSent { peer: ReplicaId, last_index: LogIndex },
    SnapshotSendFailed { peer: ReplicaId },
    CompactLog { last_index: LogIndex },
}

/// The single entry point a driver calls for every input kind except `change_config`,
/// which returns a richer outcome type (see [`membership::change_config`]).
pub fn step(state: ReplicaState, input: Input) -> (ReplicaState, Vec<Action>) {
    match input {
        Input::RequestVote(msg) => election::request_vote(state, msg),
        Input::VoteResult { from, result } => election::vote_result(state, from, result),
        Input::AppendEntries(msg) => replication::append_entries(state, msg),
        Input::AppendResult { from, result } => replication::append_result(state, from, result),
        Input::ElectionTimeout => election::election_timeout(state),
        Input::HeartbeatTimeout => replication::heartbeat_timeout(state),
        Input::ClientCommand(op) => replication::client_command(state, op),
        Input::InstallSnapshot { last_term, last_index, config } => {
            let (state, actions, _installed) = snapshot::install_snapshot(state, last_term, last_index, config);
            (state, actions)
        }
        Input::SnapshotSent { peer, last_index } => snapshot::snapshot_sent(state, peer, last_index),
        Input::SnapshotSendFailed { peer } => snapshot::snapshot_send_failed(state, peer),
        Input::CompactLog { last_index } => snapshot::compact_log(state, last_index),
    }
}

/// Universal preflight step 1 (§4.3): if `term` exceeds `current_term`, update
/// `current_term`, set `voted_for` to `voted_for_override`, and revert to `Follower`.
/// Returns the `Become_follower(None)` action when a bump occurred, so callers can tell
/// whether they still owe one (`Request_vote`'s own grant path does not, if this already
/// fired).
pub(crate) fn observe_term(state: &mut ReplicaState, term: Term, voted_for_override: Option<ReplicaId>) -> Vec<Action> {
    if term > state.current_term {
        trace!(old_term = state.current_term, new_term = term, "observed higher term, reverting to follower");
        state.current_term = term;
        state.voted_for = voted_for_override;
        state.role = Role::Follower;
        state.leader_id = None;
        state.votes.clear();
        vec![Action::BecomeFollower(None)]
    } else {
        Vec::new()
    }
}

/// The outcome of trying to build a replication send to one peer.
pub(crate) enum SendOutcome {
    Entries(Action),
    Snapshot(Action),
    AlreadyTransferring,
}

/// Build the `AppendEntries` (or `Send_snapshot`) action for `peer`, based on its current
/// `next_index`. Does not mutate `state`; callers add `peer` to `snapshot_transfers`
/// themselves on the `Snapshot` outcome.
pub(crate) fn build_send(state: &ReplicaState, peer: &ReplicaId) -> SendOutcome {
    let next = state.next_index.get(peer).copied().unwrap_or(1).max(1);
    let prev_index = next - 1;

    if prev_index < state.log.prev_log_index() {
        if state.snapshot_transfers.contains(peer) {
            return SendOutcome::AlreadyTransferring;
        }
        let config = state.membership.last_commit();
        return SendOutcome::Snapshot(Action::SendSnapshot {
            peer: peer.clone(),
            from_index: state.log.prev_log_index(),
            config,
        });
    }

    let prev_term = state.log.get_term(prev_index).unwrap_or_else(|| state.log.prev_log_term());
    let (_, last) = state.log.last_index();
    let batch_cap = state.config.max_payload_entries.max(1) as u64;
    let to = next.saturating_add(batch_cap - 1).min(last);
    let entries = state.log.get_range(next, to);

    SendOutcome::Entries(Action::Send(
        peer.clone(),
        Message::AppendEntries(AppendEntries {
            term: state.current_term,
            leader_id: state.id.clone(),
            prev_log_index: prev_index,
            prev_log_term: prev_term,
            entries,
            leader_commit: state.commit_index,
        }),
    ))
}

/// Build a send for every peer, recording any that fall back to a snapshot transfer.
pub(crate) fn fanout(state: &mut ReplicaState) -> Vec<Action> {
    let mut actions = Vec::new();
    for peer in state.membership.peers() {
        match build_send(state, &peer) {
            SendOutcome::Entries(action) => actions.push(action),
            SendOutcome::Snapshot(action) => {
                state.snapshot_transfers.insert(peer);
                actions.push(action);
            }
            SendOutcome::AlreadyTransferring => {}
        }
    }
    actions
}

/// The leader-only half of the commit pipeline (§4.4): recompute `commit_index` from
/// `match_index`/`quorum_min`, adopting the result only if it falls within the leader's
/// own current term.
pub(crate) fn update_commit_index_if_leader(state: &mut ReplicaState) {
    if !state.is_leader() {
        return;
    }
    let (_, last_index) = state.log.last_index();
    let self_id = state.id.clone();
    let match_index = state.match_index.clone();
    let get = move |id: &ReplicaId| -> i64 {
        if *id == self_id {
            last_index as i64
        } else {
            match_index.get(id).copied().unwrap_or(0) as i64
        }
    };

    let n = state.membership.quorum_min(get);
    if n <= 0 {
        return;
    }
    let n = n as u64;
    if n <= state.commit_index {
        return;
    }
    if state.log.get_term(n) == Some(state.current_term) {
        state.commit_index = n;
    }
}

/// The shared half of the commit pipeline (§4.4): advance `last_applied` up to
/// `commit_index`, emit `Apply` for newly committed `Op` entries, drive the
/// configuration tracker's own `commit`, and emit `Changed_config`/`Stop` as called for.
///
/// Runs for both leaders and followers: a follower's `commit_index` advances from the
/// leader's `leader_commit` field, but it must still apply entries to its own state
/// machine.
pub(crate) fn try_commit(mut state: ReplicaState) -> (ReplicaState, Vec<Action>) {
    let mut actions = Vec::new();
    if state.commit_index <= state.last_applied {
        return (state, actions);
    }

    let from = state.last_applied;
    let to = state.commit_index;
    state.last_applied = to;

    let newly_committed = state.log.get_range(from + 1, to);
    let mut ops = Vec::new();
    let mut saw_config = false;
    for entry in &newly_committed {
        match &entry.payload {
            EntryPayload::Op(payload) => ops.push((entry.index, payload.clone(), entry.term)),
            EntryPayload::Config(config) => {
                saw_config = true;
                // Joint consensus takes effect on append, not commit (§4.1), and the
                // engine's own append paths already call `observe_append` as entries land.
                // Re-applying it here too is a no-op in the common case; it is the only
                // place that keeps the tracker correct for a replica that is replaying a
                // range of entries it missed (e.g. just caught up via `append_many` in one
                // large batch, or a snapshot-adjacent resync).
                state.membership = state.membership.observe_append(entry.index, config);
            }
            EntryPayload::Nop => {}
        }
    }
    if !ops.is_empty() {
        actions.push(Action::Apply(ops));
    }

    let (membership, wanted) = state.membership.commit(to);
    state.membership = membership;

    // §4.4 point 4 only applies once a configuration *excluding self* has actually
    // committed: everything that has genuinely committed up to and including `to` is
    // already reflected above (the `newly_committed` loop, and the `Transitional ->
    // Joint` step from `commit(to)` just above). Snapshot that here, before the eager
    // trailing-`Simple`-entry append below mutates the tracker again — that append only
    // lands a brand new, as-yet-uncommitted entry, and must not trigger `Stop` on its own.
    let still_a_member = state.membership.mem(&state.id);

    if let Some((new_active, passive)) = wanted {
        if state.is_leader() {
            let config = Configuration::Simple { active: new_active, passive };
            let (log, index) = state.log.append(state.current_term, EntryPayload::Config(config.clone()));
            state.log = log;
            state.membership = state.membership.observe_append(index, &config);
        }
    }

    if saw_config {
        actions.push(Action::ChangedConfig);
    }

    if !still_a_member {
        actions.push(Action::Stop);
    }

    (state, actions)
}
