//! Role transitions driven by the election timer and the `RequestVote`/`VoteResult`
//! message pair (§4.3, §4.5).

use std::collections::BTreeSet;

use tracing::debug;
use tracing::instrument;

use crate::action::Action;
use crate::configuration::Configuration;
use crate::engine::observe_term;
use crate::engine::try_commit;
use crate::engine::update_commit_index_if_leader;
use crate::entry::EntryPayload;
use crate::ids::LogId;
use crate::ids::ReplicaId;
use crate::membership::Status;
use crate::message::Message;
use crate::message::RequestVote;
use crate::message::VoteResult;
use crate::state::ReplicaState;
use crate::state::Role;

/// `election_timeout` (§4.5): valid in any role, including `Leader` — a leader that times
/// out here is stepping down, since it immediately becomes a `Candidate` of a new term.
#[instrument(level = "trace", skip(state), fields(id = %state.id, term = state.current_term))]
pub fn election_timeout(mut state: ReplicaState) -> (ReplicaState, Vec<Action>) {
    state.current_term += 1;
    state.role = Role::Candidate;
    state.voted_for = Some(state.id.clone());
    state.votes = std::iter::once(state.id.clone()).collect();
    state.leader_id = None;

    debug!(new_term = state.current_term, "election timeout, starting campaign");

    let mut actions = vec![Action::BecomeCandidate];
    let (last_term, last_index) = state.log.last_index();
    for peer in state.membership.peers() {
        actions.push(Action::Send(
            peer,
            Message::RequestVote(RequestVote {
                term: state.current_term,
                candidate_id: state.id.clone(),
                last_log_index: last_index,
                last_log_term: last_term,
            }),
        ));
    }

    // A single-replica (or otherwise self-sufficient) cluster already holds a quorum with
    // just its own vote; there is no peer whose `VoteResult` would ever arrive to trigger
    // the usual path in `vote_result`, so check for it here.
    if state.membership.has_quorum(&state.votes) {
        become_leader(&mut state, &mut actions);
        let (next_state, mut commit_actions) = try_commit(state);
        state = next_state;
        actions.append(&mut commit_actions);
    }
    (state, actions)
}

/// `RequestVote` (§4.3, receiver side).
#[instrument(level = "trace", skip(state, msg), fields(id = %state.id, candidate = %msg.candidate_id))]
pub fn request_vote(mut state: ReplicaState, msg: RequestVote) -> (ReplicaState, Vec<Action>) {
    let sender = msg.candidate_id.clone();

    let mut actions = observe_term(&mut state, msg.term, None);
    let term_just_bumped = !actions.is_empty();

    if msg.term < state.current_term {
        actions.push(reply(&state, sender, false));
        return (state, actions);
    }

    if !state.membership.mem_active(&sender) {
        return (state, actions);
    }

    let (our_last_term, our_last_index) = state.log.last_index();
    let our_log_id = LogId::new(our_last_term, our_last_index);
    let candidate_log_id = LogId::new(msg.last_log_term, msg.last_log_index);
    let candidate_up_to_date = candidate_log_id >= our_log_id;
    let can_vote = state.voted_for.is_none() || state.voted_for.as_ref() == Some(&sender);
    let grant = msg.term == state.current_term && can_vote && candidate_up_to_date && state.role == Role::Follower;

    if grant {
        state.voted_for = Some(sender.clone());
        if !term_just_bumped {
            actions.push(Action::BecomeFollower(None));
        }
        actions.push(reply(&state, sender, true));
    } else {
        actions.push(reply(&state, sender, false));
    }
    (state, actions)
}

fn reply(state: &ReplicaState, to: ReplicaId, granted: bool) -> Action {
    Action::Send(to, Message::VoteResult(VoteResult { term: state.current_term, vote_granted: granted }))
}

/// `VoteResult` (§4.3): on gathering a quorum of grants, become leader and kick off
/// replication.
#[instrument(level = "trace", skip(state, result), fields(id = %state.id, from = %from))]
pub fn vote_result(mut state: ReplicaState, from: ReplicaId, result: VoteResult) -> (ReplicaState, Vec<Action>) {
    let mut actions = observe_term(&mut state, result.term, None);

    if result.term < state.current_term || !state.is_candidate() || !result.vote_granted {
        return (state, actions);
    }
    if !state.membership.mem_active(&from) {
        return (state, actions);
    }

    state.votes.insert(from);
    if !state.membership.has_quorum(&state.votes) {
        return (state, actions);
    }

    become_leader(&mut state, &mut actions);
    let (state, mut commit_actions) = try_commit(state);
    actions.append(&mut commit_actions);
    (state, actions)
}

/// Transition to `Leader` and kick off replication. Callers are responsible for running
/// the commit pipeline afterwards (a lone replica's own blank entry can commit the moment
/// it is appended, since a quorum of one needs no peer acknowledgment).
fn become_leader(state: &mut ReplicaState, actions: &mut Vec<Action>) {
    state.role = Role::Leader;
    state.leader_id = Some(state.id.clone());
    state.snapshot_transfers.clear();

    // Per §9's open-question resolution: append the blank entry first, so the initial
    // `next_index` already reflects it (set to the new last index, not +1) and the first
    // send to every peer carries it.
    let blank_payload = blank_entry_payload(state);
    let (log, blank_index) = state.log.append(state.current_term, blank_payload.clone());
    state.log = log;
    if let EntryPayload::Config(config) = &blank_payload {
        // Joint consensus takes effect on append, not commit (§4.1): this mirrors the
        // `observe_append` call every other `Config`-append path makes (replication.rs for
        // followers, engine/mod.rs for the leader's own trailing-`Simple` append).
        state.membership = state.membership.observe_append(blank_index, config);
    }

    let peers = state.membership.peers();
    state.next_index = peers.iter().map(|p| (p.clone(), blank_index)).collect();
    state.match_index = peers.iter().map(|p| (p.clone(), 0)).collect();

    actions.push(Action::BecomeLeader);
    actions.extend(crate::engine::fanout(state));
    update_commit_index_if_leader(state);
}

/// A new leader commits a blank entry to discover its commit index (§8 of the Raft
/// paper). If a membership change is already in flight, the blank entry is the pending
/// target configuration instead of a plain `Nop`, so the change keeps progressing under
/// the new leader:
/// - `Transitional`: the joint entry itself hasn't committed yet under this leader, so
///   re-affirm `current()`'s `Joint` target.
/// - `Joint`: the joint entry already committed (under this leader or a predecessor this
///   one just replaced); per `Status::Joint`'s own contract, the leader must now append
///   the completing `Simple(new_active, passive)` entry, not the already-committed joint
///   config again.
fn blank_entry_payload(state: &ReplicaState) -> EntryPayload {
    match state.membership.status() {
        Status::Normal => EntryPayload::Nop,
        Status::Transitional => EntryPayload::Config(state.membership.current()),
        Status::Joint => match state.membership.current() {
            Configuration::Joint { new_active, passive, .. } => {
                EntryPayload::Config(Configuration::Simple { active: new_active, passive })
            }
            Configuration::Simple { .. } => unreachable!("Status::Joint always carries a Joint current()"),
        },
    }
}
