//! Randomized invariant tests (§8): election safety, leader append-only, log matching,
//! leader completeness, state-machine safety, commit monotonicity, joint-quorum
//! correctness, and wire round-tripping, driven by `proptest` the way the pack's other
//! Raft-adjacent manifests do (see DESIGN.md).
//!
//! Unlike `tests/scenarios.rs`, which hand-drives a handful of concrete walkthroughs, this
//! file generates random input sequences over small clusters (3-5 replicas) and checks that
//! the invariants hold no matter what order elections, heartbeats, and message deliveries
//! happen to interleave in.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;

use maplit::btreeset;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use raft_core::configuration::Configuration;
use raft_core::engine;
use raft_core::engine::Input;
use raft_core::ids::LogIndex;
use raft_core::ids::ReplicaId;
use raft_core::ids::Term;
use raft_core::log::LogStore;
use raft_core::message::AppendEntries;
use raft_core::message::AppendOutcome;
use raft_core::message::AppendResult;
use raft_core::message::Message;
use raft_core::message::Ping;
use raft_core::message::Pong;
use raft_core::message::RequestVote;
use raft_core::message::VoteResult;
use raft_core::state::ReplicaState;
use raft_core::Action;

/// An in-flight message, queued for later delivery so the simulation can interleave
/// several replicas' sends before any of them are consumed.
struct Envelope {
    from: ReplicaId,
    to: ReplicaId,
    message: Message,
}

/// A tiny in-process cluster, grounded on `demo_kv::cluster::Cluster`'s queue-and-route
/// shape but instrumented to record everything the invariants below need to check.
struct Sim {
    replicas: BTreeMap<ReplicaId, ReplicaState>,
    queue: VecDeque<Envelope>,
    leaders_by_term: BTreeMap<Term, BTreeSet<ReplicaId>>,
    applied: BTreeMap<ReplicaId, Vec<(LogIndex, Vec<u8>)>>,
    /// Every log entry any replica has ever observed committed, keyed by index. Used to
    /// check property 4 (leader completeness) against each subsequently-elected leader.
    committed: BTreeMap<LogIndex, raft_core::entry::LogEntry>,
}

impl Sim {
    fn new(ids: &[ReplicaId]) -> Self {
        let active: BTreeSet<ReplicaId> = ids.iter().cloned().collect();
        let replicas = ids
            .iter()
            .map(|id| (id.clone(), ReplicaState::new(id.clone(), Configuration::simple(active.clone(), []))))
            .collect();
        Self {
            replicas,
            queue: VecDeque::new(),
            leaders_by_term: BTreeMap::new(),
            applied: BTreeMap::new(),
            committed: BTreeMap::new(),
        }
    }

    fn ids(&self) -> Vec<ReplicaId> {
        self.replicas.keys().cloned().collect()
    }

    fn leader_of(&self, idx: usize) -> Option<ReplicaId> {
        self.replicas.values().find(|r| r.is_leader()).map(|r| r.id.clone()).or_else(|| {
            let ids = self.ids();
            ids.get(idx % ids.len().max(1)).cloned()
        })
    }

    /// Deliver one input to `target`, recording leadership/apply/commit observations and
    /// queuing any resulting sends.
    fn deliver(&mut self, target: &ReplicaId, input: Input) {
        let before_commit = self.replicas[target].commit_index;
        let before_applied = self.replicas[target].last_applied;
        let was_leader = self.replicas[target].is_leader();
        let log_before_step = was_leader.then(|| self.replicas[target].log.clone());

        let (state, actions) = engine::step(self.replicas[target].clone(), input);
        self.replicas.insert(target.clone(), state);

        let after = &self.replicas[target];
        // Property 6: commit_index and last_applied never decrease.
        assert!(after.commit_index >= before_commit, "commit_index went backwards on {target}");
        assert!(after.last_applied >= before_applied, "last_applied went backwards on {target}");

        // Property 2 (leader append-only): a replica that was already leader going into
        // this step never rewrites or truncates the entries it already held; the log can
        // only grow.
        if let Some(before_log) = log_before_step {
            assert_log_prefix_unchanged(target, &before_log, &after.log);
        }

        // Feed property 4 (leader completeness): record every entry that just became
        // committed on `target`, from its own (now up to date) log.
        if after.commit_index > before_commit {
            for entry in after.log.get_range(before_commit + 1, after.commit_index) {
                self.record_committed(target, entry);
            }
        }

        for action in actions {
            match action {
                Action::BecomeLeader => {
                    let term = self.replicas[target].current_term;
                    let entry = self.leaders_by_term.entry(term).or_default();
                    entry.insert(target.clone());
                    // Property 1: election safety, checked the moment it could be violated.
                    assert_eq!(entry.len(), 1, "two replicas both became leader in term {term}");

                    // Property 4 (leader completeness): every entry committed by anyone, at
                    // any earlier point in the run, must still be present in this brand new
                    // leader's log.
                    let log = &self.replicas[target].log;
                    for (index, committed) in &self.committed {
                        let found = log.get_range(*index, *index);
                        assert_eq!(
                            found.first(),
                            Some(committed),
                            "leader {target} (term {term}) is missing previously committed entry at index {index}"
                        );
                    }
                }
                Action::Send(to, message) => self.queue.push_back(Envelope { from: target.clone(), to, message }),
                Action::Apply(ops) => {
                    let log = self.applied.entry(target.clone()).or_default();
                    for (index, payload, _term) in ops {
                        log.push((index, payload));
                    }
                }
                Action::SendSnapshot { .. } | Action::Stop | Action::ChangedConfig | Action::Redirect { .. } => {}
                Action::BecomeCandidate | Action::BecomeFollower(_) | Action::ResetElectionTimeout | Action::ResetHeartbeat => {}
            }
        }
    }

    /// Record `entry` as committed, checking it against any earlier recording of the same
    /// index: once committed, an entry's `(term, payload)` can never change (the log
    /// matching + leader completeness properties together guarantee this).
    fn record_committed(&mut self, observer: &ReplicaId, entry: raft_core::entry::LogEntry) {
        if let Some(existing) = self.committed.get(&entry.index) {
            assert_eq!(existing, &entry, "{observer} committed a different entry at index {} than was previously observed", entry.index);
        } else {
            self.committed.insert(entry.index, entry);
        }
    }

    fn drain(&mut self, max_steps: usize) {
        let mut steps = 0;
        while let Some(envelope) = self.queue.pop_front() {
            steps += 1;
            if steps > max_steps {
                break;
            }
            if let Some(input) = to_input(envelope.from, envelope.message) {
                self.deliver(&envelope.to, input);
            }
        }
    }

    /// Property 3 (log matching): wherever two logs both define an entry at the same
    /// index with the same term, every earlier entry they both define must match too.
    fn assert_logs_match(&self) {
        let ids = self.ids();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let a = &self.replicas[&ids[i]].log;
                let b = &self.replicas[&ids[j]].log;
                assert_log_pair_matches(&ids[i], a, &ids[j], b);
            }
        }
    }

    /// Property 5 (state-machine safety): any two replicas' applied sequences agree
    /// wherever both have applied the same index.
    fn assert_applied_agree(&self) {
        let ids = self.ids();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let empty = Vec::new();
                let a = self.applied.get(&ids[i]).unwrap_or(&empty);
                let b = self.applied.get(&ids[j]).unwrap_or(&empty);
                let a_map: BTreeMap<_, _> = a.iter().cloned().collect();
                let b_map: BTreeMap<_, _> = b.iter().cloned().collect();
                for (index, payload) in &a_map {
                    if let Some(other_payload) = b_map.get(index) {
                        assert_eq!(payload, other_payload, "replicas {} and {} disagree on applied index {index}", ids[i], ids[j]);
                    }
                }
            }
        }
    }
}

fn assert_log_pair_matches(a_id: &ReplicaId, a: &LogStore, b_id: &ReplicaId, b: &LogStore) {
    let (_, a_last) = a.last_index();
    let (_, b_last) = b.last_index();
    let upper = a_last.min(b_last);
    let lower = a.prev_log_index().max(b.prev_log_index()) + 1;
    if lower > upper {
        return;
    }
    for idx in lower..=upper {
        let (ta, tb) = (a.get_term(idx), b.get_term(idx));
        if let (Some(ta), Some(tb)) = (ta, tb) {
            if ta == tb {
                let ea = a.get_range(idx, idx);
                let eb = b.get_range(idx, idx);
                assert_eq!(ea, eb, "logs of {a_id} and {b_id} diverge at index {idx} despite matching term {ta}");
            }
        }
    }
}

/// Property 2 (leader append-only): every entry `before` already held is still present,
/// unchanged, in `after`. `before` and `after` belong to the same replica, taken
/// immediately before and after a single step in which it was already leader.
fn assert_log_prefix_unchanged(id: &ReplicaId, before: &LogStore, after: &LogStore) {
    let (_, last) = before.last_index();
    let start = before.prev_log_index() + 1;
    if start > last {
        return;
    }
    for idx in start..=last {
        let prior = before.get_range(idx, idx);
        let now = after.get_range(idx, idx);
        assert_eq!(prior, now, "leader {id} mutated its own log entry at index {idx} after it was already leader");
    }
}

fn to_input(from: ReplicaId, message: Message) -> Option<Input> {
    match message {
        Message::RequestVote(rv) => Some(Input::RequestVote(rv)),
        Message::VoteResult(result) => Some(Input::VoteResult { from, result }),
        Message::AppendEntries(ae) => Some(Input::AppendEntries(ae)),
        Message::AppendResult(result) => Some(Input::AppendResult { from, result }),
        Message::Ping(_) | Message::Pong(_) => None,
    }
}

/// One randomly-generated step in a simulation run.
#[derive(Clone, Copy, Debug)]
enum Step {
    ElectionTimeout(usize),
    HeartbeatTimeout(usize),
    DeliverOne,
    ClientCommand(usize, u8),
}

fn step_strategy(n: usize) -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..n).prop_map(Step::ElectionTimeout),
        (0..n).prop_map(Step::HeartbeatTimeout),
        Just(Step::DeliverOne),
        ((0..n), any::<u8>()).prop_map(|(r, b)| Step::ClientCommand(r, b)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Drive a random interleaving of elections, heartbeats, client commands, and message
    /// deliveries over a 3-5 node cluster, then check election safety, log matching,
    /// state-machine safety, and commit monotonicity (properties 1, 3, 5, 6). Leader
    /// append-only (property 2) and leader completeness (property 4) are checked inline,
    /// on every single step, inside `Sim::deliver` itself.
    #[test]
    fn cluster_invariants_hold_under_random_interleaving(
        cluster_size in 3usize..=5,
        steps in prop::collection::vec(step_strategy(5), 10..40),
    ) {
        let ids: Vec<ReplicaId> = (0..cluster_size).map(|i| ReplicaId::from(format!("r{i}"))).collect();
        let mut sim = Sim::new(&ids);

        for step in steps {
            match step {
                Step::ElectionTimeout(pick) => {
                    let id = ids[pick % cluster_size].clone();
                    sim.deliver(&id, Input::ElectionTimeout);
                }
                Step::HeartbeatTimeout(pick) => {
                    let id = sim.leader_of(pick).unwrap_or_else(|| ids[pick % cluster_size].clone());
                    sim.deliver(&id, Input::HeartbeatTimeout);
                }
                Step::DeliverOne => sim.drain(1),
                Step::ClientCommand(pick, byte) => {
                    let id = sim.leader_of(pick).unwrap_or_else(|| ids[pick % cluster_size].clone());
                    sim.deliver(&id, Input::ClientCommand(vec![byte]));
                }
            }
            sim.assert_logs_match();
            sim.assert_applied_agree();
        }

        // Let the cluster settle, then check once more against the fully-drained state.
        sim.drain(500);
        sim.assert_logs_match();
        sim.assert_applied_agree();

        // No term ever had more than one leader across the whole run.
        for (term, leaders) in &sim.leaders_by_term {
            prop_assert!(leaders.len() <= 1, "term {term} had {} leaders", leaders.len());
        }
    }
}

proptest! {
    /// Property 7 (quorum correctness): a joint configuration only reports a quorum when
    /// the candidate voter set clears a strict majority of *both* the old and new active
    /// sets, independent of how those sets happen to overlap.
    #[test]
    fn joint_quorum_requires_majority_of_both_active_sets(
        old_n in 1usize..=7,
        new_n in 1usize..=7,
        mask in any::<u32>(),
    ) {
        let old_active: BTreeSet<ReplicaId> = (0..old_n).map(|i| ReplicaId::from(format!("old{i}"))).collect();
        let new_active: BTreeSet<ReplicaId> = (0..new_n).map(|i| ReplicaId::from(format!("new{i}"))).collect();
        let tracker = raft_core::membership::MembershipTracker::make(
            ReplicaId::from("old0"),
            Configuration::Joint { old_active: old_active.clone(), new_active: new_active.clone(), passive: btreeset![] },
        );

        let mut voters = BTreeSet::new();
        for (i, id) in old_active.iter().chain(new_active.iter()).enumerate() {
            if mask & (1 << (i % 32)) != 0 {
                voters.insert(id.clone());
            }
        }

        let old_votes = old_active.intersection(&voters).count();
        let new_votes = new_active.intersection(&voters).count();
        let expected = old_votes >= old_n / 2 + 1 && new_votes >= new_n / 2 + 1;

        prop_assert_eq!(tracker.has_quorum(&voters), expected);
    }
}

proptest! {
    /// Property 8 (round-trip): encoding then decoding any message yields an equal value.
    #[test]
    fn message_round_trips(
        term in any::<Term>(),
        candidate in "[a-z]{1,8}",
        last_log_index in any::<LogIndex>(),
        last_log_term in any::<Term>(),
        granted in any::<bool>(),
        nonce in any::<u64>(),
        success in any::<bool>(),
        idx in any::<LogIndex>(),
    ) {
        let messages = vec![
            Message::RequestVote(RequestVote {
                term,
                candidate_id: ReplicaId::from(candidate.as_str()),
                last_log_index,
                last_log_term,
            }),
            Message::VoteResult(VoteResult { term, vote_granted: granted }),
            Message::AppendEntries(AppendEntries {
                term,
                leader_id: ReplicaId::from(candidate.as_str()),
                prev_log_index: last_log_index,
                prev_log_term: last_log_term,
                entries: vec![],
                leader_commit: idx,
            }),
            Message::AppendResult(AppendResult {
                term,
                result: if success { AppendOutcome::Success { last_log_index: idx } } else { AppendOutcome::Failure { prev_log_index: idx } },
            }),
            Message::Ping(Ping { term, nonce }),
            Message::Pong(Pong { term, nonce }),
        ];
        for msg in messages {
            let encoded = msg.encode().expect("encode");
            let decoded = Message::decode(&encoded).expect("decode");
            prop_assert_eq!(msg, decoded);
        }
    }
}
