//! [`Dictionary`]: a `BTreeMap`-backed state machine wired to one `raft_core` replica.

use std::collections::BTreeMap;

use raft_core::configuration::Configuration;
use raft_core::engine;
use raft_core::engine::Input;
use raft_core::ids::ReplicaId;
use raft_core::state::ReplicaState;
use raft_core::Action;
use tracing::trace;

use crate::command::Command;

/// One cluster member: a `raft_core` replica plus the key-value map it drives.
///
/// This is the whole of what a driver needs to add on top of the core for a trivial
/// application: decode the `Op` bytes inside `Action::Apply` and mutate local state. A real
/// driver additionally owns a transport for the `Send`/`SendSnapshot` actions, timers for
/// `Reset*`, and durable storage for `current_term`/`voted_for`/the log — all left to the
/// caller here, surfaced as the actions [`Dictionary::step`] does not consume itself.
#[derive(Clone, Debug)]
pub struct Dictionary {
    pub replica: ReplicaState,
    data: BTreeMap<String, String>,
}

impl Dictionary {
    pub fn new(id: ReplicaId, config: Configuration) -> Self {
        Self { replica: ReplicaState::new(id, config), data: BTreeMap::new() }
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.data.get(key)
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data.clone()
    }

    /// Propose a [`Command`] to the cluster via this replica. A convenience wrapper around
    /// `step(Input::ClientCommand(...))` that handles the encoding.
    pub fn propose(&mut self, command: &Command) -> Vec<Action> {
        let encoded = command.encode().expect("Command always encodes");
        self.step(Input::ClientCommand(encoded))
    }

    /// Feed one input to the underlying replica, applying any `Action::Apply` locally and
    /// returning the remaining actions (sends, timer resets, role changes, ...) for the
    /// caller to route — this crate has no transport or timer of its own.
    pub fn step(&mut self, input: Input) -> Vec<Action> {
        let (state, actions) = engine::step(self.replica.clone(), input);
        self.replica = state;
        self.drain_applies(actions)
    }

    fn drain_applies(&mut self, actions: Vec<Action>) -> Vec<Action> {
        let mut remaining = Vec::with_capacity(actions.len());
        for action in actions {
            match action {
                Action::Apply(ops) => {
                    for (index, payload, term) in ops {
                        match Command::decode(&payload) {
                            Ok(command) => {
                                trace!(index, term, ?command, "applying committed command");
                                self.apply(command);
                            }
                            Err(err) => {
                                // An application-level decode failure is not a core error
                                // (§7): the core already guaranteed the bytes were
                                // durably committed. Surfacing this as a panic would be
                                // wrong for a real driver; a demo just logs it.
                                tracing::warn!(index, term, %err, "dropping undecodable committed command");
                            }
                        }
                    }
                }
                other => remaining.push(other),
            }
        }
        remaining
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Put { key, value } => {
                self.data.insert(key, value);
            }
            Command::Delete { key } => {
                self.data.remove(&key);
            }
        }
    }
}
