//! A tiny in-process, single-threaded cluster harness.
//!
//! This is not a transport: there are no sockets, no threads, and no timers. It exists to
//! show the shape of the "persist-before-send" discipline (§5 of the design doc) a real
//! driver must uphold, and to give this crate's own tests a way to drive several
//! [`Dictionary`]s against each other without reaching for an actual network.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use raft_core::engine::Input;
use raft_core::ids::ReplicaId;
use raft_core::message::Message;
use raft_core::Action;
use tracing::trace;

use crate::store::Dictionary;

/// A pending message in flight between two nodes of the harness.
struct Envelope {
    to: ReplicaId,
    from: ReplicaId,
    message: Message,
}

/// A small set of [`Dictionary`] replicas wired together by an in-memory message queue.
pub struct Cluster {
    nodes: BTreeMap<ReplicaId, Dictionary>,
    queue: VecDeque<Envelope>,
}

impl Cluster {
    pub fn new() -> Self {
        Self { nodes: BTreeMap::new(), queue: VecDeque::new() }
    }

    pub fn add_node(&mut self, dict: Dictionary) {
        self.nodes.insert(dict.replica.id.clone(), dict);
    }

    pub fn node(&self, id: &ReplicaId) -> &Dictionary {
        self.nodes.get(id).unwrap_or_else(|| panic!("no such node: {id}"))
    }

    pub fn node_mut(&mut self, id: &ReplicaId) -> &mut Dictionary {
        self.nodes.get_mut(id).unwrap_or_else(|| panic!("no such node: {id}"))
    }

    /// Deliver one input directly to `target`, queuing whatever `Send` actions it produces
    /// for later delivery. Does not itself drain the queue — see [`Cluster::run_until_quiescent`].
    pub fn deliver(&mut self, target: &ReplicaId, input: Input) {
        let actions = self.node_mut(target).step(input);
        self.route(target.clone(), actions);
    }

    /// Propose a client command to `target`, queuing whatever `Send` actions result.
    pub fn propose(&mut self, target: &ReplicaId, command: &crate::command::Command) {
        let actions = self.node_mut(target).propose(command);
        self.route(target.clone(), actions);
    }

    fn route(&mut self, from: ReplicaId, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send(to, message) => self.queue.push_back(Envelope { to, from: from.clone(), message }),
                Action::SendSnapshot { peer, .. } => {
                    // This harness never exercises real snapshot transfer; a production
                    // driver would stream the body out-of-band and call
                    // `Input::SnapshotSent`/`Input::SnapshotSendFailed` on completion.
                    trace!(%peer, "demo harness ignores SendSnapshot (no body transport)");
                }
                other => trace!(?other, "demo harness does not act on this action kind"),
            }
        }
    }

    /// Drain the message queue, delivering each envelope to its recipient, until empty or
    /// `max_steps` deliveries have happened (a safety valve against runaway test loops).
    pub fn run_until_quiescent(&mut self, max_steps: usize) {
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
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a wire [`Message`] plus its sender into the [`Input`] the recipient's engine
/// expects. `Ping`/`Pong` are a driver-level liveness probe the core never consumes.
fn to_input(from: ReplicaId, message: Message) -> Option<Input> {
    match message {
        Message::RequestVote(rv) => Some(Input::RequestVote(rv)),
        Message::VoteResult(result) => Some(Input::VoteResult { from, result }),
        Message::AppendEntries(ae) => Some(Input::AppendEntries(ae)),
        Message::AppendResult(result) => Some(Input::AppendResult { from, result }),
        Message::Ping(_) | Message::Pong(_) => None,
    }
}
