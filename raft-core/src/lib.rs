//! A pure, side-effect-free Raft consensus state machine.
//!
//! This crate implements the CORE of a Raft consensus library only: leader election, log
//! replication, commit tracking, snapshot installation, and joint-consensus membership
//! changes. It performs no I/O, no networking, no disk persistence, no timer management,
//! and opens no sockets. Every public operation is a total, pure function `(state, input)
//! -> (state', actions)`: the caller (an outer "driver") owns concurrency, transport,
//! persistence, and timers, and is responsible for executing the returned actions in
//! order — see [`action::Action`] and the module docs on [`engine`] for the contract.
//!
//! ### Layout
//!
//! - [`ids`] — term/index/replica-id primitives.
//! - [`entry`] — log entry payloads (`Nop` / `Op` / `Config`).
//! - [`configuration`] — the `Simple`/`Joint` membership wire type.
//! - [`membership`] — the configuration tracker: joint-consensus state machine, quorum
//!   arithmetic.
//! - [`log`] — the append-oriented log store.
//! - [`state`] — the replica state aggregate.
//! - [`message`] — the wire protocol surface.
//! - [`action`] — the action vocabulary a driver executes.
//! - [`config`] — pure-core tunables (batch sizing).
//! - [`engine`] — the transition functions themselves, split by input family.
//! - [`error`] — the small `CodecError` type for the optional wire-encoding helpers.

pub mod action;
pub mod config;
pub mod configuration;
pub mod engine;
pub mod entry;
pub mod error;
pub mod ids;
pub mod log;
pub mod membership;
pub mod message;
pub mod state;

pub use action::Action;
pub use config::RaftCoreConfig;
pub use configuration::Configuration;
pub use engine::change_config;
pub use engine::step;
pub use engine::ChangeConfigOutcome;
pub use engine::Input;
pub use entry::EntryPayload;
pub use entry::LogEntry;
pub use error::CodecError;
pub use ids::LogId;
pub use ids::LogIndex;
pub use ids::ReplicaId;
pub use ids::Term;
pub use log::LogStore;
pub use membership::MembershipTracker;
pub use membership::Status as MembershipStatus;
pub use message::Message;
pub use state::ReplicaState;
pub use state::Role;
