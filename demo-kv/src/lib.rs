//! A minimal single-threaded key-value dictionary driven by `raft-core`.
//!
//! This crate is the demonstration external collaborator the core's own docs point to: it
//! has no persistence, no networking, and no concurrency of its own. It exists to show what
//! a driver built on top of [`raft_core`] looks like in miniature — decoding the `Op`
//! payloads the core hands back via [`raft_core::Action::Apply`] and applying them to an
//! in-memory `BTreeMap`. A real driver would also own timers, a transport, and a persistence
//! layer for `current_term`/`voted_for`/the log, none of which belong here or in the core.
//!
//! ### Layout
//!
//! - [`command`] — the `Command` enum this dictionary understands, and its wire encoding.
//! - [`store`] — [`store::Dictionary`], the `BTreeMap`-backed state machine.
//! - [`cluster`] — an in-process, single-threaded multi-replica harness for exercising a
//!   whole cluster without any real transport, used by this crate's own tests and usable as
//!   a worked example for anyone building a real driver.

pub mod cluster;
pub mod command;
pub mod error;
pub mod store;

pub use command::Command;
pub use error::DictionaryError;
pub use store::Dictionary;
