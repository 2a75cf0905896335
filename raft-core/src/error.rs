//! The core's error taxonomy.
//!
//! The transition functions themselves are total: stale terms, log mismatches, and
//! "not leader" are all ordinary tagged outcomes, not errors (see §7 of the design doc).
//! The one place this crate raises a real `Result` is the optional wire encoding helpers
//! in [`crate::message`].

use thiserror::Error;

/// Failure decoding or encoding a wire [`crate::message::Message`].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("truncated message frame: expected at least {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("failed to (de)serialize message body")]
    Serde(#[from] bincode::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;
