//! The client command vocabulary this dictionary understands.
//!
//! The core treats every `Op` payload as opaque bytes (§3 of the design doc); this module is
//! where a real driver would define its own application-level protocol and (de)serialize it
//! into those bytes. `Command` is encoded with `bincode`, matching the convenience encoding
//! `raft_core::message` offers for wire messages.

use serde::Deserialize;
use serde::Serialize;

use crate::error::DictionaryResult;

/// A single operation against the dictionary's key-value store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Put { key: String, value: String },
    Delete { key: String },
}

impl Command {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Put { key: key.into(), value: value.into() }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Encode this command as the bytes a client hands to
    /// [`raft_core::engine::client_command`] (via [`raft_core::Input::ClientCommand`]).
    pub fn encode(&self) -> DictionaryResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> DictionaryResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_command_kind() {
        for cmd in [Command::put("a", "1"), Command::delete("a")] {
            let encoded = cmd.encode().unwrap();
            assert_eq!(Command::decode(&encoded).unwrap(), cmd);
        }
    }
}
