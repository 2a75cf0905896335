//! The dictionary's own small error taxonomy, in the same `thiserror`-based style as
//! `raft_core::error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("failed to decode command payload")]
    Codec(#[from] bincode::Error),
}

pub type DictionaryResult<T> = Result<T, DictionaryError>;
