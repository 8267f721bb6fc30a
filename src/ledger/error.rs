use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to read ledger file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to decode ledger data from '{0}'")]
    Decode(PathBuf, #[source] Box<bincode::error::DecodeError>),

    #[error("Failed to encode ledger data")]
    Encode(#[source] Box<bincode::error::EncodeError>),

    #[error("Failed to write ledger file '{0}'")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Failed to atomically replace ledger file '{0}'")]
    Persist(PathBuf, #[source] tempfile::PersistError),
}
