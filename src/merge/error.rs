use crate::dataset::error::DatasetError;
use crate::ledger::error::LedgerError;
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Day {date} is missing collections: {}", missing.join(", "))]
    PartialCollection { date: NaiveDate, missing: Vec<String> },

    #[error("Merged file '{path}' has {found} time steps, expected {expected}")]
    Verification {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Failed to create temporary file in '{0}'")]
    TempFile(PathBuf, #[source] std::io::Error),

    #[error("Failed to move merged file into place at '{0}'")]
    Persist(PathBuf, #[source] tempfile::PathPersistError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
