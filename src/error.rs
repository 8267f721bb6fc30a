use crate::config::ConfigError;
use crate::extract::error::ExtractError;
use crate::fetch::error::FetchError;
use crate::ledger::error::LedgerError;
use crate::merge::error::MergeError;
use crate::resolver::error::ResolveError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Merra2Error {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Earthdata credentials are required to download MERRA-2 granules")]
    MissingCredentials,

    #[error("Failed to create data directory '{0}'")]
    DataDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine data directory")]
    DataDirResolution(#[source] std::io::Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
