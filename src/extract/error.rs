use crate::dataset::error::DatasetError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("Variable '{variable}' is missing from '{path}'")]
    MissingVariable { path: PathBuf, variable: String },

    #[error("No source file covers any requested timestamp for {}", variables.join(", "))]
    NoDataExtracted { variables: Vec<String> },

    #[error("Site {site} has a different timestamp series than site 0, a dense matrix needs identical series")]
    InconsistentSeries { site: usize },

    #[error("Expected {expected} timestamp series (one per site), got {found}")]
    SeriesCount { expected: usize, found: usize },

    #[error("No constant asm file (const_2d_asm) found in '{0}'")]
    MissingConstantFile(PathBuf),

    #[error("Failed to list data directory '{0}'")]
    Discover(PathBuf, #[source] std::io::Error),

    #[error("Failed to build data frame")]
    DataFrame(#[from] polars::error::PolarsError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
