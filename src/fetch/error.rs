use std::path::PathBuf;
use thiserror::Error;

/// How the pool reacts to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The server says the granule does not exist. Not retried.
    NotFound,
    /// Credentials were refused. Not retried for this target; the run is flagged.
    Unauthorized,
    /// Anything that may succeed on another attempt.
    Transient,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Remote file not found: {url}")]
    NotFound { url: String },

    #[error("Authentication refused for {url} (status {status})")]
    Unauthorized { url: String, status: u16 },

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Download of {url} did not finish within {after:?}")]
    Timeout { url: String, after: std::time::Duration },

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("Could not follow redirect from {url}: {reason}")]
    Redirect { url: String, reason: String },

    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("I/O error writing '{0}'")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Integrity check failed for '{path}': {reason}")]
    Integrity { path: PathBuf, reason: String },

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::NotFound { .. } => FailureKind::NotFound,
            FetchError::Unauthorized { .. } => FailureKind::Unauthorized,
            _ => FailureKind::Transient,
        }
    }

    /// Maps a non-success HTTP status onto the failure taxonomy.
    pub fn from_status(url: &str, status: u16) -> Self {
        match status {
            404 | 410 => FetchError::NotFound {
                url: url.to_string(),
            },
            401 | 403 => FetchError::Unauthorized {
                url: url.to_string(),
                status,
            },
            _ => FetchError::HttpStatus {
                url: url.to_string(),
                status,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_taxonomy() {
        assert_eq!(FetchError::from_status("u", 404).kind(), FailureKind::NotFound);
        assert_eq!(FetchError::from_status("u", 401).kind(), FailureKind::Unauthorized);
        assert_eq!(FetchError::from_status("u", 403).kind(), FailureKind::Unauthorized);
        assert_eq!(FetchError::from_status("u", 503).kind(), FailureKind::Transient);
    }
}
