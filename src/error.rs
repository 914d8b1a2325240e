//! Error taxonomy for a backup run
//!
//! Every variant except [`Error::Sync`] aborts the run. Sync errors are caught
//! at the per-repository boundary by the [`SyncEngine`](crate::SyncEngine),
//! reported, and the run continues with the next repository.

use http::StatusCode;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The token was rejected by the "current user" endpoint
    #[error("authentication failed: GitHub returned {status}. Check your token")]
    Auth { status: StatusCode },

    /// A repository listing page returned a non-success status
    #[error("failed to list repositories: {url} returned {status}")]
    Api { url: String, status: StatusCode },

    /// A listing page carried a `Link` header that could not be parsed
    #[error("failed to list repositories: invalid Link header from {url}: {detail}")]
    Pagination { url: String, detail: String },

    /// A name from the API is not safe to use as a path component
    #[error("invalid name '{name}'")]
    Validation { name: String },

    /// A git invocation or per-repository filesystem step failed
    #[error("{operation} failed for {}: {detail}", path.display())]
    Sync {
        operation: &'static str,
        path: PathBuf,
        detail: String,
    },

    /// Configuration could not be resolved
    #[error("configuration error: {0}")]
    Config(String),

    #[error("GitHub request failed: {0}")]
    GitHub(#[from] octocrab::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error must terminate the run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Sync { .. })
    }

    pub(crate) fn sync(operation: &'static str, path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Error::Sync {
            operation,
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }
}
