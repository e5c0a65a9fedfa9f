//! Error types for the files crate.

use std::path::PathBuf;

use thiserror::Error;

/// Reasons a request path is refused or cannot be mapped onto the root.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The configured root could not be opened as a directory.
    #[error("invalid server root {path}: {reason}")]
    InvalidRoot {
        /// Root as configured.
        path: PathBuf,
        /// Why it was refused.
        reason: String,
    },

    /// Bad percent escape, non UTF-8 bytes or an embedded NUL.
    #[error("malformed request path: {0}")]
    MalformedPath(String),

    /// A `.` or `..` segment in the decoded request path.
    #[error("path traversal detected: {0}")]
    TraversalAttempt(String),

    /// A segment naming a hidden entry.
    #[error("hidden path rejected: {0}")]
    HiddenPathRejected(String),

    /// The path resolved to somewhere outside the root.
    #[error("path is outside the server root: {0}")]
    OutsideRoot(PathBuf),

    /// Nothing exists at the resolved location.
    #[error("path does not exist: {0}")]
    NotFound(PathBuf),

    /// Stat failed for a reason other than absence.
    #[error("failed to stat {path}: {source}")]
    StatFailed {
        /// Path that was being inspected.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ResolveError {
    /// Whether the error was caused by what the client sent rather than by
    /// the state of the filesystem.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedPath(_)
                | Self::TraversalAttempt(_)
                | Self::HiddenPathRejected(_)
                | Self::OutsideRoot(_)
        )
    }
}

/// Failures while producing a thumbnail.
///
/// Cloneable so that callers waiting on an in-flight generation receive the
/// same outcome as the caller that performed it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThumbnailError {
    /// The cache root could not be created.
    #[error("failed to prepare thumbnail cache at {path}: {reason}")]
    CacheRoot { path: PathBuf, reason: String },

    /// The source could not be read or decoded as an image.
    #[error("failed to decode {path}: {reason}")]
    DecodeError { path: PathBuf, reason: String },

    /// The thumbnail could not be written into the cache.
    #[error("failed to persist thumbnail {path}: {reason}")]
    PersistError { path: PathBuf, reason: String },

    /// The generating caller went away without publishing a result.
    #[error("thumbnail generation for {0} was aborted")]
    GenerationAborted(PathBuf),
}
