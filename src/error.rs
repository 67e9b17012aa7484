//! Error types for the reference graph service.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the store, the scan engines, and the service.
///
/// Per-file problems (a path that no longer resolves, a single failed
/// dependency extraction) are recovered locally with a log line and never
/// reach this enum. Everything here aborts the operation that raised it.
#[derive(Debug, Error)]
pub enum Error {
    /// The persistence driver could not be loaded or the store opened.
    /// The service degrades to a disabled state instead of retrying.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The store exists but its tables are missing or have the wrong shape.
    /// Recovered by dropping and recreating the schema, then rescanning.
    #[error("store schema is missing or malformed")]
    MalformedSchema,

    /// A full rescan was cancelled; the in-flight transaction was discarded
    /// and the store still holds its pre-scan contents.
    #[error("rescan cancelled")]
    ScanCancelled,

    /// The dependency provider signalled an unrecoverable failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Errors raised by a [`DependencyProvider`](crate::provider::DependencyProvider).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Extracting one file's dependencies failed. The scan engines skip the
    /// file's edge update and keep going.
    #[error("dependency extraction failed for {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    /// The provider itself is broken; the whole scan or batch aborts.
    #[error("dependency provider failed: {0}")]
    Unrecoverable(String),
}
