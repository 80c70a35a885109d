//! Error taxonomy for a run.
//!
//! Recoverable errors (validation, fetch, single inserts) are caught at their
//! boundary and end up in the [`ErrorLog`](crate::notify::ErrorLog).
//! [`RunError`] is reserved for conditions that abort the whole run.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Item store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported store url: {0}")]
    UnsupportedUrl(String),

    #[error("store connect failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("index provisioning failed: {0}")]
    Index(#[source] sqlx::Error),

    #[error("store query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("insert of {guid} failed: {source}")]
    Insert {
        guid: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("guid {0} already stored")]
    Duplicate(String),
}

/// Run lock token failures.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("couldn't read lockfile {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't create lockfile {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't remove lockfile {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A cargo candidate that is missing a required field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// Cargo retrieval failures, scoped to one source.
#[derive(Debug, Error)]
pub enum SourceFetchError {
    #[error("cargo retrieval from {class} failed: {error:#}")]
    Fetch { class: String, error: anyhow::Error },

    #[error("cargo retrieval from {class} timed out after {:?}", .timeout)]
    Timeout { class: String, timeout: Duration },

    #[error("cargo retrieval from {class} panicked: {message}")]
    Panicked { class: String, message: String },
}

/// Conditions that abort the run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
