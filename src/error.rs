//! Error taxonomy for a retrieval run.
//!
//! Every stage returns its own error type; the binary is the only place that
//! turns them into exit codes.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::afc::AfcError;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures while bringing up the device session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("lockdown handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("service {service} unavailable: {reason}")]
    ServiceUnavailable { service: String, reason: String },

    #[error(
        "crash report mover did not signal completion within {}ms ({received}/{expected} bytes)",
        timeout.as_millis()
    )]
    MoverTimeout {
        expected: usize,
        received: usize,
        timeout: Duration,
    },

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

#[derive(Debug, Error)]
#[error("failed to list '{path}': {source}")]
pub struct ListError {
    pub path: String,
    #[source]
    pub source: AfcError,
}

#[derive(Debug, Error)]
#[error("failed to stat '{name}': {source}")]
pub struct StatError {
    pub name: String,
    #[source]
    pub source: AfcError,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("'{name}' reports no size")]
    MissingSize { name: String },

    #[error("short read on '{name}' at offset {offset}: requested {requested} bytes, got {received}")]
    ShortRead {
        name: String,
        offset: u64,
        requested: usize,
        received: usize,
    },

    #[error("download of '{name}' interrupted")]
    Interrupted { name: String },

    #[error("'{name}' is too large to buffer ({size} bytes)")]
    TooLarge { name: String, size: u64 },

    #[error("refusing to write entry with unsafe name {name:?}")]
    InvalidName { name: String },

    #[error(transparent)]
    Stat(#[from] StatError),

    #[error("remote I/O on '{name}' failed: {source}")]
    Remote {
        name: String,
        #[source]
        source: AfcError,
    },

    #[error("failed to write '{}': {source}", path.display())]
    Local {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
#[error("failed to remove '{name}': {source}")]
pub struct RemoveError {
    pub name: String,
    #[source]
    pub source: AfcError,
}

/// Top-level error for a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    List(#[from] ListError),

    #[error(transparent)]
    Stat(#[from] StatError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Remove(#[from] RemoveError),

    #[error("Path '{}' cannot be accessed: {reason}", path.display())]
    OutputPathInaccessible { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Process exit status for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::OutputPathInaccessible { .. } | Error::Config(_) => 1,
            // 128 + SIGINT
            _ if self.is_interrupted() => 130,
            _ => 2,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Transfer(TransferError::Interrupted { .. }))
    }
}
