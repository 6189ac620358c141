//! Error types for the relay pipeline.

use std::io;

use mediarelay_transfer::TransferError;

/// Pipeline phase an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Creating, closing or deleting the staging file.
    TempFile,
    Fetch,
    Seek,
    Push,
    Cancelled,
}

/// Errors produced by a clone invocation.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error("create temp file: {0}")]
    CreateTemp(#[source] io::Error),

    #[error("download: {0}")]
    Download(#[source] TransferError),

    #[error("seek: {0}")]
    Seek(#[source] io::Error),

    #[error("upload: {0}")]
    Upload(#[source] TransferError),

    #[error("cancelled")]
    Cancelled,

    #[error("close temp file: {0}")]
    CloseTemp(#[source] io::Error),

    #[error("remove temp file: {0}")]
    RemoveTemp(#[source] io::Error),

    /// Several failures, first substantive one first. Never nested.
    #[error("{}", join(.0))]
    Multiple(Vec<CloneError>),
}

fn join(errors: &[CloneError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl CloneError {
    /// Appends `other` after `self`, flattening composed errors.
    pub fn combine(self, other: CloneError) -> CloneError {
        let mut errors = self.into_errors();
        errors.extend(other.into_errors());
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            CloneError::Multiple(errors)
        }
    }

    /// Splits a composed error into its parts.
    pub fn into_errors(self) -> Vec<CloneError> {
        match self {
            CloneError::Multiple(errors) => errors,
            other => vec![other],
        }
    }

    /// Returns the individual failures this error is made of.
    pub fn errors(&self) -> &[CloneError] {
        match self {
            CloneError::Multiple(errors) => errors,
            other => std::slice::from_ref(other),
        }
    }

    /// Phase of the first failure.
    pub fn phase(&self) -> Phase {
        match self {
            CloneError::CreateTemp(_) | CloneError::CloseTemp(_) | CloneError::RemoveTemp(_) => {
                Phase::TempFile
            }
            CloneError::Download(_) => Phase::Fetch,
            CloneError::Seek(_) => Phase::Seek,
            CloneError::Upload(_) => Phase::Push,
            CloneError::Cancelled => Phase::Cancelled,
            CloneError::Multiple(errors) => errors.first().map_or(Phase::TempFile, Self::phase),
        }
    }

    /// Returns `true` if the invocation stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.phase() == Phase::Cancelled
    }

    /// Wraps a transfer failure with its phase, keeping cancellation distinct.
    pub(crate) fn from_transfer(err: TransferError, tag: fn(TransferError) -> CloneError) -> Self {
        match err {
            TransferError::Cancelled => CloneError::Cancelled,
            err => tag(err),
        }
    }
}

/// Merges a stage outcome with the outcome of releasing its resources.
///
/// Cleanup failures are appended to a stage failure rather than replacing
/// it, and a successful value is never returned alongside an error.
pub(crate) fn compose<T>(
    result: Result<T, CloneError>,
    cleanup: Result<(), CloneError>,
) -> Result<T, CloneError> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cleanup)) => Err(cleanup),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(cleanup)) => Err(err.combine(cleanup)),
    }
}

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
