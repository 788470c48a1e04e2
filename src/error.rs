//! Errors raised by the orchestrator and by encoding jobs.

use crate::{backend::BackendKind, job::JobId};
use std::{fmt, path::PathBuf};
use thiserror::Error;

/// An error that occurred while submitting, managing or running an encoding job.
#[derive(Debug, Error)]
pub enum Error {
    /// The submitted frame set has no frame with a visible area.
    #[error("frame set has no frame with a visible area")]
    EmptyJob,

    /// No job with this id is registered.
    #[error("unknown encoding job {0}")]
    UnknownJob(JobId),

    /// The job is still queued or encoding and cannot be dismissed.
    #[error("encoding job {0} is still running and cannot be dismissed")]
    NotDismissable(JobId),

    /// The worker thread for a job could not be spawned.
    #[error("failed to spawn encoding worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The requested backend was not compiled into this build.
    #[error("{0} backend is not available in this build")]
    BackendUnavailable(BackendKind),

    /// A container backend rejected an operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// A frame image could not be decoded or written.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The gif encoder failed.
    #[cfg(feature = "gif")]
    #[error("gif encoding error: {0}")]
    Gif(#[from] gif::EncodingError),

    /// Reading frames or writing the output failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker panicked while encoding.
    #[error("encoding worker panicked: {0}")]
    WorkerPanic(String),

    /// Temporary frame storage could not be removed.
    #[error("failed to remove temporary storage {}: {source}", path.display())]
    Cleanup {
        /// The directory that could not be removed.
        path: PathBuf,
        /// The underlying io error.
        #[source]
        source: std::io::Error,
    },

    /// Settings could not be parsed.
    #[error("invalid encoder settings: {0}")]
    Settings(#[from] serde_json::Error),
}

/// The result type for encoding operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad class of a job fault, as recorded on the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The optimizer, a backend or frame decoding failed.
    Backend,
    /// Writing the output to disk failed.
    Io,
}

/// Diagnostic attached to a job that ended with [`JobStatus::Error`](crate::JobStatus::Error).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFault {
    /// What kind of failure ended the job.
    pub kind: FaultKind,
    /// Human readable description of the failure.
    pub message: String,
}

impl From<&Error> for JobFault {
    fn from(error: &Error) -> Self {
        let kind = match error {
            Error::Io(_) | Error::Cleanup { .. } => FaultKind::Io,
            _ => FaultKind::Backend,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for JobFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
