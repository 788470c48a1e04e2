//! Encoding jobs, their status and cancellation.

use crate::{
    error::JobFault,
    frame::{FrameSet, Format},
};
use std::{
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use uuid::Uuid;

/// Identifies one encoding job for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Status of an encoding job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Waiting for its worker to start.
    Queued,
    /// Frames are being optimized or written.
    Encoding,
    /// The output was written.
    Completed,
    /// Cancelled; frames written before the cancellation remain in the output.
    Canceled,
    /// The job failed; see [`EncodingJob::fault`].
    Error,
    /// The job completed but its output is no longer at its path.
    FileDeletedOrMoved,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Encoding => "encoding",
            JobStatus::Completed => "completed",
            JobStatus::Canceled => "canceled",
            JobStatus::Error => "error",
            JobStatus::FileDeletedOrMoved => "file_deleted_or_moved",
        }
    }

    /// Returns `true` once the job's worker has finished.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Encoding)
    }

    /// Returns `true` if moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Encoding)
                | (Encoding, Completed)
                | (Encoding, Canceled)
                | (Encoding, Error)
                | (Completed, FileDeletedOrMoved)
                | (FileDeletedOrMoved, Completed)
        )
    }

    /// Default status line shown for the status.
    pub fn default_text(&self) -> &'static str {
        match self {
            JobStatus::Queued => "Starting",
            JobStatus::Encoding => "Encoding",
            JobStatus::Completed => "Completed",
            JobStatus::Canceled => "Canceled",
            JobStatus::Error => "Error",
            JobStatus::FileDeletedOrMoved => "File deleted or moved",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative cancellation flag shared between a job and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Returns `false` if it was already requested.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot of an encoding job.
#[derive(Debug, Clone)]
pub struct EncodingJob {
    /// Job identifier.
    pub id: JobId,
    /// Frames as submitted.
    pub frame_set: FrameSet,
    /// Where the output is written.
    pub output_path: PathBuf,
    /// Output container format.
    pub format: Format,
    /// Current status.
    pub status: JobStatus,
    /// Human readable status line.
    pub status_text: String,
    /// Index of the last frame handed to the backend.
    pub current_frame: usize,
    /// Number of frames in the submitted set.
    pub frame_count: usize,
    /// Output size, set when the job completed.
    pub output_size_bytes: Option<u64>,
    /// Why the job failed, set when the status is [`JobStatus::Error`].
    pub fault: Option<JobFault>,
}

impl EncodingJob {
    pub(crate) fn new(id: JobId, frame_set: FrameSet, output_path: PathBuf) -> Self {
        Self {
            id,
            format: Format::from_path(&output_path),
            frame_count: frame_set.len(),
            frame_set,
            output_path,
            status: JobStatus::Queued,
            status_text: JobStatus::Queued.default_text().to_string(),
            current_frame: 0,
            output_size_bytes: None,
            fault: None,
        }
    }

    /// Progress of the frame loop, 0.0 to 1.0.
    pub fn progress_fraction(&self) -> f64 {
        match self.status {
            JobStatus::Completed | JobStatus::FileDeletedOrMoved => 1.0,
            _ if self.frame_count == 0 => 0.0,
            _ => (self.current_frame + 1).min(self.frame_count) as f64 / self.frame_count as f64,
        }
    }

    /// The job's outcome, `None` while it is still running.
    ///
    /// `Ok` carries the terminal status (with the output size on completion),
    /// `Err` the recorded fault.
    pub fn result(&self) -> Option<Result<(JobStatus, Option<u64>), &JobFault>> {
        match (self.status, &self.fault) {
            (status, _) if !status.is_terminal() => None,
            (JobStatus::Error, Some(fault)) => Some(Err(fault)),
            (status, _) => Some(Ok((status, self.output_size_bytes))),
        }
    }

    /// Moves to `next` if the transition is valid. Returns `false` otherwise.
    pub(crate) fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.status_text = next.default_text().to_string();
        if next != JobStatus::Completed {
            self.output_size_bytes = None;
        }
        true
    }
}
