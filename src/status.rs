//! Publishing job progress to a single observer.
//!
//! Every mutation of a job record happens under the registry lock and emits a
//! [`StatusEvent`] while the lock is held. Events flow through one unbounded
//! channel to one dispatcher thread, so the observer sees each job's events in
//! the order the job produced them.

use crate::job::{CancellationToken, EncodingJob, JobId, JobStatus};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::{debug, warn};

/// A change of a job's status or progress.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    /// The job that changed.
    pub job_id: JobId,
    /// Its status after the change.
    pub status: JobStatus,
    /// Human readable status line.
    pub text: String,
    /// Index of the last frame handed to the backend.
    pub current_frame: usize,
    /// Output size, present when the job completed.
    pub output_size: Option<u64>,
}

impl StatusEvent {
    fn from_job(job: &EncodingJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            text: job.status_text.clone(),
            current_frame: job.current_frame,
            output_size: job.output_size_bytes,
        }
    }
}

/// Receives status changes, typically a presentation layer.
pub trait StatusObserver: Send + 'static {
    /// Called on the dispatcher thread for every change.
    fn on_status_changed(&self, event: &StatusEvent);
}

impl StatusObserver for Sender<StatusEvent> {
    fn on_status_changed(&self, event: &StatusEvent) {
        // The receiving side may have been dropped; status is still kept in the registry.
        let _ = self.send(event.clone());
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl StatusObserver for NullObserver {
    fn on_status_changed(&self, _event: &StatusEvent) {}
}

pub(crate) struct JobEntry {
    pub(crate) job: EncodingJob,
    pub(crate) token: CancellationToken,
    pub(crate) worker: Option<JoinHandle<()>>,
}

pub(crate) type Registry = Arc<Mutex<Vec<JobEntry>>>;

/// Thread-safe writer of job status, shared by the orchestrator and workers.
#[derive(Clone)]
pub struct StatusReporter {
    registry: Registry,
    events: Sender<StatusEvent>,
}

impl StatusReporter {
    /// Starts the dispatcher thread that forwards events to `observer`.
    pub(crate) fn spawn(
        registry: Registry,
        observer: Box<dyn StatusObserver>,
    ) -> std::io::Result<(Self, JoinHandle<()>)> {
        let (events, rx) = unbounded::<StatusEvent>();
        let dispatcher = thread::Builder::new()
            .name("encoder-status".to_string())
            .spawn(move || {
                for event in rx {
                    observer.on_status_changed(&event);
                }
                debug!("Status dispatcher stopped");
            })?;
        Ok((Self { registry, events }, dispatcher))
    }

    /// Records progress of an encoding job. Ignored unless the job is encoding.
    pub fn update(&self, id: JobId, current_frame: usize, status_text: Option<String>) -> bool {
        self.mutate(id, |job| {
            if job.status != JobStatus::Encoding {
                return false;
            }
            job.current_frame = current_frame;
            if let Some(text) = status_text {
                job.status_text = text;
            }
            true
        })
    }

    /// Moves a job to `status`, then lets `finish` adjust the record.
    /// Invalid transitions are ignored.
    pub(crate) fn transition(
        &self,
        id: JobId,
        status: JobStatus,
        finish: impl FnOnce(&mut EncodingJob),
    ) -> bool {
        self.mutate(id, |job| {
            let from = job.status;
            if !job.transition(status) {
                debug!(job = %id, %from, to = %status, "Ignoring invalid status transition");
                return false;
            }
            finish(job);
            true
        })
    }

    /// Publishes the current record of a job, e.g. right after it was registered.
    pub(crate) fn publish(&self, job: &EncodingJob) {
        if self.events.send(StatusEvent::from_job(job)).is_err() {
            warn!(job = %job.id, "Status dispatcher is gone, dropping event");
        }
    }

    fn mutate(&self, id: JobId, change: impl FnOnce(&mut EncodingJob) -> bool) -> bool {
        let mut registry = self.registry.lock();
        let Some(entry) = registry.iter_mut().find(|entry| entry.job.id == id) else {
            return false;
        };
        if !change(&mut entry.job) {
            return false;
        }
        self.publish(&entry.job);
        true
    }
}
