//! Owns every encoding job and its worker.

use crate::{
    backend::{BackendFactory, DefaultBackendFactory},
    frame::FrameSet,
    job::{CancellationToken, EncodingJob, JobId, JobStatus},
    settings::EncoderSettings,
    status::{JobEntry, Registry, StatusObserver, StatusReporter},
    worker::{self, JobContext},
    Error, Result,
};
use parking_lot::Mutex;
use std::{fs, path::PathBuf, sync::Arc, thread};
use tracing::{info, warn};

/// Creates, runs, cancels and forgets encoding jobs.
///
/// Each submitted job runs on its own thread; there is no limit on how many
/// jobs encode at once. Status changes are forwarded to the observer given at
/// construction. Dropping the orchestrator cancels running jobs and waits for
/// their workers.
///
/// # Example
/// ```no_run
/// # use capture_encoder::{FrameInfo, FrameSet, JobOrchestrator, NullObserver, Rect};
/// let orchestrator = JobOrchestrator::new(NullObserver)?;
/// let frames = FrameSet::new(vec![
///     FrameInfo::new("capture/000.png", Rect::new(0, 0, 640, 480), 10),
///     FrameInfo::new("capture/001.png", Rect::new(0, 0, 640, 480), 10),
/// ])
/// .with_storage_dir("capture");
/// let id = orchestrator.submit(frames, "recording.gif")?;
/// println!("{:?}", orchestrator.query(id).map(|job| job.status));
/// # Ok::<(), capture_encoder::Error>(())
/// ```
pub struct JobOrchestrator {
    registry: Registry,
    reporter: StatusReporter,
    settings: Mutex<EncoderSettings>,
    factory: Arc<dyn BackendFactory>,
}

impl JobOrchestrator {
    /// Creates an orchestrator using the shipped container backends.
    pub fn new(observer: impl StatusObserver) -> Result<Self> {
        Self::with_backend_factory(observer, DefaultBackendFactory)
    }

    /// Creates an orchestrator that takes its backends from `factory`.
    pub fn with_backend_factory(
        observer: impl StatusObserver,
        factory: impl BackendFactory,
    ) -> Result<Self> {
        let registry = Registry::default();
        let (reporter, _dispatcher) =
            StatusReporter::spawn(registry.clone(), Box::new(observer)).map_err(Error::Spawn)?;

        Ok(Self {
            registry,
            reporter,
            settings: Mutex::new(EncoderSettings::default()),
            factory: Arc::new(factory),
        })
    }

    /// Sets the settings used by [`submit`](Self::submit).
    pub fn with_settings(self, settings: EncoderSettings) -> Self {
        *self.settings.lock() = settings;
        self
    }

    /// The settings used by [`submit`](Self::submit).
    pub fn settings(&self) -> EncoderSettings {
        self.settings.lock().clone()
    }

    /// Replaces the settings for jobs submitted from now on.
    pub fn set_settings(&self, settings: EncoderSettings) {
        *self.settings.lock() = settings;
    }

    /// A reporter for publishing progress of this orchestrator's jobs.
    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    /// Queues `frame_set` for encoding into `output_path` with the current
    /// settings and returns immediately.
    ///
    /// The output is a GIF if the path ends in `.gif`, an AVI otherwise.
    pub fn submit(&self, frame_set: FrameSet, output_path: impl Into<PathBuf>) -> Result<JobId> {
        self.submit_with(frame_set, output_path, self.settings())
    }

    /// Like [`submit`](Self::submit), with explicit settings for this job.
    pub fn submit_with(
        &self,
        frame_set: FrameSet,
        output_path: impl Into<PathBuf>,
        settings: EncoderSettings,
    ) -> Result<JobId> {
        if !frame_set.has_visible_frame() {
            return Err(Error::EmptyJob);
        }

        let id = JobId::new();
        let output_path = output_path.into();
        let token = CancellationToken::new();
        let job = EncodingJob::new(id, frame_set.clone(), output_path.clone());
        let format = job.format;

        let ctx = JobContext {
            id,
            frame_set,
            output_path,
            format,
            settings,
            token: token.clone(),
            reporter: self.reporter.clone(),
            factory: self.factory.clone(),
        };

        // The worker blocks on the registry until the job is registered and
        // its Queued event is out.
        let mut registry = self.registry.lock();
        let handle = thread::Builder::new()
            .name(format!("encode-job-{id}"))
            .spawn(move || worker::run(ctx))
            .map_err(Error::Spawn)?;

        self.reporter.publish(&job);
        registry.push(JobEntry {
            job,
            token,
            worker: Some(handle),
        });
        drop(registry);

        info!(job = %id, ?format, "Queued encoding job");
        Ok(id)
    }

    /// Stops a job.
    ///
    /// An encoding job is asked to stop at its next frame; frames already
    /// written stay in the output. Any other job is removed from the registry.
    pub fn cancel(&self, id: JobId) -> Result<()> {
        let mut registry = self.registry.lock();
        let index = registry
            .iter()
            .position(|entry| entry.job.id == id)
            .ok_or(Error::UnknownJob(id))?;

        if registry[index].job.status == JobStatus::Encoding {
            if registry[index].token.cancel() {
                info!(job = %id, "Cancellation requested");
            }
            return Ok(());
        }

        let entry = registry.remove(index);
        entry.token.cancel();
        info!(job = %id, status = %entry.job.status, "Removed job");
        Ok(())
    }

    /// Removes a finished job.
    pub fn dismiss(&self, id: JobId) -> Result<()> {
        let mut registry = self.registry.lock();
        let index = registry
            .iter()
            .position(|entry| entry.job.id == id)
            .ok_or(Error::UnknownJob(id))?;

        if !registry[index].job.status.is_terminal() {
            return Err(Error::NotDismissable(id));
        }
        registry.remove(index);
        Ok(())
    }

    /// Removes every finished job and returns how many were removed.
    pub fn dismiss_all_terminal(&self) -> usize {
        let mut registry = self.registry.lock();
        let before = registry.len();
        registry.retain(|entry| !entry.job.status.is_terminal());
        before - registry.len()
    }

    /// Snapshot of a job.
    pub fn query(&self, id: JobId) -> Option<EncodingJob> {
        self.registry
            .lock()
            .iter()
            .find(|entry| entry.job.id == id)
            .map(|entry| entry.job.clone())
    }

    /// Snapshots of all jobs in submission order.
    pub fn jobs(&self) -> Vec<EncodingJob> {
        self.registry
            .lock()
            .iter()
            .map(|entry| entry.job.clone())
            .collect()
    }

    /// Returns `true` if no job is queued or encoding.
    pub fn is_idle(&self) -> bool {
        self.registry
            .lock()
            .iter()
            .all(|entry| entry.job.status.is_terminal())
    }

    /// Marks completed jobs whose output disappeared as
    /// [`FileDeletedOrMoved`](JobStatus::FileDeletedOrMoved), and restores
    /// those whose output is back at its path.
    pub fn refresh_outputs(&self) {
        let finished: Vec<_> = self
            .registry
            .lock()
            .iter()
            .filter(|entry| {
                matches!(
                    entry.job.status,
                    JobStatus::Completed | JobStatus::FileDeletedOrMoved
                )
            })
            .map(|entry| (entry.job.id, entry.job.status, entry.job.output_path.clone()))
            .collect();

        for (id, status, path) in finished {
            match (status, fs::metadata(&path)) {
                (JobStatus::Completed, Err(_)) => {
                    self.reporter
                        .transition(id, JobStatus::FileDeletedOrMoved, |_| {});
                }
                (JobStatus::FileDeletedOrMoved, Ok(metadata)) => {
                    self.reporter.transition(id, JobStatus::Completed, |job| {
                        job.output_size_bytes = Some(metadata.len());
                    });
                }
                _ => {}
            }
        }
    }

    /// Cancels every running job and waits for all workers to finish.
    pub fn shutdown(&self) {
        let workers: Vec<_> = self
            .registry
            .lock()
            .iter_mut()
            .filter_map(|entry| {
                if !entry.job.status.is_terminal() {
                    entry.token.cancel();
                }
                entry.worker.take()
            })
            .collect();

        for worker in workers {
            if worker.join().is_err() {
                warn!("Encoding worker panicked during shutdown");
            }
        }
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{BackendKind, ContainerBackend},
        status::NullObserver,
    };

    fn unavailable(kind: BackendKind) -> Result<Box<dyn ContainerBackend>> {
        Err(Error::BackendUnavailable(kind))
    }

    fn push_queued(orchestrator: &JobOrchestrator, output: &str) -> (JobId, CancellationToken) {
        let id = JobId::new();
        let token = CancellationToken::new();
        orchestrator.registry.lock().push(JobEntry {
            job: EncodingJob::new(id, FrameSet::default(), PathBuf::from(output)),
            token: token.clone(),
            worker: None,
        });
        (id, token)
    }

    #[test]
    fn cancel_removes_a_queued_job_and_signals_its_worker() {
        let orchestrator = JobOrchestrator::with_backend_factory(NullObserver, unavailable).unwrap();
        let (first, first_token) = push_queued(&orchestrator, "first.avi");
        let (second, second_token) = push_queued(&orchestrator, "second.gif");

        orchestrator.cancel(first).unwrap();

        assert!(orchestrator.query(first).is_none());
        assert!(first_token.is_cancelled());
        assert_eq!(orchestrator.query(second).unwrap().status, JobStatus::Queued);
        assert!(!second_token.is_cancelled());
        assert!(matches!(orchestrator.cancel(first), Err(Error::UnknownJob(_))));
    }

    #[test]
    fn shutdown_signals_queued_jobs() {
        let orchestrator = JobOrchestrator::with_backend_factory(NullObserver, unavailable).unwrap();
        let (_, token) = push_queued(&orchestrator, "queued.avi");
        orchestrator.shutdown();
        assert!(token.is_cancelled());
    }
}
