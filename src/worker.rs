//! Execution of one encoding job on its own thread.

use crate::{
    backend::{BackendFactory, OpenParams},
    error::JobFault,
    frame::{FrameSet, Format, MIN_DELAY},
    job::{CancellationToken, JobId, JobStatus},
    optimizer::DeltaFrameOptimizer,
    settings::EncoderSettings,
    status::StatusReporter,
    strategy::EncodingStrategy,
    Error, Result,
};
use std::{
    any::Any,
    fs,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::Arc,
};
use tempdir::TempDir;
use tracing::{debug, error, info, warn};

/// Everything a worker needs to run one job.
pub(crate) struct JobContext {
    pub(crate) id: JobId,
    pub(crate) frame_set: FrameSet,
    pub(crate) output_path: PathBuf,
    pub(crate) format: Format,
    pub(crate) settings: EncoderSettings,
    pub(crate) token: CancellationToken,
    pub(crate) reporter: StatusReporter,
    pub(crate) factory: Arc<dyn BackendFactory>,
}

enum Outcome {
    Finished,
    Canceled,
}

/// Runs a job to its terminal status. Never panics and never returns an error:
/// failures end up on the job record.
pub(crate) fn run(ctx: JobContext) {
    if !ctx.reporter.transition(ctx.id, JobStatus::Encoding, |_| {}) {
        debug!(job = %ctx.id, "Job was removed before it started");
        cleanup(&ctx, None);
        return;
    }
    if ctx.token.is_cancelled() {
        info!(job = %ctx.id, "Encoding canceled before the first frame");
        cleanup(&ctx, None);
        ctx.reporter.transition(ctx.id, JobStatus::Canceled, |_| {});
        return;
    }
    info!(
        job = %ctx.id,
        frames = ctx.frame_set.len(),
        output = %ctx.output_path.display(),
        format = ?ctx.format,
        "Encoding started"
    );

    let mut scratch = None;
    let result = panic::catch_unwind(AssertUnwindSafe(|| encode(&ctx, &mut scratch)))
        .unwrap_or_else(|payload| Err(Error::WorkerPanic(panic_message(&*payload))));

    cleanup(&ctx, scratch);

    match result {
        Ok(Outcome::Finished) if !ctx.token.is_cancelled() => complete(&ctx),
        Ok(_) => {
            info!(job = %ctx.id, "Encoding canceled");
            ctx.reporter.transition(ctx.id, JobStatus::Canceled, |_| {});
        }
        Err(error) => fail(&ctx, error),
    }
}

fn encode(ctx: &JobContext, scratch: &mut Option<TempDir>) -> Result<Outcome> {
    let strategy = EncodingStrategy::select(ctx.format, &ctx.settings);
    debug!(job = %ctx.id, ?strategy, "Selected encoding strategy");

    let frame_set = if strategy.optimizer_enabled {
        let total = ctx.frame_set.len();
        ctx.reporter
            .update(ctx.id, 0, Some("Analyzing unchanged pixels".to_string()));
        let dir = scratch.insert(TempDir::new("capture_encoder")?);
        let optimized = DeltaFrameOptimizer::new(strategy.transparent_color).optimize(
            ctx.frame_set.frames(),
            dir.path(),
            &ctx.token,
            |index| {
                ctx.reporter.update(
                    ctx.id,
                    0,
                    Some(format!("Analyzing unchanged pixels {}/{}", index + 1, total)),
                );
            },
        )?;
        match optimized {
            Some(frames) => ctx.frame_set.replace_frames(frames),
            None => return Ok(Outcome::Canceled),
        }
    } else {
        ctx.frame_set.clone()
    };

    let mut backend = ctx.factory.create(strategy.backend)?;
    strategy.apply(backend.as_mut());

    let (width, height) = frame_set.canvas_size();
    backend.open(&OpenParams {
        destination: ctx.output_path.clone(),
        width,
        height,
        loop_count: strategy.loop_count,
        frame_rate_hint: frame_set
            .first_delay()
            .map(|delay| (100 / u32::from(delay.max(MIN_DELAY))).max(1)),
    })?;

    let positive_delay = backend.requires_positive_delay();
    let mut outcome = Outcome::Finished;
    for (index, frame) in frame_set.frames().iter().enumerate() {
        if ctx.token.is_cancelled() {
            debug!(job = %ctx.id, index, "Cancellation observed, closing partial output");
            outcome = Outcome::Canceled;
            break;
        }
        if !frame.has_area {
            continue;
        }

        let pixels = frame.load_pixels()?;
        backend.append_frame(
            &pixels,
            frame.rect.x,
            frame.rect.y,
            frame.delay_for(positive_delay),
        )?;
        ctx.reporter
            .update(ctx.id, index, Some(format!("Processing frame {index}")));
    }

    backend.close()?;
    Ok(outcome)
}

fn complete(ctx: &JobContext) {
    match fs::metadata(&ctx.output_path) {
        Ok(metadata) => {
            let size = metadata.len();
            info!(job = %ctx.id, bytes = size, "Encoding completed");
            ctx.reporter.transition(ctx.id, JobStatus::Completed, |job| {
                job.output_size_bytes = Some(size);
            });
        }
        Err(err) => fail(ctx, Error::Io(err)),
    }
}

fn fail(ctx: &JobContext, error: Error) {
    error!(job = %ctx.id, %error, "Encoding failed");
    let fault = JobFault::from(&error);
    ctx.reporter.transition(ctx.id, JobStatus::Error, |job| {
        job.fault = Some(fault);
    });
}

/// Removes the optimizer's scratch files and the job's frame storage.
/// Failures are logged only.
fn cleanup(ctx: &JobContext, scratch: Option<TempDir>) {
    if let Some(dir) = scratch {
        let path = dir.path().to_path_buf();
        if let Err(source) = dir.close() {
            let error = Error::Cleanup { path, source };
            warn!(job = %ctx.id, %error, "Cleanup failed");
        }
    }

    if let Some(dir) = ctx.frame_set.storage_dir() {
        if !dir.exists() {
            return;
        }
        match fs::remove_dir_all(dir) {
            Ok(()) => debug!(job = %ctx.id, dir = %dir.display(), "Removed frame storage"),
            Err(source) => {
                let error = Error::Cleanup {
                    path: dir.to_path_buf(),
                    source,
                };
                warn!(job = %ctx.id, %error, "Cleanup failed");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
