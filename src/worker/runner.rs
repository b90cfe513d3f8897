//! Job runner - drives one job from `pending` to a terminal state

use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

use super::naming::{finalize, title_from_name};
use super::progress::ProgressReporter;
use super::{JobSpec, WorkerContext};
use crate::hub::ProgressUpdate;
use crate::jobs::{Job, JobStatus, RegistryError};
use crate::resolver::{DownloadError, DownloadRequest, OutputKind};
use crate::transcode::ProcessingError;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Download(#[from] DownloadError),

    #[error("{0}")]
    Processing(#[from] ProcessingError),

    #[error("failed to rename artifact: {0}")]
    Rename(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TaskError>;

/// Final artifact of a successful job
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub name: String,
}

/// Run one job and record its outcome.
///
/// Never fails: every error ends up in the job's `error` field and in a
/// terminal broadcast, which is always the last one for the job.
pub fn run_job(ctx: &WorkerContext, spec: JobSpec) {
    let started = Instant::now();
    info!(job_id = %spec.job_id, url = %spec.url, selector = %spec.selector, "Job started");

    let mut reporter = ProgressReporter::new(ctx, &spec.job_id);
    let outcome = execute(ctx, &spec, &mut reporter);

    let recorded = match &outcome {
        Ok(artifact) => ctx.jobs.try_mutate(&spec.job_id, |job| {
            job.finish(artifact.path.clone(), artifact.name.clone())?;
            if spec.title.is_none() {
                job.title = title_from_name(&artifact.name);
            }
            Ok(ProgressUpdate::from_job(job))
        }),
        Err(e) => ctx
            .jobs
            .try_mutate(&spec.job_id, |job: &mut Job| {
                job.fail(e.to_string())?;
                Ok(ProgressUpdate::from_job(job))
            }),
    };

    let update = match recorded {
        Ok(update) => update,
        Err(RegistryError::JobNotFound(_)) => {
            warn!(job_id = %spec.job_id, "Job evicted while running, announcing outcome anyway");
            detached_update(&spec, &outcome, reporter.last_progress())
        }
        Err(e) => {
            error!(job_id = %spec.job_id, error = %e, "Failed to record job outcome");
            return;
        }
    };

    match &outcome {
        Ok(artifact) => {
            ctx.metrics.job_finished();
            ctx.hub.broadcast(update);
            info!(
                job_id = %spec.job_id,
                file = %artifact.path.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job finished"
            );
        }
        Err(e) => {
            ctx.metrics.job_failed();
            ctx.hub.broadcast(update);
            warn!(job_id = %spec.job_id, error = %e, "Job failed");
        }
    }
}

/// Terminal event for a job whose registry entry is already gone.
fn detached_update(spec: &JobSpec, outcome: &Result<Artifact>, progress: f64) -> ProgressUpdate {
    let (status, progress, title, error) = match outcome {
        Ok(artifact) => (
            JobStatus::Finished,
            100.0,
            Some(
                spec.title
                    .clone()
                    .unwrap_or_else(|| title_from_name(&artifact.name)),
            ),
            None,
        ),
        Err(e) => (JobStatus::Error, progress, None, Some(e.to_string())),
    };

    ProgressUpdate {
        job_id: spec.job_id.clone(),
        status,
        progress,
        speed: None,
        eta: None,
        title,
        error,
    }
}

/// Download, post-process and name the artifact.
pub fn execute(
    ctx: &WorkerContext,
    spec: &JobSpec,
    reporter: &mut ProgressReporter<'_>,
) -> Result<Artifact> {
    let request = DownloadRequest {
        job_id: spec.job_id.clone(),
        url: spec.url.clone(),
        selector: spec.selector.clone(),
        output_dir: ctx.download_dir.clone(),
        kind: spec.kind,
        range: spec.range,
    };

    let downloaded = ctx
        .resolver
        .download(&request, &mut |event| reporter.on_event(event))?;

    // Some downloads complete without a "finished" hook
    reporter.enter_processing();

    let path = match spec.kind {
        OutputKind::Gif => encode_gif(ctx, &downloaded)?,
        OutputKind::Video | OutputKind::Audio => downloaded,
    };

    let (path, name) =
        finalize(&path, &spec.job_id, spec.title.as_deref()).map_err(TaskError::Rename)?;
    Ok(Artifact { path, name })
}

/// Replace the downloaded video by its GIF rendition.
fn encode_gif(ctx: &WorkerContext, source: &Path) -> Result<PathBuf> {
    let output = source.with_extension("gif");
    ctx.transcoder.to_gif(source, &output)?;

    if let Err(e) = std::fs::remove_file(source) {
        warn!(path = %source.display(), error = %e, "Failed to remove GIF source video");
    }
    Ok(output)
}
