//! Marshals downloader callbacks into registry updates and broadcasts

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::WorkerContext;
use crate::hub::ProgressUpdate;
use crate::jobs::{Job, JobStatus, RegistryError};
use crate::resolver::TransferEvent;

static ANSI_ESCAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").ok());

/// Strip terminal control sequences from downloader output.
pub fn strip_ansi(text: &str) -> String {
    match ANSI_ESCAPE.as_ref() {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Percentage of `downloaded` over `total`; `None` without a usable total.
pub fn percent(downloaded: u64, total: Option<u64>) -> Option<f64> {
    let total = total.filter(|t| *t > 0)?;
    Some((downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
}

/// Per-job progress sink, driven on the worker thread.
pub struct ProgressReporter<'a> {
    ctx: &'a WorkerContext,
    job_id: &'a str,
    processing: bool,
    last_progress: f64,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(ctx: &'a WorkerContext, job_id: &'a str) -> Self {
        Self {
            ctx,
            job_id,
            processing: false,
            last_progress: 0.0,
        }
    }

    /// Progress carried by the last accepted update.
    pub fn last_progress(&self) -> f64 {
        self.last_progress
    }

    pub fn on_event(&mut self, event: TransferEvent) {
        match event {
            TransferEvent::Downloading {
                downloaded_bytes,
                total_bytes,
                speed,
                eta,
            } => {
                // Merged formats report a second stream after the first
                // finishes; the job has already moved on.
                if self.processing {
                    return;
                }
                let percent = percent(downloaded_bytes, total_bytes);
                self.update(|job| {
                    if job.status == JobStatus::Pending {
                        job.transition(JobStatus::Downloading)?;
                    }
                    if let Some(percent) = percent {
                        job.record_progress(percent);
                    }
                    job.speed = speed.as_deref().map(strip_ansi).filter(|s| !s.is_empty());
                    job.eta = eta.as_deref().map(strip_ansi).filter(|s| !s.is_empty());
                    Ok(())
                });
            }
            TransferEvent::Finished => self.enter_processing(),
        }
    }

    /// Move the job to `processing` with progress at 100. Idempotent.
    pub fn enter_processing(&mut self) {
        if self.processing {
            return;
        }
        self.processing = true;
        self.update(|job| {
            job.transition(JobStatus::Processing)?;
            job.record_progress(100.0);
            job.speed = None;
            job.eta = None;
            Ok(())
        });
    }

    /// Apply `f` under the entry lock, then broadcast the resulting state.
    fn update(&mut self, f: impl FnOnce(&mut Job) -> Result<(), RegistryError>) {
        let result = self.ctx.jobs.try_mutate(self.job_id, |job| {
            f(job)?;
            Ok(ProgressUpdate::from_job(job))
        });

        match result {
            Ok(update) => {
                debug!(job_id = %self.job_id, status = %update.status, progress = update.progress, "Progress");
                self.last_progress = update.progress;
                self.ctx.hub.broadcast(update);
            }
            Err(e) => warn!(job_id = %self.job_id, error = %e, "Progress update rejected"),
        }
    }
}
