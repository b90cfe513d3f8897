//! Download worker
//!
//! Every submitted job runs on its own OS thread. The resolver and the
//! transcoder block for the whole transfer, so they are kept off the async
//! runtime entirely; the thread only talks to the rest of the service
//! through the registry and the hub.

pub mod naming;
pub mod progress;
pub mod runner;

pub use runner::{TaskError, run_job};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::hub::NotificationHub;
use crate::jobs::{JobId, JobRegistry};
use crate::observability::Metrics;
use crate::resolver::{OutputKind, Resolver, TimeRange};
use crate::transcode::Transcoder;

/// Shared handles a worker needs
#[derive(Clone)]
pub struct WorkerContext {
    pub jobs: Arc<JobRegistry>,
    pub hub: Arc<NotificationHub>,
    pub resolver: Arc<dyn Resolver>,
    pub transcoder: Arc<dyn Transcoder>,
    pub metrics: Arc<Metrics>,
    pub download_dir: PathBuf,
}

/// What one worker has to produce
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_id: JobId,
    pub url: String,
    pub selector: String,
    /// Caller-requested file name, applied after the download
    pub title: Option<String>,
    pub kind: OutputKind,
    pub range: TimeRange,
}

/// Run `spec` to completion on a dedicated, named thread.
pub fn spawn(ctx: WorkerContext, spec: JobSpec) -> io::Result<JoinHandle<()>> {
    let short: String = spec.job_id.chars().take(8).collect();

    thread::Builder::new()
        .name(format!("job-{short}"))
        .spawn(move || run_job(&ctx, spec))
}
