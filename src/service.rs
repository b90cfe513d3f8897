//! Job orchestration
//!
//! [`JobService`] is the operation surface the HTTP layer calls into:
//! metadata lookup, submission, status polling and artifact retrieval. It
//! composes the registry, the hub, the resolver and the worker, and never
//! waits on a running job.

use bon::Builder;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::config::Config;
use crate::hub::{NotificationHub, ProgressUpdate};
use crate::jobs::{Job, JobId, JobRegistry, JobStatus, RegistryError, TransferLease};
use crate::observability::Metrics;
use crate::resolver::{self, Metadata, OutputKind, ResolveError, Resolver, TimeRange};
use crate::transcode::Transcoder;
use crate::worker::{self, JobSpec, WorkerContext};

#[derive(Debug, Error)]
pub enum JobServiceError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {0} has no artifact yet")]
    NotReady(JobId),

    #[error("failed to start worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("resolver task aborted: {0}")]
    Join(String),
}

impl From<RegistryError> for JobServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::JobNotFound(id) => JobServiceError::NotFound(id),
            RegistryError::IllegalTransition { job_id, .. }
            | RegistryError::ArtifactAlreadySet(job_id) => JobServiceError::NotReady(job_id),
        }
    }
}

/// One download submission
#[derive(Debug, Clone, Builder)]
pub struct JobRequest {
    #[builder(into)]
    pub url: String,
    /// Variant selector as offered by `info`
    #[builder(into)]
    pub selector: String,
    /// Requested file name
    #[builder(into)]
    pub title: Option<String>,
    #[builder(default)]
    pub start: u64,
    #[builder(default)]
    pub end: u64,
    #[builder(default)]
    pub gif: bool,
}

/// A finished job's file, pinned against eviction while `lease` lives.
#[derive(Debug)]
pub struct Artifact {
    pub path: PathBuf,
    pub name: String,
    pub lease: TransferLease,
}

pub struct JobService {
    jobs: Arc<JobRegistry>,
    hub: Arc<NotificationHub>,
    resolver: Arc<dyn Resolver>,
    transcoder: Arc<dyn Transcoder>,
    metrics: Arc<Metrics>,
    config: Arc<Config>,
}

impl JobService {
    pub fn new(
        config: Arc<Config>,
        jobs: Arc<JobRegistry>,
        hub: Arc<NotificationHub>,
        resolver: Arc<dyn Resolver>,
        transcoder: Arc<dyn Transcoder>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            jobs,
            hub,
            resolver,
            transcoder,
            metrics,
            config,
        }
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    /// Resolve `url` on the blocking pool.
    pub async fn info(&self, url: &str) -> Result<Metadata, JobServiceError> {
        let backend = Arc::clone(&self.resolver);
        let url = url.to_string();

        tokio::task::spawn_blocking(move || resolver::resolve(backend.as_ref(), &url))
            .await
            .map_err(|e| JobServiceError::Join(e.to_string()))?
            .map_err(JobServiceError::from)
    }

    /// Direct media URL for `url`, resolved on the blocking pool.
    pub async fn stream_url(&self, url: &str) -> Result<String, JobServiceError> {
        let backend = Arc::clone(&self.resolver);
        let url = url.to_string();

        tokio::task::spawn_blocking(move || backend.stream_url(&url))
            .await
            .map_err(|e| JobServiceError::Join(e.to_string()))?
            .map_err(JobServiceError::from)
    }

    /// Register a job and start its worker; returns before any transfer.
    pub fn submit(&self, request: JobRequest) -> Result<JobId, JobServiceError> {
        self.jobs.sweep_expired(self.config.jobs.max_age());

        let title = request
            .title
            .clone()
            .filter(|t| !t.trim().is_empty());
        let job_id = self
            .jobs
            .create(title.clone().unwrap_or_else(|| request.url.clone()));

        self.metrics.job_submitted();
        if let Ok(job) = self.jobs.get(&job_id) {
            self.hub.broadcast(ProgressUpdate::from_job(&job));
        }

        let spec = JobSpec {
            job_id: job_id.clone(),
            url: request.url,
            kind: OutputKind::for_selector(&request.selector, request.gif),
            selector: request.selector,
            title,
            range: TimeRange::new(request.start, request.end),
        };
        info!(job_id = %job_id, url = %spec.url, kind = ?spec.kind, "Job submitted");

        if let Err(e) = worker::spawn(self.worker_context(), spec) {
            error!(job_id = %job_id, error = %e, "Failed to spawn worker thread");
            let failed = self.jobs.try_mutate(&job_id, |job| {
                job.fail(format!("failed to start worker: {e}"))?;
                Ok(ProgressUpdate::from_job(job))
            });
            if let Ok(update) = failed {
                self.metrics.job_failed();
                self.hub.broadcast(update);
            }
            return Err(JobServiceError::Spawn(e));
        }

        Ok(job_id)
    }

    pub fn status(&self, job_id: &str) -> Result<Job, JobServiceError> {
        Ok(self.jobs.get(job_id)?)
    }

    /// The artifact of a finished job. Leaves job and file in place, so it
    /// can be fetched again.
    pub fn fetch_artifact(&self, job_id: &str) -> Result<Artifact, JobServiceError> {
        let (job, lease) = self.jobs.lease(job_id)?;

        match (job.status, job.file_path, job.file_name) {
            (JobStatus::Finished, Some(path), Some(name)) => Ok(Artifact { path, name, lease }),
            _ => Err(JobServiceError::NotReady(job.job_id)),
        }
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            jobs: Arc::clone(&self.jobs),
            hub: Arc::clone(&self.hub),
            resolver: Arc::clone(&self.resolver),
            transcoder: Arc::clone(&self.transcoder),
            metrics: Arc::clone(&self.metrics),
            download_dir: self.config.server.download_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{DownloadError, DownloadRequest, RawInfo, TransferEvent};
    use crate::transcode::ProcessingError;
    use std::path::Path;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Blocks every download until the test releases it.
    struct GatedResolver {
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl Resolver for GatedResolver {
        fn probe(&self, _url: &str) -> Result<RawInfo, ResolveError> {
            Ok(RawInfo {
                title: Some("Probed".to_string()),
                ..RawInfo::default()
            })
        }

        fn download(
            &self,
            request: &DownloadRequest,
            on_progress: &mut dyn FnMut(TransferEvent),
        ) -> Result<PathBuf, DownloadError> {
            on_progress(TransferEvent::Downloading {
                downloaded_bytes: 1,
                total_bytes: Some(2),
                speed: None,
                eta: None,
            });
            let released = self.gate.lock().unwrap().recv_timeout(Duration::from_secs(10));
            if released.is_err() {
                return Err(DownloadError::Failed("gate never opened".to_string()));
            }
            let path = request.output_dir.join(format!("{}_clip.mp4", request.job_id));
            std::fs::write(&path, b"data").map_err(DownloadError::Spawn)?;
            Ok(path)
        }
    }

    struct NoTranscoder;

    impl Transcoder for NoTranscoder {
        fn to_gif(&self, _input: &Path, _output: &Path) -> Result<(), ProcessingError> {
            Ok(())
        }
    }

    fn service(dir: &Path) -> (JobService, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let mut config = Config::default();
        config.server.download_dir = dir.to_path_buf();
        let metrics = Arc::new(Metrics::new());

        let service = JobService::new(
            Arc::new(config),
            Arc::new(JobRegistry::new()),
            Arc::new(NotificationHub::new(metrics.clone())),
            Arc::new(GatedResolver {
                gate: Mutex::new(rx),
            }),
            Arc::new(NoTranscoder),
            metrics,
        );
        (service, tx)
    }

    fn wait_for(service: &JobService, job_id: &str, status: JobStatus) -> Job {
        for _ in 0..200 {
            let job = service.status(job_id).unwrap();
            if job.status == status {
                return job;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("job {job_id} never reached {status}");
    }

    #[test]
    fn test_submit_returns_before_transfer_completes() {
        let dir = tempfile::tempdir().unwrap();
        let (service, gate) = service(dir.path());

        let job_id = service
            .submit(
                JobRequest::builder()
                    .url("https://example.com/v")
                    .selector("22")
                    .build(),
            )
            .unwrap();

        let job = service.status(&job_id).unwrap();
        assert!(matches!(job.status, JobStatus::Pending | JobStatus::Downloading));
        assert!(matches!(
            service.fetch_artifact(&job_id),
            Err(JobServiceError::NotReady(_))
        ));

        gate.send(()).unwrap();
        let job = wait_for(&service, &job_id, JobStatus::Finished);
        assert_eq!(job.file_name.as_deref(), Some("clip.mp4"));
    }

    #[test]
    fn test_fetch_twice_keeps_job() {
        let dir = tempfile::tempdir().unwrap();
        let (service, gate) = service(dir.path());
        gate.send(()).unwrap();

        let job_id = service
            .submit(
                JobRequest::builder()
                    .url("https://example.com/v")
                    .selector("22")
                    .title("Renamed")
                    .build(),
            )
            .unwrap();
        wait_for(&service, &job_id, JobStatus::Finished);

        let first = service.fetch_artifact(&job_id).unwrap();
        let second = service.fetch_artifact(&job_id).unwrap();
        assert_eq!(first.name, "Renamed.mp4");
        assert_eq!(first.path, second.path);
        assert!(second.path.exists());
    }

    #[test]
    fn test_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _gate) = service(dir.path());

        assert!(matches!(service.status("nope"), Err(JobServiceError::NotFound(_))));
        assert!(matches!(
            service.fetch_artifact("nope"),
            Err(JobServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_info_runs_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _gate) = service(dir.path());

        let Metadata::Video(video) = service.info("https://example.com/v").await.unwrap() else {
            panic!("expected video metadata");
        };
        assert_eq!(video.title, "Probed");
        assert_eq!(video.formats.len(), 1);
    }
}
