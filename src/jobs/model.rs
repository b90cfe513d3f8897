use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::error::{RegistryError, Result};

pub type JobId = String;

/// Lifecycle of a job.
///
/// `pending -> downloading -> processing -> finished`, with `error`
/// reachable from any non-terminal state. `finished` and `error` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Processing,
    Finished,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Finished => "finished",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Error)
    }

    /// Whether a job in `self` may move to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;

        match (self, next) {
            (Finished | Error, _) => false,
            (_, Error) => true,
            (Pending, Downloading | Processing) => true,
            (Downloading, Processing) => true,
            (Processing, Finished) => true,
            (current, next) => current == next,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one submitted download
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    pub title: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
}

impl Job {
    pub fn new(job_id: JobId, title: impl Into<String>) -> Self {
        Self::created_at(job_id, title, Utc::now())
    }

    pub(crate) fn created_at(
        job_id: JobId,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            progress: 0.0,
            title: title.into(),
            created_at,
            updated_at: created_at,
            file_path: None,
            file_name: None,
            error: None,
            speed: None,
            eta: None,
        }
    }

    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RegistryError::IllegalTransition {
                job_id: self.job_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Record a download percentage, clamped to [0, 100].
    ///
    /// Progress never moves backwards; the stored value is returned.
    pub fn record_progress(&mut self, percent: f64) -> f64 {
        if percent.is_finite() {
            let clamped = percent.clamp(0.0, 100.0);
            if clamped > self.progress {
                self.progress = clamped;
            }
        }
        self.progress
    }

    /// Fix the artifact location and move to `finished`.
    pub fn finish(&mut self, file_path: PathBuf, file_name: String) -> Result<()> {
        if self.file_path.is_some() {
            return Err(RegistryError::ArtifactAlreadySet(self.job_id.clone()));
        }
        self.transition(JobStatus::Finished)?;
        self.progress = 100.0;
        self.file_path = Some(file_path);
        self.file_name = Some(file_name);
        self.speed = None;
        self.eta = None;
        Ok(())
    }

    /// Move to `error` with a human-readable cause.
    pub fn fail(&mut self, detail: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Error)?;
        self.error = Some(detail.into());
        self.speed = None;
        self.eta = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut job = Job::new("job-1".to_string(), "clip");
        assert_eq!(job.status, JobStatus::Pending);

        job.transition(JobStatus::Downloading).unwrap();
        job.transition(JobStatus::Downloading).unwrap();
        job.transition(JobStatus::Processing).unwrap();
        job.finish(PathBuf::from("/tmp/clip.mp4"), "clip.mp4".to_string())
            .unwrap();

        assert_eq!(job.status, JobStatus::Finished);
        assert_eq!(job.progress, 100.0);
        assert_eq!(job.file_name.as_deref(), Some("clip.mp4"));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut finished = Job::new("job-1".to_string(), "a");
        finished.transition(JobStatus::Processing).unwrap();
        finished
            .finish(PathBuf::from("/tmp/a.mp4"), "a.mp4".to_string())
            .unwrap();

        let mut failed = Job::new("job-2".to_string(), "b");
        failed.transition(JobStatus::Downloading).unwrap();
        failed.fail("network unreachable").unwrap();

        for next in [
            JobStatus::Pending,
            JobStatus::Downloading,
            JobStatus::Processing,
            JobStatus::Finished,
            JobStatus::Error,
        ] {
            assert!(finished.transition(next).is_err());
            assert!(failed.transition(next).is_err());
        }
        assert!(failed.fail("again").is_err());
        assert_eq!(failed.error.as_deref(), Some("network unreachable"));
        assert_eq!(finished.status, JobStatus::Finished);
    }

    #[test]
    fn test_finish_requires_processing() {
        let mut job = Job::new("job-1".to_string(), "a");
        job.transition(JobStatus::Downloading).unwrap();

        let err = job
            .finish(PathBuf::from("/tmp/a.mp4"), "a.mp4".to_string())
            .unwrap_err();
        assert!(matches!(err, RegistryError::IllegalTransition { .. }));
        assert!(job.file_path.is_none());
    }

    #[test]
    fn test_no_backwards_transitions() {
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Downloading));
        assert!(!JobStatus::Downloading.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Finished));
    }

    #[test]
    fn test_progress_is_clamped_and_monotonic() {
        let mut job = Job::new("job-1".to_string(), "a");

        assert_eq!(job.record_progress(12.5), 12.5);
        assert_eq!(job.record_progress(10.0), 12.5);
        assert_eq!(job.record_progress(-4.0), 12.5);
        assert_eq!(job.record_progress(f64::NAN), 12.5);
        assert_eq!(job.record_progress(180.0), 100.0);
    }

    #[test]
    fn test_snapshot_serialization() {
        let job = Job::new("job-1".to_string(), "clip");
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["status"], "pending");
        assert_eq!(json["progress"], 0.0);
        assert!(json["created_at"].is_i64());
        assert!(json.get("file_path").is_none());
        assert!(json.get("error").is_none());
    }
}
