use serde::{Deserialize, Serialize};

use crate::jobs::{Job, JobStatus};

/// Message pushed to every connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    Progress(ProgressUpdate),
}

/// Progress of one job, as seen by push subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressUpdate {
    /// Event for the job's current state.
    ///
    /// Transfer figures ride along while downloading, the title on
    /// `pending`/`finished`, the cause on `error`.
    pub fn from_job(job: &Job) -> Self {
        let downloading = job.status == JobStatus::Downloading;
        let titled = matches!(job.status, JobStatus::Pending | JobStatus::Finished);

        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            progress: job.progress,
            speed: job.speed.clone().filter(|_| downloading),
            eta: job.eta.clone().filter(|_| downloading),
            title: Some(job.title.clone()).filter(|_| titled),
            error: job.error.clone(),
        }
    }
}

impl From<ProgressUpdate> for HubEvent {
    fn from(update: ProgressUpdate) -> Self {
        HubEvent::Progress(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let mut job = Job::new("abc".to_string(), "Clip");
        job.transition(JobStatus::Downloading).unwrap();
        job.record_progress(42.5);
        job.speed = Some("1.2MiB/s".to_string());
        job.eta = Some("00:10".to_string());

        let event = HubEvent::from(ProgressUpdate::from_job(&job));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "progress",
                "jobId": "abc",
                "status": "downloading",
                "progress": 42.5,
                "speed": "1.2MiB/s",
                "eta": "00:10",
            })
        );
    }

    #[test]
    fn test_pending_carries_title() {
        let job = Job::new("abc".to_string(), "Clip");
        let update = ProgressUpdate::from_job(&job);

        assert_eq!(update.title.as_deref(), Some("Clip"));
        assert!(update.speed.is_none());
    }

    #[test]
    fn test_error_carries_cause() {
        let mut job = Job::new("abc".to_string(), "Clip");
        job.transition(JobStatus::Downloading).unwrap();
        job.fail("HTTP Error 403").unwrap();

        let value = serde_json::to_value(HubEvent::from(ProgressUpdate::from_job(&job))).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "HTTP Error 403");
        assert!(value.get("title").is_none());
    }
}
