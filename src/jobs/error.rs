use thiserror::Error;

use super::model::JobStatus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Illegal transition for job {job_id}: {from} -> {to}")]
    IllegalTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Artifact for job {0} is already set")]
    ArtifactAlreadySet(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
