/// In-memory job state
///
/// Jobs live only in process memory and are lost on restart. The registry
/// is shared between the request handlers (create, read) and the worker
/// threads (mutate), and is swept opportunistically on every submission.
///
/// ## Usage
///
/// ```rust,ignore
/// use mediafetch::jobs::{JobRegistry, JobStatus};
///
/// let registry = JobRegistry::new();
/// let job_id = registry.create("My clip");
/// registry.try_mutate(&job_id, |job| job.transition(JobStatus::Downloading))?;
/// ```

pub mod error;
pub mod model;
pub mod registry;

pub use error::{RegistryError, Result};
pub use model::{Job, JobId, JobStatus};
pub use registry::{JobRegistry, TransferLease};
