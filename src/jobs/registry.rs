//! Concurrent job registry

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{RegistryError, Result};
use super::model::{Job, JobId};

struct Entry {
    job: Job,
    /// Number of artifact responses currently streaming this job's file
    transfers: Arc<AtomicUsize>,
}

/// Held for as long as an artifact is being sent to a client.
///
/// While any lease is alive the owning job survives `sweep_expired`.
#[derive(Debug)]
pub struct TransferLease {
    counter: Arc<AtomicUsize>,
}

impl Drop for TransferLease {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// In-memory map from job id to job state.
///
/// Entries are sharded, so work on distinct jobs does not contend; every
/// read or write of a single job happens under that entry's shard lock.
#[derive(Default)]
pub struct JobRegistry {
    entries: DashMap<JobId, Entry>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id and insert a `pending` job for it.
    pub fn create(&self, title: impl Into<String>) -> JobId {
        self.insert(Job::new(Uuid::new_v4().to_string(), title))
    }

    pub(crate) fn insert(&self, job: Job) -> JobId {
        let job_id = job.job_id.clone();
        debug!(job_id = %job_id, "Job registered");
        self.entries.insert(
            job_id.clone(),
            Entry {
                job,
                transfers: Arc::new(AtomicUsize::new(0)),
            },
        );
        job_id
    }

    pub fn get(&self, job_id: &str) -> Result<Job> {
        self.entries
            .get(job_id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))
    }

    /// Apply `f` to the job while holding its entry lock.
    pub fn mutate<T>(&self, job_id: &str, f: impl FnOnce(&mut Job) -> T) -> Result<T> {
        let mut entry = self
            .entries
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))?;

        let result = f(&mut entry.job);
        entry.job.updated_at = Utc::now();
        Ok(result)
    }

    /// Like [`mutate`](Self::mutate) for fallible updates.
    pub fn try_mutate<T>(
        &self,
        job_id: &str,
        f: impl FnOnce(&mut Job) -> Result<T>,
    ) -> Result<T> {
        self.mutate(job_id, f)?
    }

    /// Snapshot a job and pin it against eviction until the lease drops.
    pub fn lease(&self, job_id: &str) -> Result<(Job, TransferLease)> {
        let entry = self
            .entries
            .get(job_id)
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))?;

        entry.transfers.fetch_add(1, Ordering::AcqRel);
        let lease = TransferLease {
            counter: Arc::clone(&entry.transfers),
        };
        Ok((entry.job.clone(), lease))
    }

    /// Remove every job created more than `max_age` ago.
    ///
    /// Jobs with an artifact transfer in flight are kept. Returns the
    /// number of evicted jobs.
    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        self.sweep_expired_at(Utc::now(), max_age)
    }

    pub fn sweep_expired_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        let before = self.entries.len();

        self.entries.retain(|job_id, entry| {
            let expired = now.signed_duration_since(entry.job.created_at) > max_age;
            if !expired {
                return true;
            }
            if entry.transfers.load(Ordering::Acquire) > 0 {
                debug!(job_id = %job_id, "Expired job kept, artifact transfer in flight");
                return true;
            }
            false
        });

        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            info!(evicted, "Expired jobs swept");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::JobStatus;
    use std::thread;

    fn aged_job(registry: &JobRegistry, title: &str, age: TimeDelta) -> JobId {
        let created = Utc::now() - age;
        registry.insert(Job::created_at(Uuid::new_v4().to_string(), title, created))
    }

    #[test]
    fn test_create_is_pending_and_visible() {
        let registry = JobRegistry::new();
        let job_id = registry.create("clip");

        let job = registry.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.title, "clip");
        assert_eq!(job.progress, 0.0);
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = JobRegistry::new();
        let a = registry.create("a");
        let b = registry.create("a");
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_get_unknown() {
        let registry = JobRegistry::new();
        assert_eq!(
            registry.get("missing").unwrap_err(),
            RegistryError::JobNotFound("missing".to_string())
        );
        assert!(registry.mutate("missing", |_| ()).is_err());
    }

    #[test]
    fn test_try_mutate_propagates_transition_errors() {
        let registry = JobRegistry::new();
        let job_id = registry.create("clip");

        let err = registry
            .try_mutate(&job_id, |job| job.transition(JobStatus::Finished))
            .unwrap_err();
        assert!(matches!(err, RegistryError::IllegalTransition { .. }));
        assert_eq!(registry.get(&job_id).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let registry = JobRegistry::new();
        let old = aged_job(&registry, "old", TimeDelta::hours(2));
        let fresh = aged_job(&registry, "fresh", TimeDelta::minutes(10));
        let edge = aged_job(&registry, "edge", TimeDelta::minutes(59));

        let evicted = registry.sweep_expired(Duration::from_secs(3600));

        assert_eq!(evicted, 1);
        assert!(registry.get(&old).is_err());
        assert_eq!(registry.get(&fresh).unwrap().title, "fresh");
        assert_eq!(registry.get(&edge).unwrap().title, "edge");
    }

    #[test]
    fn test_sweep_ignores_status() {
        let registry = JobRegistry::new();
        let running = aged_job(&registry, "running", TimeDelta::hours(3));
        registry
            .try_mutate(&running, |job| job.transition(JobStatus::Downloading))
            .unwrap();

        let now = Utc::now();
        assert_eq!(registry.sweep_expired_at(now, Duration::from_secs(3600)), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_skips_leased_jobs() {
        let registry = JobRegistry::new();
        let job_id = aged_job(&registry, "served", TimeDelta::hours(2));

        let (_, lease) = registry.lease(&job_id).unwrap();
        assert_eq!(registry.sweep_expired(Duration::from_secs(3600)), 0);
        assert!(registry.get(&job_id).is_ok());

        drop(lease);
        assert_eq!(registry.sweep_expired(Duration::from_secs(3600)), 1);
        assert!(registry.get(&job_id).is_err());
    }

    #[test]
    fn test_concurrent_mutations_are_not_lost() {
        let registry = Arc::new(JobRegistry::new());
        let job_id = registry.create("counter");

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                let job_id = job_id.clone();
                thread::spawn(move || {
                    for step in 0..100 {
                        registry
                            .mutate(&job_id, |job| {
                                job.record_progress((worker * 100 + step) as f64 / 8.0);
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let job = registry.get(&job_id).unwrap();
        assert_eq!(job.progress, 799.0 / 8.0);
    }
}
