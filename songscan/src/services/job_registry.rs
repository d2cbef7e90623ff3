//! In-memory job registry
//!
//! The only shared mutable state in the service. Each job is mutated by its
//! own scan task and read by the status endpoint; every successful mutation
//! is published on the event bus for SSE subscribers.

use chrono::Utc;
use songscan_common::events::{EventBus, ScanEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::models::{JobId, JobProgress, JobStatus, JobTransitionError, RecognizedSegment, ScanJob};

/// Registry errors
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error(transparent)]
    Transition(#[from] JobTransitionError),
}

/// Job registry
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, ScanJob>>>,
    event_bus: EventBus,
}

impl JobRegistry {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            event_bus,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Register a new job in `processing` and return its id
    pub async fn create(&self) -> JobId {
        let id = {
            let mut jobs = self.jobs.write().await;
            let mut id = JobId::new();
            while jobs.contains_key(&id) {
                id = JobId::new();
            }
            jobs.insert(id, ScanJob::new(id));
            id
        };

        self.event_bus.emit_lossy(ScanEvent::JobSubmitted {
            job_id: id.to_string(),
            timestamp: Utc::now(),
        });
        id
    }

    /// Snapshot of a job
    pub async fn get(&self, id: &JobId) -> Option<ScanJob> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Snapshot of a job's client-visible status
    pub async fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.jobs.read().await.get(id).map(|job| job.status.clone())
    }

    /// Apply a mutation to one job under the write lock
    pub async fn update<T, F>(&self, id: &JobId, mutation: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&mut ScanJob) -> Result<T, JobTransitionError>,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(id).ok_or(RegistryError::NotFound(*id))?;
        Ok(mutation(job)?)
    }

    pub async fn record_progress(
        &self,
        id: &JobId,
        done: u64,
        total: u64,
    ) -> Result<JobProgress, RegistryError> {
        let progress = self.update(id, |job| job.record_progress(done, total)).await?;
        self.event_bus.emit_lossy(ScanEvent::JobProgress {
            job_id: id.to_string(),
            done: progress.done,
            total: progress.total,
            timestamp: Utc::now(),
        });
        Ok(progress)
    }

    pub async fn complete(
        &self,
        id: &JobId,
        segments: Vec<RecognizedSegment>,
    ) -> Result<usize, RegistryError> {
        let segment_count = self.update(id, |job| job.complete(segments)).await?;
        info!(job_id = %id, segments = segment_count, "Scan job done");
        self.event_bus.emit_lossy(ScanEvent::JobCompleted {
            job_id: id.to_string(),
            segment_count,
            timestamp: Utc::now(),
        });
        Ok(segment_count)
    }

    pub async fn fail(&self, id: &JobId, error: impl Into<String>) -> Result<(), RegistryError> {
        let error = error.into();
        let message = error.clone();
        self.update(id, |job| job.fail(message)).await?;
        info!(job_id = %id, error = %error, "Scan job failed");
        self.event_bus.emit_lossy(ScanEvent::JobFailed {
            job_id: id.to_string(),
            error,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Drop terminal jobs whose last update is older than `retention`
    ///
    /// Jobs still processing are never dropped. Returns the number removed.
    pub async fn purge_expired(&self, retention: Duration) -> usize {
        let cutoff = match chrono::Duration::from_std(retention) {
            Ok(d) => Utc::now() - d,
            Err(_) => return 0,
        };

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.is_terminal() && job.updated_at < cutoff));
        let removed = before - jobs.len();
        if removed > 0 {
            debug!(removed, remaining = jobs.len(), "Purged expired jobs");
        }
        removed
    }

    /// Periodically purge expired jobs for the life of the process
    pub fn spawn_sweeper(&self, retention: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        let period = (retention / 4).max(Duration::from_secs(1));
        info!(?retention, ?period, "Job retention sweeper started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                registry.purge_expired(retention).await;
            }
        })
    }
}
