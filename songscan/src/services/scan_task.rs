//! Background scan task
//!
//! One task per job: acquire media, run the recognizer, record the outcome.
//! Every failure is converted into the job's `error` state; nothing here
//! propagates back to the HTTP request that created the job.

use std::sync::Arc;
use tracing::{info, warn};

use super::job_registry::JobRegistry;
use super::media_acquirer::{MediaAcquirer, MediaSource};
use super::recognition_invoker::RecognitionInvoker;
use crate::models::{JobId, ScanParameters};

/// Shared handles a scan task needs
#[derive(Clone)]
pub struct ScanTask {
    registry: JobRegistry,
    acquirer: Arc<MediaAcquirer>,
    invoker: Arc<RecognitionInvoker>,
}

impl ScanTask {
    pub fn new(
        registry: JobRegistry,
        acquirer: Arc<MediaAcquirer>,
        invoker: Arc<RecognitionInvoker>,
    ) -> Self {
        Self {
            registry,
            acquirer,
            invoker,
        }
    }

    /// Detach a task for `job_id`
    pub fn spawn(
        &self,
        job_id: JobId,
        source: MediaSource,
        params: ScanParameters,
    ) -> tokio::task::JoinHandle<()> {
        let task = self.clone();
        tokio::spawn(async move {
            info!(job_id = %job_id, "Background scan task started");
            task.run(job_id, source, params).await;
        })
    }

    /// Drive one job to a terminal state
    pub async fn run(&self, job_id: JobId, source: MediaSource, params: ScanParameters) {
        let media = match self.acquirer.acquire(source).await {
            Ok(media) => media,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Media acquisition failed");
                self.finish_with_error(&job_id, e.to_string()).await;
                return;
            }
        };

        let registry = self.registry.clone();
        let progress_id = job_id;
        let outcome = self
            .invoker
            .invoke(&job_id, media.path(), &params, move |done, total| {
                let registry = registry.clone();
                async move {
                    if let Err(e) = registry.record_progress(&progress_id, done, total).await {
                        warn!(job_id = %progress_id, error = %e, "Dropped progress update");
                    }
                }
            })
            .await;

        // Media is no longer needed once the recognizer has exited
        drop(media);

        match outcome {
            Ok(segments) => {
                if let Err(e) = self.registry.complete(&job_id, segments).await {
                    warn!(job_id = %job_id, error = %e, "Could not record scan result");
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Recognition failed");
                self.finish_with_error(&job_id, e.to_string()).await;
            }
        }
    }

    async fn finish_with_error(&self, job_id: &JobId, message: String) {
        if let Err(e) = self.registry.fail(job_id, message).await {
            warn!(job_id = %job_id, error = %e, "Could not record scan failure");
        }
    }
}
