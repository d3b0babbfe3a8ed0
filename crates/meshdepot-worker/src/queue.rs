//! Upload job queue: bounded channel, worker pool and graceful shutdown.
//!
//! Jobs are recorded as `pending` in the job store before they enter the
//! channel, so a client can poll a job id as soon as it is returned. The job
//! store also enforces one active job per asset.

use meshdepot_core::models::{AssetId, UploadJob};
use meshdepot_core::{AppError, Config};
use meshdepot_db::UploadJobStore;
use meshdepot_services::UploadItem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::handler::UploadJobHandler;

/// Message recorded on jobs still queued when the pool shuts down.
pub const SHUTDOWN_FAILURE: &str = "Upload queue shut down before the job started";

#[derive(Debug, Clone)]
pub struct UploadJobQueueConfig {
    pub max_workers: usize,
    pub capacity: usize,
    /// How long `shutdown` waits for running jobs.
    pub shutdown_grace: Duration,
}

impl Default for UploadJobQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            capacity: 256,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl UploadJobQueueConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.upload_queue_max_workers().max(1),
            capacity: config.upload_queue_capacity().max(1),
            ..Self::default()
        }
    }
}

struct QueuedUpload {
    job_id: Uuid,
    asset_id: AssetId,
    items: Vec<UploadItem>,
}

#[derive(Clone)]
pub struct UploadJobQueue {
    jobs: Arc<dyn UploadJobStore>,
    sender: mpsc::Sender<QueuedUpload>,
    shutdown_tx: mpsc::Sender<()>,
    semaphore: Arc<Semaphore>,
    dispatcher: Arc<Mutex<Option<JoinHandle<()>>>>,
    config: UploadJobQueueConfig,
}

impl UploadJobQueue {
    /// Create the queue and spawn its dispatcher. Must be called inside a tokio runtime.
    pub fn new(
        jobs: Arc<dyn UploadJobStore>,
        handler: Arc<dyn UploadJobHandler>,
        config: UploadJobQueueConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let semaphore = Arc::new(Semaphore::new(config.max_workers));

        let dispatcher = tokio::spawn(Self::dispatch(
            jobs.clone(),
            handler,
            semaphore.clone(),
            receiver,
            shutdown_rx,
            config.max_workers,
        ));

        Self {
            jobs,
            sender,
            shutdown_tx,
            semaphore,
            dispatcher: Arc::new(Mutex::new(Some(dispatcher))),
            config,
        }
    }

    /// Record a pending job for `asset_id` and queue its files.
    ///
    /// Fails with `AppError::Conflict` while another job for the asset is active.
    #[tracing::instrument(skip(self, items), fields(asset_id = %asset_id, items = items.len()))]
    pub async fn submit(
        &self,
        asset_id: AssetId,
        owner_id: Uuid,
        items: Vec<UploadItem>,
    ) -> Result<UploadJob, AppError> {
        let job = UploadJob::pending(asset_id, owner_id);
        self.jobs.create_job(&job).await?;

        let queued = QueuedUpload {
            job_id: job.id,
            asset_id,
            items,
        };
        if self.sender.send(queued).await.is_err() {
            self.jobs.mark_failed(job.id, SHUTDOWN_FAILURE).await?;
            return Err(AppError::Internal(
                "Upload queue is not accepting jobs".to_string(),
            ));
        }

        tracing::info!(job_id = %job.id, "Upload job queued");
        Ok(job)
    }

    async fn dispatch(
        jobs: Arc<dyn UploadJobStore>,
        handler: Arc<dyn UploadJobHandler>,
        semaphore: Arc<Semaphore>,
        mut receiver: mpsc::Receiver<QueuedUpload>,
        mut shutdown_rx: mpsc::Receiver<()>,
        max_workers: usize,
    ) {
        tracing::info!(max_workers, "Upload job worker pool started");

        // A worker slot is reserved before a job leaves the channel, so jobs
        // waiting for a slot are still queued when shutdown arrives.
        loop {
            let permit = tokio::select! {
                _ = shutdown_rx.recv() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let queued = tokio::select! {
                _ = shutdown_rx.recv() => break,
                queued = receiver.recv() => match queued {
                    Some(queued) => queued,
                    None => break,
                },
            };

            let jobs = jobs.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                let _permit = permit;
                Self::run(jobs, handler, queued).await;
            });
        }

        receiver.close();
        while let Some(queued) = receiver.recv().await {
            if let Err(e) = jobs.mark_failed(queued.job_id, SHUTDOWN_FAILURE).await {
                tracing::error!(job_id = %queued.job_id, error = %e, "Failed to fail queued job");
            }
        }

        tracing::info!("Upload job worker pool stopped");
    }

    #[tracing::instrument(skip(jobs, handler, queued), fields(job_id = %queued.job_id, asset_id = %queued.asset_id))]
    async fn run(
        jobs: Arc<dyn UploadJobStore>,
        handler: Arc<dyn UploadJobHandler>,
        queued: QueuedUpload,
    ) {
        let job_id = queued.job_id;
        if let Err(e) = jobs.mark_running(job_id).await {
            tracing::error!(error = %e, "Failed to mark upload job running");
            return;
        }

        let outcome = match handler.handle(queued.asset_id, queued.items).await {
            Ok(report) => {
                tracing::info!("Upload job completed");
                jobs.mark_completed(job_id, report).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Upload job failed");
                jobs.mark_failed(job_id, &e.to_string()).await
            }
        };

        if let Err(e) = outcome {
            tracing::error!(error = %e, "Failed to record upload job outcome");
        }
    }

    /// Stop accepting work, fail jobs still queued and wait for running jobs.
    ///
    /// Waits at most `shutdown_grace` for running jobs; later calls return at once.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating upload queue shutdown");
        let _ = self.shutdown_tx.send(()).await;

        let Some(dispatcher) = self.dispatcher.lock().await.take() else {
            return;
        };
        if let Err(e) = dispatcher.await {
            tracing::error!(error = %e, "Upload queue dispatcher panicked");
        }

        let workers = u32::try_from(self.config.max_workers).unwrap_or(u32::MAX);
        match tokio::time::timeout(
            self.config.shutdown_grace,
            self.semaphore.acquire_many(workers),
        )
        .await
        {
            Ok(_) => tracing::info!("Upload queue drained"),
            Err(_) => tracing::warn!(
                grace_secs = self.config.shutdown_grace.as_secs(),
                "Upload jobs still running after shutdown grace period"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use meshdepot_core::models::JobStatus;
    use meshdepot_db::MemoryUploadJobStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Succeeds for every asset except 13 and counts calls; waits on `gate` when set.
    struct CountingHandler {
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl UploadJobHandler for CountingHandler {
        async fn handle(
            &self,
            asset_id: AssetId,
            items: Vec<UploadItem>,
        ) -> anyhow::Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if asset_id == 13 {
                anyhow::bail!("no usable files");
            }
            Ok(serde_json::json!({ "files": items.len() }))
        }
    }

    fn config(max_workers: usize) -> UploadJobQueueConfig {
        UploadJobQueueConfig {
            max_workers,
            capacity: 8,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    async fn wait_for_status(
        jobs: &MemoryUploadJobStore,
        job_id: Uuid,
        status: JobStatus,
    ) -> UploadJob {
        for _ in 0..200 {
            if let Some(job) = jobs.get_job(job_id).await.unwrap() {
                if job.status == status {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {}", job_id, status);
    }

    fn files() -> Vec<UploadItem> {
        vec![UploadItem::new("a.glb", b"glb".to_vec())]
    }

    #[tokio::test]
    async fn test_jobs_complete_or_fail_with_message() {
        let jobs = Arc::new(MemoryUploadJobStore::new());
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            gate: None,
        });
        let queue = UploadJobQueue::new(jobs.clone(), handler.clone(), config(2));

        let ok = queue.submit(1, Uuid::new_v4(), files()).await.unwrap();
        let bad = queue.submit(13, Uuid::new_v4(), files()).await.unwrap();

        let ok = wait_for_status(&jobs, ok.id, JobStatus::Completed).await;
        assert_eq!(ok.report, Some(serde_json::json!({ "files": 1 })));
        assert!(ok.started_at.is_some());

        let bad = wait_for_status(&jobs, bad.id, JobStatus::Failed).await;
        assert_eq!(bad.error.as_deref(), Some("no usable files"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_active_job_for_asset_conflicts() {
        let jobs = Arc::new(MemoryUploadJobStore::new());
        let gate = Arc::new(Notify::new());
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            gate: Some(gate.clone()),
        });
        let queue = UploadJobQueue::new(jobs.clone(), handler, config(1));

        let first = queue.submit(5, Uuid::new_v4(), files()).await.unwrap();
        wait_for_status(&jobs, first.id, JobStatus::Running).await;

        assert!(matches!(
            queue.submit(5, Uuid::new_v4(), files()).await,
            Err(AppError::Conflict(_))
        ));

        gate.notify_one();
        wait_for_status(&jobs, first.id, JobStatus::Completed).await;
        queue.submit(5, Uuid::new_v4(), files()).await.unwrap();
        gate.notify_one();
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_jobs_and_rejects_new_ones() {
        let jobs = Arc::new(MemoryUploadJobStore::new());
        let gate = Arc::new(Notify::new());
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            gate: Some(gate.clone()),
        });
        let queue = UploadJobQueue::new(jobs.clone(), handler, config(1));

        let running = queue.submit(1, Uuid::new_v4(), files()).await.unwrap();
        wait_for_status(&jobs, running.id, JobStatus::Running).await;
        let queued = queue.submit(2, Uuid::new_v4(), files()).await.unwrap();

        let shutdown = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.shutdown().await })
        };
        let queued = wait_for_status(&jobs, queued.id, JobStatus::Failed).await;
        assert_eq!(queued.error.as_deref(), Some(SHUTDOWN_FAILURE));

        gate.notify_one();
        shutdown.await.unwrap();
        wait_for_status(&jobs, running.id, JobStatus::Completed).await;

        assert!(matches!(
            queue.submit(3, Uuid::new_v4(), files()).await,
            Err(AppError::Internal(_))
        ));
        let rejected = jobs.active_job_for_asset(3).await.unwrap();
        assert!(rejected.is_none());
    }
}
