//! Fixed worker pool draining the bounded media job queue.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use chatvault_core::defaults::{
    EVENT_BUS_CAPACITY, MEDIA_JOB_TIMEOUT_SECS, MEDIA_QUEUE_CAPACITY, MEDIA_WORKERS,
};
use chatvault_core::env::env_parse;
use chatvault_core::{Error, MediaJob, Result};

use crate::handler::{JobResult, MediaJobHandler};

/// Configuration for the media pool.
#[derive(Debug, Clone)]
pub struct MediaPoolConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Queue capacity. `submit` blocks once this many jobs wait.
    pub queue_capacity: usize,
    /// Per-job timeout.
    pub job_timeout: Duration,
}

impl Default for MediaPoolConfig {
    fn default() -> Self {
        Self {
            workers: MEDIA_WORKERS,
            queue_capacity: MEDIA_QUEUE_CAPACITY,
            job_timeout: Duration::from_secs(MEDIA_JOB_TIMEOUT_SECS),
        }
    }
}

impl MediaPoolConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `MEDIA_WORKERS` | `5` | Concurrent workers |
    /// | `MEDIA_QUEUE_CAPACITY` | `100` | Queue capacity |
    /// | `MEDIA_JOB_TIMEOUT_SECS` | `600` | Per-job timeout |
    pub fn from_env() -> Result<Self> {
        let config = Self {
            workers: env_parse("MEDIA_WORKERS", MEDIA_WORKERS)?,
            queue_capacity: env_parse("MEDIA_QUEUE_CAPACITY", MEDIA_QUEUE_CAPACITY)?,
            job_timeout: Duration::from_secs(env_parse(
                "MEDIA_JOB_TIMEOUT_SECS",
                MEDIA_JOB_TIMEOUT_SECS,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the per-job timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("MEDIA_WORKERS must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("MEDIA_QUEUE_CAPACITY must be at least 1".into()));
        }
        if self.job_timeout.is_zero() {
            return Err(Error::Config("MEDIA_JOB_TIMEOUT_SECS must be positive".into()));
        }
        Ok(())
    }
}

/// Event emitted by the media pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A worker started consuming the queue.
    WorkerStarted { worker: usize },
    /// A job was picked up.
    JobStarted {
        remote_message_id: i64,
        conversation_id: Uuid,
    },
    /// A job completed successfully.
    JobCompleted {
        remote_message_id: i64,
        conversation_id: Uuid,
        locator: Option<String>,
    },
    /// A job failed, timed out or panicked. It will not be retried.
    JobFailed {
        remote_message_id: i64,
        conversation_id: Uuid,
        error: String,
    },
    /// A worker exited after the queue closed.
    WorkerStopped { worker: usize },
}

/// Bounded media job queue with a fixed set of workers.
///
/// Jobs are consumed in submission order. Each job runs in its own task so a
/// panic only fails that job; the worker awaits it and moves on.
pub struct MediaIngestionPool {
    sender: Mutex<Option<mpsc::Sender<MediaJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
    config: MediaPoolConfig,
}

impl MediaIngestionPool {
    /// Start `config.workers` workers running `handler`.
    ///
    /// Worker and job spans are children of `parent`.
    pub fn start(
        config: MediaPoolConfig,
        handler: Arc<dyn MediaJobHandler>,
        parent: &Span,
    ) -> Result<Self> {
        config.validate()?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);

        let workers = (0..config.workers)
            .map(|worker| {
                let span = info_span!(parent: parent, "media_worker", worker);
                let ctx = WorkerContext {
                    worker,
                    receiver: receiver.clone(),
                    handler: handler.clone(),
                    event_tx: event_tx.clone(),
                    job_timeout: config.job_timeout,
                };
                tokio::spawn(ctx.run().instrument(span))
            })
            .collect();

        info!(
            subsystem = "jobs",
            component = "media_pool",
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            job_timeout_secs = config.job_timeout.as_secs(),
            "Media pool started"
        );

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            event_tx,
            config,
        })
    }

    pub fn config(&self) -> &MediaPoolConfig {
        &self.config
    }

    /// Get a receiver for pool events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    fn sender(&self) -> Option<mpsc::Sender<MediaJob>> {
        self.sender.lock().ok().and_then(|guard| guard.clone())
    }

    /// Enqueue a job, waiting for room when the queue is full.
    ///
    /// Fails once the pool has been shut down.
    pub async fn submit(&self, job: MediaJob) -> Result<()> {
        let sender = self
            .sender()
            .ok_or_else(|| Error::Job("media pool is shut down".into()))?;

        debug!(
            subsystem = "jobs",
            component = "media_pool",
            op = "submit",
            remote_message_id = job.remote_message_id,
            conversation_id = %job.conversation_id,
            media = job.media.shape(),
            "Queueing media job"
        );

        sender
            .send(job)
            .await
            .map_err(|_| Error::Job("media pool is shut down".into()))
    }

    /// Jobs waiting in the queue, not counting in-flight ones.
    pub fn queued(&self) -> usize {
        self.sender()
            .map(|s| s.max_capacity() - s.capacity())
            .unwrap_or(0)
    }

    /// Close the queue and wait until every queued and in-flight job is done.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let start = Instant::now();
        let sender = self.sender.lock().ok().and_then(|mut guard| guard.take());
        drop(sender);

        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .map(|mut guard| guard.drain(..).collect())
            .unwrap_or_default();
        if workers.is_empty() {
            return;
        }

        info!(
            subsystem = "jobs",
            component = "media_pool",
            op = "shutdown",
            "Draining media queue"
        );
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = ?e, "Media worker task failed");
            }
        }
        info!(
            subsystem = "jobs",
            component = "media_pool",
            op = "shutdown",
            duration_ms = start.elapsed().as_millis() as u64,
            "Media pool stopped"
        );
    }
}

/// State a single worker task owns.
struct WorkerContext {
    worker: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<MediaJob>>>,
    handler: Arc<dyn MediaJobHandler>,
    event_tx: broadcast::Sender<WorkerEvent>,
    job_timeout: Duration,
}

impl WorkerContext {
    async fn run(self) {
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted {
            worker: self.worker,
        });
        debug!("Media worker started");

        loop {
            let job = {
                let mut receiver = self.receiver.lock().await;
                receiver.recv().await
            };
            match job {
                Some(job) => self.execute_job(job).await,
                None => break,
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped {
            worker: self.worker,
        });
        debug!("Media worker stopped");
    }

    async fn execute_job(&self, job: MediaJob) {
        let start = Instant::now();
        let remote_message_id = job.remote_message_id;
        let conversation_id = job.conversation_id;
        let span = info_span!(
            "media_job",
            remote_message_id,
            %conversation_id,
            media = job.media.shape()
        );

        let _ = self.event_tx.send(WorkerEvent::JobStarted {
            remote_message_id,
            conversation_id,
        });

        let handler = self.handler.clone();
        let job_timeout = self.job_timeout;
        let task = tokio::spawn(
            async move { tokio::time::timeout(job_timeout, handler.execute(job)).await }
                .instrument(span.clone()),
        );

        let result = match task.await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                JobResult::Failed(format!("Job exceeded timeout of {}s", job_timeout.as_secs()))
            }
            Err(e) if e.is_panic() => {
                span.in_scope(|| error!(error = ?e, "Media job panicked"));
                JobResult::Failed("media job panicked".into())
            }
            Err(e) => JobResult::Failed(format!("media job aborted: {}", e)),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            JobResult::Success(locator) => {
                span.in_scope(|| {
                    info!(
                        duration_ms,
                        locator = locator.as_deref().unwrap_or(""),
                        "Media job completed"
                    )
                });
                let _ = self.event_tx.send(WorkerEvent::JobCompleted {
                    remote_message_id,
                    conversation_id,
                    locator,
                });
            }
            JobResult::Failed(error) => {
                span.in_scope(|| warn!(duration_ms, %error, "Media job failed"));
                let _ = self.event_tx.send(WorkerEvent::JobFailed {
                    remote_message_id,
                    conversation_id,
                    error,
                });
            }
        }
    }
}
