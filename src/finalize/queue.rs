//! Job Queue
//!
//! Background execution of finalization jobs: a bounded channel consumed by
//! a pool of worker tasks. Delivery is at-least-once; retryable failures are
//! re-run with exponential backoff, which is safe because finalization is
//! idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::FinalizationConfig;
use crate::error::{Error, Result};
use crate::finalize::{FinalizationJob, FinalizationReport};
use crate::id::{EventId, UserId};

/// Work accepted by the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Mark non-voters of a closed event as `did_not_vote`
    FinalizeEvent { event_id: EventId, validated_by: UserId },
}

/// Observable job state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running { attempt: u32 },
    Succeeded { attempts: u32, report: FinalizationReport },
    Failed { attempts: u32, error: String },
}

/// Retry policy for retryable job failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FinalizationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: config.retry_backoff(),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based), before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1 << exponent)
    }

    /// Delay with up to 50% random jitter added
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let max_jitter = (base.as_millis() / 2) as u64;
        let jitter = if max_jitter > 0 {
            rand::thread_rng().gen_range(0..=max_jitter)
        } else {
            0
        };
        base + Duration::from_millis(jitter)
    }
}

struct Envelope {
    id: Uuid,
    job: Job,
    done: oneshot::Sender<JobStatus>,
}

struct Tracked {
    status: JobStatus,
    finished_at: Option<Instant>,
}

/// Job statuses by id; finished entries expire after `retention`
#[derive(Clone)]
struct StatusBoard {
    entries: Arc<RwLock<HashMap<Uuid, Tracked>>>,
    retention: Duration,
}

impl StatusBoard {
    fn new(retention: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    fn is_live(&self, tracked: &Tracked) -> bool {
        match tracked.finished_at {
            Some(at) => at.elapsed() < self.retention,
            None => true,
        }
    }

    async fn set(&self, id: Uuid, status: JobStatus) {
        self.entries
            .write()
            .await
            .insert(id, Tracked { status, finished_at: None });
    }

    /// Record a final status and drop expired ones
    async fn finish(&self, id: Uuid, status: JobStatus) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, tracked| self.is_live(tracked));
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} expired job statuses", evicted);
        }
        entries.insert(
            id,
            Tracked {
                status,
                finished_at: Some(Instant::now()),
            },
        );
    }

    async fn get(&self, id: Uuid) -> Option<JobStatus> {
        self.entries
            .read()
            .await
            .get(&id)
            .filter(|tracked| self.is_live(tracked))
            .map(|tracked| tracked.status.clone())
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Handle returned by [`JobDispatcher::dispatch`]
pub struct JobTicket {
    pub id: Uuid,
    done: oneshot::Receiver<JobStatus>,
}

impl JobTicket {
    /// Wait for the job's final status
    pub async fn wait(self) -> Result<JobStatus> {
        self.done.await.map_err(|_| Error::ShuttingDown)
    }
}

/// Reserved queue capacity; sending through it cannot fail
pub struct JobSlot<'a> {
    permit: mpsc::Permit<'a, Envelope>,
    statuses: &'a StatusBoard,
}

impl JobSlot<'_> {
    /// Enqueue a job into the reserved slot
    pub async fn send(self, job: Job) -> JobTicket {
        let id = Uuid::new_v4();
        let (done_tx, done_rx) = oneshot::channel();

        self.statuses.set(id, JobStatus::Queued).await;
        self.permit.send(Envelope { id, job, done: done_tx });

        tracing::info!("Queued job {} ({:?})", id, job);
        JobTicket { id, done: done_rx }
    }
}

/// Cloneable producer side of the queue
#[derive(Clone)]
pub struct JobDispatcher {
    tx: mpsc::Sender<Envelope>,
    statuses: StatusBoard,
}

impl JobDispatcher {
    /// Reserve queue capacity ahead of a side effect the job depends on.
    ///
    /// Dropping the slot releases the capacity.
    pub async fn reserve(&self) -> Result<JobSlot<'_>> {
        let permit = self.tx.reserve().await.map_err(|_| Error::ShuttingDown)?;
        Ok(JobSlot {
            permit,
            statuses: &self.statuses,
        })
    }

    /// Enqueue a job; callers may drop the ticket for fire-and-forget
    pub async fn dispatch(&self, job: Job) -> Result<JobTicket> {
        Ok(self.reserve().await?.send(job).await)
    }

    /// Current status of a job; finished jobs expire after the retention window
    pub async fn status(&self, id: Uuid) -> Option<JobStatus> {
        self.statuses.get(id).await
    }
}

#[cfg(test)]
impl JobDispatcher {
    /// Dispatcher whose workers are gone
    pub(crate) fn closed() -> Self {
        let (tx, rx) = mpsc::channel::<Envelope>(1);
        drop(rx);
        Self {
            tx,
            statuses: StatusBoard::new(Duration::ZERO),
        }
    }
}

/// Worker tasks consuming the queue
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn the workers; they stop once every dispatcher is dropped
    pub fn start(finalizer: Arc<FinalizationJob>, config: &FinalizationConfig) -> (JobDispatcher, WorkerPool) {
        let (tx, rx) = mpsc::channel::<Envelope>(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let statuses = StatusBoard::new(config.status_retention());
        let retry = RetryPolicy::from_config(config);

        let handles = (0..config.workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let finalizer = Arc::clone(&finalizer);
                let statuses = statuses.clone();
                tokio::spawn(async move {
                    tracing::debug!("Job worker {} started", worker);
                    loop {
                        let envelope = rx.lock().await.recv().await;
                        let Some(envelope) = envelope else { break };

                        let status = run_with_retry(&finalizer, &statuses, envelope.id, envelope.job, retry).await;
                        statuses.finish(envelope.id, status.clone()).await;
                        let _ = envelope.done.send(status);
                    }
                    tracing::debug!("Job worker {} stopped", worker);
                })
            })
            .collect();

        (JobDispatcher { tx, statuses }, WorkerPool { handles })
    }

    /// Wait for every worker to drain the queue and exit
    pub async fn join(self) {
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!("Job worker panicked: {}", e);
            }
        }
    }
}

async fn run_with_retry(
    finalizer: &FinalizationJob,
    statuses: &StatusBoard,
    id: Uuid,
    job: Job,
    retry: RetryPolicy,
) -> JobStatus {
    let mut attempt = 0;
    loop {
        attempt += 1;
        statuses.set(id, JobStatus::Running { attempt }).await;

        match execute(finalizer, job).await {
            Ok(report) => {
                tracing::info!("Job {} succeeded on attempt {}", id, attempt);
                return JobStatus::Succeeded { attempts: attempt, report };
            }
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                let delay = retry.delay(attempt);
                tracing::warn!("Job {} attempt {} failed: {}; retrying in {:?}", id, attempt, e, delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!("Job {} failed after {} attempts: {}", id, attempt, e);
                return JobStatus::Failed { attempts: attempt, error: e.to_string() };
            }
        }
    }
}

async fn execute(finalizer: &FinalizationJob, job: Job) -> Result<FinalizationReport> {
    match job {
        Job::FinalizeEvent { event_id, validated_by } => {
            let report = finalizer.run(event_id, validated_by).await?;
            if report.failed > 0 {
                return Err(Error::PartialFinalization { event_id, failed: report.failed });
            }
            Ok(report)
        }
    }
}
