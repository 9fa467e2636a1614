use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{JobHandler, JobOutcome, JobPayload, JobReport, RetryPolicy};
use crate::error::{InsightError, Result};

/// Named queues jobs are dispatched through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Ingestion,
    Insights,
}

impl QueueName {
    pub const ALL: [QueueName; 2] = [QueueName::Ingestion, QueueName::Insights];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Ingestion => "ingestion",
            QueueName::Insights => "insights",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ingestion" => Ok(QueueName::Ingestion),
            "insights" => Ok(QueueName::Insights),
            other => Err(InsightError::Queue(format!("unknown queue: {}", other))),
        }
    }
}

/// Job kinds, each statically routed to one queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobName {
    IngestCall,
    GenerateCallInsights,
}

impl JobName {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::IngestCall => "ingest_call",
            JobName::GenerateCallInsights => "generate_call_insights",
        }
    }

    /// The queue this job is routed to
    pub fn queue(&self) -> QueueName {
        match self {
            JobName::IngestCall => QueueName::Ingestion,
            JobName::GenerateCallInsights => QueueName::Insights,
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job travelling through a queue, across retries
struct Envelope {
    id: Uuid,
    job: JobName,
    payload: JobPayload,
    retries: u32,
    retry_delays: Vec<Duration>,
    done: Option<oneshot::Sender<JobReport>>,
}

impl Envelope {
    fn finish(mut self, outcome: JobOutcome) {
        let report = JobReport {
            job_id: self.id,
            job: self.job,
            call_id: self.payload.call_id,
            attempts: self.retries + 1,
            retry_delays: std::mem::take(&mut self.retry_delays),
            outcome,
        };
        if let Some(done) = self.done.take() {
            // The submitter may have dropped its handle.
            let _ = done.send(report);
        }
    }
}

/// Receipt for a submitted job
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    job: JobName,
    queue: QueueName,
    done: oneshot::Receiver<JobReport>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn job(&self) -> JobName {
        self.job
    }

    pub fn queue(&self) -> QueueName {
        self.queue
    }

    /// Wait until the job completes or is abandoned
    pub async fn wait(self) -> Result<JobReport> {
        self.done
            .await
            .map_err(|_| InsightError::Queue(format!("job {} dropped before finishing", self.id)))
    }
}

/// Configures handlers and worker counts before starting a [`JobQueue`]
pub struct JobQueueBuilder {
    retry: RetryPolicy,
    handlers: HashMap<JobName, Arc<dyn JobHandler>>,
    workers: HashMap<QueueName, usize>,
}

impl JobQueueBuilder {
    pub fn handler(mut self, job: JobName, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(job, handler);
        self
    }

    /// Worker tasks consuming `queue` (default 1)
    pub fn workers(mut self, queue: QueueName, count: usize) -> Self {
        self.workers.insert(queue, count.max(1));
        self
    }

    /// Spawn the workers; must be called inside a tokio runtime
    pub fn start(self) -> JobQueue {
        let handlers = Arc::new(self.handlers);
        let mut senders = HashMap::new();
        let mut workers = Vec::new();

        for queue in QueueName::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            let context = Arc::new(WorkerContext {
                queue,
                receiver: Mutex::new(rx),
                retry_sender: tx.downgrade(),
                handlers: Arc::clone(&handlers),
                retry: self.retry,
            });

            let count = self.workers.get(&queue).copied().unwrap_or(1);
            for worker_id in 0..count {
                workers.push(tokio::spawn(run_worker(Arc::clone(&context), worker_id)));
            }
            info!(queue = %queue, workers = count, "Queue started");
            senders.insert(queue, tx);
        }

        JobQueue { senders, workers }
    }
}

/// In-process task queue with named queues and retry scheduling
///
/// Delivery is at-least-once from the handler's point of view: a retried job
/// runs its handler again from the start.
pub struct JobQueue {
    senders: HashMap<QueueName, mpsc::UnboundedSender<Envelope>>,
    workers: Vec<JoinHandle<()>>,
}

impl JobQueue {
    pub fn builder(retry: RetryPolicy) -> JobQueueBuilder {
        JobQueueBuilder {
            retry,
            handlers: HashMap::new(),
            workers: HashMap::new(),
        }
    }

    /// Submit `job` on `queue`, which must be the job's routed queue
    pub fn submit(&self, job: JobName, payload: JobPayload, queue: QueueName) -> Result<JobHandle> {
        if job.queue() != queue {
            return Err(InsightError::Queue(format!(
                "{} is routed to {}, not {}",
                job,
                job.queue(),
                queue
            )));
        }

        let sender = self
            .senders
            .get(&queue)
            .ok_or_else(|| InsightError::Queue(format!("queue {} is not running", queue)))?;

        let (done_tx, done_rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let envelope = Envelope {
            id,
            job,
            payload,
            retries: 0,
            retry_delays: Vec::new(),
            done: Some(done_tx),
        };

        sender
            .send(envelope)
            .map_err(|_| InsightError::Queue(format!("queue {} is closed", queue)))?;
        debug!(job_id = %id, job = %job, call_id = payload.call_id, queue = %queue, "Enqueued job");

        Ok(JobHandle {
            id,
            job,
            queue,
            done: done_rx,
        })
    }

    /// Submit `job` on its routed queue
    pub fn enqueue(&self, job: JobName, payload: JobPayload) -> Result<JobHandle> {
        self.submit(job, payload, job.queue())
    }

    /// Stop accepting jobs and wait for queued work
    ///
    /// Retries already scheduled still run. A job that fails after this
    /// point is abandoned instead of retried.
    pub async fn shutdown(self) {
        drop(self.senders);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("Worker task ended abnormally: {}", e);
            }
        }
    }
}

struct WorkerContext {
    queue: QueueName,
    receiver: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    retry_sender: mpsc::WeakUnboundedSender<Envelope>,
    handlers: Arc<HashMap<JobName, Arc<dyn JobHandler>>>,
    retry: RetryPolicy,
}

async fn run_worker(context: Arc<WorkerContext>, worker_id: usize) {
    loop {
        let next = {
            let mut receiver = context.receiver.lock().await;
            receiver.recv().await
        };

        let Some(envelope) = next else {
            debug!(queue = %context.queue, worker_id, "Queue closed, worker exiting");
            break;
        };

        context.dispatch(envelope).await;
    }
}

impl WorkerContext {
    async fn dispatch(&self, envelope: Envelope) {
        let Some(handler) = self.handlers.get(&envelope.job) else {
            error!(job = %envelope.job, "No handler registered");
            let reason = format!("no handler registered for {}", envelope.job);
            envelope.finish(JobOutcome::Abandoned { reason });
            return;
        };

        info!(
            job_id = %envelope.id,
            job = %envelope.job,
            call_id = envelope.payload.call_id,
            attempt = envelope.retries + 1,
            "Running job"
        );

        match handler.handle(envelope.payload).await {
            JobOutcome::Retry { reason } => self.schedule_retry(envelope, reason),
            outcome => envelope.finish(outcome),
        }
    }

    fn schedule_retry(&self, mut envelope: Envelope, reason: String) {
        let Some(delay) = self.retry.next_delay(envelope.retries) else {
            error!(
                job_id = %envelope.id,
                call_id = envelope.payload.call_id,
                attempts = envelope.retries + 1,
                "Retries exhausted, abandoning job: {}",
                reason
            );
            envelope.finish(JobOutcome::Abandoned { reason });
            return;
        };

        let Some(sender) = self.retry_sender.upgrade() else {
            warn!(job_id = %envelope.id, "Queue shut down, dropping retry");
            envelope.finish(JobOutcome::Abandoned { reason });
            return;
        };

        envelope.retries += 1;
        envelope.retry_delays.push(delay);
        warn!(
            job_id = %envelope.id,
            call_id = envelope.payload.call_id,
            retry = envelope.retries,
            delay_secs = delay.as_secs(),
            "Scheduling retry: {}",
            reason
        );

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(mpsc::error::SendError(envelope)) = sender.send(envelope) {
                envelope.finish(JobOutcome::Abandoned {
                    reason: "queue closed before retry".to_string(),
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CapabilityProvider, HashingEmbedder, SentimentCapability};
    use crate::jobs::{CallCatalog, CallIngestor, JobExecutor};
    use crate::models::{CallRecord, NewCall, ProcessingStatus, SentimentResult};
    use crate::pipeline::InsightOrchestrator;
    use crate::store::{CallStore, SqliteCallStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Panics on the first `failures` calls, then answers normally
    struct FlakySentiment {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SentimentCapability for FlakySentiment {
        async fn analyze(&self, _text: &str) -> SentimentResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                panic!("model server unavailable");
            }
            SentimentResult::from_label("POSITIVE", 0.9)
        }
    }

    fn raw_call(call_id: i64) -> NewCall {
        NewCall {
            call_id,
            agent_id: None,
            customer_id: None,
            language: Some("en".to_string()),
            start_time: None,
            duration_seconds: Some(30),
            transcript: "Agent: hi there\nCustomer: hello".to_string(),
        }
    }

    fn seeded_store(call_ids: &[i64]) -> Arc<SqliteCallStore> {
        let store = Arc::new(SqliteCallStore::open_in_memory().unwrap());
        for &call_id in call_ids {
            store.upsert(&CallRecord::new(raw_call(call_id))).unwrap();
        }
        store
    }

    fn insights_queue(store: Arc<SqliteCallStore>, provider: CapabilityProvider) -> JobQueue {
        let orchestrator = InsightOrchestrator::new(provider, Duration::from_secs(30));
        let executor = Arc::new(JobExecutor::new(store, orchestrator));
        JobQueue::builder(RetryPolicy::default())
            .handler(JobName::GenerateCallInsights, executor)
            .workers(QueueName::Insights, 2)
            .start()
    }

    fn flaky_provider(failures: usize) -> CapabilityProvider {
        CapabilityProvider::new(
            Arc::new(FlakySentiment {
                failures,
                calls: AtomicUsize::new(0),
            }),
            Arc::new(HashingEmbedder::new(8)),
        )
    }

    #[test]
    fn test_routing() {
        assert_eq!(JobName::IngestCall.queue(), QueueName::Ingestion);
        assert_eq!(JobName::GenerateCallInsights.queue(), QueueName::Insights);
        assert_eq!(JobName::GenerateCallInsights.to_string(), "generate_call_insights");
        assert_eq!("insights".parse::<QueueName>().unwrap(), QueueName::Insights);
        assert!("default".parse::<QueueName>().is_err());
    }

    #[tokio::test]
    async fn test_submit_to_wrong_queue_rejected() {
        let queue = insights_queue(seeded_store(&[1]), CapabilityProvider::local(8));
        let err = queue
            .submit(
                JobName::GenerateCallInsights,
                JobPayload { call_id: 1 },
                QueueName::Ingestion,
            )
            .unwrap_err();
        assert!(matches!(err, InsightError::Queue(_)));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_handles_have_unique_ids() {
        let queue = insights_queue(seeded_store(&[1, 2]), CapabilityProvider::local(8));
        let a = queue
            .enqueue(JobName::GenerateCallInsights, JobPayload { call_id: 1 })
            .unwrap();
        let b = queue
            .enqueue(JobName::GenerateCallInsights, JobPayload { call_id: 2 })
            .unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.queue(), QueueName::Insights);

        assert!(a.wait().await.unwrap().outcome.is_completed());
        assert!(b.wait().await.unwrap().outcome.is_completed());
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let store = seeded_store(&[1]);
        let queue = insights_queue(store.clone(), flaky_provider(2));
        let started = tokio::time::Instant::now();

        let report = queue
            .submit(
                JobName::GenerateCallInsights,
                JobPayload { call_id: 1 },
                QueueName::Insights,
            )
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert!(report.outcome.is_completed());
        assert_eq!(report.attempts, 3);
        assert_eq!(
            report.retry_delays,
            vec![Duration::from_secs(120), Duration::from_secs(240)]
        );
        assert!(started.elapsed() >= Duration::from_secs(360));

        let record = store.get(1).unwrap().unwrap();
        assert_eq!(record.processing_status, ProcessingStatus::Completed);
        assert_eq!(record.sentiment_score, Some(0.9));
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_leaves_failed() {
        let store = seeded_store(&[1]);
        let queue = insights_queue(store.clone(), flaky_provider(usize::MAX));

        let report = queue
            .enqueue(JobName::GenerateCallInsights, JobPayload { call_id: 1 })
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(report.attempts, 4);
        assert_eq!(
            report.retry_delays,
            vec![
                Duration::from_secs(120),
                Duration::from_secs(240),
                Duration::from_secs(480)
            ]
        );
        let JobOutcome::Abandoned { reason } = &report.outcome else {
            panic!("expected abandoned, got {:?}", report.outcome);
        };
        assert!(reason.contains("model server unavailable"));

        let record = store.get(1).unwrap().unwrap();
        assert_eq!(record.processing_status, ProcessingStatus::Failed(reason.clone()));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_call_not_retried() {
        let queue = insights_queue(seeded_store(&[]), CapabilityProvider::local(8));
        let report = queue
            .enqueue(JobName::GenerateCallInsights, JobPayload { call_id: 77 })
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(report.attempts, 1);
        assert!(report.retry_delays.is_empty());
        assert!(matches!(report.outcome, JobOutcome::Abandoned { .. }));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_unregistered_job_abandoned() {
        let queue = insights_queue(seeded_store(&[]), CapabilityProvider::local(8));
        let report = queue
            .enqueue(JobName::IngestCall, JobPayload { call_id: 1 })
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert!(matches!(report.outcome, JobOutcome::Abandoned { .. }));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_ingest_then_generate_insights() {
        let store = Arc::new(SqliteCallStore::open_in_memory().unwrap());
        let catalog = Arc::new(CallCatalog::new((1..=5).map(raw_call)));
        let orchestrator =
            InsightOrchestrator::new(CapabilityProvider::local(8), Duration::from_secs(30));

        let queue = JobQueue::builder(RetryPolicy::default())
            .handler(
                JobName::IngestCall,
                Arc::new(CallIngestor::new(catalog.clone(), store.clone())),
            )
            .handler(
                JobName::GenerateCallInsights,
                Arc::new(JobExecutor::new(store.clone(), orchestrator)),
            )
            .workers(QueueName::Ingestion, 2)
            .workers(QueueName::Insights, 3)
            .start();

        let ingests: Vec<JobHandle> = catalog
            .call_ids()
            .into_iter()
            .map(|call_id| {
                queue
                    .enqueue(JobName::IngestCall, JobPayload { call_id })
                    .unwrap()
            })
            .collect();
        for handle in ingests {
            assert!(handle.wait().await.unwrap().outcome.is_completed());
        }
        assert_eq!(store.list(Some("pending")).unwrap().len(), 5);

        let runs: Vec<JobHandle> = catalog
            .call_ids()
            .into_iter()
            .map(|call_id| {
                queue
                    .enqueue(JobName::GenerateCallInsights, JobPayload { call_id })
                    .unwrap()
            })
            .collect();
        for handle in runs {
            let report = handle.wait().await.unwrap();
            match report.outcome {
                JobOutcome::Completed(summary) => {
                    let ratio = summary.agent_talk_ratio.unwrap();
                    assert!((ratio - 2.0 / 3.0).abs() < 1e-9);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        assert_eq!(store.status_counts().unwrap(), vec![("completed".to_string(), 5)]);
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_shutdown_abandoned() {
        let store = seeded_store(&[1]);
        let queue = insights_queue(store.clone(), flaky_provider(1));
        let handle = queue
            .enqueue(JobName::GenerateCallInsights, JobPayload { call_id: 1 })
            .unwrap();

        queue.shutdown().await;

        let report = handle.wait().await.unwrap();
        assert_eq!(report.attempts, 1);
        assert!(report.retry_delays.is_empty());
        assert!(matches!(report.outcome, JobOutcome::Abandoned { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_scheduled_retry() {
        let store = seeded_store(&[1]);
        let queue = insights_queue(store.clone(), flaky_provider(1));
        let handle = queue
            .enqueue(JobName::GenerateCallInsights, JobPayload { call_id: 1 })
            .unwrap();

        // Let the first attempt fail and schedule its retry.
        tokio::time::sleep(Duration::from_secs(1)).await;
        queue.shutdown().await;

        let report = handle.wait().await.unwrap();
        assert!(report.outcome.is_completed());
        assert_eq!(report.retry_delays, vec![Duration::from_secs(120)]);
        assert_eq!(
            store.get(1).unwrap().unwrap().processing_status,
            ProcessingStatus::Completed
        );
    }
}
