/// Job Dispatcher - queue consumption and delivery settlement
///
/// One consumer loop per job kind. Each loop handles one message at a time;
/// the three loops run in parallel with each other and with the HTTP server.
///
/// **Settlement rules (at-least-once):**
/// - undecodable payload → nack without requeue (never retried)
/// - result published → ack
/// - publish failed → nack with requeue; the job will run again
/// - a failed ack or nack is retried until it lands or shutdown is raised,
///   so a delivery is never left in flight while the worker keeps running
///
/// An execution failure is not a delivery failure: timeouts, build errors and
/// unsupported languages all produce a published `error` result and an ack.

use crate::engine::ProcessEngine;
use crate::executor;
use crate::metrics::Metrics;
use judge_common::queue::{Delivery, JobQueue};
use judge_common::types::{Job, JobKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// How long a loop blocks on its queue before re-checking for shutdown
pub const DEFAULT_POLL_WAIT: Duration = Duration::from_secs(5);

const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What happened to a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Requeued,
    Dropped,
}

pub struct Dispatcher<Q> {
    queue: Arc<Q>,
    engine: Arc<ProcessEngine>,
    metrics: Arc<Metrics>,
    poll_wait: Duration,
}

impl<Q> Dispatcher<Q>
where
    Q: JobQueue + 'static,
{
    pub fn new(queue: Arc<Q>, engine: Arc<ProcessEngine>, metrics: Arc<Metrics>) -> Self {
        Self {
            queue,
            engine,
            metrics,
            poll_wait: DEFAULT_POLL_WAIT,
        }
    }

    pub fn with_poll_wait(mut self, poll_wait: Duration) -> Self {
        self.poll_wait = poll_wait;
        self
    }

    /// Start one consumer loop per job kind
    pub fn spawn_all(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        JobKind::ALL
            .into_iter()
            .map(|kind| {
                let dispatcher = Arc::clone(self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { dispatcher.run_consumer(kind, shutdown).await })
            })
            .collect()
    }

    /// Consume `kind` until the shutdown flag is raised.
    ///
    /// The flag is checked between messages, so an in-flight job always
    /// finishes and settles before the loop exits.
    #[instrument(skip(self, shutdown), fields(kind = %kind))]
    pub async fn run_consumer(&self, kind: JobKind, shutdown: watch::Receiver<bool>) {
        info!(queue = kind.queue_name(), "Consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.queue.next_delivery(kind, self.poll_wait).await {
                Ok(Some(delivery)) => {
                    let settlement = self.process_delivery(&delivery, &shutdown).await;
                    debug!(?settlement, "Delivery settled");
                }
                Ok(None) => {
                    // Timeout - check for shutdown
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Queue error");
                    tokio::time::sleep(QUEUE_ERROR_BACKOFF).await;
                }
            }
        }

        info!("Consumer stopped");
    }

    /// Decode, execute, publish and settle one delivery
    pub async fn process_delivery(
        &self,
        delivery: &Delivery,
        shutdown: &watch::Receiver<bool>,
    ) -> Settlement {
        let kind = delivery.kind;
        self.metrics.job_received(kind);

        let job = match Job::decode(kind, delivery.payload.as_bytes()) {
            Ok(job) => job,
            Err(e) => {
                warn!(
                    kind = %kind,
                    error = %e,
                    payload_bytes = delivery.payload.len(),
                    "Dropping malformed message"
                );
                self.metrics.malformed_message(kind);
                self.settle(delivery, Settlement::Dropped, shutdown).await;
                return Settlement::Dropped;
            }
        };

        info!(
            job_id = %job.job_id(),
            kind = %kind,
            language = %job.language(),
            mode = %job.mode(),
            "Received job"
        );

        let (outcome, result) = executor::execute_job(&job, &self.engine).await;
        self.metrics
            .observe_execution(job.language(), outcome.duration_secs);

        let payload = match serde_json::to_string(&result) {
            Ok(payload) => payload,
            Err(e) => {
                error!(job_id = %job.job_id(), error = %e, "Failed to serialize result");
                self.settle(delivery, Settlement::Dropped, shutdown).await;
                return Settlement::Dropped;
            }
        };

        let destination = job.destination();
        if let Err(e) = self.queue.publish(destination, &payload).await {
            error!(
                job_id = %job.job_id(),
                destination,
                error = %e,
                "Failed to publish result; requeueing job"
            );
            self.metrics.publish_failure(kind);
            self.settle(delivery, Settlement::Requeued, shutdown).await;
            return Settlement::Requeued;
        }

        self.settle(delivery, Settlement::Acked, shutdown).await;
        self.metrics.job_completed(kind, result.status());

        info!(
            job_id = %job.job_id(),
            destination,
            status = %result.status(),
            passed = ?result.passed(),
            duration_secs = outcome.duration_secs,
            "Result published"
        );
        Settlement::Acked
    }

    /// Apply `settlement` to the broker, retrying through broker outages.
    ///
    /// Gives up only once shutdown is raised; the delivery then stays in the
    /// worker's in-flight list and is recovered on the next start-up.
    async fn settle(
        &self,
        delivery: &Delivery,
        settlement: Settlement,
        shutdown: &watch::Receiver<bool>,
    ) {
        let mut attempts: u32 = 0;
        loop {
            let settled = match settlement {
                Settlement::Acked => self.queue.ack(delivery).await,
                Settlement::Requeued => self.queue.nack(delivery, true).await,
                Settlement::Dropped => self.queue.nack(delivery, false).await,
            };
            let Err(e) = settled else {
                if attempts > 0 {
                    info!(kind = %delivery.kind, ?settlement, attempts, "Delivery settled after retry");
                }
                return;
            };

            attempts += 1;
            error!(
                kind = %delivery.kind,
                ?settlement,
                attempts,
                error = %e,
                "Failed to settle delivery"
            );
            if *shutdown.borrow() {
                warn!(kind = %delivery.kind, "Shutting down with delivery still in flight");
                return;
            }
            tokio::time::sleep(QUEUE_ERROR_BACKOFF).await;
        }
    }
}
