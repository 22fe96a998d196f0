use crate::queue::{Delivery, JobQueue, QueueError};
use crate::types::{Job, JobKind};
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, RedisResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Redis queue semantics - defines only key layout, not runtime logic.
/// Keeps the worker and the CLI from drifting apart on key names.

pub const QUEUE_PREFIX: &str = "judge:queue";
pub const RESULT_PREFIX: &str = "judge:result";
pub const PROCESSING_PREFIX: &str = "judge:processing";

/// Inbound list for a job kind
pub fn queue_key(kind: JobKind) -> String {
    format!("{}:{}", QUEUE_PREFIX, kind.queue_name())
}

/// In-flight list holding deliveries this worker has taken but not settled
pub fn processing_key(kind: JobKind, worker_id: &str) -> String {
    format!("{}:{}:{}", PROCESSING_PREFIX, kind.queue_name(), worker_id)
}

/// Outbound list for a result destination
pub fn result_key(destination: &str) -> String {
    format!("{}:{}", RESULT_PREFIX, destination)
}

/// Reliable-queue adapter over Redis lists.
///
/// A delivery is moved atomically from the kind queue into this worker's
/// in-flight list, so a crash between receipt and acknowledgement never loses
/// the message. Blocking pops get a dedicated connection per kind: a blocked
/// multiplexed connection would otherwise stall publishes from the other loops.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    blocking: HashMap<JobKind, ConnectionManager>,
    worker_id: String,
}

impl RedisQueue {
    pub async fn connect(redis_url: &str, worker_id: impl Into<String>) -> RedisResult<Self> {
        let client = ::redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;

        let mut blocking = HashMap::new();
        for kind in JobKind::ALL {
            blocking.insert(kind, ConnectionManager::new(client.clone()).await?);
        }

        Ok(Self {
            conn,
            blocking,
            worker_id: worker_id.into(),
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    fn blocking_conn(&self, kind: JobKind) -> ConnectionManager {
        self.blocking
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.conn.clone())
    }

    /// Push a job onto its kind queue. RPUSH + head pops give FIFO order.
    pub async fn push_job(&self, job: &Job) -> Result<(), QueueError> {
        let payload = job.encode()?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(queue_key(job.kind()), payload).await?;
        Ok(())
    }

    /// Pop the oldest published result of a destination
    pub async fn pop_result(
        &self,
        destination: &str,
        timeout_seconds: f64,
    ) -> RedisResult<Option<String>> {
        let mut conn = self.conn.clone();
        let result: Option<(String, String)> =
            conn.blpop(result_key(destination), timeout_seconds).await?;
        Ok(result.map(|(_key, payload)| payload))
    }

    /// Move every delivery left in this worker's in-flight lists back to the
    /// head of its queue, oldest first. Run once at start-up.
    pub async fn recover_inflight(&self) -> RedisResult<usize> {
        let mut conn = self.conn.clone();
        let mut recovered = 0;

        for kind in JobKind::ALL {
            let processing = processing_key(kind, &self.worker_id);
            let queue = queue_key(kind);
            loop {
                // newest in-flight goes in first so the oldest ends up at the head
                let moved: Option<String> = ::redis::cmd("LMOVE")
                    .arg(&processing)
                    .arg(&queue)
                    .arg("RIGHT")
                    .arg("LEFT")
                    .query_async(&mut conn)
                    .await?;
                if moved.is_none() {
                    break;
                }
                recovered += 1;
            }
        }

        if recovered > 0 {
            info!(worker_id = %self.worker_id, recovered, "Requeued in-flight deliveries");
        }
        Ok(recovered)
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn next_delivery(
        &self,
        kind: JobKind,
        wait: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.blocking_conn(kind);
        let payload: Option<String> = ::redis::cmd("BLMOVE")
            .arg(queue_key(kind))
            .arg(processing_key(kind, &self.worker_id))
            .arg("LEFT")
            .arg("RIGHT")
            .arg(wait.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        Ok(payload.map(|payload| Delivery::new(kind, payload)))
    }

    async fn publish(&self, destination: &str, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(result_key(destination), payload).await?;
        debug!(destination, bytes = payload.len(), "Published result");
        Ok(())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .lrem(
                processing_key(delivery.kind, &self.worker_id),
                1,
                &delivery.payload,
            )
            .await?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let processing = processing_key(delivery.kind, &self.worker_id);

        if requeue {
            let _: () = ::redis::pipe()
                .atomic()
                .lrem(&processing, 1, &delivery.payload)
                .ignore()
                .lpush(queue_key(delivery.kind), &delivery.payload)
                .ignore()
                .query_async(&mut conn)
                .await?;
        } else {
            let _: () = conn.lrem(&processing, 1, &delivery.payload).await?;
        }
        Ok(())
    }
}
