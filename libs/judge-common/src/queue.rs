//! Queue adapter contract shared by the worker and the operator tooling.
//!
//! The dispatcher only ever talks to a [`JobQueue`]; the broker behind it is
//! swappable (Redis in production, in-memory in tests).

use crate::types::JobKind;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// A job could not be serialized for its queue (raised by `push_job`).
    /// Undecodable deliveries never surface here: the dispatcher decodes
    /// payloads itself and drops the ones that fail.
    #[error("malformed job payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("destination '{destination}' rejected the message: {reason}")]
    Rejected { destination: String, reason: String },
}

/// One message taken from a kind queue, held in flight until it is
/// acknowledged or negatively acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub kind: JobKind,
    pub payload: String,
}

impl Delivery {
    pub fn new(kind: JobKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Wait up to `wait` for the next message of `kind`. `Ok(None)` on timeout.
    async fn next_delivery(
        &self,
        kind: JobKind,
        wait: Duration,
    ) -> Result<Option<Delivery>, QueueError>;

    /// Publish a serialized result to a named destination
    async fn publish(&self, destination: &str, payload: &str) -> Result<(), QueueError>;

    /// Settle a delivery as done. Called exactly once per successful job.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Settle a delivery as failed; `requeue` puts it back for redelivery,
    /// otherwise it is dropped.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError>;
}
