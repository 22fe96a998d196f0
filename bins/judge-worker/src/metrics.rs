// Prometheus metrics for the judge worker.
//
// One `Metrics` value is built in main and shared via Arc with the consumer
// loops and the HTTP layer. Nothing is registered globally.

use judge_common::types::{ExecutionStatus, JobKind};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    jobs_received: IntCounterVec,
    jobs_completed: IntCounterVec,
    malformed_messages: IntCounterVec,
    publish_failures: IntCounterVec,
    execution_duration: HistogramVec,
    inventory_access: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let jobs_received = IntCounterVec::new(
            Opts::new("judge_jobs_received_total", "Jobs taken off a kind queue"),
            &["kind"],
        )?;
        let jobs_completed = IntCounterVec::new(
            Opts::new("judge_jobs_completed_total", "Jobs whose result was published"),
            &["kind", "status"],
        )?;
        let malformed_messages = IntCounterVec::new(
            Opts::new(
                "judge_malformed_messages_total",
                "Messages dropped because they could not be decoded",
            ),
            &["kind"],
        )?;
        let publish_failures = IntCounterVec::new(
            Opts::new(
                "judge_publish_failures_total",
                "Results that could not be published; the job was requeued",
            ),
            &["kind"],
        )?;
        let execution_duration = HistogramVec::new(
            HistogramOpts::new(
                "judge_execution_duration_seconds",
                "Wall-clock run duration reported by the engine",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0]),
            &["language"],
        )?;
        let inventory_access = IntCounterVec::new(
            Opts::new(
                "docexec_microservice",
                "Total number of times microservice items are accessed",
            ),
            &["item_type"],
        )?;

        registry.register(Box::new(jobs_received.clone()))?;
        registry.register(Box::new(jobs_completed.clone()))?;
        registry.register(Box::new(malformed_messages.clone()))?;
        registry.register(Box::new(publish_failures.clone()))?;
        registry.register(Box::new(execution_duration.clone()))?;
        registry.register(Box::new(inventory_access.clone()))?;

        Ok(Self {
            registry,
            jobs_received,
            jobs_completed,
            malformed_messages,
            publish_failures,
            execution_duration,
            inventory_access,
        })
    }

    pub fn job_received(&self, kind: JobKind) {
        self.jobs_received.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn job_completed(&self, kind: JobKind, status: ExecutionStatus) {
        self.jobs_completed
            .with_label_values(&[kind.as_str(), status.as_str()])
            .inc();
    }

    pub fn malformed_message(&self, kind: JobKind) {
        self.malformed_messages.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn publish_failure(&self, kind: JobKind) {
        self.publish_failures.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn observe_execution(&self, language: &str, duration_secs: f64) {
        let language = language.trim().to_lowercase();
        self.execution_duration
            .with_label_values(&[language.as_str()])
            .observe(duration_secs);
    }

    pub fn inventory_accessed(&self, item_type: &str) {
        self.inventory_access.with_label_values(&[item_type]).inc();
    }

    #[cfg(test)]
    pub fn completed_count(&self, kind: JobKind, status: ExecutionStatus) -> u64 {
        self.jobs_completed
            .with_label_values(&[kind.as_str(), status.as_str()])
            .get()
    }

    #[cfg(test)]
    pub fn malformed_count(&self, kind: JobKind) -> u64 {
        self.malformed_messages.with_label_values(&[kind.as_str()]).get()
    }

    #[cfg(test)]
    pub fn publish_failure_count(&self, kind: JobKind) -> u64 {
        self.publish_failures.with_label_values(&[kind.as_str()]).get()
    }

    /// Prometheus text exposition of every registered family
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
