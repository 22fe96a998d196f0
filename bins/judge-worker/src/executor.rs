/// Job Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Coordinate the execution engine and evaluator to produce the result
/// payload for one job.
///
/// **Architecture:**
/// 1. Run the job's source through the ProcessEngine (engine.rs)
/// 2. Grade the outcome for test kinds (evaluator.rs)
/// 3. Echo the job's identifying fields into the kind's result shape
///
/// This module is the glue layer - it knows nothing about:
/// - How code executes (engine's job)
/// - How equivalence works (evaluator's job)
/// - Where the result goes (dispatcher's job)

use crate::engine::{ExecutionOutcome, ProcessEngine};
use crate::evaluator::{self, TestVerdict};
use judge_common::types::{
    utc_timestamp, Job, JobResult, RunResult, SingleTestResult, SuiteTestResult,
};
use tracing::{info, warn};

/// Execute a job and build its result message
pub async fn execute_job(job: &Job, engine: &ProcessEngine) -> (ExecutionOutcome, JobResult) {
    info!(
        job_id = %job.job_id(),
        kind = %job.kind(),
        language = %job.language(),
        source_size = job.source().len(),
        mode = %job.mode(),
        "Starting job execution"
    );

    let outcome = engine.execute(job.source(), job.language()).await;

    if let Some(failure) = outcome.failure {
        warn!(
            job_id = %job.job_id(),
            failure = failure.as_str(),
            duration_secs = outcome.duration_secs,
            "Execution did not succeed"
        );
    }

    let result = build_result(job, &outcome);
    (outcome, result)
}

/// Pure mapping from (job, outcome) to the published payload
pub fn build_result(job: &Job, outcome: &ExecutionOutcome) -> JobResult {
    let timestamp = utc_timestamp();

    match job {
        Job::Run(job) => JobResult::Run(RunResult {
            correlation_id: job.correlation_id.clone(),
            job_id: job.job_id.clone(),
            status: outcome.status,
            output: outcome.output.clone(),
            duration: outcome.duration_secs,
            user_id: job.user_id.clone(),
            code: job.code.clone(),
            language: job.language.clone(),
            problem_id: job.problem_id.clone(),
            mode: job.mode.clone(),
            created_at: job.created_at.clone(),
            timestamp,
        }),
        Job::SingleTest(job) => {
            let TestVerdict {
                passed,
                error_message,
            } = evaluator::grade(outcome, &job.expected);
            JobResult::SingleTest(SingleTestResult {
                job_id: job.job_id.clone(),
                correlation_id: job.correlation_id.clone(),
                user_id: job.user_id.clone(),
                problem_id: job.problem_id.clone(),
                language: job.language.clone(),
                code: job.wrapped_code.clone(),
                input: job.input.clone(),
                expected: job.expected.clone(),
                actual_output: outcome.output.clone(),
                status: outcome.status,
                passed,
                error_message,
                duration: outcome.duration_secs,
                mode: job.mode.clone(),
                timestamp,
            })
        }
        Job::SuiteTest(job) => {
            let TestVerdict {
                passed,
                error_message,
            } = evaluator::grade(outcome, &job.expected);
            JobResult::SuiteTest(SuiteTestResult {
                job_id: job.job_id.clone(),
                test_case_id: job.test_case_id.clone(),
                test_case_number: job.test_case_number,
                total_test_cases: job.total_test_cases,
                correlation_id: job.correlation_id.clone(),
                user_id: job.user_id.clone(),
                problem_id: job.problem_id.clone(),
                language: job.language.clone(),
                input: job.input.clone(),
                expected: job.expected.clone(),
                actual_output: outcome.output.clone(),
                status: outcome.status,
                passed,
                error_message,
                duration: outcome.duration_secs,
                original_code: job.original_code.clone(),
                mode: job.mode.clone(),
                timestamp,
            })
        }
    }
}
