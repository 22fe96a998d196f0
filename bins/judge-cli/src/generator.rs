// Job payload generation from command-line input

use anyhow::{bail, Result};
use judge_common::types::{Job, JobKind, RunJob, SingleTestJob, SuiteTestJob, NORMAL_MODE};
use uuid::Uuid;

/// Everything `submit` collects before a job is built
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub kind: JobKind,
    pub language: String,
    pub source: String,
    pub expected: Option<String>,
    pub input: String,
    pub mode: String,
    pub user_id: String,
    pub problem_id: String,
    pub test_case_number: u32,
    pub total_test_cases: u32,
}

impl JobSpec {
    pub fn new(kind: JobKind, language: &str, source: &str) -> Self {
        Self {
            kind,
            language: language.to_string(),
            source: source.to_string(),
            expected: None,
            input: String::new(),
            mode: NORMAL_MODE.to_string(),
            user_id: String::new(),
            problem_id: String::new(),
            test_case_number: 1,
            total_test_cases: 1,
        }
    }
}

/// Build a job with a fresh id. The correlation id doubles as the job id so
/// the submitter can match results without a socket.
pub fn build_job(spec: &JobSpec) -> Result<Job> {
    if spec.language.trim().is_empty() {
        bail!("Language cannot be empty");
    }
    if spec.source.trim().is_empty() {
        eprintln!("⚠️  Source file is empty; submitting anyway");
    }

    let job_id = Uuid::new_v4().to_string();

    let job = match spec.kind {
        JobKind::Run => Job::Run(RunJob {
            job_id: job_id.clone(),
            correlation_id: job_id,
            code: spec.source.clone(),
            language: spec.language.clone(),
            user_id: spec.user_id.clone(),
            problem_id: spec.problem_id.clone(),
            mode: spec.mode.clone(),
            created_at: None,
        }),
        JobKind::SingleTest => Job::SingleTest(SingleTestJob {
            job_id: job_id.clone(),
            language: spec.language.clone(),
            input: spec.input.clone(),
            expected: required_expected(spec)?,
            wrapped_code: spec.source.clone(),
            correlation_id: job_id,
            user_id: spec.user_id.clone(),
            problem_id: spec.problem_id.clone(),
            mode: spec.mode.clone(),
        }),
        JobKind::SuiteTest => {
            if spec.test_case_number == 0 || spec.test_case_number > spec.total_test_cases {
                bail!(
                    "Test case number {} is outside 1..={}",
                    spec.test_case_number,
                    spec.total_test_cases
                );
            }
            Job::SuiteTest(SuiteTestJob {
                job_id: job_id.clone(),
                test_case_id: format!("{}-{}", job_id, spec.test_case_number),
                test_case_number: spec.test_case_number,
                total_test_cases: spec.total_test_cases,
                language: spec.language.clone(),
                input: spec.input.clone(),
                expected: required_expected(spec)?,
                wrapped_code: spec.source.clone(),
                correlation_id: job_id,
                user_id: spec.user_id.clone(),
                problem_id: spec.problem_id.clone(),
                original_code: spec.source.clone(),
                mode: spec.mode.clone(),
            })
        }
    };

    Ok(job)
}

fn required_expected(spec: &JobSpec) -> Result<String> {
    match &spec.expected {
        Some(expected) => Ok(expected.clone()),
        None => bail!("--expected is required for {} jobs", spec.kind),
    }
}
