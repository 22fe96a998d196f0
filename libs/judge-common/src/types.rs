use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mode value for the ordinary delivery path. Any other value, including a
/// missing mode, routes the result to the shared re-run destination.
pub const NORMAL_MODE: &str = "normal";

/// Destination shared by every job kind when the job is a resubmission
pub const RERUN_DESTINATION: &str = "re-Run";

/// Job class. Each kind is consumed from its own queue and publishes to its
/// own result destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Run,
    SingleTest,
    SuiteTest,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Run, JobKind::SingleTest, JobKind::SuiteTest];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Run => "run",
            JobKind::SingleTest => "single-test",
            JobKind::SuiteTest => "suite-test",
        }
    }

    /// Inbound queue this kind is delivered on
    pub fn queue_name(&self) -> &'static str {
        match self {
            JobKind::Run => "programiz_execution",
            JobKind::SingleTest => "print_test_execution",
            JobKind::SuiteTest => "all_test_execution",
        }
    }

    /// Result destination for jobs in the normal mode
    pub fn result_destination(&self) -> &'static str {
        match self {
            JobKind::Run => "programmiz_result",
            JobKind::SingleTest => "print_test_result",
            JobKind::SuiteTest => "all_test_result",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "run" => Ok(JobKind::Run),
            "single-test" | "single" => Ok(JobKind::SingleTest),
            "suite-test" | "suite" => Ok(JobKind::SuiteTest),
            other => Err(format!(
                "unknown job kind '{}' (expected run, single-test or suite-test)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plain run: execute and report, no grading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunJob {
    pub job_id: String,
    #[serde(default, alias = "socketId")]
    pub correlation_id: String,
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub problem_id: String,
    #[serde(default, alias = "type")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<serde_json::Number>,
}

/// One graded test case against harness-wrapped code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleTestJob {
    pub job_id: String,
    pub language: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected: String,
    pub wrapped_code: String,
    #[serde(default, alias = "socketId")]
    pub correlation_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub problem_id: String,
    #[serde(default, alias = "type")]
    pub mode: String,
}

/// One test case out of a full suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteTestJob {
    pub job_id: String,
    #[serde(default)]
    pub test_case_id: String,
    #[serde(default)]
    pub test_case_number: u32,
    #[serde(default)]
    pub total_test_cases: u32,
    pub language: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected: String,
    pub wrapped_code: String,
    #[serde(default, alias = "socketId")]
    pub correlation_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub problem_id: String,
    #[serde(default, alias = "orginalCode")]
    pub original_code: String,
    #[serde(default, alias = "type")]
    pub mode: String,
}

/// A job decoded once at the queue boundary. The queue a message arrives on
/// decides which variant it must parse into.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Run(RunJob),
    SingleTest(SingleTestJob),
    SuiteTest(SuiteTestJob),
}

impl Job {
    pub fn decode(kind: JobKind, payload: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            JobKind::Run => Job::Run(serde_json::from_slice(payload)?),
            JobKind::SingleTest => Job::SingleTest(serde_json::from_slice(payload)?),
            JobKind::SuiteTest => Job::SuiteTest(serde_json::from_slice(payload)?),
        })
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            Job::Run(job) => serde_json::to_string(job),
            Job::SingleTest(job) => serde_json::to_string(job),
            Job::SuiteTest(job) => serde_json::to_string(job),
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Job::Run(_) => JobKind::Run,
            Job::SingleTest(_) => JobKind::SingleTest,
            Job::SuiteTest(_) => JobKind::SuiteTest,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            Job::Run(job) => &job.job_id,
            Job::SingleTest(job) => &job.job_id,
            Job::SuiteTest(job) => &job.job_id,
        }
    }

    pub fn language(&self) -> &str {
        match self {
            Job::Run(job) => &job.language,
            Job::SingleTest(job) => &job.language,
            Job::SuiteTest(job) => &job.language,
        }
    }

    /// Source text handed to the engine. Graded kinds run the wrapped variant.
    pub fn source(&self) -> &str {
        match self {
            Job::Run(job) => &job.code,
            Job::SingleTest(job) => &job.wrapped_code,
            Job::SuiteTest(job) => &job.wrapped_code,
        }
    }

    pub fn mode(&self) -> &str {
        match self {
            Job::Run(job) => &job.mode,
            Job::SingleTest(job) => &job.mode,
            Job::SuiteTest(job) => &job.mode,
        }
    }

    pub fn is_rerun(&self) -> bool {
        self.mode() != NORMAL_MODE
    }

    /// Where the result of this job is published
    pub fn destination(&self) -> &'static str {
        if self.is_rerun() {
            RERUN_DESTINATION
        } else {
            self.kind().result_destination()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub correlation_id: String,
    pub job_id: String,
    pub status: ExecutionStatus,
    pub output: String,
    pub duration: f64,
    pub user_id: String,
    pub code: String,
    pub language: String,
    pub problem_id: String,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<serde_json::Number>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleTestResult {
    pub job_id: String,
    pub correlation_id: String,
    pub user_id: String,
    pub problem_id: String,
    pub language: String,
    pub code: String,
    pub input: String,
    pub expected: String,
    pub actual_output: String,
    pub status: ExecutionStatus,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration: f64,
    pub mode: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteTestResult {
    pub job_id: String,
    pub test_case_id: String,
    pub test_case_number: u32,
    pub total_test_cases: u32,
    pub correlation_id: String,
    pub user_id: String,
    pub problem_id: String,
    pub language: String,
    pub input: String,
    pub expected: String,
    pub actual_output: String,
    pub status: ExecutionStatus,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration: f64,
    pub original_code: String,
    pub mode: String,
    pub timestamp: String,
}

/// Outbound payload, one shape per job kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobResult {
    Run(RunResult),
    SingleTest(SingleTestResult),
    SuiteTest(SuiteTestResult),
}

impl JobResult {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            JobResult::Run(r) => r.status,
            JobResult::SingleTest(r) => r.status,
            JobResult::SuiteTest(r) => r.status,
        }
    }

    /// `None` for plain runs, which are never graded
    pub fn passed(&self) -> Option<bool> {
        match self {
            JobResult::Run(_) => None,
            JobResult::SingleTest(r) => Some(r.passed),
            JobResult::SuiteTest(r) => Some(r.passed),
        }
    }
}

/// UTC wall-clock stamp with second precision
pub fn utc_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_run_job_with_legacy_keys() {
        let payload = br#"{
            "jobId": "j-1",
            "socketId": "sock-9",
            "code": "print(1)",
            "language": "python",
            "userId": "u1",
            "problemId": "p1",
            "type": "normal",
            "createdAt": 1718000000000
        }"#;

        let job = Job::decode(JobKind::Run, payload).unwrap();
        let Job::Run(run) = &job else {
            panic!("expected run job");
        };
        assert_eq!(run.correlation_id, "sock-9");
        assert_eq!(run.mode, "normal");
        assert_eq!(run.created_at.as_ref().unwrap().to_string(), "1718000000000");
        assert_eq!(job.source(), "print(1)");
        assert!(!job.is_rerun());
        assert_eq!(job.destination(), "programmiz_result");
    }

    #[test]
    fn test_missing_mode_takes_rerun_path() {
        let payload = br#"{"jobId":"j","code":"x","language":"go"}"#;
        let job = Job::decode(JobKind::Run, payload).unwrap();
        assert_eq!(job.mode(), "");
        assert!(job.is_rerun());
        assert_eq!(job.destination(), RERUN_DESTINATION);
    }

    #[test]
    fn test_rerun_mode_routes_to_shared_destination() {
        let payload = br#"{
            "jobId": "j-2",
            "language": "c",
            "wrappedCode": "int main(){}",
            "expected": "1",
            "mode": "resubmit"
        }"#;
        let job = Job::decode(JobKind::SingleTest, payload).unwrap();
        assert!(job.is_rerun());
        assert_eq!(job.destination(), RERUN_DESTINATION);
        assert_eq!(job.source(), "int main(){}");
    }

    #[test]
    fn test_suite_job_accepts_misspelled_original_code() {
        let payload = br#"{
            "jobId": "j-3",
            "testCaseId": "tc-1",
            "testCaseNumber": 2,
            "totalTestCases": 5,
            "language": "java",
            "wrappedCode": "class Main {}",
            "orginalCode": "class Solution {}",
            "mode": "normal"
        }"#;
        let job = Job::decode(JobKind::SuiteTest, payload).unwrap();
        let Job::SuiteTest(suite) = job else {
            panic!("expected suite job");
        };
        assert_eq!(suite.original_code, "class Solution {}");
        assert_eq!(suite.test_case_number, 2);
        assert_eq!(suite.total_test_cases, 5);
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        assert!(Job::decode(JobKind::Run, b"not json").is_err());
        // wrapped code is required for graded kinds
        assert!(Job::decode(JobKind::SingleTest, br#"{"jobId":"j","language":"go"}"#).is_err());
        // a plain run shape does not satisfy the suite queue
        assert!(Job::decode(
            JobKind::SuiteTest,
            br#"{"jobId":"j","code":"x","language":"go"}"#
        )
        .is_err());
        assert!(Job::decode(
            JobKind::SuiteTest,
            br#"{"jobId":"j","language":"go","wrappedCode":"x","testCaseNumber":"two"}"#
        )
        .is_err());
    }

    #[test]
    fn test_encode_then_decode_keeps_kind() {
        let job = Job::SingleTest(SingleTestJob {
            job_id: "j".into(),
            language: "python".into(),
            input: "1".into(),
            expected: "2".into(),
            wrapped_code: "print(2)".into(),
            correlation_id: "c".into(),
            user_id: "u".into(),
            problem_id: "p".into(),
            mode: NORMAL_MODE.into(),
        });
        let encoded = job.encode().unwrap();
        assert!(encoded.contains("\"wrappedCode\""));
        assert_eq!(Job::decode(JobKind::SingleTest, encoded.as_bytes()).unwrap(), job);
    }

    #[test]
    fn test_result_serialization_shape() {
        let result = JobResult::SuiteTest(SuiteTestResult {
            job_id: "j".into(),
            test_case_id: "tc".into(),
            test_case_number: 1,
            total_test_cases: 3,
            correlation_id: "c".into(),
            user_id: "u".into(),
            problem_id: "p".into(),
            language: "go".into(),
            input: String::new(),
            expected: "[1,2]".into(),
            actual_output: "[1, 2]".into(),
            status: ExecutionStatus::Success,
            passed: true,
            error_message: None,
            duration: 0.25,
            original_code: "orig".into(),
            mode: NORMAL_MODE.into(),
            timestamp: "2024-01-01 00:00:00".into(),
        });

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["actualOutput"], "[1, 2]");
        assert_eq!(value["testCaseNumber"], 1);
        assert_eq!(value["originalCode"], "orig");
        assert!(value.get("errorMessage").is_none());
        assert_eq!(result.passed(), Some(true));
    }

    #[test]
    fn test_job_kind_names() {
        assert_eq!(JobKind::Run.queue_name(), "programiz_execution");
        assert_eq!(JobKind::SingleTest.result_destination(), "print_test_result");
        assert_eq!(JobKind::SuiteTest.queue_name(), "all_test_execution");
        assert_eq!("suite-test".parse::<JobKind>().unwrap(), JobKind::SuiteTest);
        assert!("batch".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_timestamp_format() {
        let ts = utc_timestamp();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");
    }
}
