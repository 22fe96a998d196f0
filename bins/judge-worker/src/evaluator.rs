/// Output Evaluator - Language-Agnostic Grading Logic
///
/// **Core Responsibility:**
/// Decide whether a run's captured output answers a test case.
///
/// **Critical Properties:**
/// - Knows nothing about processes or toolchains
/// - Knows nothing about Redis
/// - Pure function: (actual output, expected output) → verdict
///
/// **Equivalence Ladder (first match wins):**
/// 1. Exact equality after trimming surrounding whitespace on both sides
/// 2. Both sides are JSON: deep structural equality (key order and
///    formatting ignored; value types, numbers and array order respected)
/// 3. Equality after stripping every space and newline character
///
/// A run that did not succeed is never compared; it fails with its own
/// output as the error message.

use crate::engine::ExecutionOutcome;
use judge_common::types::ExecutionStatus;
use serde_json::Value;

/// Pass/fail decision for one graded job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestVerdict {
    pub passed: bool,
    /// Only set when the run itself errored
    pub error_message: Option<String>,
}

impl TestVerdict {
    pub fn passed() -> Self {
        Self {
            passed: true,
            error_message: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            passed: false,
            error_message: None,
        }
    }
}

/// Grade an execution outcome against an expected answer
pub fn grade(outcome: &ExecutionOutcome, expected: &str) -> TestVerdict {
    match outcome.status {
        ExecutionStatus::Error => TestVerdict {
            passed: false,
            error_message: Some(outcome.output.clone()),
        },
        ExecutionStatus::Success if is_equivalent(&outcome.output, expected) => TestVerdict::passed(),
        ExecutionStatus::Success => TestVerdict::failed(),
    }
}

pub fn is_equivalent(actual: &str, expected: &str) -> bool {
    let actual = actual.trim();
    let expected = expected.trim();

    if actual == expected {
        return true;
    }

    if let (Ok(a), Ok(e)) = (
        serde_json::from_str::<Value>(actual),
        serde_json::from_str::<Value>(expected),
    ) {
        return json_equal(&a, &e);
    }

    strip_layout(actual) == strip_layout(expected)
}

/// Deep equality where numbers compare by value, so `1` and `1.0` agree
fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| json_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, l)| y.get(key).is_some_and(|r| json_equal(l, r)))
        }
        _ => a == b,
    }
}

fn strip_layout(text: &str) -> String {
    text.chars().filter(|c| *c != ' ' && *c != '\n').collect()
}
