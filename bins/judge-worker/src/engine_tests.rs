/// Integration tests for the process engine
///
/// These tests run real child processes through `sh`-based recipes:
/// 1. Output capture, stream merge order and trimming
/// 2. Build failures and spawn failures
/// 3. Non-zero exits and timeouts (including surviving grandchildren)
/// 4. Output truncation under concurrent stream floods
/// 5. Scratch directory cleanup on every exit path
///
/// Per-language toolchain tests are ignored by default.

mod process_engine_tests {
    use crate::capture::TRUNCATION_MARKER;
    use crate::config::{LanguageRecipe, LanguageRegistry};
    use crate::engine::{ExecutionLimits, FailureKind, ProcessEngine};
    use judge_common::types::ExecutionStatus;
    use std::path::Path;
    use std::time::{Duration, Instant};

    fn sh_registry() -> LanguageRegistry {
        let mut registry = LanguageRegistry::empty();
        registry.register("sh", LanguageRecipe::new("sh", &[], &["sh", "{source}"]));
        // syntax check as the build step
        registry.register(
            "checked-sh",
            LanguageRecipe::new("sh", &["sh", "-n", "{source}"], &["sh", "{source}"]),
        );
        // build produces an artifact next to the source
        registry.register(
            "copied-sh",
            LanguageRecipe::new("sh", &["cp", "{source}", "{binary}"], &["sh", "{binary}"]),
        );
        // a compiler that floods its diagnostics far past the output budget
        registry.register(
            "noisy-build",
            LanguageRecipe::new(
                "sh",
                &["sh", "-c", "yes 'warning: noise' | head -n 200000 >&2; exit 1"],
                &["sh", "{source}"],
            ),
        );
        registry.register(
            "missing-compiler",
            LanguageRecipe::new("x", &["judge-no-such-compiler", "{source}"], &["{binary}"]),
        );
        registry.register(
            "missing-interpreter",
            LanguageRecipe::new("x", &[], &["judge-no-such-interpreter", "{source}"]),
        );
        registry
    }

    fn engine_with(limits: ExecutionLimits, scratch: &Path) -> ProcessEngine {
        ProcessEngine::new(sh_registry(), limits, 4).with_scratch_root(scratch)
    }

    fn engine(scratch: &Path) -> ProcessEngine {
        engine_with(ExecutionLimits::default(), scratch)
    }

    fn short_timeout() -> ExecutionLimits {
        ExecutionLimits {
            run_timeout: Duration::from_secs(1),
            ..ExecutionLimits::default()
        }
    }

    fn scratch_entries(scratch: &Path) -> usize {
        std::fs::read_dir(scratch).unwrap().count()
    }

    #[tokio::test]
    async fn test_prints_and_trims() {
        let scratch = tempfile::tempdir().unwrap();
        let outcome = engine(scratch.path()).execute("echo '  hello  '\necho", "sh").await;

        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.output, "hello");
        assert_eq!(outcome.failure, None);
        assert!(outcome.duration_secs > 0.0);
    }

    #[tokio::test]
    async fn test_empty_output_is_success() {
        let scratch = tempfile::tempdir().unwrap();
        let outcome = engine(scratch.path()).execute("true", "sh").await;

        assert!(outcome.is_success());
        assert_eq!(outcome.output, "");
    }

    #[tokio::test]
    async fn test_stdout_precedes_stderr() {
        let scratch = tempfile::tempdir().unwrap();
        let outcome = engine(scratch.path())
            .execute("echo err >&2\necho out", "sh")
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.output, "out\nerr");
    }

    #[tokio::test]
    async fn test_nonzero_exit_annotated() {
        let scratch = tempfile::tempdir().unwrap();
        let outcome = engine(scratch.path())
            .execute("echo partial\nexit 3", "sh")
            .await;

        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert_eq!(outcome.failure, Some(FailureKind::RuntimeFailure));
        assert!(outcome.output.starts_with("partial\n(exit error:"));
        assert!(outcome.output.contains('3'));
        assert!(outcome.duration_secs > 0.0);
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out_at_three_seconds() {
        let scratch = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let outcome = engine(scratch.path())
            .execute("echo started\nwhile true; do :; done", "sh")
            .await;

        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert_eq!(outcome.failure, Some(FailureKind::Timeout));
        assert_eq!(outcome.output, "started\n[timeout: 3s exceeded]");
        assert!(outcome.duration_secs >= 3.0);
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let scratch = tempfile::tempdir().unwrap();
        let started = Instant::now();
        // the background sleep inherits the pipes and would hold them open
        let outcome = engine_with(short_timeout(), scratch.path())
            .execute("sleep 30 &\nsleep 30", "sh")
            .await;

        assert_eq!(outcome.failure, Some(FailureKind::Timeout));
        assert_eq!(outcome.output, "[timeout: 1s exceeded]");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_exited_parent_with_lingering_child_times_out() {
        let scratch = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let outcome = engine_with(short_timeout(), scratch.path())
            .execute("echo bye\nsleep 30 &", "sh")
            .await;

        // the pipe stays open until the deadline kills the group
        assert_eq!(outcome.failure, Some(FailureKind::Timeout));
        assert!(outcome.output.starts_with("bye"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn test_capture_kept_when_escaped_process_holds_pipes() {
        let scratch = tempfile::tempdir().unwrap();
        let started = Instant::now();
        // setsid moves the sleep out of the process group, so the kill misses it
        let outcome = engine_with(short_timeout(), scratch.path())
            .execute("echo kept\nsetsid sleep 5 &", "sh")
            .await;

        assert_eq!(outcome.failure, Some(FailureKind::Timeout));
        assert_eq!(outcome.output, "kept\n[timeout: 1s exceeded]");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_output_truncated_on_line_boundary() {
        let scratch = tempfile::tempdir().unwrap();
        let limits = ExecutionLimits {
            max_output_bytes: 1024,
            ..ExecutionLimits::default()
        };
        let source = "i=0\nwhile [ $i -lt 5000 ]; do echo \"line $i\"; i=$((i+1)); done";
        let outcome = engine_with(limits, scratch.path()).execute(source, "sh").await;

        assert!(outcome.is_success());
        assert!(outcome.output.ends_with(TRUNCATION_MARKER));
        let body = outcome.output.trim_end_matches(TRUNCATION_MARKER).trim_end();
        assert!(body.len() <= 1024);
        assert!(body.lines().all(|line| line.starts_with("line ")));
    }

    #[tokio::test]
    async fn test_flooding_both_streams_does_not_deadlock() {
        let scratch = tempfile::tempdir().unwrap();
        let source = "(yes out | head -n 200000) &\n(yes err | head -n 200000 >&2)\nwait";
        let started = Instant::now();
        let outcome = engine(scratch.path()).execute(source, "sh").await;

        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert!(outcome.output.ends_with(TRUNCATION_MARKER));
        assert!(outcome.output.len() <= 16 * 1024 + TRUNCATION_MARKER.len() + 2);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_build_failure_reports_diagnostics_with_zero_duration() {
        let scratch = tempfile::tempdir().unwrap();
        let outcome = engine(scratch.path())
            .execute("if then fi (", "checked-sh")
            .await;

        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert_eq!(outcome.failure, Some(FailureKind::BuildFailure));
        assert_eq!(outcome.duration_secs, 0.0);
        assert!(!outcome.output.is_empty());
    }

    #[tokio::test]
    async fn test_build_diagnostics_capped_by_output_budget() {
        let scratch = tempfile::tempdir().unwrap();
        let outcome = engine(scratch.path()).execute("echo unused", "noisy-build").await;

        assert_eq!(outcome.failure, Some(FailureKind::BuildFailure));
        assert_eq!(outcome.duration_secs, 0.0);
        assert!(outcome.output.starts_with("warning: noise\n"));
        assert!(outcome.output.ends_with(TRUNCATION_MARKER));
        assert!(outcome.output.len() <= 16 * 1024 + TRUNCATION_MARKER.len() + 2);
    }

    #[tokio::test]
    async fn test_build_then_run() {
        let scratch = tempfile::tempdir().unwrap();
        let outcome = engine(scratch.path())
            .execute("echo built", "copied-sh")
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.output, "built");
    }

    #[tokio::test]
    async fn test_missing_build_tool_is_build_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let outcome = engine(scratch.path())
            .execute("whatever", "missing-compiler")
            .await;

        assert_eq!(outcome.failure, Some(FailureKind::BuildFailure));
        assert_eq!(outcome.duration_secs, 0.0);
        assert!(outcome.output.starts_with("failed to start build:"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let outcome = engine(scratch.path())
            .execute("whatever", "missing-interpreter")
            .await;

        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert_eq!(outcome.failure, Some(FailureKind::SpawnFailure));
        assert!(outcome.output.starts_with("failed to start:"));
    }

    #[tokio::test]
    async fn test_scratch_removed_on_every_exit_path() {
        let scratch = tempfile::tempdir().unwrap();
        let engine = engine_with(short_timeout(), scratch.path());

        engine.execute("echo ok", "sh").await;
        engine.execute("exit 1", "sh").await;
        engine.execute("if then", "checked-sh").await;
        engine.execute("echo artifact", "copied-sh").await;
        engine.execute("x", "missing-compiler").await;
        engine.execute("x", "missing-interpreter").await;
        engine.execute("while true; do :; done", "sh").await;
        engine.execute("x", "unknown").await;

        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_concurrent_executions_are_isolated() {
        let scratch = tempfile::tempdir().unwrap();
        let engine = engine(scratch.path());

        let (a, b, c) = tokio::join!(
            engine.execute("echo a", "sh"),
            engine.execute("echo b >&2", "sh"),
            engine.execute("echo c", "copied-sh"),
        );

        assert_eq!(a.output, "a");
        assert_eq!(b.output, "b");
        assert_eq!(c.output, "c");
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    fn toolchain_engine() -> ProcessEngine {
        ProcessEngine::new(LanguageRegistry::builtin(), ExecutionLimits::default(), 1)
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_python_hello() {
        let outcome = toolchain_engine().execute("print('hello')", "python").await;
        assert!(outcome.is_success());
        assert_eq!(outcome.output, "hello");
    }

    #[tokio::test]
    #[ignore] // Requires node
    async fn test_javascript_hello() {
        let outcome = toolchain_engine()
            .execute("console.log([1, 2, 3])", "javascript")
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.output, "[ 1, 2, 3 ]");
    }

    #[tokio::test]
    #[ignore] // Requires go
    async fn test_go_build_and_run() {
        let source = "package main\nimport \"fmt\"\nfunc main() { fmt.Println(42) }\n";
        let outcome = toolchain_engine().execute(source, "go").await;
        assert!(outcome.is_success(), "{}", outcome.output);
        assert_eq!(outcome.output, "42");
    }

    #[tokio::test]
    #[ignore] // Requires gcc
    async fn test_c_build_and_run() {
        let source = "#include <stdio.h>\nint main(void) { puts(\"from c\"); return 0; }\n";
        let outcome = toolchain_engine().execute(source, "c").await;
        assert!(outcome.is_success(), "{}", outcome.output);
        assert_eq!(outcome.output, "from c");
        assert!(outcome.duration_secs > 0.0);
    }

    #[tokio::test]
    #[ignore] // Requires gcc
    async fn test_c_compilation_error() {
        let outcome = toolchain_engine()
            .execute("int main() { return 0 }", "c")
            .await;
        assert_eq!(outcome.failure, Some(FailureKind::BuildFailure));
        assert_eq!(outcome.duration_secs, 0.0);
        assert!(outcome.output.contains("error"));
    }

    #[tokio::test]
    #[ignore] // Requires a JDK
    async fn test_java_main_class() {
        let source = r#"
public class Main {
    public static void main(String[] args) {
        System.out.println("from java");
    }
}
"#;
        let outcome = toolchain_engine().execute(source, "java").await;
        assert!(outcome.is_success(), "{}", outcome.output);
        assert_eq!(outcome.output, "from java");
    }
}
