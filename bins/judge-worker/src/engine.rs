/// Execution Engine - compile-and-run pipeline for untrusted submissions
///
/// **Core Responsibility:**
/// Turn (source text, language tag) into an [`ExecutionOutcome`]: build if the
/// recipe asks for it, run under a wall-clock deadline, capture bounded output.
///
/// **Boundary:**
/// - Engine knows HOW to execute (recipes, processes, pipes, deadlines)
/// - Engine does NOT grade output; the evaluator does
/// - Engine never fails with a Rust error: every terminal condition is an outcome
///
/// **Isolation:**
/// Process-level only. Each job gets its own scratch directory and its own
/// process group; there is no container, namespace or cgroup boundary.

use crate::capture::{drain_lines, BoundedOutput};
use crate::config::{LanguageRegistry, RecipePaths};
use judge_common::types::ExecutionStatus;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Safety limit to keep pathological payloads off the disk
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB

/// How long a killed child's pipes get to flush into the capture tasks
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    UnsupportedLanguage,
    SourceTooLarge,
    Workspace,
    BuildFailure,
    SpawnFailure,
    RuntimeFailure,
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnsupportedLanguage => "unsupported_language",
            FailureKind::SourceTooLarge => "source_too_large",
            FailureKind::Workspace => "workspace",
            FailureKind::BuildFailure => "build_failure",
            FailureKind::SpawnFailure => "spawn_failure",
            FailureKind::RuntimeFailure => "runtime_failure",
            FailureKind::Timeout => "timeout",
        }
    }
}

/// Raw result of running one submission
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// Captured output, trimmed of surrounding whitespace
    pub output: String,
    pub status: ExecutionStatus,
    /// Wall-clock seconds since the run process was spawned; 0 when no
    /// runnable process ever existed
    pub duration_secs: f64,
    pub failure: Option<FailureKind>,
}

impl ExecutionOutcome {
    pub fn success(output: &str, duration_secs: f64) -> Self {
        Self {
            output: output.trim().to_string(),
            status: ExecutionStatus::Success,
            duration_secs,
            failure: None,
        }
    }

    pub fn failure(kind: FailureKind, output: &str, duration_secs: f64) -> Self {
        Self {
            output: output.trim().to_string(),
            status: ExecutionStatus::Error,
            duration_secs,
            failure: Some(kind),
        }
    }

    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionLimits {
    pub run_timeout: Duration,
    /// Combined stdout + stderr budget
    pub max_output_bytes: usize,
    pub max_source_bytes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(3),
            max_output_bytes: 16 * 1024,
            max_source_bytes: MAX_SOURCE_CODE_BYTES,
        }
    }
}

impl ExecutionLimits {
    /// Fixed marker appended to the output of a run that hit the deadline
    pub fn timeout_marker(&self) -> String {
        format!("[timeout: {}s exceeded]", self.run_timeout.as_secs_f64())
    }
}

/// Process-based execution engine.
///
/// Cheap to share behind an `Arc`; the semaphore bounds how many jobs build
/// or run at once across every consumer loop and the HTTP surface.
pub struct ProcessEngine {
    registry: Arc<LanguageRegistry>,
    limits: ExecutionLimits,
    scratch_root: PathBuf,
    permits: Arc<Semaphore>,
}

impl ProcessEngine {
    pub fn new(registry: LanguageRegistry, limits: ExecutionLimits, max_concurrent: usize) -> Self {
        Self {
            registry: Arc::new(registry),
            limits,
            scratch_root: std::env::temp_dir(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Create per-job scratch directories under `root` instead of the system temp dir
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Build (if needed) and run `source` as `language`.
    ///
    /// The scratch directory holding the source, binaries and class files is
    /// removed on every return path, and on unwind, by the `TempDir` guard.
    #[instrument(skip(self, source), fields(language = %language, source_bytes = source.len()))]
    pub async fn execute(&self, source: &str, language: &str) -> ExecutionOutcome {
        let recipe = match self.registry.recipe_for(language) {
            Ok(recipe) => recipe,
            Err(e) => {
                warn!("Rejected job for unsupported language");
                return ExecutionOutcome::failure(FailureKind::UnsupportedLanguage, &e.to_string(), 0.0);
            }
        };

        if source.len() > self.limits.max_source_bytes {
            return ExecutionOutcome::failure(
                FailureKind::SourceTooLarge,
                &format!(
                    "source code exceeds maximum size of {} bytes",
                    self.limits.max_source_bytes
                ),
                0.0,
            );
        }

        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return ExecutionOutcome::failure(FailureKind::Workspace, "execution pool is closed", 0.0);
            }
        };

        let workspace = match tempfile::Builder::new()
            .prefix("judge-")
            .tempdir_in(&self.scratch_root)
        {
            Ok(dir) => dir,
            Err(e) => {
                return ExecutionOutcome::failure(
                    FailureKind::Workspace,
                    &format!("cannot create scratch directory: {}", e),
                    0.0,
                );
            }
        };

        let paths = recipe.paths_in(workspace.path());
        if let Err(e) = tokio::fs::write(&paths.source, source).await {
            return ExecutionOutcome::failure(
                FailureKind::Workspace,
                &format!("cannot write source file: {}", e),
                0.0,
            );
        }
        debug!(
            scratch = %paths.dir.display(),
            needs_build = recipe.needs_build(),
            "Source written"
        );

        let outcome = match recipe.build_command(&paths) {
            Some(build) => match self.build(&build, &paths).await {
                Ok(()) => self.run(&recipe.run_command(&paths), &paths.dir).await,
                Err(outcome) => outcome,
            },
            None => self.run(&recipe.run_command(&paths), &paths.dir).await,
        };

        let scratch = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(path = %scratch.display(), error = %e, "Failed to remove scratch directory");
        }

        outcome
    }

    /// Run the build step to completion. No deadline applies here.
    ///
    /// Compiler output is drained through the same bounded capture as a run,
    /// so a noisy build never holds more than the output budget in memory.
    async fn build(&self, argv: &[String], paths: &RecipePaths) -> Result<(), ExecutionOutcome> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(());
        };

        let limit = self.limits.max_output_bytes;
        let started = Instant::now();
        let spawned = Command::new(program)
            .args(args)
            .current_dir(&paths.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return Err(ExecutionOutcome::failure(
                    FailureKind::BuildFailure,
                    &format!("failed to start build: {}", e),
                    0.0,
                ));
            }
        };

        let stdout_drain = child.stdout.take().map(|s| StreamDrain::spawn(s, limit));
        let stderr_drain = child.stderr.take().map(|s| StreamDrain::spawn(s, limit));
        let stdout = collect(stdout_drain, limit).await;
        let stderr = collect(stderr_drain, limit).await;

        match child.wait().await {
            Err(e) => Err(ExecutionOutcome::failure(
                FailureKind::BuildFailure,
                &format!("failed to wait for build: {}", e),
                0.0,
            )),
            Ok(status) if !status.success() => {
                let combined = BoundedOutput::merge(&stdout, &stderr, limit);
                info!(
                    build_ms = started.elapsed().as_millis() as u64,
                    %status,
                    truncated = combined.is_truncated(),
                    "Build failed"
                );
                Err(ExecutionOutcome::failure(
                    FailureKind::BuildFailure,
                    &combined.render(),
                    0.0,
                ))
            }
            Ok(_) => {
                debug!(build_ms = started.elapsed().as_millis() as u64, "Build succeeded");
                Ok(())
            }
        }
    }

    /// Spawn the run command under the deadline and capture both streams
    async fn run(&self, argv: &[String], dir: &Path) -> ExecutionOutcome {
        let Some((program, args)) = argv.split_first() else {
            return ExecutionOutcome::failure(FailureKind::SpawnFailure, "empty run command", 0.0);
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let limit = self.limits.max_output_bytes;

        // the deadline covers the run only, never the build
        let started = Instant::now();
        let deadline = started + self.limits.run_timeout;

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionOutcome::failure(
                    FailureKind::SpawnFailure,
                    &format!("failed to start: {}", e),
                    0.0,
                );
            }
        };
        let pid = child.id();

        let mut stdout_drain = child.stdout.take().map(|s| StreamDrain::spawn(s, limit));
        let mut stderr_drain = child.stderr.take().map(|s| StreamDrain::spawn(s, limit));

        let mut stdout_capture: Option<BoundedOutput> = None;
        let mut stderr_capture: Option<BoundedOutput> = None;

        // drains first, then wait: a child blocked on a full pipe never exits
        let waited = tokio::time::timeout_at(deadline, async {
            if let Some(drain) = stdout_drain.as_mut() {
                stdout_capture = Some(settle((&mut drain.handle).await, limit));
            }
            if let Some(drain) = stderr_drain.as_mut() {
                stderr_capture = Some(settle((&mut drain.handle).await, limit));
            }
            child.wait().await
        })
        .await;

        let duration_secs;
        let exit = match waited {
            Ok(exit) => {
                duration_secs = started.elapsed().as_secs_f64();
                Some(exit)
            }
            Err(_) => {
                duration_secs = started.elapsed().as_secs_f64();
                kill_process_group(pid);
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Child already gone at deadline");
                }
                if let Err(e) = child.wait().await {
                    warn!(error = %e, "Failed to reap timed-out child");
                }
                None
            }
        };

        // only reached with unfinished drains after a timeout
        if stdout_capture.is_none() {
            stdout_capture = Some(collect_after_kill(stdout_drain.take(), limit).await);
        }
        if stderr_capture.is_none() {
            stderr_capture = Some(collect_after_kill(stderr_drain.take(), limit).await);
        }

        let stdout = stdout_capture.unwrap_or_else(|| BoundedOutput::new(limit));
        let stderr = stderr_capture.unwrap_or_else(|| BoundedOutput::new(limit));
        let merged = BoundedOutput::merge(&stdout, &stderr, limit);
        if merged.is_truncated() {
            debug!(limit, "Output truncated");
        }
        let output = merged.render();
        let output = output.trim();

        match exit {
            None => {
                warn!(
                    duration_secs,
                    timeout_secs = self.limits.run_timeout.as_secs_f64(),
                    "Execution timed out; process group killed"
                );
                ExecutionOutcome::failure(
                    FailureKind::Timeout,
                    &format!("{}\n{}", output, self.limits.timeout_marker()),
                    duration_secs,
                )
            }
            Some(Err(e)) => ExecutionOutcome::failure(
                FailureKind::RuntimeFailure,
                &format!("{}\n(exit error: {})", output, e),
                duration_secs,
            ),
            Some(Ok(status)) if !status.success() => {
                debug!(%status, duration_secs, "Process exited with error");
                ExecutionOutcome::failure(
                    FailureKind::RuntimeFailure,
                    &format!("{}\n(exit error: {})", output, status),
                    duration_secs,
                )
            }
            Some(Ok(_)) => ExecutionOutcome::success(output, duration_secs),
        }
    }
}

fn settle(
    joined: Result<BoundedOutput, tokio::task::JoinError>,
    limit: usize,
) -> BoundedOutput {
    joined.unwrap_or_else(|e| {
        warn!(error = %e, "Output drain task failed");
        BoundedOutput::new(limit)
    })
}

/// A capture task for one stream, plus the switch that ends it before EOF
struct StreamDrain {
    handle: JoinHandle<BoundedOutput>,
    stop: oneshot::Sender<()>,
}

impl StreamDrain {
    fn spawn<R>(reader: R, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (stop, stopped) = oneshot::channel();
        // dropping `stop` ends the drain too
        let handle = tokio::spawn(drain_lines(reader, limit, async move {
            let _ = stopped.await;
        }));
        Self { handle, stop }
    }
}

/// Wait for a drain to reach EOF
async fn collect(drain: Option<StreamDrain>, limit: usize) -> BoundedOutput {
    let Some(StreamDrain { handle, stop: _stop }) = drain else {
        return BoundedOutput::new(limit);
    };
    settle(handle.await, limit)
}

/// Give a drain a short grace period to see EOF after the kill, then stop it
/// and keep what it captured so far
async fn collect_after_kill(drain: Option<StreamDrain>, limit: usize) -> BoundedOutput {
    let Some(StreamDrain { mut handle, stop }) = drain else {
        return BoundedOutput::new(limit);
    };

    match tokio::time::timeout(DRAIN_GRACE, &mut handle).await {
        Ok(joined) => settle(joined, limit),
        Err(_) => {
            debug!("Stopping output drain still held open by a surviving process");
            let _ = stop.send(());
            settle(handle.await, limit)
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!(pid, error = %e, "killpg failed");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
