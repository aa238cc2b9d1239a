//! Stack plan executor
//!
//! Runs each stack's command once everything it requires has completed,
//! several stacks at a time, and publishes the status table as a loop frame
//! so the console redraws it in place.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::log::jsonl::{OutcomeStatus, StackOutcome};
use crate::log::record::LoopId;
use crate::plan::config::PlanConfig;
use crate::plan::graph::{dependents_of, ready_stacks};
use crate::plan::status::{StackStatus, StatusBoard};

/// Captured result of a finished process
#[derive(Debug)]
pub struct CommandOutput {
    /// Last non-blank line written to stderr
    pub last_stderr_line: Option<String>,
    /// Process exit code (None if killed by signal)
    pub exit_code: Option<i32>,
    /// Wall-clock duration in seconds
    pub duration_secs: u64,
}

/// Result of running one stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackResult {
    /// Name of the stack
    pub name: String,
    /// Whether the command exited with status 0
    pub success: bool,
    /// Process exit code (None if killed by signal or never started)
    pub exit_code: Option<i32>,
    /// Duration of the command in seconds
    pub duration_secs: u64,
    /// Last stderr line on failure, or the spawn error
    pub detail: Option<String>,
}

impl StackResult {
    fn from_output(name: String, output: Result<CommandOutput>) -> Self {
        match output {
            Ok(output) => {
                let success = output.exit_code == Some(0);
                let detail = if success {
                    None
                } else {
                    output.last_stderr_line
                };
                Self {
                    name,
                    success,
                    exit_code: output.exit_code,
                    duration_secs: output.duration_secs,
                    detail,
                }
            }
            Err(err) => Self {
                name,
                success: false,
                exit_code: None,
                duration_secs: 0,
                detail: Some(format!("{err:#}")),
            },
        }
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// One outcome per stack, in plan order
    pub outcomes: Vec<StackOutcome>,
    /// Wall-clock duration of the run in seconds
    pub duration_secs: u64,
}

impl RunSummary {
    /// Whether every stack completed
    #[must_use]
    pub fn success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == OutcomeStatus::Complete)
    }

    /// Number of stacks that ended with `status`
    #[must_use]
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Outcome of a stack by name
    #[must_use]
    pub fn outcome(&self, stack: &str) -> Option<&StackOutcome> {
        self.outcomes.iter().find(|o| o.stack == stack)
    }
}

/// Runs a stack plan
pub struct PlanExecutor {
    plan: PlanConfig,
}

impl PlanExecutor {
    /// Create a new executor for the given plan
    #[must_use]
    pub const fn new(plan: PlanConfig) -> Self {
        Self { plan }
    }

    /// Run every stack of the plan.
    ///
    /// Stacks start as soon as their requirements complete, up to
    /// `max_parallel` at once. A failed stack skips everything that depends
    /// on it (or everything still pending, with `fail_fast`). The status
    /// table is emitted after every change and on each refresh tick.
    pub async fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        let loop_id = LoopId::fresh();
        let mut board = StatusBoard::new(&self.plan);
        let mut results: HashMap<String, StackResult> = HashMap::new();
        let mut tasks: JoinSet<StackResult> = JoinSet::new();
        let mut halted = false;

        let mut ticker = tokio::time::interval(Duration::from_millis(self.plan.global.refresh_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.launch_ready(&mut board, &mut tasks);
        emit_frame(loop_id, &board);

        while !tasks.is_empty() {
            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    let result = joined.context("Stack task panicked")?;
                    halted |= self.record_result(&mut board, &result);
                    results.insert(result.name.clone(), result);
                    if !halted {
                        self.launch_ready(&mut board, &mut tasks);
                    }
                    emit_frame(loop_id, &board);
                }
                _ = ticker.tick() => emit_frame(loop_id, &board),
            }
        }

        for name in board.pending() {
            board.set(
                &name,
                StackStatus::Skipped {
                    reason: "not started".to_string(),
                },
            );
        }
        emit_frame(loop_id, &board);

        Ok(RunSummary {
            outcomes: collect_outcomes(&board, &results),
            duration_secs: start.elapsed().as_secs(),
        })
    }

    /// Start every ready stack that fits under the parallelism limit.
    fn launch_ready(&self, board: &mut StatusBoard, tasks: &mut JoinSet<StackResult>) {
        let limit = match self.plan.global.max_parallel {
            0 => usize::MAX,
            n => n,
        };

        for stack in ready_stacks(&self.plan, board) {
            if board.running_count() >= limit {
                break;
            }
            board.set(
                &stack.name,
                StackStatus::Running {
                    started: Instant::now(),
                },
            );
            debug!(stack = %stack.name, "launching");

            let name = stack.name.clone();
            let cmd = shell_command(&stack.command);
            tasks.spawn(async move { StackResult::from_output(name, run_command(cmd).await) });
        }
    }

    /// Apply a finished stack to the board. Returns true if the run must
    /// stop launching new stacks.
    fn record_result(&self, board: &mut StatusBoard, result: &StackResult) -> bool {
        if result.success {
            board.set(&result.name, StackStatus::Complete);
            info!("{}: complete in {}s", result.name, result.duration_secs);
            return false;
        }

        let status = StackStatus::Failed {
            exit_code: result.exit_code,
        };
        match &result.detail {
            Some(detail) => warn!("{}: {status}: {detail}", result.name),
            None => warn!("{}: {status}", result.name),
        }
        board.set(&result.name, status);

        for dependent in dependents_of(&self.plan, &result.name) {
            if board.get(dependent) == Some(&StackStatus::Pending) {
                board.set(
                    dependent,
                    StackStatus::Skipped {
                        reason: format!("requires {}", result.name),
                    },
                );
                info!("{dependent}: skipped, requires {}", result.name);
            }
        }

        if self.plan.global.fail_fast {
            for name in board.pending() {
                board.set(
                    &name,
                    StackStatus::Skipped {
                        reason: format!("halted after {} failed", result.name),
                    },
                );
            }
            warn!("{} failed, not starting any more stacks", result.name);
            return true;
        }

        false
    }
}

/// Write the status board as one loop frame.
fn emit_frame(loop_id: LoopId, board: &StatusBoard) {
    for (index, line) in board.frame_lines().iter().enumerate() {
        info!(loop_id = loop_id.as_u64(), index, "{line}");
    }
}

fn collect_outcomes(board: &StatusBoard, results: &HashMap<String, StackResult>) -> Vec<StackOutcome> {
    board
        .iter()
        .map(|(name, status)| {
            let result = results.get(name);
            let (status, detail) = match status {
                StackStatus::Complete => (OutcomeStatus::Complete, None),
                StackStatus::Skipped { reason } => (OutcomeStatus::Skipped, Some(reason.clone())),
                _ => (OutcomeStatus::Failed, result.and_then(|r| r.detail.clone())),
            };
            StackOutcome {
                stack: name.to_string(),
                timestamp: Utc::now(),
                status,
                exit_code: result.and_then(|r| r.exit_code),
                duration_secs: result.map_or(0, |r| r.duration_secs),
                detail,
            }
        })
        .collect()
}

/// Build the `sh -c` invocation for a stack command.
#[must_use]
pub fn shell_command(command: &str) -> std::process::Command {
    let mut cmd = std::process::Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

/// Run a command to completion.
///
/// Nothing is echoed to the terminal: stack output would tear the status
/// table. Stdout is discarded and only the last stderr line is kept.
pub async fn run_command(cmd: std::process::Command) -> Result<CommandOutput> {
    let mut tokio_cmd = TokioCommand::from(cmd);
    tokio_cmd.stdin(Stdio::null());
    tokio_cmd.stdout(Stdio::null());
    tokio_cmd.stderr(Stdio::piped());

    let start = Instant::now();

    let mut child = tokio_cmd.spawn().context("Failed to spawn stack command")?;

    let child_stderr = child.stderr.take().context("Failed to capture stderr")?;

    // Drain stderr while waiting so the pipe never fills up
    let stderr_handle = tokio::spawn(last_nonblank_line(BufReader::new(child_stderr)));

    let status = child.wait().await.context("Failed waiting for process")?;
    let last_stderr_line = stderr_handle
        .await
        .context("stderr reader panicked")?
        .context("Failed to read stderr")?;

    Ok(CommandOutput {
        last_stderr_line,
        exit_code: status.code(),
        duration_secs: start.elapsed().as_secs(),
    })
}

/// Read `reader` to EOF and return its last non-blank line, trimmed.
///
/// Invalid UTF-8 is replaced, never treated as the end of input: dropping
/// the pipe early would kill the writer with SIGPIPE.
async fn last_nonblank_line<R>(mut reader: BufReader<R>) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut last = None;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(last);
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if !line.is_empty() {
            last = Some(line.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::handler::clear_line;
    use crate::log::layer::{LoopRenderLayer, RenderMode};
    use crate::testutil::RecordingStream;
    use tempfile::TempDir;
    use tracing_subscriber::prelude::*;

    fn plan(toml: &str) -> PlanConfig {
        PlanConfig::parse(toml).unwrap()
    }

    // --- run_command ---

    #[tokio::test]
    async fn test_run_command_discards_stdout() {
        let output = run_command(shell_command("echo line1; echo line2"))
            .await
            .unwrap();
        assert_eq!(output.last_stderr_line, None);
        assert_eq!(output.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_run_command_keeps_last_stderr_line_and_exit_code() {
        let output = run_command(shell_command(
            "echo warning >&2; echo error >&2; echo >&2; exit 42",
        ))
        .await
        .unwrap();
        assert_eq!(output.last_stderr_line.as_deref(), Some("error"));
        assert_eq!(output.exit_code, Some(42));
    }

    #[tokio::test]
    async fn test_run_command_drains_stderr_past_invalid_utf8() {
        let output = run_command(shell_command(
            "printf '\\377\\n' >&2; head -c 300000 /dev/zero | tr '\\0' 'a' >&2; echo >&2; echo done >&2; exit 0",
        ))
        .await
        .unwrap();
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.last_stderr_line.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_last_nonblank_line_replaces_invalid_utf8() {
        let input: &[u8] = b"first\n\xff\xfe tail\r\n\n   \n";
        let last = last_nonblank_line(BufReader::new(input)).await.unwrap();
        assert_eq!(last.as_deref(), Some("\u{FFFD}\u{FFFD} tail"));
    }

    #[tokio::test]
    async fn test_last_nonblank_line_without_trailing_newline() {
        let input: &[u8] = b"one\ntwo";
        let last = last_nonblank_line(BufReader::new(input)).await.unwrap();
        assert_eq!(last.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_run_command_spawn_failure() {
        let cmd = std::process::Command::new("/nonexistent/stackrun-binary");
        let err = run_command(cmd).await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }

    // --- StackResult ---

    #[test]
    fn test_stack_result_uses_last_stderr_line_on_failure() {
        let output = CommandOutput {
            last_stderr_line: Some("fatal: bucket exists".to_string()),
            exit_code: Some(1),
            duration_secs: 3,
        };
        let result = StackResult::from_output("s3".to_string(), Ok(output));
        assert!(!result.success);
        assert_eq!(result.detail.as_deref(), Some("fatal: bucket exists"));
    }

    #[test]
    fn test_stack_result_success_has_no_detail() {
        let output = CommandOutput {
            last_stderr_line: Some("noise".to_string()),
            exit_code: Some(0),
            duration_secs: 1,
        };
        let result = StackResult::from_output("vpc".to_string(), Ok(output));
        assert!(result.success);
        assert_eq!(result.detail, None);
    }

    // --- PlanExecutor ---

    #[tokio::test]
    async fn test_run_all_stacks_complete() {
        let executor = PlanExecutor::new(plan(
            r#"
[global]
refresh_ms = 20

[[stack]]
name = "vpc"
command = "true"

[[stack]]
name = "db"
command = "true"
requires = ["vpc"]
"#,
        ));

        let summary = executor.run().await.unwrap();

        assert!(summary.success());
        assert_eq!(summary.count(OutcomeStatus::Complete), 2);
        assert_eq!(summary.outcomes[0].stack, "vpc");
        assert_eq!(summary.outcomes[1].stack, "db");
        assert_eq!(summary.outcome("db").unwrap().exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_requirements_run_first() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("vpc.done");
        let executor = PlanExecutor::new(plan(&format!(
            r#"
[[stack]]
name = "app"
command = "test -f '{marker}'"
requires = ["vpc"]

[[stack]]
name = "vpc"
command = "sleep 0.1; touch '{marker}'"
"#,
            marker = marker.display()
        )));

        let summary = executor.run().await.unwrap();
        assert!(summary.success(), "{:?}", summary.outcomes);
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_does_not_fail_stack() {
        let executor = PlanExecutor::new(plan(
            r#"
[[stack]]
name = "vpc"
command = "printf '\\377\\n'; head -c 300000 /dev/zero | tr '\\0' 'a'; echo; exit 0"
"#,
        ));

        let summary = executor.run().await.unwrap();

        let vpc = summary.outcome("vpc").unwrap();
        assert_eq!(vpc.status, OutcomeStatus::Complete);
        assert_eq!(vpc.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_only() {
        let executor = PlanExecutor::new(plan(
            r#"
[[stack]]
name = "vpc"
command = "echo no quota >&2; exit 3"

[[stack]]
name = "db"
command = "true"
requires = ["vpc"]

[[stack]]
name = "app"
command = "true"
requires = ["db"]

[[stack]]
name = "dns"
command = "true"
"#,
        ));

        let summary = executor.run().await.unwrap();

        assert!(!summary.success());
        let vpc = summary.outcome("vpc").unwrap();
        assert_eq!(vpc.status, OutcomeStatus::Failed);
        assert_eq!(vpc.exit_code, Some(3));
        assert_eq!(vpc.detail.as_deref(), Some("no quota"));

        let db = summary.outcome("db").unwrap();
        assert_eq!(db.status, OutcomeStatus::Skipped);
        assert_eq!(db.detail.as_deref(), Some("requires vpc"));
        assert_eq!(
            summary.outcome("app").unwrap().detail.as_deref(),
            Some("requires vpc")
        );

        assert_eq!(summary.outcome("dns").unwrap().status, OutcomeStatus::Complete);
    }

    #[tokio::test]
    async fn test_fail_fast_skips_everything_pending() {
        let executor = PlanExecutor::new(plan(
            r#"
[global]
max_parallel = 1
fail_fast = true

[[stack]]
name = "vpc"
command = "false"

[[stack]]
name = "dns"
command = "true"
"#,
        ));

        let summary = executor.run().await.unwrap();

        assert_eq!(summary.outcome("vpc").unwrap().status, OutcomeStatus::Failed);
        let dns = summary.outcome("dns").unwrap();
        assert_eq!(dns.status, OutcomeStatus::Skipped);
        assert_eq!(dns.detail.as_deref(), Some("halted after vpc failed"));
    }

    #[tokio::test]
    async fn test_max_parallel_serializes_stacks() {
        let executor = PlanExecutor::new(plan(
            r#"
[global]
max_parallel = 1

[[stack]]
name = "a"
command = "sleep 0.2"

[[stack]]
name = "b"
command = "sleep 0.2"
"#,
        ));

        let start = Instant::now();
        let summary = executor.run().await.unwrap();

        assert!(summary.success());
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_run_renders_status_frames() {
        let stream = RecordingStream::new();
        let layer = LoopRenderLayer::new(stream.clone(), RenderMode::Redraw);
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(layer));

        let executor = PlanExecutor::new(plan(
            r#"
[[stack]]
name = "vpc"
command = "true"
"#,
        ));
        executor.run().await.unwrap();

        let writes = stream.writes();
        assert!(writes.iter().any(|w| w.starts_with("vpc: complete in")));
        assert_eq!(
            writes.last().unwrap(),
            &format!("{}vpc  complete\n", clear_line())
        );
    }
}
