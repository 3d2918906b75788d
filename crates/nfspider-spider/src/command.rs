//! Bounded execution of external helper programs.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::runtime::{Builder, Handle};
use tracing::debug;

use crate::error::CommandError;

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

/// Run `program` with `args`, killing it if it outlives `timeout`.
///
/// Blocks the calling thread. Call it from blocking code only (for example
/// inside `spawn_blocking`), never from an async task.
pub fn run(program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput, CommandError> {
    debug!(program, ?args, "running helper");
    match Handle::try_current() {
        Ok(handle) => handle.block_on(run_async(program, args, timeout)),
        Err(_) => {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|source| CommandError::Runtime {
                    program: program.to_string(),
                    source,
                })?;
            runtime.block_on(run_async(program, args, timeout))
        }
    }
}

async fn run_async(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| CommandError::TimedOut {
            program: program.to_string(),
            timeout,
        })?
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        return Err(CommandError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr,
        });
    }
    Ok(CommandOutput { stdout, stderr })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_run_captures_stdout() {
        let out = run("sh", &args(&["-c", "echo /srv/a 10.0.0.0/8"]), Duration::from_secs(5))
            .unwrap();
        assert_eq!(out.stdout.trim(), "/srv/a 10.0.0.0/8");
    }

    #[test]
    fn test_run_reports_failure() {
        let err = run("sh", &args(&["-c", "echo nope >&2; exit 3"]), Duration::from_secs(5))
            .unwrap_err();
        match err {
            CommandError::Failed { stderr, .. } => assert_eq!(stderr, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_times_out() {
        let err = run("sleep", &args(&["5"]), Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));
    }

    #[test]
    fn test_run_missing_program() {
        let err = run("/nonexistent/showmount", &[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_from_blocking_pool() {
        let out = tokio::task::spawn_blocking(|| {
            run("sh", &args(&["-c", "echo ok"]), Duration::from_secs(5))
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(out.stdout.trim(), "ok");
    }
}
