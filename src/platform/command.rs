/// External Command Interface
///
/// A narrow, timeout-bounded subprocess wrapper. Replaces the ad-hoc
/// subprocess calls the original system made directly to `tar`, database
/// dump tools, and the container runtime CLI, with one shared mechanism
/// used by both the Backup Orchestrator's pipeline and the Container
/// Collaborator.
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("command timed out after {0:?}")]
    TimedOut(Duration),

    #[error("failed to spawn command: {0}")]
    Spawn(String),

    #[error("command exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program` with `args`, enforcing `max_duration`. Captures stdout and
/// stderr as UTF-8 (lossily, since tool output is not guaranteed valid UTF-8).
pub async fn run(
    program: &str,
    args: &[&str],
    max_duration: Duration,
) -> Result<CommandOutput, CommandError> {
    let child = Command::new(program)
        .args(args)
        .output();

    let output = timeout(max_duration, child)
        .await
        .map_err(|_| CommandError::TimedOut(max_duration))?
        .map_err(|e| CommandError::Spawn(e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(CommandError::NonZeroExit {
            status: output.status.code().unwrap_or(-1),
            stderr,
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_successful_command() {
        let out = run("true", &[], Duration::from_secs(5)).await.unwrap();
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn propagates_nonzero_exit() {
        let err = run("false", &[], Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, CommandError::NonZeroExit { .. }));
    }

    #[tokio::test]
    async fn times_out_long_running_command() {
        let err = run("sleep", &["5"], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::TimedOut(_)));
    }
}
