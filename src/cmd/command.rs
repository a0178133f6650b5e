use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("error while executing command: {0}")]
    ExecutionError(#[from] std::io::Error),

    #[error("command terminated with a non success exit status code: {0}")]
    ExitStatusError(ExitStatus),

    #[error("command killed by user request")]
    Killed,
}

/// Cooperative cancellation flag shared across a pipeline run, the same
/// role `CommandKiller` plays for shelled-out processes: every suspension
/// point (network call, shell-out, loop header) checks it and bails out
/// rather than being preempted.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Thin wrapper over `std::process::Command`: logs the invocation, captures
/// stdout/stderr line by line, and honors a `CancellationToken` checked
/// before the process is even spawned.
pub struct ShellCommand {
    command: Command,
}

impl ShellCommand {
    pub fn new(binary: &str, args: &[&str], envs: &[(&str, &str)]) -> Self {
        let mut command = Command::new(binary);
        command.args(args);
        for (k, v) in envs {
            command.env(k, v);
        }
        Self { command }
    }

    pub fn exec_with_output<Stdout, Stderr>(
        &mut self,
        stdout_output: &mut Stdout,
        stderr_output: &mut Stderr,
        cancellation: &CancellationToken,
    ) -> Result<(), CommandError>
    where
        Stdout: FnMut(String),
        Stderr: FnMut(String),
    {
        if cancellation.is_cancelled() {
            return Err(CommandError::Killed);
        }

        info!(command = ?self.command, "executing shell command");
        let output = self
            .command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            stdout_output(line.to_string());
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            stderr_output(line.to_string());
        }

        if cancellation.is_cancelled() {
            return Err(CommandError::Killed);
        }

        if !output.status.success() {
            warn!(status = ?output.status, "shell command exited non zero");
            return Err(CommandError::ExitStatusError(output.status));
        }

        Ok(())
    }

    pub fn exec(&mut self, cancellation: &CancellationToken) -> Result<(), CommandError> {
        self.exec_with_output(&mut |line| info!("{line}"), &mut |line| warn!("{line}"), cancellation)
    }
}
