use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::ProcessError;

#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Timeout,
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let start = std::time::Instant::now();

        tracing::debug!(
            "executing subprocess: {} {}",
            command.program,
            command.args.join(" ")
        );

        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::CommandNotFound(command.program.clone())
            } else {
                ProcessError::Io(e)
            }
        })?;

        let cancel = command.cancel.clone().unwrap_or_default();
        let wait = child.wait_with_output();
        tokio::pin!(wait);

        let output = if let Some(timeout_duration) = command.timeout {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProcessError::Cancelled),
                result = tokio::time::timeout(timeout_duration, &mut wait) => match result {
                    Ok(output) => output.map_err(ProcessError::Io)?,
                    Err(_) => return Err(ProcessError::Timeout(timeout_duration)),
                },
            }
        } else {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProcessError::Cancelled),
                output = &mut wait => output.map_err(ProcessError::Io)?,
            }
        };

        let duration = start.elapsed();

        let status = if output.status.success() {
            ExitStatus::Success
        } else if let Some(code) = output.status.code() {
            ExitStatus::Error(code)
        } else {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = output.status.signal() {
                    ExitStatus::Signal(signal)
                } else {
                    ExitStatus::Error(1)
                }
            }
            #[cfg(not(unix))]
            {
                ExitStatus::Error(1)
            }
        };

        let result = ProcessOutput {
            status: status.clone(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration,
        };

        match &status {
            ExitStatus::Success => {
                tracing::debug!(
                    "subprocess completed in {:?}: {} {}",
                    duration,
                    command.program,
                    command.args.join(" ")
                );
            }
            ExitStatus::Error(code) => {
                tracing::warn!(
                    "subprocess failed with exit code {} in {:?}: {} {}",
                    code,
                    duration,
                    command.program,
                    command.args.join(" ")
                );
                if !result.stderr.is_empty() {
                    tracing::debug!("stderr: {}", result.stderr);
                }
            }
            ExitStatus::Signal(signal) => {
                tracing::warn!(
                    "subprocess terminated by signal {}: {} {}",
                    signal,
                    command.program,
                    command.args.join(" ")
                );
            }
            ExitStatus::Timeout => {}
        }

        Ok(result)
    }
}
