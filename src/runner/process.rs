//! Subprocess runner backed by `tokio::process`.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::console::Console;
use crate::error::{Error, Result};

use super::{CommandRunner, CommandSpec};

/// Runs commands as real child processes.
///
/// Stdout and stderr are read concurrently and written to the console line
/// by line as they arrive.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        working_dir: &Path,
        timeout: Duration,
        console: &dyn Console,
    ) -> Result<ExitStatus> {
        tracing::info!(
            command = %command,
            working_dir = ?working_dir,
            timeout_secs = timeout.as_secs(),
            "running package manager"
        );

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr was not piped"))?;

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        let stream = async {
            let mut stdout_open = true;
            let mut stderr_open = true;
            while stdout_open || stderr_open {
                tokio::select! {
                    line = stdout_reader.next_line(), if stdout_open => {
                        match line {
                            Ok(Some(line)) => console.write_line(&line),
                            Ok(None) => stdout_open = false,
                            Err(e) => {
                                tracing::error!(error = %e, "error reading stdout");
                                stdout_open = false;
                            }
                        }
                    }
                    line = stderr_reader.next_line(), if stderr_open => {
                        match line {
                            Ok(Some(line)) => console.write_line(&line),
                            Ok(None) => stderr_open = false,
                            Err(e) => {
                                tracing::error!(error = %e, "error reading stderr");
                                stderr_open = false;
                            }
                        }
                    }
                }
            }
            child.wait().await
        };

        match tokio::time::timeout(timeout, stream).await {
            Ok(status) => {
                let status = status?;
                tracing::debug!(command = %command, status = %status, "package manager exited");
                Ok(status)
            }
            Err(_) => {
                tracing::error!(command = %command, ?timeout, "package manager timed out");
                // Dropping the future released the child; kill_on_drop reaps it.
                Err(Error::InstallTimedOut {
                    command: command.to_string(),
                    timeout,
                })
            }
        }
    }
}
