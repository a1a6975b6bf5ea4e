//! Package manager invocation.
//!
//! Installation is a short, ordered list of [`CommandSpec`]s run inside the
//! master sandbox. The [`CommandRunner`] trait is the seam between the
//! orchestrator and real subprocesses.

mod process;

pub use process::ProcessRunner;

use std::fmt;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use async_trait::async_trait;

use crate::console::Console;
use crate::error::Result;

/// A program plus its arguments, run without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments, passed through verbatim.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Creates a command spec.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) || arg.is_empty() {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Builds the dependency installation plan.
///
/// With a pinned core version the core requirement is declared first,
/// without updating, so the install step resolves against it.
pub fn install_commands(package_manager: &str, pinned_core_version: Option<&str>) -> Vec<CommandSpec> {
    let mut commands = Vec::with_capacity(2);
    if let Some(version) = pinned_core_version {
        commands.push(CommandSpec::new(
            package_manager,
            [
                "require".to_string(),
                format!("drupal/core:{}", version),
                "--no-update".to_string(),
                "--no-interaction".to_string(),
            ],
        ));
    }
    commands.push(CommandSpec::new(
        package_manager,
        ["install", "--prefer-dist", "--no-progress", "--no-suggest"],
    ));
    commands
}

/// Runs external commands, forwarding their output to a console.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command` in `working_dir`, blocking the caller until it exits.
    ///
    /// Expiry of `timeout` is an error, not an exit status.
    async fn run(
        &self,
        command: &CommandSpec,
        working_dir: &Path,
        timeout: Duration,
        console: &dyn Console,
    ) -> Result<ExitStatus>;
}
