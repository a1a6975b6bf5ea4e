//! BLT Sandbox - disposable project sandboxes for the BLT test suite
//!
//! This library builds a master sandbox from a fixture project linked to the
//! local BLT checkout, installs its dependencies once, and hands out fresh
//! instance copies for each test run.

pub mod config;
pub mod console;
pub mod error;
pub mod runner;
pub mod sandbox;

pub use config::{ConfigIssue, SandboxConfig, Severity, ValidationResult};
pub use console::{CaptureConsole, Console, StdoutConsole};
pub use error::{Error, Result};
pub use runner::{install_commands, CommandRunner, CommandSpec, ProcessRunner};
pub use sandbox::{
    Manifest, NativeTreeOps, RefreshOutcome, SandboxManager, ShellTreeOps, TreeOps,
};
