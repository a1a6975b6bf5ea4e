//! Error types for sandbox management.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for sandbox operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error during copy, chmod, or removal.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The package manager exited non-zero.
    #[error("dependency installation failed: `{command}` exited with {status}")]
    InstallFailed { command: String, status: ExitStatus },

    /// The package manager ran past its timeout and was killed.
    #[error("dependency installation failed: `{command}` timed out after {timeout:?}")]
    InstallTimedOut { command: String, timeout: Duration },

    /// The manifest could not be read or patched.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// A subprocess filesystem operation failed.
    #[error("filesystem command failed at {path}: {reason}")]
    TreeCommand { path: PathBuf, reason: String },

    /// Sandbox configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for either flavour of installation failure.
    pub fn is_install_failure(&self) -> bool {
        matches!(
            self,
            Error::InstallFailed { .. } | Error::InstallTimedOut { .. }
        )
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_counts_as_install_failure() {
        let err = Error::InstallTimedOut {
            command: "composer install".to_string(),
            timeout: Duration::from_secs(3600),
        };
        assert!(err.is_install_failure());
        assert!(err.to_string().starts_with("dependency installation failed"));
    }

    #[test]
    fn io_is_not_install_failure() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(!err.is_install_failure());
    }
}
