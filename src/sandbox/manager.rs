//! Master and instance sandbox lifecycle.
//!
//! The master sandbox is built once from the fixture, linked to the tool's
//! source tree, and fully installed. Instances are cheap copies of it that
//! tests are free to trash.

use std::path::Path;

use crate::config::{SandboxConfig, RECREATE_MASTER_VAR};
use crate::console::{Console, StdoutConsole};
use crate::error::{Error, Result};
use crate::runner::{install_commands, CommandRunner, ProcessRunner};

use super::manifest::{Manifest, PathPackage, RequireSection};
use super::tree::{make_writable, NativeTreeOps, TreeOps};

/// Repository key for the tool under test.
const TOOL_REPOSITORY: &str = "blt";

/// Repository key for the staged require-dev package.
const REQUIRE_DEV_REPOSITORY: &str = "blt-require-dev";

/// How [`SandboxManager::refresh_instance`] ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The master was copied over the existing instance.
    Refreshed,
    /// The refresh failed and the instance was rebuilt from scratch.
    Replaced {
        /// Why the refresh attempt failed.
        reason: String,
    },
}

/// Owns the master sandbox, the instance sandbox, and the staging dir.
pub struct SandboxManager {
    config: SandboxConfig,
    tree: Box<dyn TreeOps>,
    runner: Box<dyn CommandRunner>,
    console: Box<dyn Console>,
}

impl SandboxManager {
    /// Creates a manager using native tree operations, real subprocesses,
    /// and stdout.
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            tree: Box::new(NativeTreeOps),
            runner: Box::new(ProcessRunner::new()),
            console: Box::new(StdoutConsole),
        }
    }

    /// Replaces the tree operations.
    pub fn with_tree_ops(mut self, tree: impl TreeOps + 'static) -> Self {
        self.tree = Box::new(tree);
        self
    }

    /// Replaces the command runner.
    pub fn with_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    /// Replaces the console.
    pub fn with_console(mut self, console: impl Console + 'static) -> Self {
        self.console = Box::new(console);
        self
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Path of the master sandbox.
    pub fn master_dir(&self) -> &Path {
        &self.config.master_dir
    }

    /// Path the require-dev package is staged in.
    pub fn staging_dir(&self) -> &Path {
        &self.config.staging_dir
    }

    /// Path of the instance sandbox tests should run against.
    pub fn instance_dir(&self) -> &Path {
        &self.config.instance_dir
    }

    /// Writes `message` to the console when verbose output is on.
    pub fn debug(&self, message: &str) {
        if self.config.verbose_output {
            self.console.write_line(message);
        }
    }

    /// Ensures the master sandbox exists, rebuilding it when forced.
    pub async fn bootstrap(&self) -> Result<()> {
        self.console
            .write_line("Bootstrapping BLT testing framework...");

        if !self.master_dir().exists() || self.config.force_recreate_master {
            self.console.write_line(&format!(
                "To prevent recreation of sandbox master on each bootstrap, set {}=0",
                RECREATE_MASTER_VAR
            ));
            self.create_master().await
        } else {
            tracing::info!(master = ?self.master_dir(), "reusing existing master sandbox");
            self.console.write_line(&format!(
                "Skipping master sandbox creation, {} is disabled.",
                RECREATE_MASTER_VAR
            ));
            Ok(())
        }
    }

    /// Rebuilds the master sandbox from the fixture and installs it.
    ///
    /// Any existing instance is removed afterwards since it was copied from
    /// the old master.
    pub async fn create_master(&self) -> Result<()> {
        let master = self.master_dir();
        self.console.write_line(&format!(
            "Creating master sandbox in {}...",
            master.display()
        ));
        tracing::info!(master = ?master, fixture = ?self.config.fixture_dir, "creating master sandbox");

        self.tree.remove_tree(master)?;
        self.tree.copy_tree(&self.config.fixture_dir, master)?;
        std::fs::copy(&self.config.manifest_template, master.join("composer.json"))?;

        self.stage_require_dev_package()?;
        self.link_master_manifest()?;
        self.install_master_dependencies().await?;
        self.remove_instance()?;

        tracing::info!(master = ?master, "master sandbox ready");
        Ok(())
    }

    /// Deletes the instance sandbox. No-op when it does not exist.
    pub fn remove_instance(&self) -> Result<()> {
        let instance = self.instance_dir();
        if !instance.exists() {
            return Ok(());
        }
        self.debug("Removing sandbox instance...");
        self.make_instance_writable()?;
        self.tree.remove_tree(instance)?;
        tracing::debug!(instance = ?instance, "removed sandbox instance");
        Ok(())
    }

    /// Unlocks `docroot/sites` in the instance so it can be deleted.
    pub fn make_instance_writable(&self) -> Result<()> {
        make_writable(&self.instance_dir().join("docroot/sites"))
    }

    /// Removes the instance and copies a fresh one from the master.
    pub fn replace_instance(&self) -> Result<()> {
        self.remove_instance()?;
        self.copy_master_to_instance()
    }

    /// Copies the master over the existing instance and enters it.
    ///
    /// Files that exist only in the instance are not removed, so repeated
    /// refreshes can accumulate stale files. Use [`Self::replace_instance`]
    /// when the instance must match the master exactly.
    pub fn try_refresh_instance(&self) -> Result<()> {
        self.make_instance_writable()?;
        self.copy_master_to_instance()?;
        std::env::set_current_dir(self.instance_dir())?;
        Ok(())
    }

    /// Refreshes the instance, falling back to a full replace on failure.
    ///
    /// Only the replace can fail this call; a failed refresh is reported in
    /// the outcome.
    pub fn refresh_instance(&self) -> Result<RefreshOutcome> {
        match self.try_refresh_instance() {
            Ok(()) => Ok(RefreshOutcome::Refreshed),
            Err(e) => {
                tracing::warn!(error = %e, "refresh failed, replacing sandbox instance");
                self.replace_instance()?;
                Ok(RefreshOutcome::Replaced {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Copies every file from the master into the instance.
    ///
    /// This is a plain copy, not a sync: existing instance files are only
    /// replaced when the master has a file of the same name.
    pub fn copy_master_to_instance(&self) -> Result<()> {
        self.debug("Copying sandbox master to sandbox instance...");
        self.tree.copy_tree(self.master_dir(), self.instance_dir())
    }

    /// Copies the require-dev package out of the tool's tree.
    ///
    /// The package manager cannot link a package nested inside another
    /// linked package, so it gets its own directory.
    fn stage_require_dev_package(&self) -> Result<()> {
        tracing::debug!(
            source = ?self.config.require_dev_source,
            staging = ?self.staging_dir(),
            "staging require-dev package"
        );
        self.tree.remove_tree(self.staging_dir())?;
        self.tree
            .copy_tree(&self.config.require_dev_source, self.staging_dir())
    }

    /// Points the master's manifest at the local tool and require-dev trees.
    fn link_master_manifest(&self) -> Result<()> {
        let path = self.master_dir().join("composer.json");
        let mut manifest = Manifest::load(&path)?;

        manifest.link_path_package(&PathPackage {
            repository: TOOL_REPOSITORY.to_string(),
            url: self.config.tool_root.clone(),
            package: self.config.tool_package.clone(),
            section: RequireSection::Require,
        })?;
        manifest.link_path_package(&PathPackage {
            repository: REQUIRE_DEV_REPOSITORY.to_string(),
            url: self.config.staging_dir.clone(),
            package: self.config.require_dev_package.clone(),
            section: RequireSection::RequireDev,
        })?;

        manifest.save(&path)
    }

    async fn install_master_dependencies(&self) -> Result<()> {
        let commands = install_commands(
            &self.config.package_manager,
            self.config.pinned_core_version.as_deref(),
        );

        for command in &commands {
            self.debug(&format!("> {}", command));
            let status = self
                .runner
                .run(
                    command,
                    self.master_dir(),
                    self.config.install_timeout,
                    self.console.as_ref(),
                )
                .await?;

            if !status.success() {
                tracing::error!(command = %command, status = %status, "dependency installation failed");
                return Err(Error::InstallFailed {
                    command: command.to_string(),
                    status,
                });
            }
        }
        Ok(())
    }
}
