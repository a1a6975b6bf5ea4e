//! Sandbox configuration.
//!
//! Environment variables:
//! - `BLT_RECREATE_SANDBOX_MASTER` - Rebuild the master sandbox on every bootstrap
//! - `BLT_PRINT_COMMAND_OUTPUT` - Print debug messages to the console
//! - `DRUPAL_CORE_VERSION` - Pin `drupal/core` before installing (ignored when `default`)
//!
//! Toggles are read here and nowhere else; the orchestrator only sees the
//! resulting [`SandboxConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable forcing a master rebuild.
pub const RECREATE_MASTER_VAR: &str = "BLT_RECREATE_SANDBOX_MASTER";

/// Environment variable enabling debug console output.
pub const PRINT_OUTPUT_VAR: &str = "BLT_PRINT_COMMAND_OUTPUT";

/// Environment variable pinning the core dependency version.
pub const CORE_VERSION_VAR: &str = "DRUPAL_CORE_VERSION";

/// Default installation timeout: one hour.
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Everything the sandbox orchestrator needs to know.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Source root of the tool under test.
    pub tool_root: PathBuf,
    /// Fully installed template sandbox.
    pub master_dir: PathBuf,
    /// Disposable working copy of the master.
    pub instance_dir: PathBuf,
    /// Out-of-tree copy of the require-dev package.
    pub staging_dir: PathBuf,
    /// Fixture tree mirrored into the master.
    pub fixture_dir: PathBuf,
    /// Known-good manifest copied over the fixture's manifest.
    pub manifest_template: PathBuf,
    /// Source tree of the require-dev package.
    pub require_dev_source: PathBuf,
    /// Rebuild the master even when it already exists.
    pub force_recreate_master: bool,
    /// Print debug messages.
    pub verbose_output: bool,
    /// Core version to require before installing.
    pub pinned_core_version: Option<String>,
    /// Package manager program.
    pub package_manager: String,
    /// Package name of the tool under test.
    pub tool_package: String,
    /// Package name of the require-dev package.
    pub require_dev_package: String,
    /// Upper bound on each package manager invocation.
    pub install_timeout: Duration,
}

impl SandboxConfig {
    /// Creates a configuration with sandboxes under the system temp directory.
    pub fn new(tool_root: impl Into<PathBuf>) -> Self {
        let tool_root = tool_root.into();
        let tmp = std::env::temp_dir();
        Self {
            master_dir: tmp.join("blt-sandbox-master"),
            instance_dir: tmp.join("blt-sandbox-instance"),
            staging_dir: tmp.join("blt-require-dev"),
            fixture_dir: tool_root.join("tests/phpunit/fixtures/sandbox"),
            manifest_template: tool_root.join("subtree-splits/blt-project/composer.json"),
            require_dev_source: tool_root.join("subtree-splits/blt-require-dev"),
            tool_root,
            force_recreate_master: false,
            verbose_output: false,
            pinned_core_version: None,
            package_manager: "composer".to_string(),
            tool_package: "acquia/blt".to_string(),
            require_dev_package: "acquia/blt-require-dev".to_string(),
            install_timeout: DEFAULT_INSTALL_TIMEOUT,
        }
    }

    /// Loads defaults for `tool_root` and applies environment toggles.
    pub fn from_env(tool_root: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(tool_root);
        config.apply_env();
        config
    }

    /// Loads a TOML config file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>, tool_root: impl Into<PathBuf>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content, tool_root)
    }

    /// Parses TOML config text.
    pub fn from_toml_str(content: &str, tool_root: impl Into<PathBuf>) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        let mut config = Self::new(tool_root);
        file.apply_to(&mut config);
        Ok(config)
    }

    /// Re-roots the master, instance, and staging directories under `root`.
    pub fn with_temp_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.master_dir = root.join("blt-sandbox-master");
        self.instance_dir = root.join("blt-sandbox-instance");
        self.staging_dir = root.join("blt-require-dev");
        self
    }

    /// Sets the pinned core version.
    pub fn with_pinned_core_version(mut self, version: Option<String>) -> Self {
        self.pinned_core_version = version.filter(|v| is_pinnable_version(v));
        self
    }

    /// Sets the install timeout.
    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = timeout;
        self
    }

    /// Overrides toggles from the process environment.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(RECREATE_MASTER_VAR) {
            self.force_recreate_master = is_truthy(&value);
        }
        if let Ok(value) = std::env::var(PRINT_OUTPUT_VAR) {
            self.verbose_output = is_truthy(&value);
        }
        if let Ok(value) = std::env::var(CORE_VERSION_VAR) {
            self.pinned_core_version = Some(value).filter(|v| is_pinnable_version(v));
        }
    }
}

/// Interprets an environment flag.
///
/// Unset-looking values (`""`, `0`, `false`, `no`, `off`) are false; anything
/// else is true.
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    !matches!(value.as_str(), "" | "0" | "false" | "no" | "off")
}

fn is_pinnable_version(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != "default"
}

/// On-disk shape of `blt-sandbox.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    temp_root: Option<PathBuf>,
    master_dir: Option<PathBuf>,
    instance_dir: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
    fixture_dir: Option<PathBuf>,
    manifest_template: Option<PathBuf>,
    require_dev_source: Option<PathBuf>,
    force_recreate_master: Option<bool>,
    verbose_output: Option<bool>,
    pinned_core_version: Option<String>,
    package_manager: Option<String>,
    tool_package: Option<String>,
    require_dev_package: Option<String>,
    install_timeout_secs: Option<u64>,
}

impl ConfigFile {
    fn apply_to(self, config: &mut SandboxConfig) {
        if let Some(root) = self.temp_root {
            *config = config.clone().with_temp_root(root);
        }
        // Relative paths in the file are relative to the tool root.
        let resolve = |p: PathBuf| {
            if p.is_absolute() {
                p
            } else {
                config.tool_root.join(p)
            }
        };
        let master_dir = self.master_dir.map(resolve);
        let instance_dir = self.instance_dir.map(resolve);
        let staging_dir = self.staging_dir.map(resolve);
        let fixture_dir = self.fixture_dir.map(resolve);
        let manifest_template = self.manifest_template.map(resolve);
        let require_dev_source = self.require_dev_source.map(resolve);

        if let Some(v) = master_dir {
            config.master_dir = v;
        }
        if let Some(v) = instance_dir {
            config.instance_dir = v;
        }
        if let Some(v) = staging_dir {
            config.staging_dir = v;
        }
        if let Some(v) = fixture_dir {
            config.fixture_dir = v;
        }
        if let Some(v) = manifest_template {
            config.manifest_template = v;
        }
        if let Some(v) = require_dev_source {
            config.require_dev_source = v;
        }
        if let Some(v) = self.force_recreate_master {
            config.force_recreate_master = v;
        }
        if let Some(v) = self.verbose_output {
            config.verbose_output = v;
        }
        if let Some(v) = self.pinned_core_version {
            config.pinned_core_version = Some(v).filter(|v| is_pinnable_version(v));
        }
        if let Some(v) = self.package_manager {
            config.package_manager = v;
        }
        if let Some(v) = self.tool_package {
            config.tool_package = v;
        }
        if let Some(v) = self.require_dev_package {
            config.require_dev_package = v;
        }
        if let Some(secs) = self.install_timeout_secs {
            config.install_timeout = Duration::from_secs(secs);
        }
    }
}

/// How serious a configuration problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The sandbox cannot be built with this configuration.
    Error,
    /// Suspicious, but not fatal.
    Warning,
}

/// A single configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub message: String,
}

/// Problems found by [`SandboxConfig::validate`].
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ConfigIssue>,
}

impl ValidationResult {
    fn push(&mut self, severity: Severity, message: impl Into<String>) {
        self.issues.push(ConfigIssue {
            severity,
            message: message.into(),
        });
    }

    fn messages(&self, severity: Severity) -> impl Iterator<Item = &str> {
        self.issues
            .iter()
            .filter(move |issue| issue.severity == severity)
            .map(|issue| issue.message.as_str())
    }

    /// Fatal problems.
    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.messages(Severity::Error)
    }

    /// Non-fatal problems.
    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.messages(Severity::Warning)
    }

    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Fails with every error joined, or hands back the warnings.
    pub fn into_result(self) -> Result<Vec<String>> {
        if !self.is_valid() {
            return Err(Error::Config(self.errors().collect::<Vec<_>>().join("; ")));
        }
        Ok(self.warnings().map(str::to_string).collect())
    }
}

impl SandboxConfig {
    /// Checks paths and limits before any sandbox work starts.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !self.tool_root.is_absolute() {
            result.push(
                Severity::Error,
                format!(
                    "tool_root '{}' must be absolute so the manifest can reference it",
                    self.tool_root.display()
                ),
            );
        }

        let sandboxes = [
            ("master_dir", &self.master_dir),
            ("instance_dir", &self.instance_dir),
            ("staging_dir", &self.staging_dir),
        ];
        for (i, (name_a, a)) in sandboxes.iter().enumerate() {
            for (name_b, b) in sandboxes.iter().skip(i + 1) {
                if a.starts_with(b) || b.starts_with(a) {
                    result.push(
                        Severity::Error,
                        format!("{} and {} overlap", name_a, name_b),
                    );
                }
            }
        }

        if self.install_timeout.is_zero() {
            result.push(Severity::Error, "install_timeout must be greater than zero");
        }

        if self.package_manager.trim().is_empty() {
            result.push(Severity::Error, "package_manager cannot be empty");
        }

        for (name, path) in [
            ("fixture_dir", &self.fixture_dir),
            ("manifest_template", &self.manifest_template),
            ("require_dev_source", &self.require_dev_source),
        ] {
            if !path.exists() {
                result.push(
                    Severity::Warning,
                    format!("{} '{}' does not exist", name, path.display()),
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_use_fixed_names_under_temp() {
        let config = SandboxConfig::new("/src/blt");
        let tmp = std::env::temp_dir();

        assert_eq!(config.master_dir, tmp.join("blt-sandbox-master"));
        assert_eq!(config.instance_dir, tmp.join("blt-sandbox-instance"));
        assert_eq!(config.staging_dir, tmp.join("blt-require-dev"));
        assert_eq!(
            config.fixture_dir,
            PathBuf::from("/src/blt/tests/phpunit/fixtures/sandbox")
        );
        assert_eq!(config.install_timeout, Duration::from_secs(3600));
        assert!(!config.force_recreate_master);
        assert!(config.pinned_core_version.is_none());
    }

    #[test]
    fn truthiness_follows_flag_conventions() {
        for v in ["1", "true", "yes", "TRUE", "on", "anything"] {
            assert!(is_truthy(v), "{v} should be truthy");
        }
        for v in ["", "0", "false", "False", "no", "off", "  0 "] {
            assert!(!is_truthy(v), "{v:?} should be falsy");
        }
    }

    #[test]
    fn default_core_version_is_not_pinned() {
        let config =
            SandboxConfig::new("/src/blt").with_pinned_core_version(Some("default".to_string()));
        assert!(config.pinned_core_version.is_none());

        let config =
            SandboxConfig::new("/src/blt").with_pinned_core_version(Some("9.3.0".to_string()));
        assert_eq!(config.pinned_core_version.as_deref(), Some("9.3.0"));
    }

    #[test]
    fn env_toggles_are_applied() {
        // The only test that touches these variables, so no cross-test races.
        std::env::set_var(RECREATE_MASTER_VAR, "1");
        std::env::set_var(PRINT_OUTPUT_VAR, "0");
        std::env::set_var(CORE_VERSION_VAR, "default");
        let unpinned = SandboxConfig::from_env("/src/blt");

        std::env::set_var(CORE_VERSION_VAR, "9.3.0");
        let pinned = SandboxConfig::from_env("/src/blt");

        std::env::remove_var(RECREATE_MASTER_VAR);
        std::env::remove_var(PRINT_OUTPUT_VAR);
        std::env::remove_var(CORE_VERSION_VAR);

        assert!(unpinned.force_recreate_master);
        assert!(!unpinned.verbose_output);
        assert!(unpinned.pinned_core_version.is_none());
        assert_eq!(pinned.pinned_core_version.as_deref(), Some("9.3.0"));
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let toml = r#"
temp_root = "/var/tmp/sandboxes"
verbose_output = true
pinned_core_version = "9.3.0"
install_timeout_secs = 120
fixture_dir = "fixtures/custom"
"#;
        let config = SandboxConfig::from_toml_str(toml, "/src/blt").unwrap();

        assert_eq!(
            config.master_dir,
            PathBuf::from("/var/tmp/sandboxes/blt-sandbox-master")
        );
        assert!(config.verbose_output);
        assert_eq!(config.pinned_core_version.as_deref(), Some("9.3.0"));
        assert_eq!(config.install_timeout, Duration::from_secs(120));
        assert_eq!(config.fixture_dir, PathBuf::from("/src/blt/fixtures/custom"));
        assert_eq!(config.package_manager, "composer");
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let err = SandboxConfig::from_toml_str("bogus = 1", "/src/blt").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validate_flags_overlapping_sandboxes() {
        let mut config = SandboxConfig::new("/src/blt");
        config.instance_dir = config.master_dir.join("nested");

        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors().any(|e| e.contains("overlap")));
    }

    #[test]
    fn validate_rejects_relative_root_and_zero_timeout() {
        let config = SandboxConfig::new("relative/blt").with_install_timeout(Duration::ZERO);
        let result = config.validate();

        assert_eq!(result.errors().count(), 2);
    }

    #[test]
    fn validate_warns_on_missing_sources() {
        let tmp = TempDir::new().unwrap();
        let config = SandboxConfig::new(tmp.path()).with_temp_root(tmp.path().join("sb"));

        let result = config.validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings().count(), 3);
    }
}
