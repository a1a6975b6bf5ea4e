//! The sandbox's `composer.json`.
//!
//! The manifest is kept as an order-preserving JSON object so patching only
//! adds keys; existing entries and their order survive the round trip.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};

/// Version constraint used for locally linked packages.
pub const DEV_CONSTRAINT: &str = "*@dev";

/// Which requirement section a linked package goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequireSection {
    Require,
    RequireDev,
}

impl RequireSection {
    fn key(self) -> &'static str {
        match self {
            RequireSection::Require => "require",
            RequireSection::RequireDev => "require-dev",
        }
    }
}

/// A package resolved from a local path via symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPackage {
    /// Key of the entry in `repositories`.
    pub repository: String,
    /// Directory the path repository points at.
    pub url: PathBuf,
    /// Package name to require.
    pub package: String,
    /// Section the requirement is added to.
    pub section: RequireSection,
}

/// A parsed manifest document.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    root: Map<String, Value>,
}

impl Manifest {
    /// Reads and parses the manifest at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parses manifest text. The top level must be a JSON object.
    pub fn parse(content: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(content)
            .map_err(|e| Error::Manifest(format!("failed to parse manifest: {}", e)))?
        {
            Value::Object(root) => Ok(Self { root }),
            _ => Err(Error::Manifest(
                "manifest top level must be an object".to_string(),
            )),
        }
    }

    /// Adds a path repository with symlinking enabled and the matching
    /// requirement. Re-linking the same repository key replaces its entry.
    pub fn link_path_package(&mut self, link: &PathPackage) -> Result<()> {
        let url = link.url.to_str().ok_or_else(|| {
            Error::Manifest(format!("non UTF-8 repository path: {}", link.url.display()))
        })?;

        self.section_mut("repositories")?.insert(
            link.repository.clone(),
            json!({
                "type": "path",
                "url": url,
                "options": { "symlink": true },
            }),
        );
        self.section_mut(link.section.key())?.insert(
            link.package.clone(),
            Value::String(DEV_CONSTRAINT.to_string()),
        );
        Ok(())
    }

    /// Returns a top-level section, if present.
    pub fn section(&self, key: &str) -> Option<&Map<String, Value>> {
        self.root.get(key).and_then(Value::as_object)
    }

    /// Returns the repository entries of `type: path`, keyed by name.
    pub fn path_repositories(&self) -> Vec<(&str, &Value)> {
        self.section("repositories")
            .map(|repos| {
                repos
                    .iter()
                    .filter(|(_, repo)| repo.get("type").and_then(Value::as_str) == Some("path"))
                    .map(|(name, repo)| (name.as_str(), repo))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn section_mut(&mut self, key: &str) -> Result<&mut Map<String, Value>> {
        let value = self
            .root
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        value
            .as_object_mut()
            .ok_or_else(|| Error::Manifest(format!("`{}` must be an object", key)))
    }

    /// Serializes with four-space indentation and unescaped slashes.
    pub fn to_pretty_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.root
            .serialize(&mut ser)
            .map_err(|e| Error::Manifest(format!("failed to serialize manifest: {}", e)))?;
        String::from_utf8(buf).map_err(|e| Error::Manifest(e.to_string()))
    }

    /// Writes the manifest to `path` atomically, via a sibling temp file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        if let Ok(meta) = std::fs::metadata(path) {
            file.as_file().set_permissions(meta.permissions())?;
        }
        file.write_all(self.to_pretty_string()?.as_bytes())?;
        file.flush()?;
        file.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}
