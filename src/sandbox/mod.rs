//! Test sandboxes for the tool under test.
//!
//! [`SandboxManager`] builds a fully installed master sandbox from a fixture
//! and hands out disposable instance copies of it. Filesystem work goes
//! through [`TreeOps`] and the manifest is patched via [`Manifest`].

mod manager;
mod manifest;
mod tree;

pub use manager::{RefreshOutcome, SandboxManager};
pub use manifest::{Manifest, PathPackage, RequireSection, DEV_CONSTRAINT};
pub use tree::{make_writable, NativeTreeOps, ShellTreeOps, TreeOps};
