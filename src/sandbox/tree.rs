//! Recursive filesystem operations on sandbox trees.
//!
//! [`NativeTreeOps`] uses library calls. [`ShellTreeOps`] shells out to
//! `rm -r` and `cp -R`, for trees whose ownership or permissions the library
//! calls cannot cope with (e.g. files the package manager left read-only).

use std::path::Path;
use std::process::Command;

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Recursive copy and delete of directory trees.
pub trait TreeOps: Send + Sync {
    /// Deletes `path` and everything below it. Absent paths are a no-op.
    fn remove_tree(&self, path: &Path) -> Result<()>;

    /// Copies the contents of `src` into `dst`, creating `dst` as needed.
    ///
    /// Same-named files are overwritten. Files present only in `dst` are kept.
    fn copy_tree(&self, src: &Path, dst: &Path) -> Result<()>;
}

/// Tree operations implemented with `std::fs` and `walkdir`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeTreeOps;

impl TreeOps for NativeTreeOps {
    fn remove_tree(&self, path: &Path) -> Result<()> {
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path)?,
            Ok(_) => std::fs::remove_file(path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn copy_tree(&self, src: &Path, dst: &Path) -> Result<()> {
        for entry in WalkDir::new(src) {
            let entry = entry.map_err(walk_error)?;
            let relative = entry
                .path()
                .strip_prefix(src)
                .map_err(|_| Error::TreeCommand {
                    path: entry.path().to_path_buf(),
                    reason: "entry escaped copy source".to_string(),
                })?;
            let target = dst.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                std::fs::create_dir_all(&target)?;
            } else if file_type.is_symlink() {
                copy_symlink(entry.path(), &target)?;
            } else {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                // Replacing a symlink must not write through it.
                if std::fs::symlink_metadata(&target)
                    .map(|m| m.file_type().is_symlink())
                    .unwrap_or(false)
                {
                    std::fs::remove_file(&target)?;
                }
                std::fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = std::fs::read_link(src)?;
    if std::fs::symlink_metadata(dst).is_ok() {
        NativeTreeOps.remove_tree(dst)?;
    }
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(link, dst)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dst)?;
    Ok(())
}

fn walk_error(e: walkdir::Error) -> Error {
    match e.into_io_error() {
        Some(io) => Error::Io(io),
        None => Error::Io(std::io::Error::other("filesystem loop while copying tree")),
    }
}

/// Tree operations that shell out to `rm` and `cp`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellTreeOps;

impl ShellTreeOps {
    fn run(&self, path: &Path, cmd: &mut Command) -> Result<()> {
        let output = cmd.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::TreeCommand {
                path: path.to_path_buf(),
                reason: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl TreeOps for ShellTreeOps {
    fn remove_tree(&self, path: &Path) -> Result<()> {
        if std::fs::symlink_metadata(path).is_err() {
            return Ok(());
        }
        self.run(path, Command::new("rm").arg("-r").arg(path))
    }

    fn copy_tree(&self, src: &Path, dst: &Path) -> Result<()> {
        std::fs::create_dir_all(dst)?;
        // `src/.` copies the contents rather than nesting `src` inside `dst`.
        self.run(
            dst,
            Command::new("cp").arg("-R").arg(src.join(".")).arg(dst),
        )
    }
}

/// Recursively marks `path` owner/group/other readable and the owner writable
/// (mode 0755). No-op when `path` does not exist.
///
/// Each directory's mode is fixed before it is listed, so directories that
/// were not readable can still be descended into.
pub fn make_writable(path: &Path) -> Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    set_writable(path)?;
    if meta.is_dir() {
        for entry in std::fs::read_dir(path)? {
            make_writable(&entry?.path())?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_writable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_writable(path: &Path) -> Result<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_readonly(false);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed(root: &Path) {
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::write(root.join("a.txt"), "alpha").unwrap();
        std::fs::write(root.join("b/c.txt"), "charlie").unwrap();
    }

    fn check_copy(ops: &dyn TreeOps) {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        seed(&src);

        ops.copy_tree(&src, &dst).unwrap();

        assert_eq!(std::fs::read_to_string(dst.join("a.txt")).unwrap(), "alpha");
        assert_eq!(std::fs::read_to_string(dst.join("b/c.txt")).unwrap(), "charlie");
        assert!(!dst.join("src").exists());
    }

    fn check_copy_keeps_destination_extras(ops: &dyn TreeOps) {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        seed(&src);
        std::fs::create_dir_all(&dst).unwrap();
        std::fs::write(dst.join("a.txt"), "stale").unwrap();
        std::fs::write(dst.join("extra.txt"), "left behind").unwrap();

        ops.copy_tree(&src, &dst).unwrap();

        assert_eq!(std::fs::read_to_string(dst.join("a.txt")).unwrap(), "alpha");
        assert!(dst.join("extra.txt").exists());
    }

    fn check_remove_is_idempotent(ops: &dyn TreeOps) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("tree");
        seed(&root);

        ops.remove_tree(&root).unwrap();
        assert!(!root.exists());
        ops.remove_tree(&root).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn native_copy_tree_copies_contents() {
        check_copy(&NativeTreeOps);
    }

    #[test]
    fn native_copy_tree_keeps_destination_extras() {
        check_copy_keeps_destination_extras(&NativeTreeOps);
    }

    #[test]
    fn native_remove_tree_is_idempotent() {
        check_remove_is_idempotent(&NativeTreeOps);
    }

    #[test]
    fn native_copy_tree_fails_for_missing_source() {
        let tmp = TempDir::new().unwrap();
        let err = NativeTreeOps
            .copy_tree(&tmp.path().join("missing"), &tmp.path().join("dst"))
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[cfg(unix)]
    #[test]
    fn native_copy_tree_preserves_symlinks() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        seed(&src);
        std::os::unix::fs::symlink("a.txt", src.join("link")).unwrap();

        NativeTreeOps.copy_tree(&src, &dst).unwrap();

        let link = dst.join("link");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&link).unwrap(), Path::new("a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn shell_copy_tree_copies_contents() {
        check_copy(&ShellTreeOps);
    }

    #[cfg(unix)]
    #[test]
    fn shell_copy_tree_keeps_destination_extras() {
        check_copy_keeps_destination_extras(&ShellTreeOps);
    }

    #[cfg(unix)]
    #[test]
    fn shell_remove_tree_is_idempotent() {
        check_remove_is_idempotent(&ShellTreeOps);
    }

    #[cfg(unix)]
    #[test]
    fn make_writable_restores_locked_directories() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let sites = tmp.path().join("docroot/sites");
        std::fs::create_dir_all(sites.join("default")).unwrap();
        std::fs::write(sites.join("default/settings.php"), "<?php").unwrap();
        std::fs::set_permissions(
            sites.join("default/settings.php"),
            std::fs::Permissions::from_mode(0o444),
        )
        .unwrap();
        std::fs::set_permissions(sites.join("default"), std::fs::Permissions::from_mode(0o555))
            .unwrap();

        make_writable(&sites).unwrap();

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&sites.join("default")), 0o755);
        assert_eq!(mode(&sites.join("default/settings.php")), 0o755);
        NativeTreeOps.remove_tree(tmp.path().join("docroot").as_path()).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn make_writable_descends_into_unreadable_directories() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let sites = tmp.path().join("docroot/sites");
        let files = sites.join("default/files");
        std::fs::create_dir_all(&files).unwrap();
        std::fs::write(files.join("upload.txt"), "data").unwrap();
        std::fs::set_permissions(&files, std::fs::Permissions::from_mode(0o300)).unwrap();
        std::fs::set_permissions(sites.join("default"), std::fs::Permissions::from_mode(0o300))
            .unwrap();

        make_writable(&sites).unwrap();

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&sites.join("default")), 0o755);
        assert_eq!(mode(&files), 0o755);
        assert_eq!(mode(&files.join("upload.txt")), 0o755);
    }

    #[test]
    fn make_writable_ignores_missing_path() {
        let tmp = TempDir::new().unwrap();
        make_writable(&tmp.path().join("docroot/sites")).unwrap();
    }
}
