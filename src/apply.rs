//! Replacing the on-disk executable
//!
//! The new binary is written to a staging file next to the destination, given
//! the destination's permission bits, then swapped in by a [`ReplaceStrategy`].
//! The staging file lives in the destination's directory so the swap is a
//! same-filesystem rename. It is removed on every failure path, and the
//! destination is either fully old or fully new.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::ApplyError;
use crate::logging::Logger;
use crate::platform::Platform;

// ============================================================================
// Replace strategies
// ============================================================================

/// Moves a fully written staging file over the destination
pub trait ReplaceStrategy: Send + Sync {
    fn replace(&self, staged: &Path, target: &Path) -> io::Result<()>;
}

/// One `rename`, for platforms that allow replacing a running executable
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomicRename;

impl ReplaceStrategy for AtomicRename {
    fn replace(&self, staged: &Path, target: &Path) -> io::Result<()> {
        fs::rename(staged, target)
    }
}

/// Move the running executable aside to `<target>.old` first, for platforms
/// that refuse to overwrite a file that is executing but do allow renaming it.
/// The aside copy is restored if the second move fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenameAside;

impl RenameAside {
    pub fn aside_path(target: &Path) -> PathBuf {
        let mut name = OsString::from(target.as_os_str());
        name.push(".old");
        PathBuf::from(name)
    }
}

impl ReplaceStrategy for RenameAside {
    fn replace(&self, staged: &Path, target: &Path) -> io::Result<()> {
        swap_aside(staged, target, |from, to| fs::rename(from, to))
    }
}

fn swap_aside<F>(staged: &Path, target: &Path, rename: F) -> io::Result<()>
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    let aside = RenameAside::aside_path(target);
    match fs::remove_file(&aside) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    rename(target, &aside)?;
    if let Err(e) = rename(staged, target) {
        if let Err(restore) = rename(&aside, target) {
            return Err(io::Error::new(
                e.kind(),
                format!(
                    "{}; the previous binary is left at {} (restoring it failed: {})",
                    e,
                    aside.display(),
                    restore
                ),
            ));
        }
        return Err(e);
    }

    // Still running on Windows; it goes away with the next update
    let _ = fs::remove_file(&aside);
    Ok(())
}

/// The strategy suited to the host
pub fn default_strategy() -> Box<dyn ReplaceStrategy> {
    if cfg!(windows) {
        Box::new(RenameAside)
    } else {
        Box::new(AtomicRename)
    }
}

/// Check if a new binary could be staged next to `path`
pub fn can_replace(path: &Path) -> bool {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tempfile::tempfile_in(dir).is_ok()
}

// ============================================================================
// Applier
// ============================================================================

pub struct Applier {
    strategy: Box<dyn ReplaceStrategy>,
    windows: bool,
    log: Logger,
}

impl std::fmt::Debug for Applier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Applier")
            .field("windows", &self.windows)
            .finish_non_exhaustive()
    }
}

impl Applier {
    pub fn new(platform: &Platform, log: Logger) -> Self {
        Self {
            strategy: default_strategy(),
            windows: platform.is_windows(),
            log,
        }
    }

    pub fn with_strategy(mut self, strategy: impl ReplaceStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Replace the executable at `dest` with the bytes read from `src`
    ///
    /// Returns the path actually replaced, which differs from `dest` when
    /// `dest` is a symlink or lacks a required `.exe` suffix.
    pub fn apply<R: Read>(&self, mut src: R, dest: &Path) -> Result<PathBuf, ApplyError> {
        let target = self.resolve_target(dest)?;
        let metadata = fs::metadata(&target).map_err(|source| ApplyError::StatPath {
            path: target.clone(),
            source,
        })?;

        let write_err = |source: io::Error| ApplyError::WriteTemp {
            path: target.clone(),
            source,
        };

        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".new")
            .tempfile_in(dir)
            .map_err(write_err)?;

        io::copy(&mut src, staged.as_file_mut()).map_err(write_err)?;
        staged.as_file_mut().flush().map_err(write_err)?;
        staged.as_file().sync_all().map_err(write_err)?;
        fs::set_permissions(staged.path(), metadata.permissions()).map_err(write_err)?;

        // Close the handle before the swap; the guard still removes the file
        // if anything below fails.
        let staged = staged.into_temp_path();

        self.log
            .install(&format!("Replacing {} with the new binary", target.display()));
        self.strategy
            .replace(&staged, &target)
            .map_err(|source| ApplyError::Rename {
                path: target.clone(),
                source,
            })?;

        // The staging path was consumed by the swap
        let _ = staged.keep();

        Ok(target)
    }

    fn resolve_target(&self, dest: &Path) -> Result<PathBuf, ApplyError> {
        let has_exe = matches!(dest.extension(), Some(ext) if ext == "exe");
        let dest = if self.windows && !has_exe {
            let mut name = OsString::from(dest.as_os_str());
            name.push(".exe");
            PathBuf::from(name)
        } else {
            dest.to_path_buf()
        };

        let link = fs::symlink_metadata(&dest).map_err(|source| ApplyError::StatPath {
            path: dest.clone(),
            source,
        })?;
        if !link.file_type().is_symlink() {
            return Ok(dest);
        }

        let real = fs::canonicalize(&dest).map_err(|source| ApplyError::ResolveSymlink {
            path: dest.clone(),
            source,
        })?;
        self.log.info(&format!(
            "Resolved symlink {} to {}",
            dest.display(),
            real.display()
        ));
        Ok(real)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn applier() -> Applier {
        Applier::new(&Platform::new("linux", "amd64"), Logger::default())
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    struct FailingReplace;

    impl ReplaceStrategy for FailingReplace {
        fn replace(&self, _staged: &Path, _target: &Path) -> io::Result<()> {
            Err(io::Error::other("rename refused"))
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("connection reset"))
        }
    }

    #[test]
    fn test_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool");
        fs::write(&path, b"old").unwrap();

        let replaced = applier().apply(Cursor::new(b"new binary"), &path).unwrap();

        assert_eq!(replaced, path);
        assert_eq!(fs::read(&path).unwrap(), b"new binary");
        assert_eq!(dir_entries(dir.path()), ["tool"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_preserves_permission_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool");
        fs::write(&path, b"old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o751)).unwrap();

        applier().apply(Cursor::new(b"new"), &path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o751);
    }

    #[test]
    fn test_failed_rename_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool");
        fs::write(&path, b"old").unwrap();

        let err = applier()
            .with_strategy(FailingReplace)
            .apply(Cursor::new(b"new"), &path)
            .unwrap_err();

        assert!(matches!(err, ApplyError::Rename { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"old");
        assert_eq!(dir_entries(dir.path()), ["tool"]);
    }

    #[test]
    fn test_failed_write_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool");
        fs::write(&path, b"old").unwrap();

        let err = applier().apply(FailingReader, &path).unwrap_err();

        assert!(matches!(err, ApplyError::WriteTemp { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"old");
        assert_eq!(dir_entries(dir.path()), ["tool"]);
    }

    #[test]
    fn test_missing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let err = applier()
            .apply(Cursor::new(b"new"), &dir.path().join("absent"))
            .unwrap_err();
        assert!(matches!(err, ApplyError::StatPath { .. }));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_follows_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("tool-1.0.0");
        let link = dir.path().join("tool");
        fs::write(&real, b"old").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let replaced = applier().apply(Cursor::new(b"new"), &link).unwrap();

        assert_eq!(replaced, fs::canonicalize(&real).unwrap());
        assert_eq!(fs::read(&real).unwrap(), b"new");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("tool");
        std::os::unix::fs::symlink(dir.path().join("gone"), &link).unwrap();

        let err = applier().apply(Cursor::new(b"new"), &link).unwrap_err();
        assert!(matches!(err, ApplyError::ResolveSymlink { .. }));
    }

    #[test]
    fn test_windows_adds_exe_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("tool.exe");
        fs::write(&exe, b"old").unwrap();

        let windows = Applier::new(&Platform::new("windows", "amd64"), Logger::default())
            .with_strategy(AtomicRename);
        let replaced = windows
            .apply(Cursor::new(b"new"), &dir.path().join("tool"))
            .unwrap();

        assert_eq!(replaced, exe);
        assert_eq!(fs::read(&exe).unwrap(), b"new");
    }

    #[test]
    fn test_can_replace() {
        let dir = tempfile::tempdir().unwrap();
        assert!(can_replace(&dir.path().join("tool")));
        assert!(!can_replace(&dir.path().join("missing-dir").join("tool")));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_rename_aside_restores_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool");
        fs::write(&path, b"old").unwrap();

        let err = RenameAside
            .replace(&dir.path().join("never-staged"), &path)
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(fs::read(&path).unwrap(), b"old");
        assert_eq!(dir_entries(dir.path()), ["tool"]);
    }

    #[test]
    fn test_rename_aside_names_old_binary_when_restore_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool");
        let staged = dir.path().join("staged");
        fs::write(&path, b"old").unwrap();
        fs::write(&staged, b"new").unwrap();

        // Only the first move (target aside) goes through
        let calls = std::cell::Cell::new(0);
        let err = swap_aside(&staged, &path, |from, to| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                fs::rename(from, to)
            } else {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
            }
        })
        .unwrap_err();

        let aside = RenameAside::aside_path(&path);
        assert_eq!(calls.get(), 3);
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(err.to_string().contains(&aside.display().to_string()));
        assert_eq!(fs::read(&aside).unwrap(), b"old");
    }

    #[test]
    fn test_rename_aside_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool");
        fs::write(&path, b"old").unwrap();
        fs::write(RenameAside::aside_path(&path), b"stale").unwrap();

        applier()
            .with_strategy(RenameAside)
            .apply(Cursor::new(b"new"), &path)
            .unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert_eq!(dir_entries(dir.path()), ["tool"]);
    }
}
