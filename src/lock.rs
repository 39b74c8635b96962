//! Run lock file.
//!
//! Concurrent engine invocations on one host are unsupported — the engine
//! itself takes no locks on host state — so the caller serializes runs with
//! an exclusive lock file acquired before the first step executes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Exclusive advisory lock held for the duration of a run.
///
/// Created with `O_EXCL` semantics: acquisition fails when the file already
/// exists. The file records the holder's pid and is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if another run holds the lock or the file cannot be
    /// created.
    pub fn acquire(path: &Path) -> Result<Self> {
        use std::io::Write as _;

        let result = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path);

        match result {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())
                    .with_context(|| format!("writing lock file {}", path.display()))?;
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(path).unwrap_or_default();
                bail!(
                    "another converge run holds the lock at {} (pid {}); \
                     remove the file if that run is no longer alive",
                    path.display(),
                    holder.trim()
                );
            }
            Err(e) => {
                Err(anyhow::Error::new(e).context(format!("creating lock file {}", path.display())))
            }
        }
    }

    /// Default lock location: `$XDG_RUNTIME_DIR/converge.lock`, falling back
    /// to the system temporary directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        std::env::var_os("XDG_RUNTIME_DIR")
            .map_or_else(std::env::temp_dir, PathBuf::from)
            .join("converge.lock")
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_file_with_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converge.lock");
        let lock = RunLock::acquire(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
        drop(lock);
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converge.lock");
        let _lock = RunLock::acquire(&path).unwrap();
        let err = RunLock::acquire(&path).unwrap_err();
        assert!(err.to_string().contains("another converge run"));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converge.lock");
        {
            let _lock = RunLock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists(), "lock file should be removed on drop");
        let _relock = RunLock::acquire(&path).unwrap();
    }

    #[test]
    fn default_path_names_converge_lock() {
        let path = RunLock::default_path();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("converge.lock")
        );
    }
}
