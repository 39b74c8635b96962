// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed plan fixture so each integration
// test can set up an isolated plan document without repeating filesystem
// boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use converge_cli::cli::{ApplyOpts, CheckOpts, GlobalOpts};

/// An isolated plan directory backed by a [`tempfile::TempDir`].
///
/// The directory is automatically deleted when dropped.
pub struct PlanFixture {
    /// Temporary directory holding the plan document, templates, and any
    /// converged artifacts.
    pub dir: tempfile::TempDir,
}

impl PlanFixture {
    /// Create an empty fixture (no plan written yet).
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// Path of the plan document.
    pub fn plan_path(&self) -> PathBuf {
        self.dir.path().join("plan.toml")
    }

    /// Write the plan document. `{root}` in the content is replaced with the
    /// fixture directory so steps can target isolated paths.
    pub fn write_plan(&self, content: &str) {
        let content = content.replace("{root}", &self.dir.path().display().to_string());
        std::fs::write(self.plan_path(), content).expect("write plan.toml");
    }

    /// Write a template file next to the plan document.
    pub fn write_template(&self, name: &str, content: &str) {
        std::fs::write(self.dir.path().join(name), content).expect("write template");
    }

    /// Path under the fixture directory.
    pub fn target(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Global options pointing at this fixture's plan.
    pub fn global_opts(&self, tags: &[&str], dry_run: bool) -> GlobalOpts {
        GlobalOpts {
            plan: self.plan_path(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            dry_run,
        }
    }

    /// Apply options with a fixture-local lock file, so parallel tests never
    /// contend on the host-wide default.
    pub fn apply_opts(&self) -> ApplyOpts {
        ApplyOpts {
            lock_file: Some(self.dir.path().join("converge.lock")),
        }
    }

    /// Check options.
    pub fn check_opts(&self) -> CheckOpts {
        CheckOpts {}
    }
}

/// Assert that a path's permission bits equal `mode` (no-op off Unix).
pub fn assert_mode(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let actual = std::fs::metadata(path)
            .expect("stat target")
            .permissions()
            .mode()
            & 0o7777;
        assert_eq!(
            actual, mode,
            "expected mode {mode:04o} on {}, got {actual:04o}",
            path.display()
        );
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
}
