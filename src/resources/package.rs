//! Distro package resource.
use crate::error::{EngineError, EngineResult};
use crate::exec::Executor;

use super::{Resource, ResourceState};

/// Supported package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// Debian/Ubuntu (apt-get, queried via dpkg-query).
    Apt,
    /// Fedora/RHEL (dnf, queried via rpm).
    Dnf,
    /// Arch Linux (pacman).
    Pacman,
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apt => write!(f, "apt"),
            Self::Dnf => write!(f, "dnf"),
            Self::Pacman => write!(f, "pacman"),
        }
    }
}

impl PackageManager {
    /// Parse an explicit manager name from the plan.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ResourceUnavailable`] for unknown names.
    pub fn from_name(name: &str) -> EngineResult<Self> {
        match name {
            "apt" | "apt-get" => Ok(Self::Apt),
            "dnf" | "yum" => Ok(Self::Dnf),
            "pacman" => Ok(Self::Pacman),
            other => Err(EngineError::ResourceUnavailable(format!(
                "unknown package manager '{other}'"
            ))),
        }
    }

    /// Detect the host's package manager by probing PATH.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ResourceUnavailable`] when no supported
    /// manager is installed.
    pub fn detect(executor: &dyn Executor) -> EngineResult<Self> {
        if executor.which("apt-get") {
            Ok(Self::Apt)
        } else if executor.which("dnf") {
            Ok(Self::Dnf)
        } else if executor.which("pacman") {
            Ok(Self::Pacman)
        } else {
            Err(EngineError::ResourceUnavailable(
                "no supported package manager found (apt-get, dnf, pacman)".to_string(),
            ))
        }
    }
}

/// A system package that can be queried and installed.
#[derive(Debug)]
pub struct PackageResource<'a> {
    /// Package name as known to the manager.
    pub name: String,
    /// Package manager to use.
    pub manager: PackageManager,
    executor: &'a dyn Executor,
}

impl<'a> PackageResource<'a> {
    /// Create a new package resource.
    #[must_use]
    pub const fn new(name: String, manager: PackageManager, executor: &'a dyn Executor) -> Self {
        Self {
            name,
            manager,
            executor,
        }
    }
}

impl Resource for PackageResource<'_> {
    fn describe(&self) -> String {
        format!("{} ({})", self.name, self.manager)
    }

    fn current_state(&self) -> EngineResult<ResourceState> {
        let result = match self.manager {
            PackageManager::Apt => {
                // dpkg-query reports "install ok installed" for present
                // packages; removed-but-not-purged packages still resolve.
                let result = self
                    .executor
                    .run_unchecked(
                        "dpkg-query",
                        &["-W", "-f", "${Status}", &self.name],
                    )
                    .map_err(EngineError::Other)?;
                return Ok(
                    if result.success && result.stdout.contains("install ok installed") {
                        ResourceState::Correct
                    } else {
                        ResourceState::Missing
                    },
                );
            }
            PackageManager::Dnf => self
                .executor
                .run_unchecked("rpm", &["-q", &self.name])
                .map_err(EngineError::Other)?,
            PackageManager::Pacman => self
                .executor
                .run_unchecked("pacman", &["-Q", &self.name])
                .map_err(EngineError::Other)?,
        };
        Ok(if result.success {
            ResourceState::Correct
        } else {
            ResourceState::Missing
        })
    }

    fn apply(&self) -> EngineResult<()> {
        let (program, args): (&str, Vec<&str>) = match self.manager {
            PackageManager::Apt => ("apt-get", vec!["install", "-y", &self.name]),
            PackageManager::Dnf => ("dnf", vec!["install", "-y", &self.name]),
            PackageManager::Pacman => (
                "pacman",
                vec!["-S", "--needed", "--noconfirm", &self.name],
            ),
        };
        let result = self
            .executor
            .run_unchecked(program, &args)
            .map_err(EngineError::Other)?;
        if result.success {
            Ok(())
        } else {
            Err(EngineError::from_command(
                &format!("{program} install {}", self.name),
                &result.stderr,
            ))
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::exec::test_helpers::{MockExecutor, RecordingExecutor};

    #[test]
    fn describe_includes_manager() {
        let executor = MockExecutor::ok("");
        let resource =
            PackageResource::new("docker.io".to_string(), PackageManager::Apt, &executor);
        assert_eq!(resource.describe(), "docker.io (apt)");
    }

    #[test]
    fn from_name_accepts_aliases() {
        assert_eq!(
            PackageManager::from_name("apt-get").unwrap(),
            PackageManager::Apt
        );
        assert_eq!(PackageManager::from_name("yum").unwrap(), PackageManager::Dnf);
        assert_eq!(
            PackageManager::from_name("pacman").unwrap(),
            PackageManager::Pacman
        );
    }

    #[test]
    fn from_name_rejects_unknown() {
        let err = PackageManager::from_name("brew").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
    }

    #[test]
    fn detect_fails_when_nothing_on_path() {
        let executor = MockExecutor::fail().with_which(false);
        let err = PackageManager::detect(&executor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
    }

    #[test]
    fn apt_installed_when_status_reports_installed() {
        let executor = MockExecutor::ok("install ok installed");
        let resource =
            PackageResource::new("docker.io".to_string(), PackageManager::Apt, &executor);
        assert_eq!(resource.current_state().unwrap(), ResourceState::Correct);
    }

    #[test]
    fn apt_missing_when_status_reports_deinstalled() {
        let executor = MockExecutor::ok("deinstall ok config-files");
        let resource =
            PackageResource::new("docker.io".to_string(), PackageManager::Apt, &executor);
        assert_eq!(resource.current_state().unwrap(), ResourceState::Missing);
    }

    #[test]
    fn apt_missing_when_query_fails() {
        let executor = MockExecutor::fail();
        let resource =
            PackageResource::new("docker.io".to_string(), PackageManager::Apt, &executor);
        assert_eq!(resource.current_state().unwrap(), ResourceState::Missing);
    }

    #[test]
    fn pacman_installed_when_query_succeeds() {
        let executor = MockExecutor::ok("docker 1:27.0-1\n");
        let resource =
            PackageResource::new("docker".to_string(), PackageManager::Pacman, &executor);
        assert_eq!(resource.current_state().unwrap(), ResourceState::Correct);
    }

    #[test]
    fn dnf_missing_when_rpm_query_fails() {
        let executor = MockExecutor::fail();
        let resource = PackageResource::new("docker".to_string(), PackageManager::Dnf, &executor);
        assert_eq!(resource.current_state().unwrap(), ResourceState::Missing);
    }

    #[test]
    fn apply_apt_issues_noninteractive_install() {
        let executor = RecordingExecutor::new();
        let resource =
            PackageResource::new("docker.io".to_string(), PackageManager::Apt, &executor);
        resource.apply().unwrap();

        let calls = executor.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "apt-get");
        assert_eq!(calls[0].1, vec!["install", "-y", "docker.io"]);
    }

    #[test]
    fn apply_pacman_uses_needed_noconfirm() {
        let executor = RecordingExecutor::new();
        let resource =
            PackageResource::new("docker".to_string(), PackageManager::Pacman, &executor);
        resource.apply().unwrap();

        let calls = executor.recorded_calls();
        assert_eq!(calls[0].0, "pacman");
        assert_eq!(calls[0].1, vec!["-S", "--needed", "--noconfirm", "docker"]);
    }

    #[test]
    fn apply_failure_is_classified() {
        let executor = MockExecutor::fail();
        let resource =
            PackageResource::new("no-such-pkg".to_string(), PackageManager::Apt, &executor);
        let err = resource.apply().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
    }
}
