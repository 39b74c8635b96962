//! Step types deserialized from the plan document.
use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Resource kind of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Distro package.
    Package,
    /// Systemd service state.
    ServiceState,
    /// Local user account.
    UserAccount,
    /// File, directory or absence.
    FileState,
    /// Fetched and verified archive.
    ArchiveExtract,
    /// Rendered template file.
    TemplatedFile,
    /// Running container.
    ContainerRun,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Package => "package",
            Self::ServiceState => "service",
            Self::UserAccount => "user",
            Self::FileState => "file",
            Self::ArchiveExtract => "archive",
            Self::TemplatedFile => "template",
            Self::ContainerRun => "container",
        };
        f.write_str(name)
    }
}

/// One declared unit of desired host state.
///
/// Steps are ordered in the plan and executed strictly in that order: later
/// steps may depend on resources created by earlier ones.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Display label; falls back to `kind identity` when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Selector tags for partial runs.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Log failures instead of aborting the run.
    #[serde(default)]
    pub best_effort: bool,
    /// Kind-specific desired state.
    #[serde(flatten)]
    pub spec: StepSpec,
}

impl Step {
    /// Resource kind of this step.
    #[must_use]
    pub const fn kind(&self) -> StepKind {
        match &self.spec {
            StepSpec::Package(_) => StepKind::Package,
            StepSpec::Service(_) => StepKind::ServiceState,
            StepSpec::User(_) => StepKind::UserAccount,
            StepSpec::File(_) => StepKind::FileState,
            StepSpec::Archive(_) => StepKind::ArchiveExtract,
            StepSpec::Template(_) => StepKind::TemplatedFile,
            StepSpec::Container(_) => StepKind::ContainerRun,
        }
    }

    /// String uniquely identifying the target resource.
    #[must_use]
    pub fn identity(&self) -> String {
        match &self.spec {
            StepSpec::Package(s) => s.package.clone(),
            StepSpec::Service(s) => s.service.clone(),
            StepSpec::User(s) => s.user.clone(),
            StepSpec::File(s) => s.path.display().to_string(),
            StepSpec::Archive(s) => s.dest.display().to_string(),
            StepSpec::Template(s) => s.dest.display().to_string(),
            StepSpec::Container(s) => s.container.clone(),
        }
    }

    /// Display label for logs and the run summary.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.kind(), self.identity()))
    }

    /// Whether this step is selected by the given tag set.
    ///
    /// An empty selector selects every step; otherwise the step's tag set
    /// must intersect it. This is a pure predicate — selection never reorders
    /// steps.
    #[must_use]
    pub fn selected_by(&self, selector: &[String]) -> bool {
        selector.is_empty() || self.tags.iter().any(|t| selector.contains(t))
    }
}

/// Kind-specific desired state of a step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSpec {
    /// Ensure a distro package is installed.
    Package(PackageSpec),
    /// Ensure a systemd unit is in the desired run/enablement state.
    Service(ServiceSpec),
    /// Ensure a local user account exists.
    User(UserSpec),
    /// Ensure a file or directory matches the desired state.
    File(FileSpec),
    /// Fetch, verify and extract a remote archive.
    Archive(ArchiveSpec),
    /// Render a template to a destination file.
    Template(TemplateSpec),
    /// Ensure a container is running with the desired configuration.
    Container(ContainerSpec),
}

/// Desired state for a package step.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageSpec {
    /// Package name as known to the manager.
    pub package: String,
    /// Explicit manager (`apt`, `dnf`, `pacman`); detected from PATH when
    /// absent.
    #[serde(default)]
    pub manager: Option<String>,
}

/// Desired run state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTarget {
    /// Unit should be active.
    #[default]
    Running,
    /// Unit should be inactive.
    Stopped,
}

/// Desired state for a service step.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSpec {
    /// Systemd unit name.
    pub service: String,
    /// Desired run state.
    #[serde(default)]
    pub state: ServiceTarget,
    /// Whether the unit should be enabled at boot.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Desired state for a user step.
#[derive(Debug, Clone, Deserialize)]
pub struct UserSpec {
    /// Account name.
    pub user: String,
    /// Home directory; the manager's default when absent.
    #[serde(default)]
    pub home: Option<PathBuf>,
    /// Login shell; the manager's default when absent.
    #[serde(default)]
    pub shell: Option<String>,
    /// Create as a system account.
    #[serde(default)]
    pub system: bool,
}

/// Desired presence of a filesystem path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileTarget {
    /// Regular file.
    #[default]
    File,
    /// Directory.
    Directory,
    /// Path must not exist.
    Absent,
}

/// Desired state for a file step.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSpec {
    /// Absolute target path.
    pub path: PathBuf,
    /// File, directory or absent.
    #[serde(default)]
    pub state: FileTarget,
    /// Owning user name.
    #[serde(default)]
    pub owner: Option<String>,
    /// Owning group name.
    #[serde(default)]
    pub group: Option<String>,
    /// Octal permission mode (e.g. `"0755"`).
    #[serde(default)]
    pub mode: Option<String>,
    /// Literal file content.
    #[serde(default)]
    pub content: Option<String>,
    /// Name of a secret whose value becomes the file content. Forces
    /// owner-only permissions on the artifact.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Desired state for an archive step.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveSpec {
    /// Source URL of the tar / tar.gz payload.
    pub url: String,
    /// Directory the archive is extracted into.
    pub dest: PathBuf,
    /// Expected SHA-256 of the payload, hex-encoded. Verified before any
    /// extraction; a mismatch is fatal.
    pub sha256: String,
}

/// Desired state for a template step.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSpec {
    /// Template source, relative to the plan document's directory.
    pub src: PathBuf,
    /// Absolute destination path.
    pub dest: PathBuf,
    /// Owning user name.
    #[serde(default)]
    pub owner: Option<String>,
    /// Owning group name.
    #[serde(default)]
    pub group: Option<String>,
    /// Octal permission mode of the rendered file.
    #[serde(default)]
    pub mode: Option<String>,
}

/// Desired state for a container step.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSpec {
    /// Container name.
    pub container: String,
    /// Image reference, including tag.
    pub image: String,
    /// Published ports as `"host:container"` pairs.
    #[serde(default)]
    pub ports: Vec<String>,
    /// Bind mounts as `"host:container[:options]"` strings.
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Environment variables set in the container.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Restart policy (`no`, `always`, `unless-stopped`, …); engine default
    /// when absent.
    #[serde(default)]
    pub restart: Option<String>,
    /// Explicit container engine (`docker` or `podman`); detected from PATH
    /// when absent.
    #[serde(default)]
    pub engine: Option<String>,
}

fn default_true() -> bool {
    true
}
