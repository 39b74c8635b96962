//! File and directory resource.
use std::path::PathBuf;

use crate::config::step::{FileSpec, FileTarget};
use crate::error::{EngineError, EngineResult};
use crate::exec::Executor;
use crate::fetch::sha256_hex;
use crate::secrets::SecretProvider;

use super::{Resource, ResourceState, perms};

/// Mode forced onto secret-sourced artifacts, regardless of configuration.
const SECRET_MODE: u32 = 0o600;

/// Default mode for files created without an explicit mode.
const DEFAULT_FILE_MODE: u32 = 0o644;

/// A path converged to a file, directory, or absence.
///
/// Content equality is decided by SHA-256; ownership and mode are compared
/// only when declared. Secret-sourced content forces owner-only permissions
/// on the artifact.
#[derive(Debug)]
pub struct FileResource<'a> {
    /// Absolute target path.
    pub path: PathBuf,
    /// Desired presence.
    pub target: FileTarget,
    owner: Option<String>,
    group: Option<String>,
    mode: Option<u32>,
    content: Option<Vec<u8>>,
    secret_sourced: bool,
    executor: &'a dyn Executor,
}

impl<'a> FileResource<'a> {
    /// Build the resource from its plan spec, resolving secret content.
    ///
    /// # Errors
    ///
    /// Returns an error when the mode string is invalid or a referenced
    /// secret cannot be resolved.
    pub fn from_spec(
        spec: &FileSpec,
        secrets: &dyn SecretProvider,
        executor: &'a dyn Executor,
    ) -> EngineResult<Self> {
        let mut mode = spec.mode.as_deref().map(perms::parse_octal_mode).transpose()?;
        let mut secret_sourced = false;
        let content = if let Some(name) = &spec.secret {
            // A persisted secret is never world- or group-readable, whatever
            // the plan says.
            mode = Some(SECRET_MODE);
            secret_sourced = true;
            Some(secrets.resolve(name)?.into_bytes())
        } else {
            spec.content.as_ref().map(|c| c.clone().into_bytes())
        };

        Ok(Self {
            path: spec.path.clone(),
            target: spec.state,
            owner: spec.owner.clone(),
            group: spec.group.clone(),
            mode,
            content,
            secret_sourced,
            executor,
        })
    }

    fn metadata(&self) -> EngineResult<Option<std::fs::Metadata>> {
        match std::fs::symlink_metadata(&self.path) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::from_io(
                &e,
                &format!("stat {}", self.path.display()),
            )),
        }
    }

    /// Compare mode and ownership, appending divergences to `diffs`.
    fn compare_attrs(&self, diffs: &mut Vec<String>) -> EngineResult<()> {
        if let Some(want) = self.mode {
            if let Some(current) = perms::file_mode(&self.path)? {
                if current != want {
                    diffs.push(format!("mode {current:04o} != {want:04o}"));
                }
            }
        }
        if self.owner.is_some() || self.group.is_some() {
            if let Some((uid, gid)) = perms::file_owner(&self.path)? {
                if let Some(owner) = &self.owner {
                    if perms::lookup_uid(self.executor, owner)? != uid {
                        diffs.push(format!("uid {uid} != {owner}"));
                    }
                }
                if let Some(group) = &self.group {
                    if perms::lookup_gid(self.executor, group)? != gid {
                        diffs.push(format!("gid {gid} != {group}"));
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_attrs(&self) -> EngineResult<()> {
        if let Some(mode) = self.mode {
            perms::set_mode(&self.path, mode)?;
        }
        perms::chown(
            self.executor,
            &self.path,
            self.owner.as_deref(),
            self.group.as_deref(),
        )
    }
}

impl Resource for FileResource<'_> {
    fn describe(&self) -> String {
        let kind = match self.target {
            FileTarget::File => "file",
            FileTarget::Directory => "directory",
            FileTarget::Absent => "absent",
        };
        format!("{kind} {}", self.path.display())
    }

    fn current_state(&self) -> EngineResult<ResourceState> {
        let Some(meta) = self.metadata()? else {
            return Ok(match self.target {
                FileTarget::Absent => ResourceState::Correct,
                FileTarget::File | FileTarget::Directory => ResourceState::Missing,
            });
        };

        match self.target {
            FileTarget::Absent => Ok(ResourceState::Divergent {
                current: "exists".to_string(),
            }),
            FileTarget::File => {
                if meta.is_dir() {
                    return Ok(ResourceState::Divergent {
                        current: "is a directory".to_string(),
                    });
                }
                let mut diffs = Vec::new();
                if let Some(want) = &self.content {
                    let current = std::fs::read(&self.path).map_err(|e| {
                        EngineError::from_io(&e, &format!("reading {}", self.path.display()))
                    })?;
                    if sha256_hex(&current) != sha256_hex(want) {
                        diffs.push("content differs".to_string());
                    }
                }
                self.compare_attrs(&mut diffs)?;
                Ok(if diffs.is_empty() {
                    ResourceState::Correct
                } else {
                    ResourceState::Divergent {
                        current: diffs.join(", "),
                    }
                })
            }
            FileTarget::Directory => {
                if !meta.is_dir() {
                    return Ok(ResourceState::Divergent {
                        current: "is not a directory".to_string(),
                    });
                }
                let mut diffs = Vec::new();
                self.compare_attrs(&mut diffs)?;
                Ok(if diffs.is_empty() {
                    ResourceState::Correct
                } else {
                    ResourceState::Divergent {
                        current: diffs.join(", "),
                    }
                })
            }
        }
    }

    fn apply(&self) -> EngineResult<()> {
        let meta = self.metadata()?;

        match self.target {
            FileTarget::Absent => {
                if let Some(meta) = meta {
                    let result = if meta.is_dir() {
                        std::fs::remove_dir_all(&self.path)
                    } else {
                        std::fs::remove_file(&self.path)
                    };
                    result.map_err(|e| {
                        EngineError::from_io(&e, &format!("removing {}", self.path.display()))
                    })?;
                }
                Ok(())
            }
            FileTarget::File => {
                if meta.as_ref().is_some_and(std::fs::Metadata::is_dir) {
                    return Err(EngineError::ConflictingState(format!(
                        "{} is a directory, declared as a file",
                        self.path.display()
                    )));
                }
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        EngineError::from_io(&e, &format!("creating {}", parent.display()))
                    })?;
                }
                let effective_mode = self.mode.unwrap_or(DEFAULT_FILE_MODE);
                match (&self.content, meta.is_some()) {
                    // Managed content is always written through the atomic
                    // path so a crash cannot leave a partial or over-exposed
                    // artifact.
                    (Some(content), _) => {
                        perms::atomic_write(&self.path, content, effective_mode)?;
                    }
                    (None, false) => {
                        perms::atomic_write(&self.path, b"", effective_mode)?;
                    }
                    (None, true) => {}
                }
                self.apply_attrs()
            }
            FileTarget::Directory => {
                if meta.as_ref().is_some_and(|m| !m.is_dir()) {
                    return Err(EngineError::ConflictingState(format!(
                        "{} exists and is not a directory",
                        self.path.display()
                    )));
                }
                std::fs::create_dir_all(&self.path).map_err(|e| {
                    EngineError::from_io(&e, &format!("creating {}", self.path.display()))
                })?;
                self.apply_attrs()
            }
        }
    }
}
