//! Templated file resource.
//!
//! Templates live next to the plan document and use `{{ name }}` for plan
//! variables and `{{ secret.name }}` for provider-resolved secrets. A
//! rendered file that carries any secret must not be group- or
//! world-readable; the check runs before a single byte is written.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{EngineError, EngineResult};
use crate::exec::Executor;
use crate::fetch::sha256_hex;
use crate::secrets::SecretProvider;

use super::{Resource, ResourceState, perms};

/// Default mode for rendered files without an explicit mode.
const DEFAULT_TEMPLATE_MODE: u32 = 0o644;

/// Read bits that make an artifact visible beyond its owner.
const PUBLIC_READ_BITS: u32 = 0o044;

/// A file rendered from a local template.
#[derive(Debug)]
pub struct TemplateResource<'a> {
    /// Absolute template source path.
    pub src: PathBuf,
    /// Absolute destination path.
    pub dest: PathBuf,
    owner: Option<String>,
    group: Option<String>,
    mode: Option<u32>,
    vars: &'a BTreeMap<String, String>,
    secrets: &'a dyn SecretProvider,
    executor: &'a dyn Executor,
}

impl<'a> TemplateResource<'a> {
    /// Create a new template resource.
    ///
    /// # Errors
    ///
    /// Returns an error when the mode string is invalid.
    pub fn new(
        src: PathBuf,
        dest: PathBuf,
        owner: Option<String>,
        group: Option<String>,
        mode: Option<&str>,
        vars: &'a BTreeMap<String, String>,
        secrets: &'a dyn SecretProvider,
        executor: &'a dyn Executor,
    ) -> EngineResult<Self> {
        Ok(Self {
            src,
            dest,
            owner,
            group,
            mode: mode.map(perms::parse_octal_mode).transpose()?,
            vars,
            secrets,
            executor,
        })
    }

    /// Render the template. Returns the output and whether any secret was
    /// interpolated.
    fn render(&self) -> EngineResult<(String, bool)> {
        let template = std::fs::read_to_string(&self.src)
            .map_err(|e| EngineError::from_io(&e, &format!("reading {}", self.src.display())))?;
        render_str(&template, self.vars, self.secrets)
    }

    const fn effective_mode(&self) -> u32 {
        match self.mode {
            Some(mode) => mode,
            None => DEFAULT_TEMPLATE_MODE,
        }
    }
}

/// Render `template`, substituting `{{ name }}` from `vars` and
/// `{{ secret.name }}` from the provider.
///
/// # Errors
///
/// Returns an error for unterminated or unresolvable placeholders and for
/// secrets the provider does not know.
pub fn render_str(
    template: &str,
    vars: &BTreeMap<String, String>,
    secrets: &dyn SecretProvider,
) -> EngineResult<(String, bool)> {
    let mut out = String::with_capacity(template.len());
    let mut used_secret = false;
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let (before, after_open) = rest.split_at(start);
        out.push_str(before);
        let after_open = after_open.trim_start_matches("{{");
        let Some(end) = after_open.find("}}") else {
            return Err(EngineError::Other(anyhow::anyhow!(
                "unterminated '{{{{' placeholder in template"
            )));
        };
        let (raw_name, after_close) = after_open.split_at(end);
        let name = raw_name.trim();

        if let Some(secret_name) = name.strip_prefix("secret.") {
            out.push_str(&secrets.resolve(secret_name)?);
            used_secret = true;
        } else if let Some(value) = vars.get(name) {
            out.push_str(value);
        } else {
            return Err(EngineError::Other(anyhow::anyhow!(
                "unresolved placeholder '{name}' in template"
            )));
        }
        rest = after_close.trim_start_matches("}}");
    }
    out.push_str(rest);
    Ok((out, used_secret))
}

impl Resource for TemplateResource<'_> {
    fn describe(&self) -> String {
        format!("{} -> {}", self.src.display(), self.dest.display())
    }

    fn current_state(&self) -> EngineResult<ResourceState> {
        let (rendered, _) = self.render()?;

        let meta = match std::fs::symlink_metadata(&self.dest) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ResourceState::Missing);
            }
            Err(e) => {
                return Err(EngineError::from_io(
                    &e,
                    &format!("stat {}", self.dest.display()),
                ));
            }
        };
        if meta.is_dir() {
            return Ok(ResourceState::Divergent {
                current: "is a directory".to_string(),
            });
        }

        let current = std::fs::read(&self.dest)
            .map_err(|e| EngineError::from_io(&e, &format!("reading {}", self.dest.display())))?;
        let mut diffs = Vec::new();
        if sha256_hex(&current) != sha256_hex(rendered.as_bytes()) {
            diffs.push("content differs".to_string());
        }
        if let Some(current_mode) = perms::file_mode(&self.dest)? {
            if current_mode != self.effective_mode() {
                diffs.push(format!("mode {current_mode:04o}"));
            }
        }
        Ok(if diffs.is_empty() {
            ResourceState::Correct
        } else {
            ResourceState::Divergent {
                current: diffs.join(", "),
            }
        })
    }

    fn apply(&self) -> EngineResult<()> {
        let (rendered, used_secret) = self.render()?;
        let mode = self.effective_mode();

        // Containment check before anything touches the filesystem: a
        // secret may not land in an artifact readable beyond its owner.
        if used_secret && mode & PUBLIC_READ_BITS != 0 {
            return Err(EngineError::ConflictingState(format!(
                "template output {} interpolates a secret but mode {mode:04o} is group/world readable",
                self.dest.display()
            )));
        }

        if std::fs::symlink_metadata(&self.dest).is_ok_and(|m| m.is_dir()) {
            return Err(EngineError::ConflictingState(format!(
                "{} is a directory, declared as a rendered file",
                self.dest.display()
            )));
        }

        if let Some(parent) = self.dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::from_io(&e, &format!("creating {}", parent.display()))
            })?;
        }
        perms::atomic_write(&self.dest, rendered.as_bytes(), mode)?;
        perms::chown(
            self.executor,
            &self.dest,
            self.owner.as_deref(),
            self.group.as_deref(),
        )
    }
}
