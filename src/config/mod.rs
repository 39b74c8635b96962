//! Plan document loading and validation.
//!
//! A plan is a TOML file with an optional `[vars]` table and an ordered
//! `[[step]]` array. Variables are interpolated into step fields at load
//! time, so the engine only ever sees concrete values.

pub mod interpolate;
pub mod step;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub use step::{Step, StepKind, StepSpec};

use crate::resources::perms;

/// A loaded, interpolated plan.
#[derive(Debug)]
pub struct Plan {
    /// Plan-level variables (already substituted into the steps).
    pub vars: BTreeMap<String, String>,
    /// Ordered steps; order is significant.
    pub steps: Vec<Step>,
    /// Directory containing the plan document; template sources resolve
    /// relative to it.
    pub dir: PathBuf,
}

/// Top-level shape of the raw document, before interpolation.
#[derive(Debug, serde::Deserialize)]
struct RawPlan {
    #[serde(default)]
    vars: BTreeMap<String, String>,
    #[serde(default, rename = "step")]
    steps: Vec<toml::Value>,
}

impl Plan {
    /// Load and interpolate the plan at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, a
    /// step fails to deserialize, or interpolation references an unknown
    /// variable.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading plan {}", path.display()))?;
        let raw: RawPlan = toml::from_str(&content)
            .with_context(|| format!("parsing plan {}", path.display()))?;

        let mut steps = Vec::with_capacity(raw.steps.len());
        for (index, value) in raw.steps.into_iter().enumerate() {
            let interpolated = interpolate::substitute(value, &raw.vars)
                .with_context(|| format!("interpolating step {}", index + 1))?;
            let step: Step = interpolated
                .try_into()
                .with_context(|| format!("parsing step {}", index + 1))?;
            steps.push(step);
        }

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        Ok(Self {
            vars: raw.vars,
            steps,
            dir,
        })
    }

    /// Validate cross-field constraints the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending step and constraint.
    pub fn validate(&self) -> Result<()> {
        for step in &self.steps {
            let label = step.display_name();
            match &step.spec {
                StepSpec::File(spec) => {
                    if spec.content.is_some() && spec.secret.is_some() {
                        bail!("step '{label}': 'content' and 'secret' are mutually exclusive");
                    }
                    if spec.state != step::FileTarget::File
                        && (spec.content.is_some() || spec.secret.is_some())
                    {
                        bail!("step '{label}': content requires state = \"file\"");
                    }
                    if let Some(mode) = &spec.mode {
                        perms::parse_octal_mode(mode)
                            .with_context(|| format!("step '{label}': invalid mode"))?;
                    }
                }
                StepSpec::Template(spec) => {
                    if let Some(mode) = &spec.mode {
                        perms::parse_octal_mode(mode)
                            .with_context(|| format!("step '{label}': invalid mode"))?;
                    }
                    let src = self.dir.join(&spec.src);
                    if !src.is_file() {
                        bail!(
                            "step '{label}': template source {} does not exist",
                            src.display()
                        );
                    }
                }
                StepSpec::Archive(spec) => {
                    let digest = spec.sha256.trim();
                    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                        bail!(
                            "step '{label}': 'sha256' must be a 64-character hex digest, got '{}'",
                            spec.sha256
                        );
                    }
                }
                StepSpec::Container(spec) => {
                    for port in &spec.ports {
                        if parse_port_pair(port).is_none() {
                            bail!(
                                "step '{label}': port '{port}' must be \"host:container\" with numeric ports"
                            );
                        }
                    }
                    for volume in &spec.volumes {
                        if volume.split(':').count() < 2 {
                            bail!(
                                "step '{label}': volume '{volume}' must be \"host:container[:options]\""
                            );
                        }
                    }
                }
                StepSpec::Package(_) | StepSpec::Service(_) | StepSpec::User(_) => {}
            }
            if step.identity().trim().is_empty() {
                bail!("step '{label}': identity must not be empty");
            }
        }
        Ok(())
    }
}

/// Split a `"host:container"` publish spec into its numeric halves.
#[must_use]
pub fn parse_port_pair(spec: &str) -> Option<(u16, u16)> {
    let (host, container) = spec.split_once(':')?;
    Some((host.parse().ok()?, container.parse().ok()?))
}
