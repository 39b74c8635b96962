//! Container resource driven through the docker/podman CLI.
use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::exec::Executor;

use super::{Resource, ResourceState};

/// Restart policy assumed when the plan and the engine give none.
const DEFAULT_RESTART_POLICY: &str = "no";

/// Detect the container engine binary, preferring docker over podman.
///
/// # Errors
///
/// Returns [`EngineError::ResourceUnavailable`] when neither is on PATH.
pub fn detect_engine(executor: &dyn Executor) -> EngineResult<String> {
    for candidate in ["docker", "podman"] {
        if executor.which(candidate) {
            return Ok(candidate.to_string());
        }
    }
    Err(EngineError::ResourceUnavailable(
        "no container engine found (docker, podman)".to_string(),
    ))
}

/// A named container converged to a desired image, port, volume, env and
/// restart-policy configuration.
///
/// Divergence is decided against `inspect` output; a divergent container is
/// removed and re-created rather than mutated in place, since most of the
/// compared attributes are immutable after creation.
#[derive(Debug)]
pub struct ContainerResource<'a> {
    /// Container name.
    pub name: String,
    /// Image reference, including tag.
    pub image: String,
    ports: Vec<String>,
    volumes: Vec<String>,
    env: BTreeMap<String, String>,
    restart: Option<String>,
    engine: String,
    executor: &'a dyn Executor,
}

impl<'a> ContainerResource<'a> {
    /// Create a new container resource bound to a concrete engine binary.
    #[must_use]
    pub const fn new(
        name: String,
        image: String,
        ports: Vec<String>,
        volumes: Vec<String>,
        env: BTreeMap<String, String>,
        restart: Option<String>,
        engine: String,
        executor: &'a dyn Executor,
    ) -> Self {
        Self {
            name,
            image,
            ports,
            volumes,
            env,
            restart,
            engine,
            executor,
        }
    }

    /// Inspect the container; `None` when it does not exist.
    fn inspect(&self) -> EngineResult<Option<Value>> {
        let result = self
            .executor
            .run_unchecked(
                &self.engine,
                &["inspect", "--type", "container", &self.name],
            )
            .map_err(EngineError::Other)?;
        if !result.success {
            return Ok(None);
        }
        let parsed: Value = serde_json::from_str(&result.stdout).map_err(|e| {
            EngineError::Other(anyhow::anyhow!(
                "unparseable inspect output for '{}': {e}",
                self.name
            ))
        })?;
        Ok(parsed.as_array().and_then(|a| a.first()).cloned())
    }

    fn desired_restart(&self) -> &str {
        self.restart.as_deref().unwrap_or(DEFAULT_RESTART_POLICY)
    }

    /// Desired publishes as `(container-port-key, host-port)` pairs, e.g.
    /// `("80/tcp", "8080")`.
    fn desired_port_pairs(&self) -> BTreeSet<(String, String)> {
        self.ports
            .iter()
            .filter_map(|p| p.split_once(':'))
            .map(|(host, container)| (format!("{container}/tcp"), host.to_string()))
            .collect()
    }

    /// Differences between the inspected container and the desired state.
    fn divergences(&self, info: &Value) -> Vec<String> {
        let mut diffs = Vec::new();

        let image = info
            .pointer("/Config/Image")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if image != self.image {
            diffs.push(format!("image {image}"));
        }

        if !info
            .pointer("/State/Running")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            diffs.push("not running".to_string());
        }

        let restart = info
            .pointer("/HostConfig/RestartPolicy/Name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_RESTART_POLICY);
        if restart != self.desired_restart() {
            diffs.push(format!("restart policy {restart}"));
        }

        if current_port_pairs(info) != self.desired_port_pairs() {
            diffs.push("published ports".to_string());
        }

        let binds: BTreeSet<String> = info
            .pointer("/HostConfig/Binds")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let desired_binds: BTreeSet<String> = self.volumes.iter().cloned().collect();
        if binds != desired_binds {
            diffs.push("volumes".to_string());
        }

        let current_env: BTreeSet<String> = info
            .pointer("/Config/Env")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        for (key, value) in &self.env {
            if !current_env.contains(&format!("{key}={value}")) {
                diffs.push(format!("env {key}"));
            }
        }

        diffs
    }

    fn remove(&self) -> EngineResult<()> {
        let result = self
            .executor
            .run_unchecked(&self.engine, &["rm", "-f", &self.name])
            .map_err(EngineError::Other)?;
        if result.success {
            Ok(())
        } else {
            Err(EngineError::from_command(
                &format!("{} rm -f {}", self.engine, self.name),
                &result.stderr,
            ))
        }
    }

    fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--restart".to_string(),
            self.desired_restart().to_string(),
        ];
        for port in &self.ports {
            args.push("-p".to_string());
            args.push(port.clone());
        }
        for volume in &self.volumes {
            args.push("-v".to_string());
            args.push(volume.clone());
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.image.clone());
        args
    }
}

/// Published `(container-port-key, host-port)` pairs of an inspected
/// container.
fn current_port_pairs(info: &Value) -> BTreeSet<(String, String)> {
    let mut pairs = BTreeSet::new();
    if let Some(bindings) = info
        .pointer("/HostConfig/PortBindings")
        .and_then(Value::as_object)
    {
        for (container_port, hosts) in bindings {
            if let Some(hosts) = hosts.as_array() {
                for host in hosts {
                    if let Some(host_port) = host.get("HostPort").and_then(Value::as_str) {
                        pairs.insert((container_port.clone(), host_port.to_string()));
                    }
                }
            }
        }
    }
    pairs
}

impl Resource for ContainerResource<'_> {
    fn describe(&self) -> String {
        format!("{} ({})", self.name, self.image)
    }

    fn current_state(&self) -> EngineResult<ResourceState> {
        let Some(info) = self.inspect()? else {
            return Ok(ResourceState::Missing);
        };
        let diffs = self.divergences(&info);
        Ok(if diffs.is_empty() {
            ResourceState::Correct
        } else {
            ResourceState::Divergent {
                current: diffs.join(", "),
            }
        })
    }

    fn apply(&self) -> EngineResult<()> {
        if self.inspect()?.is_some() {
            self.remove()?;
        }

        let args = self.run_args();
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let result = self
            .executor
            .run_unchecked(&self.engine, &arg_refs)
            .map_err(EngineError::Other)?;
        if result.success {
            Ok(())
        } else {
            Err(EngineError::from_command(
                &format!("{} run {}", self.engine, self.name),
                &result.stderr,
            ))
        }
    }
}
