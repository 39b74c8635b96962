//! Systemd service resource.
use crate::config::step::ServiceTarget;
use crate::error::{EngineError, EngineResult};
use crate::exec::Executor;

use super::{Resource, ResourceState};

/// A systemd unit with a desired run state and boot enablement.
#[derive(Debug)]
pub struct ServiceResource<'a> {
    /// Unit name (e.g. `"docker"` or `"nginx.service"`).
    pub unit: String,
    /// Desired run state.
    pub state: ServiceTarget,
    /// Whether the unit should be enabled at boot.
    pub enabled: bool,
    executor: &'a dyn Executor,
}

impl<'a> ServiceResource<'a> {
    /// Create a new service resource.
    #[must_use]
    pub const fn new(
        unit: String,
        state: ServiceTarget,
        enabled: bool,
        executor: &'a dyn Executor,
    ) -> Self {
        Self {
            unit,
            state,
            enabled,
            executor,
        }
    }

    fn observe(&self) -> EngineResult<(bool, bool)> {
        let active = self
            .executor
            .run_unchecked("systemctl", &["is-active", "--quiet", &self.unit])
            .map_err(EngineError::Other)?
            .success;
        let enabled = self
            .executor
            .run_unchecked("systemctl", &["is-enabled", "--quiet", &self.unit])
            .map_err(EngineError::Other)?
            .success;
        Ok((active, enabled))
    }

    fn systemctl(&self, verb: &str) -> EngineResult<()> {
        let result = self
            .executor
            .run_unchecked("systemctl", &[verb, &self.unit])
            .map_err(EngineError::Other)?;
        if result.success {
            Ok(())
        } else {
            Err(EngineError::from_command(
                &format!("systemctl {verb} {}", self.unit),
                &result.stderr,
            ))
        }
    }
}

impl Resource for ServiceResource<'_> {
    fn describe(&self) -> String {
        let state = match self.state {
            ServiceTarget::Running => "running",
            ServiceTarget::Stopped => "stopped",
        };
        format!("{} ({state}, enabled={})", self.unit, self.enabled)
    }

    fn current_state(&self) -> EngineResult<ResourceState> {
        let (active, enabled) = self.observe()?;
        let want_active = self.state == ServiceTarget::Running;

        if active == want_active && enabled == self.enabled {
            Ok(ResourceState::Correct)
        } else {
            Ok(ResourceState::Divergent {
                current: format!("active={active}, enabled={enabled}"),
            })
        }
    }

    fn apply(&self) -> EngineResult<()> {
        // Converge only the divergent halves so an already-enabled unit is
        // not churned just to be started (and vice versa).
        let (active, enabled) = self.observe()?;
        let want_active = self.state == ServiceTarget::Running;

        if enabled != self.enabled {
            self.systemctl(if self.enabled { "enable" } else { "disable" })?;
        }
        if active != want_active {
            self.systemctl(if want_active { "start" } else { "stop" })?;
        }
        Ok(())
    }
}
