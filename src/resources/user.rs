//! Local user account resource.
use std::path::PathBuf;

use crate::error::{EngineError, EngineResult};
use crate::exec::Executor;

use super::{Resource, ResourceState};

/// A local user account created with `useradd` and queried via `getent`.
#[derive(Debug)]
pub struct UserResource<'a> {
    /// Account name.
    pub name: String,
    /// Home directory; the manager's default when absent.
    pub home: Option<PathBuf>,
    /// Login shell; the manager's default when absent.
    pub shell: Option<String>,
    /// Create as a system account.
    pub system: bool,
    executor: &'a dyn Executor,
}

impl<'a> UserResource<'a> {
    /// Create a new user resource.
    #[must_use]
    pub const fn new(
        name: String,
        home: Option<PathBuf>,
        shell: Option<String>,
        system: bool,
        executor: &'a dyn Executor,
    ) -> Self {
        Self {
            name,
            home,
            shell,
            system,
            executor,
        }
    }
}

impl Resource for UserResource<'_> {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn current_state(&self) -> EngineResult<ResourceState> {
        let result = self
            .executor
            .run_unchecked("getent", &["passwd", &self.name])
            .map_err(EngineError::Other)?;
        Ok(if result.success {
            ResourceState::Correct
        } else {
            ResourceState::Missing
        })
    }

    fn apply(&self) -> EngineResult<()> {
        let home = self.home.as_ref().map(|h| h.display().to_string());
        let mut args: Vec<&str> = Vec::new();
        if self.system {
            args.push("--system");
        }
        if let Some(home) = &home {
            args.push("--home-dir");
            args.push(home);
            args.push("--create-home");
        }
        if let Some(shell) = &self.shell {
            args.push("--shell");
            args.push(shell);
        }
        args.push(&self.name);

        let result = self
            .executor
            .run_unchecked("useradd", &args)
            .map_err(EngineError::Other)?;
        if result.success {
            Ok(())
        } else {
            Err(EngineError::from_command(
                &format!("useradd {}", self.name),
                &result.stderr,
            ))
        }
    }
}
