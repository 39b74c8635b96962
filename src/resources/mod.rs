//! Idempotent resource adapters (`current_state` + `apply` pattern).
//!
//! Each adapter is the only code that touches its slice of host state:
//! package database, systemd, user database, filesystem, network/archive,
//! or the container engine. The engine drives them through the [`Resource`]
//! trait, strictly one at a time.

pub mod archive;
pub mod container;
pub mod file;
pub mod package;
pub mod perms;
pub mod service;
pub mod template;
pub mod user;

use crate::error::EngineResult;

/// State of a target resource relative to its desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Resource does not exist.
    Missing,
    /// Resource exists and matches the desired state.
    Correct,
    /// Resource exists but does not match the desired state.
    Divergent {
        /// Human-readable description of the divergence.
        current: String,
    },
}

/// Unified interface for resources that can be resolved and converged.
///
/// `current_state` must not mutate the host; `apply` performs the minimal
/// mutation to reach the desired state. Calling `apply` when the state is
/// already [`ResourceState::Correct`] is permitted and must be a no-op, but
/// the engine never does so.
pub trait Resource {
    /// Human-readable description of this resource.
    fn describe(&self) -> String;

    /// Resolve the current state of the target.
    ///
    /// # Errors
    ///
    /// Returns an error when the state cannot be determined (I/O failure,
    /// missing query tool, permission problem).
    fn current_state(&self) -> EngineResult<ResourceState>;

    /// Converge the target to the desired state.
    ///
    /// # Errors
    ///
    /// Returns a classified [`EngineError`](crate::error::EngineError) when
    /// the mutation fails or the current state conflicts irreconcilably.
    fn apply(&self) -> EngineResult<()>;
}
