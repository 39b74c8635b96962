//! Single-host idempotent provisioning engine.
//!
//! Reads an ordered list of declarative steps from a TOML plan — packages,
//! services, user accounts, files, verified archives, templated files and
//! containers — inspects current host state, and converges each step with
//! the minimal action, recording whether a change occurred.
//!
//! The public API is organised into four layers:
//!
//! - **[`config`]** — parse and validate the TOML plan document
//! - **[`resources`]** — idempotent `current_state + apply` adapters, one per
//!   resource kind
//! - **[`engine`]** — the strictly sequential converge loop and run report
//! - **[`commands`]** — top-level subcommand orchestration (`apply`, `check`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod fetch;
pub mod lock;
pub mod logging;
pub mod resources;
pub mod secrets;
