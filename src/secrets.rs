//! Secret resolution for steps that consume sensitive values.
//!
//! Plans reference secrets by name only; the raw values come from a
//! [`SecretProvider`] so that passwords and tokens never appear as literal
//! configuration. The production provider reads `CONVERGE_SECRET_<NAME>`
//! environment variables; tests inject a map-backed provider.

use crate::error::{EngineError, EngineResult};

/// Environment variable prefix used by [`EnvSecretProvider`].
const ENV_PREFIX: &str = "CONVERGE_SECRET_";

/// Source of secret values referenced by the plan.
pub trait SecretProvider: Send + Sync + std::fmt::Debug {
    /// Resolve the secret with the given plan-level name.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ResourceUnavailable`] when the secret is not
    /// known to the provider.
    fn resolve(&self, name: &str) -> EngineResult<String>;
}

/// Production provider backed by process environment variables.
///
/// A secret named `api_token` resolves from `CONVERGE_SECRET_API_TOKEN`:
/// the name is upper-cased and non-alphanumeric characters become `_`.
#[derive(Debug, Default)]
pub struct EnvSecretProvider;

impl EnvSecretProvider {
    /// Environment variable name for a plan-level secret name.
    #[must_use]
    pub fn var_name(name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{ENV_PREFIX}{suffix}")
    }
}

impl SecretProvider for EnvSecretProvider {
    fn resolve(&self, name: &str) -> EngineResult<String> {
        let var = Self::var_name(name);
        std::env::var(&var).map_err(|_| {
            EngineError::ResourceUnavailable(format!("secret '{name}' not set (expected {var})"))
        })
    }
}

/// Map-backed provider for tests and embedding callers.
#[derive(Debug, Default)]
pub struct StaticSecretProvider {
    values: std::collections::HashMap<String, String>,
}

impl StaticSecretProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret value under `name`.
    #[must_use]
    pub fn with_secret(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

impl SecretProvider for StaticSecretProvider {
    fn resolve(&self, name: &str) -> EngineResult<String> {
        self.values.get(name).cloned().ok_or_else(|| {
            EngineError::ResourceUnavailable(format!("secret '{name}' not registered"))
        })
    }
}
