//! Remote payload fetching for archive steps.
//!
//! Network access goes through the [`Fetcher`] trait so the engine can be
//! tested with canned payloads. The production implementation is
//! [`HttpFetcher`] over [`ureq`].

use sha2::{Digest, Sha256};

use crate::error::{EngineError, EngineResult};

/// Upper bound on a fetched archive, to keep a misconfigured URL from
/// exhausting memory.
const MAX_FETCH_BYTES: u64 = 512 * 1024 * 1024;

/// Source of remote payloads.
pub trait Fetcher: Send + Sync + std::fmt::Debug {
    /// Fetch the full payload at `url` into memory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NetworkFailure`] on transport or HTTP errors.
    fn fetch(&self, url: &str) -> EngineResult<Vec<u8>>;
}

/// Production [`Fetcher`] backed by a [`ureq::Agent`].
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher").finish_non_exhaustive()
    }
}

impl HttpFetcher {
    /// Create a fetcher with default agent configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> EngineResult<Vec<u8>> {
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", "converge")
            .call()
            .map_err(|e| EngineError::NetworkFailure(format!("GET {url}: {e}")))?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_FETCH_BYTES)
            .read_to_vec()
            .map_err(|e| EngineError::NetworkFailure(format!("reading body of {url}: {e}")))
    }
}

/// Compute the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for b in &result {
        // write! to a String is infallible; unwrap_or(()) makes that explicit.
        write!(hex, "{b:02x}").unwrap_or(());
    }
    hex
}

/// Canned in-memory fetcher for tests.
#[cfg(test)]
pub mod test_helpers {
    use super::{EngineError, EngineResult, Fetcher};
    use std::collections::HashMap;

    /// Returns registered payloads by exact URL; unknown URLs fail with
    /// [`EngineError::NetworkFailure`].
    #[derive(Debug, Default)]
    pub struct StaticFetcher {
        payloads: HashMap<String, Vec<u8>>,
    }

    impl StaticFetcher {
        /// Create an empty fetcher (all fetches fail).
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Register `bytes` as the payload served for `url`.
        #[must_use]
        pub fn with_payload(mut self, url: &str, bytes: &[u8]) -> Self {
            self.payloads.insert(url.to_string(), bytes.to_vec());
            self
        }
    }

    impl Fetcher for StaticFetcher {
        fn fetch(&self, url: &str) -> EngineResult<Vec<u8>> {
            self.payloads
                .get(url)
                .cloned()
                .ok_or_else(|| EngineError::NetworkFailure(format!("no route to {url}")))
        }
    }
}
