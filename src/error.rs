//! Typed errors for the provisioning engine.
//!
//! Resource adapters and the engine return [`EngineError`], which carries the
//! classification used for abort/continue decisions and reporting. Command
//! handlers at the CLI boundary convert to [`anyhow::Error`] via `?`.

use thiserror::Error;

/// Classification of an engine error.
///
/// The kind decides how a failure is reported and whether re-invoking the
/// run is a sensible recovery: [`NetworkFailure`](ErrorKind::NetworkFailure)
/// is transient and converges on retry, while
/// [`ChecksumMismatch`](ErrorKind::ChecksumMismatch) is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Target package, service, unit, image or tool is not available.
    ResourceUnavailable,
    /// The operation was denied by the operating system.
    PermissionDenied,
    /// A fetched payload did not match its expected digest.
    ChecksumMismatch,
    /// A network operation failed; re-invoking the run may succeed.
    NetworkFailure,
    /// Current host state cannot be reconciled automatically.
    ConflictingState,
    /// Anything that does not fit the taxonomy above.
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ResourceUnavailable => "resource unavailable",
            Self::PermissionDenied => "permission denied",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::NetworkFailure => "network failure",
            Self::ConflictingState => "conflicting state",
            Self::Other => "error",
        };
        f.write_str(name)
    }
}

/// Error produced while resolving or applying a step.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Target package, service, unit, image or tool was not found.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// The operating system denied the mutation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A fetched payload did not match its expected SHA-256 digest.
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Source URL of the payload.
        url: String,
        /// Digest declared in the plan.
        expected: String,
        /// Digest computed from the fetched bytes.
        actual: String,
    },

    /// A network operation failed.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// Current host state cannot be reconciled automatically
    /// (e.g., a directory exists where a file is declared).
    #[error("conflicting state: {0}")]
    ConflictingState(String),

    /// Uncategorised failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Self::NetworkFailure(_) => ErrorKind::NetworkFailure,
            Self::ConflictingState(_) => ErrorKind::ConflictingState,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Wrap an I/O error, promoting OS permission errors to
    /// [`EngineError::PermissionDenied`].
    #[must_use]
    pub fn from_io(err: &std::io::Error, context: &str) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied(format!("{context}: {err}"))
        } else {
            Self::Other(anyhow::anyhow!("{context}: {err}"))
        }
    }

    /// Classify a failed external command from its stderr output.
    ///
    /// Commands report permission problems in prose, so this is a heuristic:
    /// anything mentioning a denied permission maps to
    /// [`EngineError::PermissionDenied`], everything else to
    /// [`EngineError::ResourceUnavailable`].
    #[must_use]
    pub fn from_command(what: &str, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        if lower.contains("permission denied") || lower.contains("operation not permitted") {
            Self::PermissionDenied(format!("{what}: {}", stderr.trim()))
        } else {
            Self::ResourceUnavailable(format!("{what}: {}", stderr.trim()))
        }
    }
}

/// Shorthand result type used throughout the resource adapters.
pub type EngineResult<T> = Result<T, EngineError>;
