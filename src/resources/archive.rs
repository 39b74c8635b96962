//! Verified remote archive resource.
use std::path::PathBuf;

use crate::error::{EngineError, EngineResult};
use crate::fetch::{Fetcher, sha256_hex};

use super::{Resource, ResourceState};

/// Marker file recording the digest of the archive last extracted into a
/// destination. A matching marker short-circuits re-runs to `Unchanged`.
const DIGEST_MARKER: &str = ".converge-digest";

/// A remote tar / tar.gz archive extracted into a destination directory.
///
/// The payload's SHA-256 is verified against the plan's expected digest
/// before a single entry is unpacked; a mismatch is fatal and leaves the
/// destination untouched.
#[derive(Debug)]
pub struct ArchiveResource<'a> {
    /// Source URL.
    pub url: String,
    /// Destination directory.
    pub dest: PathBuf,
    expected: String,
    fetcher: &'a dyn Fetcher,
}

impl<'a> ArchiveResource<'a> {
    /// Create a new archive resource. The expected digest is normalised to
    /// lowercase hex.
    #[must_use]
    pub fn new(url: String, dest: PathBuf, sha256: &str, fetcher: &'a dyn Fetcher) -> Self {
        Self {
            url,
            dest,
            expected: sha256.trim().to_lowercase(),
            fetcher,
        }
    }

    fn marker_path(&self) -> PathBuf {
        self.dest.join(DIGEST_MARKER)
    }

    fn recorded_digest(&self) -> EngineResult<Option<String>> {
        match std::fs::read_to_string(self.marker_path()) {
            Ok(content) => Ok(Some(content.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::from_io(
                &e,
                &format!("reading digest marker in {}", self.dest.display()),
            )),
        }
    }

    fn extract(&self, bytes: &[u8]) -> EngineResult<()> {
        // Gzip magic bytes decide the decoder; plain tar unpacks directly.
        let io_result = if bytes.starts_with(&[0x1f, 0x8b]) {
            tar::Archive::new(flate2::read::GzDecoder::new(bytes)).unpack(&self.dest)
        } else {
            tar::Archive::new(bytes).unpack(&self.dest)
        };

        io_result
            .and_then(|()| std::fs::write(self.marker_path(), format!("{}\n", self.expected)))
            .map_err(|e| {
                EngineError::from_io(&e, &format!("extracting into {}", self.dest.display()))
            })
    }
}

impl Resource for ArchiveResource<'_> {
    fn describe(&self) -> String {
        format!("{} -> {}", self.url, self.dest.display())
    }

    fn current_state(&self) -> EngineResult<ResourceState> {
        Ok(match self.recorded_digest()? {
            Some(digest) if digest == self.expected => ResourceState::Correct,
            Some(digest) => ResourceState::Divergent {
                current: format!("extracted digest {digest}"),
            },
            None => ResourceState::Missing,
        })
    }

    fn apply(&self) -> EngineResult<()> {
        let bytes = self.fetcher.fetch(&self.url)?;
        let actual = sha256_hex(&bytes);
        if actual != self.expected {
            return Err(EngineError::ChecksumMismatch {
                url: self.url.clone(),
                expected: self.expected.clone(),
                actual,
            });
        }

        std::fs::create_dir_all(&self.dest).map_err(|e| {
            EngineError::from_io(&e, &format!("creating {}", self.dest.display()))
        })?;
        self.extract(&bytes)
    }
}
