//! What to transfer and where to put it

use sluice_errors::{Error, TransferError};
use sluice_hash::Hash;
use sluice_net::ByteRange;
use std::path::{Path, PathBuf};
use url::Url;

/// One remote object to land on local disk
///
/// The size is supplied up front; the requested range is always
/// `0..=total_size-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    source: Url,
    destination: PathBuf,
    range: ByteRange,
    expected_digest: Option<Hash>,
}

impl TransferRequest {
    /// # Errors
    ///
    /// Returns `InvalidRequest` when `total_size` is zero.
    pub fn new(source: Url, destination: impl Into<PathBuf>, total_size: u64) -> Result<Self, Error> {
        let range = ByteRange::whole(total_size).map_err(|_| TransferError::InvalidRequest {
            message: "file size must be at least one byte".to_string(),
        })?;
        Ok(Self {
            source,
            destination: destination.into(),
            range,
            expected_digest: None,
        })
    }

    /// Fail the direct transfer unless the written bytes match `digest`
    #[must_use]
    pub fn with_expected_digest(mut self, digest: Hash) -> Self {
        self.expected_digest = Some(digest);
        self
    }

    #[must_use]
    pub fn source(&self) -> &Url {
        &self.source
    }

    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.range.len()
    }

    #[must_use]
    pub fn expected_digest(&self) -> Option<&Hash> {
        self.expected_digest.as_ref()
    }

    /// The full byte range of the object
    #[must_use]
    pub fn range(&self) -> ByteRange {
        self.range
    }

    /// Short name used in progress lines
    #[must_use]
    pub fn label(&self) -> String {
        self.destination.file_name().map_or_else(
            || self.destination.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        )
    }
}

/// Where the object should land
///
/// An existing directory gets the last path segment of the source appended.
#[must_use]
pub fn resolve_destination(source: &Url, destination: &Path) -> PathBuf {
    if !destination.is_dir() {
        return destination.to_path_buf();
    }
    let name = source
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("download");
    destination.join(name)
}
