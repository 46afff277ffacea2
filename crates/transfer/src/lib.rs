#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Resumable single-file transfers for sluice
//!
//! Two modes share one [`Transfer`] interface:
//!
//! - [`DirectFileTransfer`] writes the range to disk through a
//!   [`ChecksumWriter`] and reports the digest.
//! - [`PipedProcessTransfer`] streams the range into an external decryption
//!   process that writes the destination itself.
//!
//! Both read through [`sluice_net::RangeRetryReader`], report throughput
//! with a [`ProgressSampler`] and never leave a partial destination behind.
//! [`TransferOrchestrator`] picks the mode and maps the outcome to an
//! [`ExitStatus`].

mod checksum;
mod context;
mod copy;
mod decrypt;
mod direct;
mod orchestrator;
mod piped;
mod progress;
mod request;

pub use checksum::ChecksumWriter;
pub use context::{TransferContext, DEFAULT_BUFFER_SIZE};
pub use copy::copy_range;
pub use decrypt::DecryptionContext;
pub use direct::DirectFileTransfer;
pub use orchestrator::{ExitStatus, TransferMode, TransferOrchestrator};
pub use piped::PipedProcessTransfer;
pub use progress::{ProgressConfig, ProgressCounter, ProgressSampler, ProgressWriter};
pub use request::{resolve_destination, TransferRequest};

use async_trait::async_trait;
use sluice_errors::Error;
use sluice_events::{EventEmitter, ProcessEvent};
use sluice_hash::Hash;
use sluice_net::RetryPolicy;
use std::path::Path;

/// Result of one transfer
#[derive(Debug)]
pub enum TransferOutcome {
    /// `digest` is `None` in piped mode
    Success { digest: Option<Hash>, bytes: u64 },
    Failed { reason: Error },
}

impl TransferOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub fn digest(&self) -> Option<&Hash> {
        match self {
            Self::Success { digest, .. } => digest.as_ref(),
            Self::Failed { .. } => None,
        }
    }

    /// # Errors
    ///
    /// Returns the failure reason for a failed transfer.
    pub fn into_result(self) -> Result<Option<Hash>, Error> {
        match self {
            Self::Success { digest, .. } => Ok(digest),
            Self::Failed { reason } => Err(reason),
        }
    }
}

/// Move one remote object to its destination
#[async_trait]
pub trait Transfer: Send + Sync {
    async fn transfer(&self, request: &TransferRequest, policy: &RetryPolicy) -> TransferOutcome;
}

/// Delete whatever a failed transfer left at `destination`
pub(crate) async fn remove_partial_output(ctx: &impl EventEmitter, destination: &Path) {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => tracing::debug!(path = %destination.display(), "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => ctx.emit_process(ProcessEvent::CleanupFailed {
            path: destination.display().to_string(),
            error: e.to_string(),
        }),
    }
}
