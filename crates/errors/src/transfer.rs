//! Transfer and subprocess error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum TransferError {
    #[error("invalid transfer request: {message}")]
    InvalidRequest { message: String },

    #[error("secret key {path} rejected: {message}")]
    InvalidSecretKey { path: String, message: String },

    #[error("failed to spawn {command}: {message}")]
    ProcessSpawnFailed { command: String, message: String },

    #[error("decryption process exited with {}", exit_code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error("decryption process closed its input after {bytes_written} bytes")]
    PipeClosed { bytes_written: u64 },

    #[error("failed to remove {path}: {message}")]
    CleanupFailed { path: String, message: String },
}

impl UserFacingError for TransferError {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Self::ProcessFailed { stderr_tail, .. } if !stderr_tail.is_empty() => {
                Cow::Owned(format!("{self}: {stderr_tail}"))
            }
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidSecretKey { .. } => {
                Some("Point decrypt.secret_key_path at an existing .sec key file.")
            }
            Self::ProcessSpawnFailed { .. } => {
                Some("Check decrypt.shell and decrypt.binary_path in the configuration.")
            }
            Self::ProcessFailed { .. } | Self::PipeClosed { .. } => {
                Some("Check that the secret key matches the key the file was encrypted for.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::InvalidRequest { .. } => "transfer.invalid_request",
            Self::InvalidSecretKey { .. } => "transfer.invalid_secret_key",
            Self::ProcessSpawnFailed { .. } => "transfer.spawn_failed",
            Self::ProcessFailed { .. } => "transfer.process_failed",
            Self::PipeClosed { .. } => "transfer.pipe_closed",
            Self::CleanupFailed { .. } => "transfer.cleanup_failed",
        };
        Some(code)
    }
}
