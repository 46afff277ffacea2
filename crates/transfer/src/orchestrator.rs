//! Mode selection and exit status mapping

use sluice_errors::{Error, TransferError, UserFacingError};
use sluice_events::{EventEmitter, EventSender};
use sluice_hash::HashAlgorithm;
use sluice_net::RetryPolicy;

use crate::context::TransferContext;
use crate::decrypt::DecryptionContext;
use crate::direct::DirectFileTransfer;
use crate::piped::PipedProcessTransfer;
use crate::request::TransferRequest;
use crate::{Transfer, TransferOutcome};

/// Process-level status reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitStatus {
    Success = 0,
    ApplicationFailed = 1,
    InputProcessingError = -1,
}

impl ExitStatus {
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Classify a failure: bad input versus a transfer that went wrong
    #[must_use]
    pub fn for_error(error: &Error) -> Self {
        match error {
            Error::Config(_)
            | Error::Transfer(
                TransferError::InvalidRequest { .. } | TransferError::InvalidSecretKey { .. },
            ) => Self::InputProcessingError,
            _ => Self::ApplicationFailed,
        }
    }
}

/// Which transfer to run
#[derive(Debug, Clone)]
pub enum TransferMode {
    /// Write the file directly, hashing with the given algorithm
    Direct(HashAlgorithm),
    /// Pipe through the decryption tool
    Decrypt(DecryptionContext),
}

/// Owns one transfer from start to exit status
pub struct TransferOrchestrator {
    transfer: Box<dyn Transfer>,
    policy: RetryPolicy,
    events: Option<EventSender>,
}

impl TransferOrchestrator {
    #[must_use]
    pub fn new(ctx: TransferContext, mode: TransferMode, policy: RetryPolicy) -> Self {
        let events = ctx.event_sender().cloned();
        let transfer: Box<dyn Transfer> = match mode {
            TransferMode::Direct(algorithm) => Box::new(DirectFileTransfer::new(ctx, algorithm)),
            TransferMode::Decrypt(decryption) => {
                Box::new(PipedProcessTransfer::new(ctx, decryption))
            }
        };
        Self {
            transfer,
            policy,
            events,
        }
    }

    /// Run an arbitrary transfer implementation
    #[must_use]
    pub fn with_transfer(
        transfer: Box<dyn Transfer>,
        policy: RetryPolicy,
        events: Option<EventSender>,
    ) -> Self {
        Self {
            transfer,
            policy,
            events,
        }
    }

    /// Run the transfer and report its outcome
    pub async fn run(&self, request: &TransferRequest) -> TransferOutcome {
        let operation = format!("download {}", request.source());
        self.emit_operation_started(operation.clone());

        let outcome = self.transfer.transfer(request, &self.policy).await;
        match &outcome {
            TransferOutcome::Success { .. } => self.emit_operation_completed(operation, true),
            TransferOutcome::Failed { reason } => self.emit_operation_failed(
                operation,
                format!(
                    "{} -> {}: {}",
                    request.source(),
                    request.destination().display(),
                    reason.user_message()
                ),
            ),
        }
        outcome
    }

    /// Run the transfer and map it to an exit status
    pub async fn execute(&self, request: &TransferRequest) -> ExitStatus {
        match self.run(request).await {
            TransferOutcome::Success { .. } => ExitStatus::Success,
            TransferOutcome::Failed { reason } => ExitStatus::for_error(&reason),
        }
    }
}

impl EventEmitter for TransferOrchestrator {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}
