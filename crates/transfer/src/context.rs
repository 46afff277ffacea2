//! Shared wiring for both transfer modes

use sluice_events::{EventEmitter, EventSender};
use sluice_net::{RangeRetryReader, RangeSource, RetryPolicy};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::progress::ProgressConfig;
use crate::request::TransferRequest;

/// Copy buffer size used when none is configured
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Everything a transfer needs besides the request itself
#[derive(Clone)]
pub struct TransferContext {
    source: Arc<dyn RangeSource>,
    buffer_size: usize,
    progress: ProgressConfig,
    events: Option<EventSender>,
    cancel: CancellationToken,
}

impl TransferContext {
    #[must_use]
    pub fn new(source: Arc<dyn RangeSource>) -> Self {
        Self {
            source,
            buffer_size: DEFAULT_BUFFER_SIZE,
            progress: ProgressConfig::default(),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    #[must_use]
    pub fn progress(&self) -> ProgressConfig {
        self.progress
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn events(&self) -> Option<EventSender> {
        self.events.clone()
    }

    pub(crate) fn reader(&self, request: &TransferRequest, policy: &RetryPolicy) -> RangeRetryReader {
        let reader = RangeRetryReader::new(
            Arc::clone(&self.source),
            request.source().clone(),
            request.range(),
            policy.clone(),
        )
        .with_cancellation(self.cancel.clone());

        match &self.events {
            Some(events) => reader.with_events(events.clone()),
            None => reader,
        }
    }
}

impl EventEmitter for TransferContext {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl std::fmt::Debug for TransferContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferContext")
            .field("buffer_size", &self.buffer_size)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}
