//! Resumable reader over a remote byte range

use bytes::{Buf, Bytes};
use futures::StreamExt;
use sluice_errors::{Error, NetworkError, UserFacingError};
use sluice_events::{DownloadEvent, EventEmitter, EventSender};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::range::{ByteRange, TransferCursor};
use crate::retry::RetryPolicy;
use crate::source::{ByteStream, RangeSource};

/// Reads an inclusive byte range, reconnecting after transient failures
///
/// A reconnect always asks for `start + delivered` through the original
/// end, so the consumer sees each byte exactly once and in order. The
/// retry budget covers every connection attempt of the transfer; progress
/// made by an attempt does not refund it.
pub struct RangeRetryReader {
    source: Arc<dyn RangeSource>,
    location: Url,
    range: ByteRange,
    policy: RetryPolicy,
    cursor: TransferCursor,
    stream: Option<ByteStream>,
    pending: Bytes,
    attempts: u32,
    failures: u32,
    exhausted: bool,
    cancel: CancellationToken,
    events: Option<EventSender>,
}

impl RangeRetryReader {
    #[must_use]
    pub fn new(
        source: Arc<dyn RangeSource>,
        location: Url,
        range: ByteRange,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            location,
            range,
            policy,
            cursor: TransferCursor::new(range.len()),
            stream: None,
            pending: Bytes::new(),
            attempts: 0,
            failures: 0,
            exhausted: false,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Observe `cancel` while connecting, reading and backing off
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Bytes handed to the caller so far
    #[must_use]
    pub fn bytes_delivered(&self) -> u64 {
        self.cursor.delivered()
    }

    /// Connection attempts made so far
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True once the retry budget has been spent
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    #[must_use]
    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Copy the next bytes of the range into `buf`
    ///
    /// Returns `Ok(0)` once the whole range has been delivered; further
    /// calls keep returning `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, `RetriesExhausted` once the
    /// budget is spent, or `Error::Cancelled`.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if self.exhausted {
            return Err(NetworkError::RetriesExhausted {
                attempts: self.attempts,
                last_error: "retry budget already spent".to_string(),
            }
            .into());
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.cursor.is_complete() {
                self.stream = None;
                self.pending.clear();
                return Ok(0);
            }
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if !self.pending.is_empty() {
                let remaining = usize::try_from(self.cursor.remaining()).unwrap_or(usize::MAX);
                let n = buf.len().min(self.pending.len()).min(remaining);
                buf[..n].copy_from_slice(&self.pending[..n]);
                self.pending.advance(n);
                self.cursor.advance(n as u64);
                return Ok(n);
            }

            match self.next_chunk().await {
                Ok(chunk) => self.pending = chunk,
                Err(err) => self.recover(err).await?,
            }
        }
    }

    async fn next_chunk(&mut self) -> Result<Bytes, Error> {
        if self.stream.is_none() {
            let stream = self.connect().await?;
            self.stream = Some(stream);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::internal("range stream missing after connect"));
        };

        let next = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(Error::Cancelled),
            next = stream.next() => next,
        };

        match next {
            Some(chunk) => chunk,
            None => Err(NetworkError::UnexpectedEof {
                expected: self.cursor.total(),
                received: self.cursor.delivered(),
            }
            .into()),
        }
    }

    async fn connect(&mut self) -> Result<ByteStream, Error> {
        let delivered = self.cursor.delivered();
        let range = self
            .range
            .resume_from(delivered)
            .ok_or_else(|| Error::internal("resume offset past end of range"))?;

        self.attempts += 1;
        if self.attempts == 1 {
            self.events.emit_download(DownloadEvent::Started {
                url: self.location.to_string(),
                total_size: self.range.len(),
                range: range.header_value(),
            });
        } else {
            self.events.emit_download(DownloadEvent::Resuming {
                url: self.location.to_string(),
                resume_offset: range.start(),
                total_size: self.range.len(),
                attempt: self.attempts,
            });
        }
        tracing::debug!(url = %self.location, %range, attempt = self.attempts, "opening range");

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            opened = self.source.open(&self.location, range) => opened,
        }
    }

    /// Drop the broken connection and wait out the backoff, or give up
    async fn recover(&mut self, err: Error) -> Result<(), Error> {
        self.stream = None;
        self.pending.clear();

        if matches!(err, Error::Cancelled) || !err.is_retryable() {
            return Err(err);
        }

        self.failures += 1;

        if self.failures >= self.policy.max_attempts() {
            self.exhausted = true;
            self.events.emit_download(DownloadEvent::RetryExhausted {
                url: self.location.to_string(),
                total_attempts: self.attempts,
                final_error: err.to_string(),
            });
            return Err(NetworkError::RetriesExhausted {
                attempts: self.attempts,
                last_error: err.to_string(),
            }
            .into());
        }

        let delay = self.policy.delay_for(self.failures);
        self.events.emit_download(DownloadEvent::Retrying {
            url: self.location.to_string(),
            attempt: self.failures,
            max_attempts: self.policy.max_attempts(),
            reason: err.to_string(),
            backoff_delay: delay,
        });

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

impl std::fmt::Debug for RangeRetryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeRetryReader")
            .field("location", &self.location.as_str())
            .field("range", &self.range)
            .field("cursor", &self.cursor)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}
