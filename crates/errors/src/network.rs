//! Network-related error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum NetworkError {
    #[error("connection timeout to {url}")]
    Timeout { url: String },

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("response ended early: expected {expected} bytes, received {received}")]
    UnexpectedEof { expected: u64, received: u64 },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid byte range {start}-{end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },

    #[error("server error {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("server ignored range request (status {status})")]
    PartialContentNotSupported { status: u16 },

    #[error("server answered range starting at {served} when {requested} was requested")]
    RangeMismatch { requested: u64, served: u64 },

    #[error("giving up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("credentials unavailable: {0}")]
    CredentialsUnavailable(String),
}

impl NetworkError {
    /// Classify an HTTP status that is neither success nor partial content
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if (500..600).contains(&status) {
            Self::ServerError { status, message }
        } else {
            Self::HttpError { status, message }
        }
    }

    /// Whether this error came from a 4xx response
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::HttpError { status, .. } if (400..500).contains(status))
    }
}

impl UserFacingError for NetworkError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Timeout { .. } | Self::ConnectionFailed(_) => {
                Some("Check your network connection and retry.")
            }
            Self::HttpError { status: 401 | 403, .. } | Self::CredentialsUnavailable(_) => {
                Some("Check the configured bearer token or client credentials.")
            }
            Self::HttpError { status: 404, .. } => Some("Check the source location."),
            Self::PartialContentNotSupported { .. } | Self::RangeMismatch { .. } => {
                Some("The server does not honour range requests; resuming is not possible.")
            }
            Self::RetriesExhausted { .. } => {
                Some("Raise retry.max_attempts or retry once the remote store is reachable.")
            }
            Self::ChecksumMismatch { .. } => {
                Some("The downloaded content differs from the expected digest; retry the download.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ConnectionFailed(_)
                | Self::StreamInterrupted(_)
                | Self::UnexpectedEof { .. }
                | Self::ServerError { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Timeout { .. } => "network.timeout",
            Self::ConnectionFailed(_) => "network.connection_failed",
            Self::StreamInterrupted(_) => "network.stream_interrupted",
            Self::UnexpectedEof { .. } => "network.unexpected_eof",
            Self::InvalidUrl(_) => "network.invalid_url",
            Self::InvalidRange { .. } => "network.invalid_range",
            Self::HttpError { .. } => "network.client_error",
            Self::ServerError { .. } => "network.server_error",
            Self::PartialContentNotSupported { .. } => "network.range_not_supported",
            Self::RangeMismatch { .. } => "network.range_mismatch",
            Self::RetriesExhausted { .. } => "network.retries_exhausted",
            Self::ChecksumMismatch { .. } => "network.checksum_mismatch",
            Self::CredentialsUnavailable(_) => "network.credentials_unavailable",
        };
        Some(code)
    }
}
