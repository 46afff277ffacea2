//! HTTP client used for ranged GETs and token requests

use reqwest::header::{AUTHORIZATION, RANGE};
use reqwest::{Client, Response};
use sluice_errors::{Error, NetworkError};
use std::time::Duration;
use url::Url;

use crate::range::ByteRange;

/// Network client configuration
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub connect_timeout: Duration,
    /// Maximum idle time between two body chunks
    pub read_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub user_agent: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(300),
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: format!("sluice/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Thin wrapper over a pooled reqwest client
///
/// No request-level retries happen here; resumption is the reader's job
/// because only the reader knows how many bytes were already delivered.
#[derive(Clone)]
pub struct NetClient {
    client: Client,
}

impl NetClient {
    /// Create a new network client
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to initialize.
    pub fn new(config: &NetConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client })
    }

    /// Create with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created with default settings.
    pub fn with_defaults() -> Result<Self, Error> {
        Self::new(&NetConfig::default())
    }

    /// Issue `GET url` with `Range: bytes=start-end`
    ///
    /// Only transport failures are errors here; status handling is left to
    /// the caller.
    ///
    /// # Errors
    ///
    /// Returns a network error if the request cannot be sent.
    pub async fn get_range(
        &self,
        url: &Url,
        range: ByteRange,
        bearer_token: Option<&str>,
    ) -> Result<Response, Error> {
        let mut request = self
            .client
            .get(url.clone())
            .header(RANGE, range.header_value());
        if let Some(token) = bearer_token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        request
            .send()
            .await
            .map_err(|e| map_transport_error(&e, url).into())
    }

    /// Get the underlying reqwest client for advanced usage
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Classify a reqwest failure that happened before or while reading a body
pub(crate) fn map_transport_error(error: &reqwest::Error, url: &Url) -> NetworkError {
    if error.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_body() || error.is_decode() {
        NetworkError::StreamInterrupted(error.to_string())
    } else {
        NetworkError::ConnectionFailed(error.to_string())
    }
}
