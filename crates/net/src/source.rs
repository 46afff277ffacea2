//! Where range bytes come from

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::CONTENT_RANGE;
use reqwest::StatusCode;
use sluice_errors::{Error, NetworkError};
use std::sync::Arc;
use url::Url;

use crate::auth::CredentialProvider;
use crate::client::{map_transport_error, NetClient};
use crate::range::ByteRange;

/// Body of one ranged response
pub type ByteStream = BoxStream<'static, Result<Bytes, Error>>;

/// Opens a byte stream for an inclusive range of a remote object
///
/// Each call is one connection attempt. Implementations classify failures
/// through [`sluice_errors::UserFacingError::is_retryable`]; the reader
/// decides what to do with them.
#[async_trait]
pub trait RangeSource: Send + Sync {
    async fn open(&self, location: &Url, range: ByteRange) -> Result<ByteStream, Error>;
}

/// HTTP GET with a `Range` header and an optional bearer token
pub struct HttpRangeSource {
    client: NetClient,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpRangeSource {
    #[must_use]
    pub fn new(client: NetClient, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    async fn open(&self, location: &Url, range: ByteRange) -> Result<ByteStream, Error> {
        let token = self.credentials.bearer_token().await?;
        let response = self
            .client
            .get_range(location, range, token.as_deref())
            .await?;

        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .map(|value| value.to_str().unwrap_or_default());
        validate_response(response.status(), content_range, range)?;
        tracing::trace!(%location, %range, status = %response.status(), "range opened");

        let url = location.clone();
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| map_transport_error(&e, &url).into()));
        Ok(stream.boxed())
    }
}

/// Accept 206 for the requested offset, or 200 when the request starts at
/// byte zero
///
/// A 200 for a later offset means the server ignored `Range` and would
/// replay the object from the beginning. A 206 whose `Content-Range` starts
/// elsewhere would splice foreign bytes into the output; a 206 without the
/// header is taken at its word.
pub(crate) fn validate_response(
    status: StatusCode,
    content_range: Option<&str>,
    range: ByteRange,
) -> Result<(), Error> {
    if status == StatusCode::PARTIAL_CONTENT {
        return match content_range.map(content_range_start) {
            None => Ok(()),
            Some(Some(served)) if served == range.start() => Ok(()),
            Some(Some(served)) => Err(NetworkError::RangeMismatch {
                requested: range.start(),
                served,
            }
            .into()),
            Some(None) => Err(NetworkError::HttpError {
                status: status.as_u16(),
                message: format!("malformed Content-Range: {}", content_range.unwrap_or_default()),
            }
            .into()),
        };
    }
    if status == StatusCode::OK {
        if range.start() == 0 {
            return Ok(());
        }
        return Err(NetworkError::PartialContentNotSupported {
            status: status.as_u16(),
        }
        .into());
    }

    Err(NetworkError::from_status(
        status.as_u16(),
        status.canonical_reason().unwrap_or("unexpected status"),
    )
    .into())
}

/// First byte of `bytes <first>-<last>/<total>`
fn content_range_start(value: &str) -> Option<u64> {
    let spec = value.trim().strip_prefix("bytes")?.trim_start();
    let (first, _) = spec.split_once('-')?;
    first.trim().parse().ok()
}
