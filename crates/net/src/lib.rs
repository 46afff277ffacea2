#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for sluice
//!
//! Everything needed to pull one inclusive byte range of a remote object:
//! the HTTP client, bearer credentials, the [`RangeSource`] seam, the retry
//! policy and the resumable [`RangeRetryReader`].

mod auth;
mod client;
mod range;
mod reader;
mod retry;
mod source;

pub use auth::{ClientCredentials, CredentialProvider, NoCredentials, StaticToken};
pub use client::{NetClient, NetConfig};
pub use range::{ByteRange, TransferCursor};
pub use reader::RangeRetryReader;
pub use retry::{Backoff, RetryPolicy};
pub use source::{ByteStream, HttpRangeSource, RangeSource};

use sluice_errors::{Error, NetworkError};
use url::Url;

/// Parse and validate a source location
///
/// Relative locations are resolved against `base` when one is configured.
///
/// # Errors
///
/// Returns an error if the location is malformed, relative without a base,
/// or uses a scheme other than http(s).
pub fn parse_url(location: &str, base: Option<&Url>) -> Result<Url, Error> {
    let parsed = match Url::parse(location) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base
                .join(location)
                .map_err(|e| NetworkError::InvalidUrl(e.to_string()))?,
            None => {
                return Err(NetworkError::InvalidUrl(format!(
                    "{location} is relative and no base URL is configured"
                ))
                .into())
            }
        },
        Err(e) => return Err(NetworkError::InvalidUrl(e.to_string()).into()),
    };

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(NetworkError::InvalidUrl(format!("unsupported scheme {scheme}")).into()),
    }
}
