//! Bearer credentials for the remote store

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use sluice_errors::{Error, NetworkError};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

use crate::client::{map_transport_error, NetClient};

/// Tokens are refreshed this long before the server says they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_LIFETIME: Duration = Duration::from_secs(300);

/// Supplies the bearer token attached to each (re)connect
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Token for the next request, or `None` for anonymous access
    async fn bearer_token(&self) -> Result<Option<String>, Error>;
}

/// Anonymous access
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

#[async_trait]
impl CredentialProvider for NoCredentials {
    async fn bearer_token(&self) -> Result<Option<String>, Error> {
        Ok(None)
    }
}

/// A fixed token handed in by the caller
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<Option<String>, Error> {
        Ok(Some(self.0.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// OAuth2 client-credentials grant with a cached token
pub struct ClientCredentials {
    client: NetClient,
    token_url: Url,
    client_id: String,
    client_secret: String,
    scope: Option<String>,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientCredentials {
    #[must_use]
    pub fn new(
        client: NetClient,
        token_url: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: Option<String>,
    ) -> Self {
        Self {
            client,
            token_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope,
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<TokenResponse, Error> {
        let mut form = vec![("grant_type", "client_credentials")];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }

        let response = self
            .client
            .inner()
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| map_transport_error(&e, &self.token_url))?;

        // 5xx and 429 are retried like the data endpoint; a rejection is final.
        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(NetworkError::ServerError {
                status: status.as_u16(),
                message: "token endpoint unavailable".into(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(NetworkError::CredentialsUnavailable(format!(
                "token endpoint returned {status}"
            ))
            .into());
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| NetworkError::CredentialsUnavailable(e.to_string()).into())
    }
}

#[async_trait]
impl CredentialProvider for ClientCredentials {
    async fn bearer_token(&self) -> Result<Option<String>, Error> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(Some(token.value.clone()));
            }
        }

        let response = self.fetch().await?;
        let lifetime = response
            .expires_in
            .map_or(DEFAULT_LIFETIME, Duration::from_secs);
        tracing::debug!(?lifetime, "obtained access token");

        let value = response.access_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        });
        Ok(Some(value))
    }
}
