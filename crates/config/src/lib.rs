#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for sluice
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/sluice/config.toml)
//! - Environment variables
//! - CLI flags (applied by the app)
//!
//! Raw values are validated into the core types (`RetryPolicy`,
//! `ProgressConfig`, `NetConfig`) on access, so a bad value is reported
//! against its configuration key.

mod sections;

pub use sections::{
    AuthConfig, ChecksumConfig, CopyConfig, DecryptConfig, NetworkConfig, ProgressReportConfig,
    RetryConfig, RetryStrategy,
};

use serde::{Deserialize, Serialize};
use sluice_errors::{ConfigError, Error, NetworkError};
use sluice_net::{
    parse_url, ClientCredentials, CredentialProvider, NetClient, NetConfig, NoCredentials,
    RetryPolicy, StaticToken,
};
use sluice_transfer::{DecryptionContext, ProgressConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub copy: CopyConfig,

    #[serde(default)]
    pub progress: ProgressReportConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub checksum: ChecksumConfig,

    #[serde(default)]
    pub decrypt: DecryptConfig,
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("sluice").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            tracing::debug!(path = %config_path.display(), "loading configuration");
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // SLUICE_RETRY_STRATEGY
        if let Ok(strategy) = std::env::var("SLUICE_RETRY_STRATEGY") {
            self.retry.strategy = strategy.parse().map_err(|value| ConfigError::InvalidValue {
                field: "SLUICE_RETRY_STRATEGY".to_string(),
                value,
            })?;
        }

        // SLUICE_RETRY_MAX_ATTEMPTS
        if let Ok(attempts) = std::env::var("SLUICE_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("SLUICE_RETRY_MAX_ATTEMPTS", attempts)?;
        }

        // SLUICE_BUFFER_SIZE
        if let Ok(size) = std::env::var("SLUICE_BUFFER_SIZE") {
            self.copy.buffer_size = parse_env("SLUICE_BUFFER_SIZE", size)?;
        }

        // SLUICE_PROGRESS_PERIOD_SECS
        if let Ok(period) = std::env::var("SLUICE_PROGRESS_PERIOD_SECS") {
            self.progress.period_secs = parse_env("SLUICE_PROGRESS_PERIOD_SECS", period)?;
        }

        // SLUICE_BEARER_TOKEN
        if let Ok(token) = std::env::var("SLUICE_BEARER_TOKEN") {
            if !token.is_empty() {
                self.auth.bearer_token = Some(token);
            }
        }

        // SLUICE_DECRYPT_BINARY
        if let Ok(binary) = std::env::var("SLUICE_DECRYPT_BINARY") {
            self.decrypt.binary_path = PathBuf::from(binary);
        }

        // SLUICE_SECRET_KEY
        if let Ok(key) = std::env::var("SLUICE_SECRET_KEY") {
            self.decrypt.secret_key_path = Some(PathBuf::from(key));
        }

        Ok(())
    }

    /// Validated retry policy
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` for `max_attempts == 0`, a multiplier below 1
    /// or an initial delay above the maximum.
    pub fn retry_policy(&self) -> Result<RetryPolicy, Error> {
        let retry = &self.retry;
        match retry.strategy {
            RetryStrategy::Fixed => RetryPolicy::fixed(
                retry.max_attempts,
                Duration::from_millis(retry.backoff_period_ms),
            ),
            RetryStrategy::Exponential => RetryPolicy::exponential(
                retry.max_attempts,
                Duration::from_millis(retry.initial_delay_ms),
                Duration::from_millis(retry.max_delay_ms),
                retry.multiplier,
            ),
        }
    }

    /// Validated progress schedule
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if the period is zero.
    pub fn progress(&self) -> Result<ProgressConfig, Error> {
        ProgressConfig::new(
            Duration::from_secs(self.progress.initial_delay_secs),
            Duration::from_secs(self.progress.period_secs),
        )
    }

    /// Copy buffer size in bytes
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if the size is zero.
    pub fn buffer_size(&self) -> Result<usize, Error> {
        if self.copy.buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "copy.buffer_size".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(self.copy.buffer_size)
    }

    #[must_use]
    pub fn net_config(&self) -> NetConfig {
        let mut net = NetConfig {
            connect_timeout: Duration::from_secs(self.network.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.network.read_timeout_secs),
            ..NetConfig::default()
        };
        if let Some(user_agent) = &self.network.user_agent {
            net.user_agent.clone_from(user_agent);
        }
        net
    }

    /// Base URL for relative sources, if configured
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if `network.base_url` is not an http(s) URL.
    pub fn base_url(&self) -> Result<Option<Url>, Error> {
        self.network
            .base_url
            .as_deref()
            .map(|raw| {
                parse_url(raw, None).map_err(|_| {
                    Error::from(ConfigError::InvalidValue {
                        field: "network.base_url".to_string(),
                        value: raw.to_string(),
                    })
                })
            })
            .transpose()
    }

    /// Credential provider described by `[auth]`
    ///
    /// A static bearer token wins over the client-credentials grant.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` when the grant is only partially configured and
    /// `InvalidValue` for a malformed token URL.
    pub fn credential_provider(
        &self,
        client: &NetClient,
    ) -> Result<Arc<dyn CredentialProvider>, Error> {
        let auth = &self.auth;
        if let Some(token) = &auth.bearer_token {
            return Ok(Arc::new(StaticToken::new(token.clone())));
        }

        let Some(token_url) = &auth.token_url else {
            return Ok(Arc::new(NoCredentials));
        };
        let token_url = parse_url(token_url, None).map_err(|e| match e {
            Error::Network(NetworkError::InvalidUrl(_)) => Error::from(ConfigError::InvalidValue {
                field: "auth.token_url".to_string(),
                value: token_url.clone(),
            }),
            other => other,
        })?;
        let client_id = auth.client_id.clone().ok_or_else(|| missing("auth.client_id"))?;
        let client_secret = auth
            .client_secret
            .clone()
            .ok_or_else(|| missing("auth.client_secret"))?;

        Ok(Arc::new(ClientCredentials::new(
            client.clone(),
            token_url,
            client_id,
            client_secret,
            auth.scope.clone(),
        )))
    }

    /// Decryption settings, with the key path overridable from the CLI
    ///
    /// # Errors
    ///
    /// Returns `MissingField` without a secret key and propagates
    /// [`DecryptionContext::new`] validation failures.
    pub fn decryption_context(
        &self,
        secret_key_override: Option<&Path>,
    ) -> Result<DecryptionContext, Error> {
        let key = secret_key_override
            .map(Path::to_path_buf)
            .or_else(|| self.decrypt.secret_key_path.clone())
            .ok_or_else(|| missing("decrypt.secret_key_path"))?;
        DecryptionContext::new(&self.decrypt.binary_path, key, self.decrypt.shell.clone())
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String) -> Result<T, Error> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }
        .into()
    })
}

fn missing(field: &str) -> Error {
    ConfigError::MissingField {
        field: field.to_string(),
    }
    .into()
}
