//! Configuration sections and their defaults

use serde::{Deserialize, Serialize};
use sluice_hash::HashAlgorithm;
use std::fmt;
use std::path::PathBuf;

/// Backoff shape between reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    #[default]
    Exponential,
    Fixed,
}

impl std::str::FromStr for RetryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => Err(other.to_string()),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub strategy: RetryStrategy,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts for the fixed strategy
    #[serde(default = "default_backoff_period_ms")]
    pub backoff_period_ms: u64,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::default(),
            max_attempts: default_max_attempts(),
            backoff_period_ms: default_backoff_period_ms(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

/// Copy loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

/// Progress reporting schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReportConfig {
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
}

impl Default for ProgressReportConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            period_secs: default_period_secs(),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    pub user_agent: Option<String>,
    /// Base for relative `--source` locations
    pub base_url: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            user_agent: None,
            base_url: None,
        }
    }
}

/// Credentials for the remote store
///
/// Either a static `bearer_token`, or the client-credentials grant fields.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub bearer_token: Option<String>,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("AuthConfig")
            .field("bearer_token", &redact(&self.bearer_token))
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("scope", &self.scope)
            .finish()
    }
}

/// External decryption tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptConfig {
    #[serde(default = "default_binary_path")]
    pub binary_path: PathBuf,
    #[serde(default = "default_shell")]
    pub shell: Vec<String>,
    pub secret_key_path: Option<PathBuf>,
}

impl Default for DecryptConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            shell: default_shell(),
            secret_key_path: None,
        }
    }
}

/// Digest computed in direct mode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChecksumConfig {
    #[serde(default)]
    pub algorithm: HashAlgorithm,
}

// Default value functions for serde
fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_period_ms() -> u64 {
    2000
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_buffer_size() -> usize {
    8192
}

fn default_initial_delay_secs() -> u64 {
    1
}

fn default_period_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_read_timeout_secs() -> u64 {
    300 // 5 minutes
}

fn default_binary_path() -> PathBuf {
    PathBuf::from("crypt4gh")
}

fn default_shell() -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string()]
}
