use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::FailureContext;

/// Events emitted while pulling a byte range from a remote store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DownloadEvent {
    /// Transfer started
    Started {
        url: String,
        total_size: u64,
        range: String,
    },

    /// Periodic throughput sample
    Progress {
        label: String,
        bytes_transferred: u64,
        /// Bytes per second over the last sampling period
        rate_bytes_per_sec: f64,
    },

    /// Reconnecting from the last delivered byte
    Resuming {
        url: String,
        resume_offset: u64,
        total_size: u64,
        attempt: u32,
    },

    /// A retryable failure occurred and the reader is backing off
    Retrying {
        url: String,
        attempt: u32,
        max_attempts: u32,
        reason: String,
        backoff_delay: Duration,
    },

    /// All retry attempts exhausted
    RetryExhausted {
        url: String,
        total_attempts: u32,
        final_error: String,
    },

    /// Transfer completed successfully
    Completed {
        url: String,
        final_size: u64,
        total_time: Duration,
        hash: Option<String>,
    },

    /// Transfer failed
    Failed {
        url: String,
        bytes_downloaded: u64,
        failure: FailureContext,
    },
}

impl DownloadEvent {
    /// Render a byte rate in MiB/s, the unit used for progress lines
    #[must_use]
    pub fn mib_per_sec(rate_bytes_per_sec: f64) -> f64 {
        rate_bytes_per_sec / (1024.0 * 1024.0)
    }
}
