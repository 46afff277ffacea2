use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle of the external decryption process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProcessEvent {
    /// Child spawned
    Spawned { command: String, pid: Option<u32> },

    /// Child exited; `exit_code` is `None` when terminated by a signal
    Exited {
        exit_code: Option<i32>,
        duration: Duration,
    },

    /// Child was killed after the transfer was abandoned
    Killed { reason: String },

    /// Secret key file deleted after use
    SecretKeyRemoved { path: String },

    /// A cleanup step failed; logged and never fatal
    CleanupFailed { path: String, error: String },
}
