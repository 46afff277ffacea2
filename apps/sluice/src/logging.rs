//! Structured logging integration for events
//!
//! Converts domain events into tracing records with structured fields. Each
//! domain logs under its own target so `RUST_LOG` can filter them.

use sluice_events::{AppEvent, DownloadEvent, GeneralEvent, ProcessEvent};
use tracing::{debug, error, info, trace, warn};

/// Log an `AppEvent` at its level with structured fields
pub fn log_event_with_tracing(event: &AppEvent) {
    match event {
        AppEvent::Download(download_event) => log_download(download_event),
        AppEvent::Process(process_event) => log_process(event.log_level(), process_event),
        AppEvent::General(general_event) => log_general(general_event),
    }
}

fn log_download(event: &DownloadEvent) {
    match event {
        DownloadEvent::Started {
            url,
            total_size,
            range,
        } => {
            info!(
                target: "sluice::events::download",
                url = %url,
                total_size = total_size,
                range = %range,
                "Download started"
            );
        }
        DownloadEvent::Progress {
            label,
            bytes_transferred,
            rate_bytes_per_sec,
        } => {
            info!(
                target: "sluice::events::download",
                bytes_transferred = bytes_transferred,
                rate_bytes_per_sec = rate_bytes_per_sec,
                "File download progress: {label}, Transfer rate: {:.2} MiB/s",
                DownloadEvent::mib_per_sec(*rate_bytes_per_sec)
            );
        }
        DownloadEvent::Resuming {
            url,
            resume_offset,
            total_size,
            attempt,
        } => {
            info!(
                target: "sluice::events::download",
                url = %url,
                resume_offset = resume_offset,
                total_size = total_size,
                attempt = attempt,
                "Resuming download"
            );
        }
        DownloadEvent::Retrying {
            url,
            attempt,
            max_attempts,
            reason,
            backoff_delay,
        } => {
            warn!(
                target: "sluice::events::download",
                url = %url,
                attempt = attempt,
                max_attempts = max_attempts,
                reason = %reason,
                backoff_ms = backoff_delay.as_millis(),
                "Download interrupted, retrying"
            );
        }
        DownloadEvent::RetryExhausted {
            url,
            total_attempts,
            final_error,
        } => {
            error!(
                target: "sluice::events::download",
                url = %url,
                total_attempts = total_attempts,
                final_error = %final_error,
                "Download retries exhausted"
            );
        }
        DownloadEvent::Completed {
            url,
            final_size,
            total_time,
            hash,
        } => {
            info!(
                target: "sluice::events::download",
                url = %url,
                final_size = final_size,
                duration_ms = total_time.as_millis(),
                hash = ?hash,
                "Download completed"
            );
        }
        DownloadEvent::Failed {
            url,
            bytes_downloaded,
            failure,
        } => {
            error!(
                target: "sluice::events::download",
                url = %url,
                bytes_downloaded = bytes_downloaded,
                retryable = failure.retryable,
                code = ?failure.code,
                message = %failure.message,
                hint = ?failure.hint,
                "Download failed"
            );
        }
    }
}

fn log_process(level: tracing::Level, event: &ProcessEvent) {
    match event {
        ProcessEvent::Spawned { command, pid } => {
            debug!(
                target: "sluice::events::process",
                command = %command,
                pid = ?pid,
                "Decryption process spawned"
            );
        }
        ProcessEvent::Exited {
            exit_code,
            duration,
        } => {
            info!(
                target: "sluice::events::process",
                exit_code = ?exit_code,
                duration_ms = duration.as_millis(),
                "Decryption process exited"
            );
        }
        ProcessEvent::Killed { reason } => {
            warn!(
                target: "sluice::events::process",
                reason = %reason,
                "Decryption process killed"
            );
        }
        ProcessEvent::CleanupFailed { path, error } => {
            warn!(
                target: "sluice::events::process",
                path = %path,
                error = %error,
                "Cleanup failed"
            );
        }
        _ => match level {
            tracing::Level::ERROR => {
                error!(target: "sluice::events::process", event = ?event, "Process event")
            }
            tracing::Level::WARN => {
                warn!(target: "sluice::events::process", event = ?event, "Process event")
            }
            tracing::Level::INFO => {
                info!(target: "sluice::events::process", event = ?event, "Process event")
            }
            tracing::Level::DEBUG => {
                debug!(target: "sluice::events::process", event = ?event, "Process event")
            }
            tracing::Level::TRACE => {
                trace!(target: "sluice::events::process", event = ?event, "Process event")
            }
        },
    }
}

fn log_general(event: &GeneralEvent) {
    match event {
        GeneralEvent::OperationStarted { operation } => {
            info!(
                target: "sluice::events::general",
                operation = %operation,
                "Operation started"
            );
        }
        GeneralEvent::OperationCompleted { operation, success } => {
            if *success {
                info!(
                    target: "sluice::events::general",
                    operation = %operation,
                    "Operation completed successfully"
                );
            } else {
                warn!(
                    target: "sluice::events::general",
                    operation = %operation,
                    "Operation completed with issues"
                );
            }
        }
        GeneralEvent::OperationFailed { operation, error } => {
            error!(
                target: "sluice::events::general",
                operation = %operation,
                error = %error,
                "Operation failed"
            );
        }
        GeneralEvent::Warning { message, context } => {
            warn!(
                target: "sluice::events::general",
                context = ?context,
                "{message}"
            );
        }
    }
}
