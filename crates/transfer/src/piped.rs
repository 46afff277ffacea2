//! Stream the download into an external decryption process

use async_trait::async_trait;
use sluice_errors::{Error, TransferError};
use sluice_events::{DownloadEvent, EventEmitter, EventSender, FailureContext, ProcessEvent};
use sluice_net::RetryPolicy;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::context::TransferContext;
use crate::copy::copy_range;
use crate::decrypt::DecryptionContext;
use crate::progress::ProgressSampler;
use crate::request::TransferRequest;
use crate::{remove_partial_output, Transfer, TransferOutcome};

/// Lines of decryptor stderr kept for the failure report
const STDERR_TAIL_LINES: usize = 20;

/// Reader → progress → decryptor stdin; the decryptor writes the file
///
/// No digest is produced in this mode. The secret key is deleted before
/// `transfer` returns, whatever the outcome.
#[derive(Debug)]
pub struct PipedProcessTransfer {
    ctx: TransferContext,
    decryption: DecryptionContext,
}

impl PipedProcessTransfer {
    #[must_use]
    pub fn new(ctx: TransferContext, decryption: DecryptionContext) -> Self {
        Self { ctx, decryption }
    }

    async fn run(
        &self,
        request: &TransferRequest,
        policy: &RetryPolicy,
        sampler: &ProgressSampler,
    ) -> Result<u64, Error> {
        let command_line = self.decryption.decrypt_command(request.destination());
        let mut child = self
            .decryption
            .command(request.destination())
            .spawn()
            .map_err(|e| TransferError::ProcessSpawnFailed {
                command: self.decryption.shell().join(" "),
                message: e.to_string(),
            })?;
        let spawned_at = Instant::now();

        self.ctx.emit_process(ProcessEvent::Spawned {
            command: command_line,
            pid: child.id(),
        });

        let stderr = child.stderr.take().map(|stderr| tokio::spawn(drain_stderr(stderr)));
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::internal("decryption process has no stdin"))?;

        let mut sink = sampler.wrap(stdin);
        let mut reader = self.ctx.reader(request, policy);
        let copied = copy_range(
            &mut reader,
            &mut sink,
            self.ctx.buffer_size(),
            self.ctx.cancel_token(),
        )
        .await;
        // Closing stdin is the end-of-input signal.
        drop(sink);

        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(err) if err.io_kind() == Some(std::io::ErrorKind::BrokenPipe) => {
                // The process stopped reading; its exit status says why.
                let status = self.wait(&mut child, spawned_at).await?;
                let stderr_tail = collect_stderr(stderr).await;
                if status.success() {
                    return Err(TransferError::PipeClosed {
                        bytes_written: sampler.counter().get(),
                    }
                    .into());
                }
                return Err(process_failed(status, stderr_tail));
            }
            Err(err) => {
                self.kill(&mut child, &err).await;
                return Err(err);
            }
        };

        let status = self.wait(&mut child, spawned_at).await?;
        let stderr_tail = collect_stderr(stderr).await;
        if status.success() {
            Ok(bytes)
        } else {
            Err(process_failed(status, stderr_tail))
        }
    }

    async fn wait(&self, child: &mut Child, spawned_at: Instant) -> Result<ExitStatus, Error> {
        let waited = tokio::select! {
            biased;
            () = self.ctx.cancel_token().cancelled() => None,
            status = child.wait() => Some(status),
        };
        let Some(status) = waited else {
            self.kill(child, &Error::Cancelled).await;
            return Err(Error::Cancelled);
        };
        let status = status.map_err(Error::from)?;

        self.ctx.emit_process(ProcessEvent::Exited {
            exit_code: status.code(),
            duration: spawned_at.elapsed(),
        });
        Ok(status)
    }

    async fn kill(&self, child: &mut Child, reason: &Error) {
        if let Err(e) = child.kill().await {
            tracing::debug!(error = %e, "decryption process already gone");
            return;
        }
        self.ctx.emit_process(ProcessEvent::Killed {
            reason: reason.to_string(),
        });
    }
}

#[async_trait]
impl Transfer for PipedProcessTransfer {
    async fn transfer(&self, request: &TransferRequest, policy: &RetryPolicy) -> TransferOutcome {
        let key = SecretKeyGuard::new(self.decryption.secret_key_path(), self.ctx.events());
        let started = Instant::now();
        let sampler = ProgressSampler::start(request.label(), self.ctx.progress(), self.ctx.events());

        let result = self.run(request, policy, &sampler).await;
        let transferred = sampler.stop();
        key.remove(&self.ctx).await;

        match result {
            Ok(bytes) => {
                self.ctx.emit_download(DownloadEvent::Completed {
                    url: request.source().to_string(),
                    final_size: bytes,
                    total_time: started.elapsed(),
                    hash: None,
                });
                TransferOutcome::Success {
                    digest: None,
                    bytes,
                }
            }
            Err(reason) => {
                // Without a process nothing was written, so an existing file stays.
                if !matches!(
                    reason,
                    Error::Transfer(TransferError::ProcessSpawnFailed { .. })
                ) {
                    remove_partial_output(&self.ctx, request.destination()).await;
                }
                self.ctx.emit_download(DownloadEvent::Failed {
                    url: request.source().to_string(),
                    bytes_downloaded: transferred,
                    failure: FailureContext::from_error(&reason),
                });
                TransferOutcome::Failed { reason }
            }
        }
    }
}

fn process_failed(status: ExitStatus, stderr_tail: String) -> Error {
    TransferError::ProcessFailed {
        exit_code: status.code(),
        stderr_tail,
    }
    .into()
}

/// Keep the last lines of the decryptor's stderr, logging each at debug
async fn drain_stderr<R: AsyncRead + Unpin>(stderr: R) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "sluice::decrypt", "{line}");
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

async fn collect_stderr(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}

/// Deletes the secret key file; the drop path covers early exits
struct SecretKeyGuard {
    path: PathBuf,
    events: Option<EventSender>,
    armed: bool,
}

impl SecretKeyGuard {
    fn new(path: &Path, events: Option<EventSender>) -> Self {
        Self {
            path: path.to_path_buf(),
            events,
            armed: true,
        }
    }

    async fn remove(mut self, ctx: &TransferContext) {
        self.armed = false;
        let path = self.path.display().to_string();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => ctx.emit_process(ProcessEvent::SecretKeyRemoved { path }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => ctx.emit_process(ProcessEvent::CleanupFailed {
                path,
                error: e.to_string(),
            }),
        }
    }
}

impl Drop for SecretKeyGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                let path = self.path.display().to_string();
                tracing::warn!(%path, error = %e, "failed to remove secret key");
                self.events.emit_process(ProcessEvent::CleanupFailed {
                    path,
                    error: e.to_string(),
                });
            }
        }
    }
}
