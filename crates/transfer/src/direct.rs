//! Download straight to a file, hashing as it goes

use async_trait::async_trait;
use sluice_errors::{Error, NetworkError};
use sluice_events::{DownloadEvent, EventEmitter, FailureContext};
use sluice_hash::{Hash, HashAlgorithm};
use sluice_net::RetryPolicy;
use std::time::Instant;
use tokio::fs::File;

use crate::checksum::ChecksumWriter;
use crate::context::TransferContext;
use crate::copy::copy_range;
use crate::progress::ProgressSampler;
use crate::request::TransferRequest;
use crate::{remove_partial_output, Transfer, TransferOutcome};

/// Reader → progress → checksum → destination file
#[derive(Debug)]
pub struct DirectFileTransfer {
    ctx: TransferContext,
    algorithm: HashAlgorithm,
}

impl DirectFileTransfer {
    #[must_use]
    pub fn new(ctx: TransferContext, algorithm: HashAlgorithm) -> Self {
        Self { ctx, algorithm }
    }

    async fn run(
        &self,
        request: &TransferRequest,
        policy: &RetryPolicy,
        sampler: &ProgressSampler,
    ) -> Result<(Hash, u64), Error> {
        let destination = request.destination();
        let file = File::create(destination)
            .await
            .map_err(|e| Error::io_with_path(&e, destination))?;

        // An expected digest decides the algorithm so the two are comparable.
        let algorithm = request
            .expected_digest()
            .map_or(self.algorithm, Hash::algorithm);

        let mut sink = ChecksumWriter::new(sampler.wrap(file), algorithm);
        let mut reader = self.ctx.reader(request, policy);

        let copied = copy_range(
            &mut reader,
            &mut sink,
            self.ctx.buffer_size(),
            self.ctx.cancel_token(),
        )
        .await;

        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(err) => {
                self.ctx.emit_warning_with_context(
                    format!(
                        "partial {algorithm} digest {} after {} bytes",
                        sink.digest(),
                        sink.bytes_written()
                    ),
                    destination.display().to_string(),
                );
                return Err(err);
            }
        };

        let (writer, digest) = sink.into_parts();
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| Error::io_with_path(&e, destination))?;

        if let Some(expected) = request.expected_digest() {
            if *expected != digest {
                return Err(NetworkError::ChecksumMismatch {
                    expected: expected.to_hex(),
                    actual: digest.to_hex(),
                }
                .into());
            }
        }

        Ok((digest, bytes))
    }
}

#[async_trait]
impl Transfer for DirectFileTransfer {
    async fn transfer(&self, request: &TransferRequest, policy: &RetryPolicy) -> TransferOutcome {
        let started = Instant::now();
        let sampler = ProgressSampler::start(request.label(), self.ctx.progress(), self.ctx.events());
        let result = self.run(request, policy, &sampler).await;
        let transferred = sampler.stop();

        match result {
            Ok((digest, bytes)) => {
                self.ctx.emit_download(DownloadEvent::Completed {
                    url: request.source().to_string(),
                    final_size: bytes,
                    total_time: started.elapsed(),
                    hash: Some(digest.to_hex()),
                });
                TransferOutcome::Success {
                    digest: Some(digest),
                    bytes,
                }
            }
            Err(reason) => {
                remove_partial_output(&self.ctx, request.destination()).await;
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
