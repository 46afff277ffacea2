//! Piped transfers into stand-in decryption tools
#![cfg(unix)]

mod common;

use common::{fixture, source_url, MemorySource, Step};
use sluice_errors::{Error, NetworkError, TransferError};
use sluice_events::{channel, AppEvent, DownloadEvent};
use sluice_net::RetryPolicy;
use sluice_transfer::*;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

struct Fixture {
    _dir: tempfile::TempDir,
    tool: PathBuf,
    key: PathBuf,
    destination: PathBuf,
}

/// A fake decryption tool whose body is `script`, plus a key to consume
fn setup(script: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let tool = dir.path().join("fake-crypt");
    std::fs::write(&tool, format!("#!/bin/sh\n{script}\n")).unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    let key = dir.path().join("session.sec");
    std::fs::write(&key, "secret key material").unwrap();

    let destination = dir.path().join("reads.bam");
    Fixture {
        tool,
        key,
        destination,
        _dir: dir,
    }
}

fn piped(source: Arc<MemorySource>, fx: &Fixture) -> PipedProcessTransfer {
    let decryption = DecryptionContext::new(
        &fx.tool,
        &fx.key,
        vec!["sh".to_string(), "-c".to_string()],
    )
    .unwrap();
    PipedProcessTransfer::new(TransferContext::new(source).with_buffer_size(256), decryption)
}

fn request(destination: &Path, size: u64) -> TransferRequest {
    TransferRequest::new(source_url(), destination, size).unwrap()
}

fn policy() -> RetryPolicy {
    RetryPolicy::fixed(3, Duration::from_millis(10)).unwrap()
}

#[tokio::test]
async fn passthrough_tool_writes_destination_and_removes_key() {
    let data = fixture(5000);
    let fx = setup("exec cat");
    let transfer = piped(MemorySource::new(data.clone(), []), &fx);

    let outcome = transfer.transfer(&request(&fx.destination, 5000), &policy()).await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert!(outcome.digest().is_none());
    assert_eq!(std::fs::read(&fx.destination).unwrap(), data);
    assert!(!fx.key.exists());
}

#[tokio::test]
async fn resumed_stream_reaches_the_tool_intact() {
    let data = fixture(2000);
    let fx = setup("exec cat");
    let source = MemorySource::new(data.clone(), [Step::BreakAfter(700)]);
    let transfer = piped(source.clone(), &fx);

    let outcome = transfer.transfer(&request(&fx.destination, 2000), &policy()).await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(source.range_headers(), ["bytes=0-1999", "bytes=700-1999"]);
    assert_eq!(std::fs::read(&fx.destination).unwrap(), data);
}

#[tokio::test]
async fn nonzero_exit_fails_and_cleans_up() {
    let fx = setup("cat > /dev/null\necho 'wrong key' >&2\nexit 3");
    let transfer = piped(MemorySource::new(fixture(1000), []), &fx);

    let err = transfer
        .transfer(&request(&fx.destination, 1000), &policy())
        .await
        .into_result()
        .unwrap_err();

    match err {
        Error::Transfer(TransferError::ProcessFailed {
            exit_code,
            stderr_tail,
        }) => {
            assert_eq!(exit_code, Some(3));
            assert!(stderr_tail.contains("wrong key"), "{stderr_tail}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!fx.key.exists());
    assert!(!fx.destination.exists());
}

#[tokio::test]
async fn tool_that_ignores_input_fails() {
    let fx = setup("exit 4");
    let transfer = piped(MemorySource::new(fixture(1000), []), &fx);

    let err = transfer
        .transfer(&request(&fx.destination, 1000), &policy())
        .await
        .into_result()
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Transfer(TransferError::ProcessFailed {
            exit_code: Some(4),
            ..
        })
    ));
    assert!(!fx.key.exists());
    assert!(!fx.destination.exists());
}

#[tokio::test]
async fn early_clean_exit_is_reported_as_closed_pipe() {
    // Larger than any pipe buffer so the write must hit EPIPE.
    let size = 4 * 1024 * 1024;
    let fx = setup("exit 0");
    let transfer = piped(MemorySource::new(fixture(size), []), &fx);

    let err = transfer
        .transfer(&request(&fx.destination, size as u64), &policy())
        .await
        .into_result()
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Transfer(TransferError::PipeClosed { .. })
    ));
    assert!(!fx.key.exists());
}

#[tokio::test]
async fn source_failure_kills_tool_and_removes_key() {
    let fx = setup("exec cat");
    let transfer = piped(MemorySource::new(fixture(1000), [Step::Status(404)]), &fx);

    let err = transfer
        .transfer(&request(&fx.destination, 1000), &policy())
        .await
        .into_result()
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Network(NetworkError::HttpError { status: 404, .. })
    ));
    assert!(!fx.key.exists());
    assert!(!fx.destination.exists());
}

#[tokio::test]
async fn missing_interpreter_is_a_spawn_failure() {
    let fx = setup("exec cat");
    let decryption = DecryptionContext::new(
        &fx.tool,
        &fx.key,
        vec!["/nonexistent/shell".to_string(), "-c".to_string()],
    )
    .unwrap();
    let transfer = PipedProcessTransfer::new(
        TransferContext::new(MemorySource::new(fixture(10), [])),
        decryption,
    );

    let err = transfer
        .transfer(&request(&fx.destination, 10), &policy())
        .await
        .into_result()
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Transfer(TransferError::ProcessSpawnFailed { .. })
    ));
    assert!(!fx.key.exists());
}

#[tokio::test]
async fn spawn_failure_leaves_an_existing_destination_alone() {
    let fx = setup("exec cat");
    std::fs::write(&fx.destination, "decrypted by an earlier run").unwrap();
    let decryption = DecryptionContext::new(
        &fx.tool,
        &fx.key,
        vec!["/nonexistent/shell".to_string(), "-c".to_string()],
    )
    .unwrap();
    let transfer = PipedProcessTransfer::new(
        TransferContext::new(MemorySource::new(fixture(10), [])),
        decryption,
    );

    let outcome = transfer.transfer(&request(&fx.destination, 10), &policy()).await;

    assert!(!outcome.is_success());
    assert_eq!(
        std::fs::read_to_string(&fx.destination).unwrap(),
        "decrypted by an earlier run"
    );
}

#[tokio::test]
async fn tool_that_never_reads_bounds_buffered_bytes() {
    // Linux default pipe capacity; other unixes are smaller.
    const PIPE_CAPACITY: u64 = 64 * 1024;
    const BUFFER: u64 = 256;

    let size = 4 * 1024 * 1024;
    let fx = setup("exec sleep 5");
    let decryption = DecryptionContext::new(
        &fx.tool,
        &fx.key,
        vec!["sh".to_string(), "-c".to_string()],
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let (tx, mut rx) = channel();
    let ctx = TransferContext::new(MemorySource::new(fixture(size), []))
        .with_buffer_size(BUFFER as usize)
        .with_events(tx)
        .with_cancellation(cancel.clone());
    let transfer = PipedProcessTransfer::new(ctx, decryption);

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
    });
    let started = Instant::now();
    let err = transfer
        .transfer(&request(&fx.destination, size as u64), &policy())
        .await
        .into_result()
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, Error::Cancelled), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(!fx.key.exists());

    let mut buffered = None;
    while let Ok(event) = rx.try_recv() {
        if let AppEvent::Download(DownloadEvent::Failed {
            bytes_downloaded, ..
        }) = event
        {
            buffered = Some(bytes_downloaded);
        }
    }
    let buffered = buffered.expect("failure event carries the byte count");
    assert!(buffered > 0);
    assert!(
        buffered <= PIPE_CAPACITY + BUFFER,
        "{buffered} bytes accepted by a tool that never reads"
    );
}

#[tokio::test]
async fn orchestrator_runs_decrypt_mode() {
    let data = fixture(800);
    let fx = setup("exec cat");
    let decryption = DecryptionContext::new(
        &fx.tool,
        &fx.key,
        vec!["sh".to_string(), "-c".to_string()],
    )
    .unwrap();
    let orchestrator = TransferOrchestrator::new(
        TransferContext::new(MemorySource::new(data.clone(), [])),
        TransferMode::Decrypt(decryption),
        policy(),
    );

    let status = orchestrator.execute(&request(&fx.destination, 800)).await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(std::fs::read(&fx.destination).unwrap(), data);
    assert!(!fx.key.exists());
}
