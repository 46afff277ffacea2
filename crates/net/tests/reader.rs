//! Fault-injection tests for the range reader

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use proptest::prelude::*;
use sluice_errors::{Error, NetworkError};
use sluice_events::{channel, AppEvent, DownloadEvent};
use sluice_net::{ByteRange, ByteStream, RangeRetryReader, RangeSource, RetryPolicy};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// What the next connection attempt does
#[derive(Debug, Clone)]
enum Step {
    Refuse,
    Status(u16),
    /// Serve this many bytes of the requested range, then break the stream
    BreakAfter(usize),
    Serve,
}

struct ScriptedSource {
    data: Vec<u8>,
    plan: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ByteRange>>,
}

impl ScriptedSource {
    fn new(data: Vec<u8>, plan: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            data,
            plan: Mutex::new(plan.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ByteRange> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RangeSource for ScriptedSource {
    async fn open(&self, _location: &Url, range: ByteRange) -> Result<ByteStream, Error> {
        self.requests.lock().unwrap().push(range);
        let step = self.plan.lock().unwrap().pop_front().unwrap_or(Step::Serve);

        let start = usize::try_from(range.start()).unwrap();
        let end = usize::try_from(range.end()).unwrap();
        let slice = self.data[start..=end].to_vec();

        let (body, broken) = match step {
            Step::Refuse => return Err(NetworkError::ConnectionFailed("refused".into()).into()),
            Step::Status(status) => return Err(NetworkError::from_status(status, "scripted").into()),
            Step::BreakAfter(n) => (slice[..n.min(slice.len())].to_vec(), true),
            Step::Serve => (slice, false),
        };

        let mut items: Vec<Result<Bytes, Error>> = body
            .chunks(64)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if broken {
            items.push(Err(NetworkError::StreamInterrupted("connection reset".into()).into()));
        }
        Ok(futures::stream::iter(items).boxed())
    }
}

fn fixture(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn location() -> Url {
    Url::parse("https://store.example.com/files/fixture.bin").unwrap()
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::fixed(max_attempts, Duration::from_secs(2)).unwrap()
}

async fn drain(reader: &mut RangeRetryReader, buffer: usize) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; buffer];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}

#[tokio::test(start_paused = true)]
async fn resumes_from_the_delivered_offset() {
    let data = fixture(1000);
    let source = ScriptedSource::new(data.clone(), [Step::BreakAfter(450)]);
    let mut reader = RangeRetryReader::new(
        source.clone(),
        location(),
        ByteRange::whole(1000).unwrap(),
        policy(5),
    );

    let out = drain(&mut reader, 100).await.unwrap();

    assert_eq!(out, data);
    let headers: Vec<String> = source.requests().iter().map(ByteRange::header_value).collect();
    assert_eq!(headers, ["bytes=0-999", "bytes=450-999"]);
    assert_eq!(reader.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn every_attempt_failing_uses_exactly_the_budget() {
    for k in 1..=4 {
        let source = ScriptedSource::new(fixture(10), vec![Step::Refuse; 10]);
        let mut reader = RangeRetryReader::new(
            source.clone(),
            location(),
            ByteRange::whole(10).unwrap(),
            policy(k),
        );

        let err = drain(&mut reader, 100).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Network(NetworkError::RetriesExhausted { .. })
        ));
        assert_eq!(source.requests().len(), k as usize);
        assert!(reader.is_exhausted());
    }
}

#[tokio::test(start_paused = true)]
async fn one_failure_then_success_takes_two_attempts() {
    let data = fixture(300);
    let source = ScriptedSource::new(data.clone(), [Step::Status(503)]);
    let mut reader = RangeRetryReader::new(
        source.clone(),
        location(),
        ByteRange::whole(300).unwrap(),
        policy(5),
    );

    assert_eq!(drain(&mut reader, 100).await.unwrap(), data);
    assert_eq!(source.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn client_error_fails_on_first_attempt() {
    let source = ScriptedSource::new(fixture(10), [Step::Status(403)]);
    let mut reader = RangeRetryReader::new(
        source.clone(),
        location(),
        ByteRange::whole(10).unwrap(),
        policy(10),
    );

    let err = drain(&mut reader, 100).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Network(NetworkError::HttpError { status: 403, .. })
    ));
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn progress_does_not_refund_the_budget() {
    // Every attempt delivers new bytes before breaking.
    let source = ScriptedSource::new(fixture(400), vec![Step::BreakAfter(100); 10]);
    let mut reader = RangeRetryReader::new(
        source.clone(),
        location(),
        ByteRange::whole(400).unwrap(),
        policy(2),
    );

    let err = drain(&mut reader, 64).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Network(NetworkError::RetriesExhausted { attempts: 2, .. })
    ));
    assert_eq!(reader.attempts(), 2);
    assert_eq!(reader.bytes_delivered(), 200);
    let starts: Vec<u64> = source.requests().iter().map(ByteRange::start).collect();
    assert_eq!(starts, [0, 100]);
}

#[tokio::test(start_paused = true)]
async fn repeated_breaks_within_the_budget_still_complete() {
    let data = fixture(400);
    let source = ScriptedSource::new(data.clone(), vec![Step::BreakAfter(100); 3]);
    let mut reader = RangeRetryReader::new(
        source.clone(),
        location(),
        ByteRange::whole(400).unwrap(),
        policy(4),
    );

    assert_eq!(drain(&mut reader, 64).await.unwrap(), data);
    assert_eq!(reader.attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn backoff_and_retries_are_reported() {
    let (tx, mut rx) = channel();
    let source = ScriptedSource::new(fixture(50), [Step::Refuse]);
    let mut reader = RangeRetryReader::new(
        source,
        location(),
        ByteRange::whole(50).unwrap(),
        policy(3),
    )
    .with_events(tx);

    drain(&mut reader, 100).await.unwrap();

    let mut saw_retry = false;
    let mut saw_resume = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            AppEvent::Download(DownloadEvent::Retrying { backoff_delay, .. }) => {
                assert_eq!(backoff_delay, Duration::from_secs(2));
                saw_retry = true;
            }
            AppEvent::Download(DownloadEvent::Resuming { resume_offset, .. }) => {
                assert_eq!(resume_offset, 0);
                saw_resume = true;
            }
            _ => {}
        }
    }
    assert!(saw_retry && saw_resume);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_backoff() {
    let cancel = CancellationToken::new();
    let source = ScriptedSource::new(fixture(50), vec![Step::Refuse; 10]);
    let mut reader = RangeRetryReader::new(
        source.clone(),
        location(),
        ByteRange::whole(50).unwrap(),
        RetryPolicy::fixed(10, Duration::from_secs(3600)).unwrap(),
    )
    .with_cancellation(cancel.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();
    });

    let err = drain(&mut reader, 100).await.unwrap_err();
    canceller.await.unwrap();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn subrange_is_delivered_exactly() {
    let data = fixture(100);
    let source = ScriptedSource::new(data.clone(), []);
    let mut reader = RangeRetryReader::new(
        source,
        location(),
        ByteRange::new(10, 19).unwrap(),
        policy(1),
    );

    assert_eq!(drain(&mut reader, 7).await.unwrap(), &data[10..20]);
    assert_eq!(reader.bytes_delivered(), 10);
    // Exhausted streams stay exhausted.
    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn resume_is_gapless_for_any_fault_offset(fault in 0usize..1000, buffer in 1usize..300) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let data = fixture(1000);
        let source = ScriptedSource::new(data.clone(), [Step::BreakAfter(fault)]);
        let mut reader = RangeRetryReader::new(
            source.clone(),
            location(),
            ByteRange::whole(1000).unwrap(),
            policy(3),
        );

        let out = runtime.block_on(drain(&mut reader, buffer)).unwrap();
        prop_assert_eq!(out, data);

        let requests = source.requests();
        prop_assert_eq!(requests.len(), 2);
        prop_assert_eq!(requests[1].start(), fault as u64);
        prop_assert_eq!(requests[1].end(), 999);
    }
}
