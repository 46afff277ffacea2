//! Throughput sampling off the data path

use sluice_errors::{ConfigError, Error};
use sluice_events::{DownloadEvent, EventEmitter, EventSender};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// When the first sample fires and how often after that
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressConfig {
    initial_delay: Duration,
    period: Duration,
}

impl ProgressConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero period.
    pub fn new(initial_delay: Duration, period: Duration) -> Result<Self, Error> {
        if period.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "progress.period_secs".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(Self {
            initial_delay,
            period,
        })
    }

    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            period: Duration::from_secs(10),
        }
    }
}

/// Cumulative byte count shared by the writer and the sampling task
///
/// Single writer, any number of readers.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter(Arc<AtomicU64>);

impl ProgressCounter {
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Background timer that reports the transfer rate
///
/// The task is aborted when the sampler is stopped or dropped.
#[derive(Debug)]
pub struct ProgressSampler {
    counter: ProgressCounter,
    task: JoinHandle<()>,
}

impl ProgressSampler {
    /// Start sampling; must be called inside a tokio runtime
    #[must_use]
    pub fn start(
        label: impl Into<String>,
        config: ProgressConfig,
        events: Option<EventSender>,
    ) -> Self {
        let counter = ProgressCounter::default();
        let task = tokio::spawn(sample(label.into(), counter.clone(), config, events));
        Self { counter, task }
    }

    #[must_use]
    pub fn counter(&self) -> ProgressCounter {
        self.counter.clone()
    }

    /// Count every byte written through `inner`
    #[must_use]
    pub fn wrap<W>(&self, inner: W) -> ProgressWriter<W> {
        ProgressWriter {
            inner,
            counter: self.counter.clone(),
        }
    }

    /// Stop the timer and return the final byte count
    pub fn stop(self) -> u64 {
        self.task.abort();
        self.counter.get()
    }
}

impl Drop for ProgressSampler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[allow(clippy::cast_precision_loss)]
async fn sample(
    label: String,
    counter: ProgressCounter,
    config: ProgressConfig,
    events: Option<EventSender>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + config.initial_delay, config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let period = config.period.as_secs_f64();
    let mut last = 0u64;

    loop {
        ticker.tick().await;
        let current = counter.get();
        let rate = current.saturating_sub(last) as f64 / period;
        last = current;

        events.emit_download(DownloadEvent::Progress {
            label: label.clone(),
            bytes_transferred: current,
            rate_bytes_per_sec: rate,
        });
    }
}

/// Write adapter that adds accepted bytes to a [`ProgressCounter`]
#[derive(Debug)]
pub struct ProgressWriter<W> {
    inner: W,
    counter: ProgressCounter,
}

impl<W> ProgressWriter<W> {
    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.counter.add(*n as u64);
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_events::{channel, AppEvent};
    use tokio::io::AsyncWriteExt;

    const MIB: u64 = 1024 * 1024;

    fn progress(event: AppEvent) -> (u64, f64) {
        match event {
            AppEvent::Download(DownloadEvent::Progress {
                bytes_transferred,
                rate_bytes_per_sec,
                ..
            }) => (bytes_transferred, rate_bytes_per_sec),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn samples_after_initial_delay_then_every_period() {
        let (tx, mut rx) = channel();
        let started = Instant::now();
        let sampler = ProgressSampler::start("reads.bam", ProgressConfig::default(), Some(tx));
        let counter = sampler.counter();

        counter.add(20 * MIB);
        let (bytes, rate) = progress(rx.recv().await.unwrap());
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(bytes, 20 * MIB);
        assert!((rate - 2.0 * MIB as f64).abs() < 1.0);

        counter.add(50 * MIB);
        let (bytes, rate) = progress(rx.recv().await.unwrap());
        assert_eq!(started.elapsed(), Duration::from_secs(11));
        assert_eq!(bytes, 70 * MIB);
        assert!((rate - 5.0 * MIB as f64).abs() < 1.0);

        assert_eq!(sampler.stop(), 70 * MIB);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_sampler_reports_nothing() {
        let (tx, mut rx) = channel();
        let sampler = ProgressSampler::start("x", ProgressConfig::default(), Some(tx));
        sampler.stop();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn writer_counts_accepted_bytes() {
        let sampler = ProgressSampler::start("x", ProgressConfig::default(), None);
        let mut writer = sampler.wrap(Vec::new());
        writer.write_all(b"hello world").await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(writer.get_ref().as_slice(), b"hello world");
        assert_eq!(sampler.stop(), 11);
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(ProgressConfig::new(Duration::from_secs(1), Duration::ZERO).is_err());
    }
}
