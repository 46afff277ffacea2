//! In-memory range source shared by the transfer tests
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use sluice_errors::{Error, NetworkError};
use sluice_net::{ByteRange, ByteStream, RangeSource};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use url::Url;

/// Behaviour of one connection attempt
#[derive(Debug, Clone)]
pub enum Step {
    Status(u16),
    BreakAfter(usize),
    Serve,
}

pub struct MemorySource {
    data: Vec<u8>,
    plan: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ByteRange>>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>, plan: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            data,
            plan: Mutex::new(plan.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn range_headers(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(ByteRange::header_value)
            .collect()
    }
}

#[async_trait]
impl RangeSource for MemorySource {
    async fn open(&self, _location: &Url, range: ByteRange) -> Result<ByteStream, Error> {
        self.requests.lock().unwrap().push(range);
        let step = self.plan.lock().unwrap().pop_front().unwrap_or(Step::Serve);

        let start = usize::try_from(range.start()).unwrap();
        let end = usize::try_from(range.end()).unwrap();
        let slice = &self.data[start..=end];

        let (body, broken) = match step {
            Step::Status(status) => {
                return Err(NetworkError::from_status(status, "scripted").into())
            }
            Step::BreakAfter(n) => (&slice[..n.min(slice.len())], true),
            Step::Serve => (slice, false),
        };

        let mut items: Vec<Result<Bytes, Error>> = body
            .chunks(128)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if broken {
            items.push(Err(
                NetworkError::StreamInterrupted("connection reset by peer".into()).into(),
            ));
        }
        Ok(futures::stream::iter(items).boxed())
    }
}

pub fn fixture(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

pub fn source_url() -> Url {
    Url::parse("https://store.example.com/files/EGAF0001/reads.bam").unwrap()
}
