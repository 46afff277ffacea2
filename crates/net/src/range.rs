//! Byte ranges and the delivered-bytes cursor

use sluice_errors::{Error, NetworkError};

/// Inclusive `[start, end]` byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// # Errors
    ///
    /// Returns `InvalidRange` when `start > end`.
    pub fn new(start: u64, end: u64) -> Result<Self, Error> {
        if start > end {
            return Err(NetworkError::InvalidRange { start, end }.into());
        }
        Ok(Self { start, end })
    }

    /// The range covering a whole object of `total_size` bytes
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` for an empty object.
    pub fn whole(total_size: u64) -> Result<Self, Error> {
        let end = total_size
            .checked_sub(1)
            .ok_or(NetworkError::InvalidRange { start: 0, end: 0 })?;
        Self::new(0, end)
    }

    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; a range covers at least one byte
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The remainder of this range after `delivered` bytes
    #[must_use]
    pub fn resume_from(&self, delivered: u64) -> Option<Self> {
        let start = self.start.checked_add(delivered)?;
        (start <= self.end).then_some(Self {
            start,
            end: self.end,
        })
    }

    /// Value for the HTTP `Range` header
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Bytes handed to the consumer within one logical transfer
///
/// Never decreases, including across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCursor {
    delivered: u64,
    total: u64,
}

impl TransferCursor {
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self {
            delivered: 0,
            total,
        }
    }

    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.total - self.delivered
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.delivered == self.total
    }

    /// Record `n` more delivered bytes, saturating at the total
    pub fn advance(&mut self, n: u64) {
        debug_assert!(n <= self.remaining(), "cursor advanced past end of range");
        self.delivered = self.delivered.saturating_add(n).min(self.total);
    }
}
