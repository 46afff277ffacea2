#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Content digests for sluice
//!
//! Transfers are fingerprinted with MD5 by default, matching what archive
//! metadata publishes for each file. BLAKE3 is available for callers that
//! want a stronger digest. Both are driven through the same incremental
//! [`Hasher`] so the copy loop can feed exactly the bytes it writes.

use serde::{Deserialize, Serialize};
use sluice_errors::{Error, TransferError};
use std::fmt;

/// Digest algorithm used to fingerprint a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Blake3,
}

impl HashAlgorithm {
    /// Digest length in bytes
    #[must_use]
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Blake3 => 32,
        }
    }

    /// Infer the algorithm from a digest length in bytes
    #[must_use]
    pub fn from_digest_len(len: usize) -> Option<Self> {
        match len {
            16 => Some(Self::Md5),
            32 => Some(Self::Blake3),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

/// A finished digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    algorithm: HashAlgorithm,
    bytes: Vec<u8>,
}

impl Hash {
    /// Algorithm that produced this digest
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Get the raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Convert to lowercase hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Parse from hex string, inferring the algorithm from its length
    ///
    /// # Errors
    /// Returns an error if the input is not valid hexadecimal or is neither
    /// an MD5 (32 chars) nor a BLAKE3 (64 chars) digest.
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let bytes = hex::decode(s.trim()).map_err(|e| TransferError::InvalidRequest {
            message: format!("invalid digest hex: {e}"),
        })?;

        let algorithm =
            HashAlgorithm::from_digest_len(bytes.len()).ok_or_else(|| {
                TransferError::InvalidRequest {
                    message: format!("digest must be 16 or 32 bytes, got {}", bytes.len()),
                }
            })?;

        Ok(Self { algorithm, bytes })
    }

    /// Compute the digest of a byte slice
    #[must_use]
    pub fn from_data(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let mut hasher = Hasher::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental digest state
///
/// Finalizing does not consume the hasher, so a partial digest can be read
/// mid-transfer for diagnostics and the hasher keeps accepting input.
#[derive(Clone)]
pub enum Hasher {
    Md5(md5::Context),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    #[must_use]
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Md5(_) => HashAlgorithm::Md5,
            Self::Blake3(_) => HashAlgorithm::Blake3,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(data),
            Self::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    /// Digest of everything fed so far
    #[must_use]
    pub fn finalize(&self) -> Hash {
        let bytes = match self {
            Self::Md5(ctx) => ctx.clone().compute().0.to_vec(),
            Self::Blake3(hasher) => hasher.finalize().as_bytes().to_vec(),
        };
        Hash {
            algorithm: self.algorithm(),
            bytes,
        }
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hasher")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}
