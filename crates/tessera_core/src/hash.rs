//! Grid fingerprints.
//!
//! Uses BLAKE3 for all hashing operations. A fingerprint is the only
//! synchronization token exchanged between a room and its replicas, so
//! it travels as a lowercase hex string on the wire.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A BLAKE3 digest of a grid's full item set (256 bits / 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// The number of bytes in a fingerprint
    pub const LEN: usize = 32;

    /// Compute BLAKE3 hash of data
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form for log lines
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }

    /// Parse from hex string
    ///
    /// # Errors
    ///
    /// Returns error if hex is invalid or not 32 bytes
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let bytes = hex::decode(hex).map_err(|_| HashError::InvalidHex)?;
        if bytes.len() != Self::LEN {
            return Err(HashError::InvalidLength(bytes.len()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Hash-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Invalid hex encoding
    InvalidHex,
    /// Invalid length (not 32 bytes)
    InvalidLength(usize),
}

impl std::error::Error for HashError {}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHex => write!(f, "Invalid hex encoding"),
            Self::InvalidLength(len) => {
                write!(f, "Invalid fingerprint length: {} (expected 32)", len)
            }
        }
    }
}

/// Incremental fingerprint folding.
///
/// Every value is written in a fixed-width little-endian form and
/// strings are length-prefixed, so two different field sequences can
/// never produce the same byte stream.
pub struct FingerprintBuilder {
    hasher: blake3::Hasher,
}

impl FingerprintBuilder {
    /// Start a fingerprint under a domain tag
    #[must_use]
    pub fn new(domain: &str) -> Self {
        let mut builder = Self {
            hasher: blake3::Hasher::new(),
        };
        builder.write_str(domain);
        builder
    }

    /// Fold a u32
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    /// Fold a u64
    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    /// Fold a length-prefixed string
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.write_u64(value.len() as u64);
        self.hasher.update(value.as_bytes());
        self
    }

    /// Finish folding
    #[must_use]
    pub fn finish(&self) -> Fingerprint {
        Fingerprint(*self.hasher.finalize().as_bytes())
    }
}
