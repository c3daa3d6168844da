//! Shared types for the key search pipeline
//!
//! Contains the digest newtype, compression mode, raw device hits, verified
//! search results and the device capability record.

use clap::ValueEnum;
use k256::{AffinePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SearchError};
use crate::math::{affine_coordinates, scalar_to_hex};

/// 20-byte public key fingerprint (RIPEMD160(SHA256(pubkey)))
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash160(pub [u8; 20]);

impl Hash160 {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Hash160 {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| SearchError::config(format!("invalid hash160 hex '{}': {}", s, e)))?;
        let arr: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SearchError::config(format!("hash160 must be 20 bytes, got {}", bytes.len())))?;
        Ok(Hash160(arr))
    }
}

/// Public key compression mode to search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
pub enum Compression {
    #[default]
    Compressed,
    Uncompressed,
    Both,
}

impl Compression {
    /// Whether the mode covers compressed-key digests
    pub fn covers_compressed(&self) -> bool {
        matches!(self, Compression::Compressed | Compression::Both)
    }

    /// Whether the mode covers uncompressed-key digests
    pub fn covers_uncompressed(&self) -> bool {
        matches!(self, Compression::Uncompressed | Compression::Both)
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Compressed => write!(f, "compressed"),
            Compression::Uncompressed => write!(f, "uncompressed"),
            Compression::Both => write!(f, "both"),
        }
    }
}

/// Accelerator capability as reported by the device runtime
#[derive(Debug, Clone)]
pub struct DeviceCapability {
    pub name: String,
    /// Multiprocessor count used for auto block partitioning
    pub mp_count: u32,
    /// Hardware per-block thread limit (1024 on current hardware)
    pub max_threads_per_block: u32,
}

/// Raw match reported by the device kernel
///
/// Ephemeral: lives in the bounded device result queue between one step call
/// and the reconciliation that drains it. Coordinates identify the lane in
/// device terms; x/y are the big-endian affine coordinates the kernel saw.
#[derive(Debug, Clone)]
pub struct RawHit {
    pub block: u32,
    pub thread: u32,
    pub idx: u32,
    pub digest: Hash160,
    pub x: [u8; 32],
    pub y: [u8; 32],
    pub compressed: bool,
}

/// Verified search result, immutable once produced
///
/// Invariants enforced before construction: `digest == hash(public_key)`
/// under the recorded compression flag, and `public_key == private_key * G`.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub private_key: Scalar,
    pub public_key: AffinePoint,
    pub compressed: bool,
    pub digest: Hash160,
}

impl SearchResult {
    /// Private key as 64-char big-endian hex
    pub fn private_key_hex(&self) -> String {
        scalar_to_hex(&self.private_key)
    }

    /// Public key x/y coordinates as hex
    pub fn public_key_hex(&self) -> (String, String) {
        let (x, y) = affine_coordinates(&self.public_key);
        (hex::encode(x), hex::encode(y))
    }
}
