//! Target set loading and bookkeeping
//!
//! The host-authoritative set of hash160 digests still being searched for.
//! Shrinks as matches are confirmed; reconciliation pushes the shrunk
//! snapshot back to the device view after each retirement.

use log::{info, warn};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Result, SearchError};
use crate::types::Hash160;

/// Host-side view of the digests still wanted
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    digests: HashSet<Hash160>,
}

impl TargetSet {
    pub fn new(digests: impl IntoIterator<Item = Hash160>) -> Self {
        TargetSet {
            digests: digests.into_iter().collect(),
        }
    }

    /// Load targets from a file of hex hash160 digests or P2PKH addresses,
    /// one per line. Blank lines and '#' comments are skipped; invalid lines
    /// are logged and skipped. An empty usable set is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut digests = HashSet::new();
        let mut invalid = 0usize;

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_target_line(line) {
                Ok(digest) => {
                    digests.insert(digest);
                }
                Err(e) => {
                    warn!("Skipping invalid target line {}: {}", line_num + 1, e);
                    invalid += 1;
                }
            }
        }

        if digests.is_empty() {
            return Err(SearchError::config(format!(
                "no usable targets in {} ({} invalid lines)",
                path.display(),
                invalid
            )));
        }

        info!(
            "Loaded {} targets from {} (skipped {} invalid)",
            digests.len(),
            path.display(),
            invalid
        );
        Ok(TargetSet { digests })
    }

    pub fn contains(&self, digest: &Hash160) -> bool {
        self.digests.contains(digest)
    }

    /// Retire a confirmed digest. Returns false if it was already gone.
    pub fn remove(&mut self, digest: &Hash160) -> bool {
        self.digests.remove(digest)
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Snapshot for a full device-view replacement
    pub fn snapshot(&self) -> Vec<Hash160> {
        self.digests.iter().copied().collect()
    }
}

impl fmt::Display for TargetSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} active targets", self.digests.len())
    }
}

/// Parse one target line: 40-char hex hash160, or a Base58Check P2PKH address
fn parse_target_line(line: &str) -> Result<Hash160> {
    if line.len() == 40 && line.chars().all(|c| c.is_ascii_hexdigit()) {
        return line.parse();
    }
    decode_p2pkh(line)
}

/// Decode a mainnet P2PKH address (version 0x00) to its hash160
fn decode_p2pkh(addr: &str) -> Result<Hash160> {
    let raw = bs58::decode(addr)
        .into_vec()
        .map_err(|e| SearchError::config(format!("invalid base58 '{}': {}", addr, e)))?;
    if raw.len() != 25 {
        return Err(SearchError::config(format!(
            "invalid Base58Check length {} for '{}'",
            raw.len(),
            addr
        )));
    }
    let (payload, checksum) = raw.split_at(21);
    let expected = Sha256::digest(Sha256::digest(payload));
    if &expected[..4] != checksum {
        return Err(SearchError::config(format!("bad Base58Check checksum for '{}'", addr)));
    }
    if payload[0] != 0x00 {
        return Err(SearchError::config(format!(
            "unsupported address version {:#04x} (only P2PKH mainnet)",
            payload[0]
        )));
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&payload[1..]);
    Ok(Hash160(out))
}
