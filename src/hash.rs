//! Public key digest primitives
//!
//! hash160 = RIPEMD160(SHA256(sec1_encoding)) over the compressed (33-byte)
//! or uncompressed (65-byte) public key encoding.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::AffinePoint;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::types::Hash160;

/// hash160 over raw bytes
pub fn hash160(data: &[u8]) -> Hash160 {
    let sha = Sha256::digest(data);
    let rip = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&rip);
    Hash160(out)
}

/// Fingerprint of a public key point under the requested encoding
pub fn hash_public_key(point: &AffinePoint, compressed: bool) -> Hash160 {
    let encoded = point.to_encoded_point(compressed);
    hash160(encoded.as_bytes())
}
