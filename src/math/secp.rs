//! Scalar and point conversions over the k256 arithmetic backend
//!
//! All modular arithmetic happens in k256's `Scalar` (mod the curve order N)
//! and `ProjectivePoint`. This module only adds the byte-level plumbing:
//! hex parsing with range validation, lifts from machine integers, integer
//! ordering of canonical representations and SEC1 coordinate access.

use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, EncodedPoint, FieldBytes, Scalar};
use std::cmp::Ordering;

use crate::error::{Result, SearchError};

/// Parse a big-endian hex string into a scalar, rejecting values >= N.
///
/// Accepts short strings ("1", "deadbeef"); the value is left-padded to
/// 256 bits before the canonical range check.
pub fn parse_scalar_hex(s: &str) -> Result<Scalar> {
    let s = s.trim().trim_start_matches("0x");
    if s.is_empty() || s.len() > 64 {
        return Err(SearchError::config(format!(
            "scalar hex must be 1-64 chars, got '{}'",
            s
        )));
    }
    let padded = format!("{:0>64}", s);
    let bytes = hex::decode(&padded)
        .map_err(|e| SearchError::config(format!("invalid scalar hex '{}': {}", s, e)))?;
    let mut repr = [0u8; 32];
    repr.copy_from_slice(&bytes);
    Scalar::from_repr_vartime(repr.into())
        .ok_or_else(|| SearchError::config(format!("scalar '{}' is out of range (>= curve order)", s)))
}

/// Canonical big-endian hex of a scalar, 64 chars
pub fn scalar_to_hex(s: &Scalar) -> String {
    hex::encode(s.to_bytes())
}

/// Lift a u64 into the scalar field. Always below N.
pub fn scalar_from_u64(v: u64) -> Scalar {
    scalar_from_u128(v as u128)
}

/// Lift a u128 into the scalar field. Always below N.
pub fn scalar_from_u128(v: u128) -> Scalar {
    let mut repr = [0u8; 32];
    repr[16..].copy_from_slice(&v.to_be_bytes());
    Scalar::from_repr_vartime(repr.into()).expect("u128 is below the curve order")
}

/// Integer ordering of two scalars via their canonical big-endian bytes
pub fn scalar_cmp(a: &Scalar, b: &Scalar) -> Ordering {
    a.to_bytes().as_slice().cmp(b.to_bytes().as_slice())
}

pub fn scalar_is_zero(s: &Scalar) -> bool {
    bool::from(s.is_zero())
}

/// Big-endian affine x/y of a point. The identity maps to all-zero words.
pub fn affine_coordinates(p: &AffinePoint) -> ([u8; 32], [u8; 32]) {
    let encoded = p.to_encoded_point(false);
    let bytes = encoded.as_bytes();
    if bytes.len() != 65 {
        return ([0u8; 32], [0u8; 32]);
    }
    let mut x = [0u8; 32];
    let mut y = [0u8; 32];
    x.copy_from_slice(&bytes[1..33]);
    y.copy_from_slice(&bytes[33..65]);
    (x, y)
}

/// Reconstruct an affine point from big-endian coordinates.
///
/// Returns None when the coordinates do not name a point on the curve.
pub fn point_from_coordinates(x: &[u8; 32], y: &[u8; 32]) -> Option<AffinePoint> {
    let encoded = EncodedPoint::from_affine_coordinates(
        FieldBytes::from_slice(x),
        FieldBytes::from_slice(y),
        false,
    );
    Option::from(AffinePoint::from_encoded_point(&encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ProjectivePoint;

    /// Curve order N, for range boundary tests
    const ORDER_HEX: &str = "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";

    #[test]
    fn test_parse_accepts_short_hex() {
        let five = parse_scalar_hex("5").unwrap();
        assert_eq!(five, scalar_from_u64(5));
    }

    #[test]
    fn test_parse_rejects_order() {
        assert!(parse_scalar_hex(ORDER_HEX).is_err());
    }

    #[test]
    fn test_parse_accepts_order_minus_one() {
        let n_minus_1 =
            "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140";
        let s = parse_scalar_hex(n_minus_1).unwrap();
        assert_eq!(scalar_to_hex(&s), n_minus_1);
    }

    #[test]
    fn test_scalar_cmp_is_integer_order() {
        let a = scalar_from_u64(7);
        let b = scalar_from_u128(1u128 << 90);
        assert_eq!(scalar_cmp(&a, &b), Ordering::Less);
        assert_eq!(scalar_cmp(&b, &a), Ordering::Greater);
        assert_eq!(scalar_cmp(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_coordinate_round_trip() {
        let p = (ProjectivePoint::GENERATOR * scalar_from_u64(26)).to_affine();
        let (x, y) = affine_coordinates(&p);
        let q = point_from_coordinates(&x, &y).unwrap();
        assert_eq!(p, q);
    }

    #[test]
    fn test_point_from_bogus_coordinates() {
        let x = [1u8; 32];
        let y = [2u8; 32];
        assert!(point_from_coordinates(&x, &y).is_none());
    }
}
