//! secp256k1 scalar and point helpers
//!
//! Thin layer over k256: hex import/export, small-integer lifts and the
//! canonical byte-order comparisons the lane arithmetic needs.

pub mod secp;

pub use secp::{
    affine_coordinates, parse_scalar_hex, point_from_coordinates, scalar_cmp, scalar_from_u128,
    scalar_from_u64, scalar_is_zero, scalar_to_hex,
};
