//! keystride - massively parallel strided secp256k1 private key search
//!
//! Searches a strided slice of the secp256k1 exponent space for private keys
//! whose public key hash160 matches a target set. The lane population lives
//! on an accelerator behind the `KernelBackend` contract; the host owns
//! geometry derivation, starting-point generation, iteration accounting and
//! the independent verification of every reported match.
//!
//! Unsafe code is confined to the CUDA backend.

#![deny(unsafe_code)]

pub mod config;
pub mod device;
pub mod error;
pub mod hash;
pub mod math;
pub mod search;
pub mod targets;
pub mod types;

pub use config::Config;
pub use device::{create_backend, KernelBackend, RESULT_QUEUE_CAPACITY};
pub use error::{Result, SearchError};
pub use search::{verify_key, KeySearchEngine, LaneGeometry};
pub use targets::TargetSet;
pub use types::{Compression, DeviceCapability, Hash160, SearchResult};
