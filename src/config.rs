//! Command line configuration
//!
//! Parsed once at startup and validated before any device work begins.
//! Keyspace parameters are kept as hex strings here and lifted to scalars
//! after validation.

use clap::Parser;
use std::path::PathBuf;

use crate::math::{parse_scalar_hex, scalar_is_zero};
use crate::error::{Result, SearchError};
use crate::types::Compression;
use k256::Scalar;

#[derive(Parser, Debug, Clone)]
#[command(name = "keystride", version, about = "Strided secp256k1 private key search")]
pub struct Config {
    /// Device to use
    #[arg(short = 'd', long, default_value_t = 0)]
    pub device: u32,

    /// Threads per block, must be a multiple of 32
    #[arg(short = 't', long, default_value_t = 1280)]
    pub threads: u32,

    /// Number of blocks, 0 derives one per streaming multiprocessor
    #[arg(short = 'b', long, default_value_t = 0)]
    pub blocks: u32,

    /// Points processed per thread
    #[arg(short = 'p', long = "per-thread", default_value_t = 256)]
    pub points_per_thread: u32,

    /// First private key exponent, big-endian hex
    #[arg(long = "keyspace-start", default_value = "1")]
    pub keyspace_start: String,

    /// Exponent stride between adjacent lanes, big-endian hex
    #[arg(long, default_value = "1")]
    pub stride: String,

    /// Public key encodings to search
    #[arg(short = 'c', long, value_enum, default_value_t = Compression::Compressed)]
    pub compression: Compression,

    /// File of target hash160 digests or P2PKH addresses, one per line
    #[arg(short = 'i', long = "in")]
    pub targets: PathBuf,

    /// File found keys are appended to
    #[arg(short = 'o', long = "out", default_value = "found_keys.txt")]
    pub out_file: PathBuf,

    /// Stop after this many iterations, 0 runs until all targets retire
    #[arg(long, default_value_t = 0)]
    pub max_iterations: u64,

    /// Compiled PTX module with the search kernels
    #[arg(long, default_value = "keystride.ptx")]
    pub kernel_ptx: PathBuf,

    /// Force the CPU reference backend
    #[arg(long)]
    pub cpu: bool,
}

impl Config {
    /// Reject parameter combinations the geometry derivation or the scalar
    /// field cannot represent.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 || self.threads % 32 != 0 {
            return Err(SearchError::config(format!(
                "threads must be a positive multiple of 32, got {}",
                self.threads
            )));
        }
        if self.points_per_thread == 0 {
            return Err(SearchError::config("points per thread must be at least 1"));
        }
        self.start_exponent()?;
        let stride = self.stride_scalar()?;
        if scalar_is_zero(&stride) {
            return Err(SearchError::config("stride must be nonzero"));
        }
        Ok(())
    }

    pub fn start_exponent(&self) -> Result<Scalar> {
        parse_scalar_hex(&self.keyspace_start)
            .map_err(|e| SearchError::config(format!("keyspace start: {}", e)))
    }

    pub fn stride_scalar(&self) -> Result<Scalar> {
        parse_scalar_hex(&self.stride).map_err(|e| SearchError::config(format!("stride: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config::parse_from(["keystride", "--in", "targets.txt"])
    }

    #[test]
    fn test_defaults_validate() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.threads, 1280);
        assert_eq!(config.blocks, 0);
        assert_eq!(config.points_per_thread, 256);
        assert_eq!(config.compression, Compression::Compressed);
    }

    #[test]
    fn test_rejects_non_warp_threads() {
        let mut config = base_config();
        config.threads = 33;
        assert!(config.validate().is_err());
        config.threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_points_per_thread() {
        let mut config = base_config();
        config.points_per_thread = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_start_at_curve_order() {
        let mut config = base_config();
        config.keyspace_start =
            "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141".to_string();
        assert!(config.validate().is_err());

        config.keyspace_start =
            "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_stride() {
        let mut config = base_config();
        config.stride = "0".to_string();
        assert!(config.validate().is_err());
    }
}
