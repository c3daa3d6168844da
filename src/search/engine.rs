//! Step/iterate engine and result reconciliation
//!
//! One `step()` advances the whole lane population by the shared incrementor
//! on the device, drains the raw hit queue, and turns every surviving hit
//! into an independently verified `SearchResult`. The device's report is a
//! hint; the private key, public point and digest are re-derived on the host
//! before anything is accepted.

use k256::{AffinePoint, ProjectivePoint, Scalar};
use log::{info, warn};
use std::cmp::Ordering;

use crate::device::KernelBackend;
use crate::error::{Result, SearchError};
use crate::hash::hash_public_key;
use crate::math::{point_from_coordinates, scalar_cmp, scalar_from_u128, scalar_is_zero, scalar_to_hex};
use crate::search::{generator, LaneGeometry};
use crate::targets::TargetSet;
use crate::types::{Compression, Hash160, RawHit, SearchResult};

/// Verify a candidate key against its expected fingerprint.
///
/// Pure: recomputes `private_key * G`, rejects on point mismatch, then
/// compares the digest of the requested encoding byte-for-byte.
pub fn verify_key(
    private_key: &Scalar,
    public_key: &AffinePoint,
    expected_digest: &Hash160,
    compressed: bool,
) -> bool {
    let derived = (ProjectivePoint::GENERATOR * private_key).to_affine();
    if &derived != public_key {
        return false;
    }
    hash_public_key(&derived, compressed) == *expected_digest
}

/// Search orchestrator owning one device backend and one lane population
pub struct KeySearchEngine<B: KernelBackend> {
    backend: B,
    geometry: LaneGeometry,
    start_exponent: Scalar,
    stride: Scalar,
    compression: Compression,
    iterations: u64,
    targets: TargetSet,
    results: Vec<SearchResult>,
}

impl<B: KernelBackend> KeySearchEngine<B> {
    pub fn new(
        backend: B,
        geometry: LaneGeometry,
        start_exponent: Scalar,
        stride: Scalar,
        compression: Compression,
        targets: TargetSet,
    ) -> Result<Self> {
        if scalar_is_zero(&stride) {
            return Err(SearchError::config("stride must be nonzero"));
        }
        if targets.is_empty() {
            return Err(SearchError::config("target set is empty"));
        }
        Ok(KeySearchEngine {
            backend,
            geometry,
            start_exponent,
            stride,
            compression,
            iterations: 0,
            targets,
            results: Vec::new(),
        })
    }

    /// Stage the lane population and device state. Must be called once
    /// before the first `step()`.
    pub fn init(&mut self) -> Result<()> {
        generator::generate_starting_points(
            &mut self.backend,
            &self.geometry,
            &self.start_exponent,
            &self.stride,
        )?;

        let advance = scalar_from_u128(self.geometry.total_lanes() as u128) * self.stride;
        let incrementor = (ProjectivePoint::GENERATOR * advance).to_affine();
        self.backend.set_incrementor(incrementor)?;
        self.backend.set_targets(&self.targets.snapshot())?;
        Ok(())
    }

    /// Advance every lane by one iteration and reconcile any hits.
    /// Increments the iteration count by exactly one on success.
    pub fn step(&mut self) -> Result<()> {
        let early = self.iterations < 2 && self.start_within_first_batch();
        self.backend.step(early, self.compression)?;
        self.reconcile()?;
        self.iterations += 1;
        Ok(())
    }

    /// Zero-offset boundary hint for the kernel: true while the starting
    /// exponent still falls inside the first batch of lanes
    fn start_within_first_batch(&self) -> bool {
        let total = scalar_from_u128(self.geometry.total_lanes() as u128);
        scalar_cmp(&self.start_exponent, &total) != Ordering::Greater
    }

    /// Drain the device queue and retire verified matches.
    ///
    /// Uses the pre-increment iteration count: the kernel hashes the current
    /// points before advancing them, so a hit in iteration i names exponent
    /// start + (total_lanes * i + L) * stride.
    fn reconcile(&mut self) -> Result<()> {
        let hits = self.backend.drain_hits()?;
        if hits.is_empty() {
            return Ok(());
        }

        let mut retired = false;
        for hit in hits {
            if let Some(result) = self.confirm_hit(&hit) {
                info!(
                    "Found key {} ({}) for {}",
                    result.private_key_hex(),
                    if result.compressed { "compressed" } else { "uncompressed" },
                    result.digest
                );
                self.targets.remove(&result.digest);
                self.results.push(result);
                retired = true;
            }
        }

        if retired {
            // commit the shrunk view before the next step can read it
            self.backend.set_targets(&self.targets.snapshot())?;
        }
        Ok(())
    }

    /// Map a raw hit to a verified result, or None when it must be dropped
    /// (already-retired digest, malformed point, failed re-derivation).
    fn confirm_hit(&self, hit: &RawHit) -> Option<SearchResult> {
        if !self.targets.contains(&hit.digest) {
            // retired earlier in this same batch; never report twice
            return None;
        }

        let lane = self.geometry.lane_index(hit.block, hit.thread, hit.idx);
        let offset_index =
            self.geometry.total_lanes() as u128 * self.iterations as u128 + lane as u128;
        let offset = scalar_from_u128(offset_index) * self.stride;
        let private_key = self.start_exponent + offset;

        let Some(public_key) = point_from_coordinates(&hit.x, &hit.y) else {
            warn!(
                "Dropping hit for {}: reported coordinates are not on the curve",
                hit.digest
            );
            return None;
        };
        if !verify_key(&private_key, &public_key, &hit.digest, hit.compressed) {
            warn!(
                "Dropping hit for {}: key {} failed re-derivation (lane {}, iteration {})",
                hit.digest,
                scalar_to_hex(&private_key),
                lane,
                self.iterations
            );
            return None;
        }

        Some(SearchResult {
            private_key,
            public_key,
            compressed: hit.compressed,
            digest: hit.digest,
        })
    }

    /// Move accumulated verified results out of the engine
    pub fn drain_results(&mut self) -> Vec<SearchResult> {
        std::mem::take(&mut self.results)
    }

    /// The scalar lane 0 would receive in the next, not-yet-performed
    /// iteration; exposed for external checkpointing or work partitioning
    pub fn next_unexplored_exponent(&self) -> Scalar {
        let advanced = self.geometry.total_lanes() as u128 * self.iterations as u128;
        self.start_exponent + scalar_from_u128(advanced) * self.stride
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn geometry(&self) -> &LaneGeometry {
        &self.geometry
    }

    pub fn remaining_targets(&self) -> usize {
        self.targets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::scalar_from_u64;

    #[test]
    fn test_verify_key_round_trip() {
        let private_key = scalar_from_u64(26);
        let public_key = (ProjectivePoint::GENERATOR * private_key).to_affine();
        let digest = hash_public_key(&public_key, true);
        assert!(verify_key(&private_key, &public_key, &digest, true));
    }

    #[test]
    fn test_verify_key_rejects_wrong_point() {
        let private_key = scalar_from_u64(26);
        let other = (ProjectivePoint::GENERATOR * scalar_from_u64(27)).to_affine();
        let digest = hash_public_key(&other, true);
        assert!(!verify_key(&private_key, &other, &digest, true));
    }

    #[test]
    fn test_verify_key_rejects_wrong_compression() {
        let private_key = scalar_from_u64(26);
        let public_key = (ProjectivePoint::GENERATOR * private_key).to_affine();
        let digest = hash_public_key(&public_key, true);
        assert!(!verify_key(&private_key, &public_key, &digest, false));
    }
}
