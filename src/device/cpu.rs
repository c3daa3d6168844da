//! CPU reference backend
//!
//! Honest software implementation of the kernel contract, used by the test
//! suite and as the fallback when no accelerator is available. Lane points
//! are built with the same 256-pass bit-by-bit construction the device
//! staging routine performs, and each step hashes then advances every lane.

use k256::{AffinePoint, ProjectivePoint, Scalar};
use rayon::prelude::*;
use std::collections::HashSet;

use crate::error::{Result, SearchError};
use crate::hash::hash_public_key;
use crate::search::LaneGeometry;
use crate::types::{Compression, DeviceCapability, Hash160, RawHit};

use super::{KernelBackend, RESULT_QUEUE_CAPACITY};

pub struct CpuBackend {
    capability: DeviceCapability,
    geometry: Option<LaneGeometry>,
    /// Big-endian exponent bytes, one per lane, discarded by clear_exponents
    exponent_bytes: Vec<[u8; 32]>,
    points: Vec<ProjectivePoint>,
    /// 2^pass * G, doubled after each refinement pass
    refine_base: ProjectivePoint,
    refine_pass: u32,
    incrementor: Option<ProjectivePoint>,
    targets: HashSet<Hash160>,
    queue: Vec<RawHit>,
}

impl CpuBackend {
    pub fn new() -> Self {
        let mp_count = rayon::current_num_threads().max(1) as u32;
        Self::with_capability(DeviceCapability {
            name: format!("CPU ({} threads)", mp_count),
            mp_count,
            max_threads_per_block: 1024,
        })
    }

    /// Backend with a caller-chosen capability, used by tests that need a
    /// specific multiprocessor count
    pub fn with_capability(capability: DeviceCapability) -> Self {
        CpuBackend {
            capability,
            geometry: None,
            exponent_bytes: Vec::new(),
            points: Vec::new(),
            refine_base: ProjectivePoint::GENERATOR,
            refine_pass: 0,
            incrementor: None,
            targets: HashSet::new(),
            queue: Vec::new(),
        }
    }

    fn geometry(&self) -> Result<LaneGeometry> {
        self.geometry
            .ok_or_else(|| SearchError::device("no staged lane population"))
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Bit `bit` of a big-endian 256-bit value, 0 = least significant
fn scalar_bit(bytes: &[u8; 32], bit: u32) -> bool {
    let byte = bytes[31 - (bit / 8) as usize];
    (byte >> (bit % 8)) & 1 == 1
}

impl KernelBackend for CpuBackend {
    fn capability(&self) -> Result<DeviceCapability> {
        Ok(self.capability.clone())
    }

    fn stage_exponents(&mut self, geometry: &LaneGeometry, exponents: Vec<Scalar>) -> Result<()> {
        let total = geometry.total_lanes();
        if exponents.len() as u64 != total {
            return Err(SearchError::device(format!(
                "staged {} exponents for {} lanes",
                exponents.len(),
                total
            )));
        }
        self.geometry = Some(*geometry);
        self.exponent_bytes = exponents.iter().map(|e| e.to_bytes().into()).collect();
        self.points = vec![ProjectivePoint::IDENTITY; exponents.len()];
        self.refine_base = ProjectivePoint::GENERATOR;
        self.refine_pass = 0;
        Ok(())
    }

    fn refine_points(&mut self) -> Result<()> {
        if self.exponent_bytes.is_empty() {
            return Err(SearchError::device("no staged exponents to refine"));
        }
        if self.refine_pass >= 256 {
            // nothing left to fold in
            return Ok(());
        }
        let bit = self.refine_pass;
        let base = self.refine_base;
        self.points
            .par_iter_mut()
            .zip(self.exponent_bytes.par_iter())
            .for_each(|(point, exponent)| {
                if scalar_bit(exponent, bit) {
                    *point += base;
                }
            });
        self.refine_base = self.refine_base.double();
        self.refine_pass += 1;
        Ok(())
    }

    fn clear_exponents(&mut self) -> Result<()> {
        self.exponent_bytes.clear();
        Ok(())
    }

    fn set_incrementor(&mut self, point: AffinePoint) -> Result<()> {
        self.incrementor = Some(ProjectivePoint::from(point));
        Ok(())
    }

    fn set_targets(&mut self, digests: &[Hash160]) -> Result<()> {
        self.targets = digests.iter().copied().collect();
        Ok(())
    }

    fn step(&mut self, _early: bool, compression: Compression) -> Result<()> {
        // The early hint exists for point-stepping constructions that must
        // special-case the zero-offset lane; projective addition has no such
        // degenerate case, so this backend only skips hashing the identity.
        let geometry = self.geometry()?;
        let incrementor = self
            .incrementor
            .ok_or_else(|| SearchError::device("incrementor point not set"))?;
        let targets = &self.targets;

        let hits: Vec<RawHit> = self
            .points
            .par_iter_mut()
            .enumerate()
            .map(|(lane, point)| {
                let mut lane_hits = Vec::new();
                if *point != ProjectivePoint::IDENTITY && !targets.is_empty() {
                    let affine = point.to_affine();
                    let (block, thread, idx) = geometry.lane_coordinates(lane as u64);
                    let mut check = |compressed: bool| {
                        let digest = hash_public_key(&affine, compressed);
                        if targets.contains(&digest) {
                            let (x, y) = crate::math::affine_coordinates(&affine);
                            lane_hits.push(RawHit {
                                block,
                                thread,
                                idx,
                                digest,
                                x,
                                y,
                                compressed,
                            });
                        }
                    };
                    if compression.covers_compressed() {
                        check(true);
                    }
                    if compression.covers_uncompressed() {
                        check(false);
                    }
                }
                *point += incrementor;
                lane_hits
            })
            .flatten()
            .collect();

        if self.queue.len() + hits.len() > RESULT_QUEUE_CAPACITY {
            return Err(SearchError::device(format!(
                "result queue overflow: {} hits exceed capacity {}",
                self.queue.len() + hits.len(),
                RESULT_QUEUE_CAPACITY
            )));
        }
        self.queue.extend(hits);
        Ok(())
    }

    fn drain_hits(&mut self) -> Result<Vec<RawHit>> {
        Ok(std::mem::take(&mut self.queue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::scalar_from_u64;

    fn staged_backend(exponents: Vec<Scalar>, geometry: LaneGeometry) -> CpuBackend {
        let mut backend = CpuBackend::new();
        backend.stage_exponents(&geometry, exponents).unwrap();
        for _ in 0..256 {
            backend.refine_points().unwrap();
        }
        backend.clear_exponents().unwrap();
        backend
    }

    fn tiny_geometry() -> LaneGeometry {
        LaneGeometry {
            block_count: 1,
            threads_per_block: 32,
            points_per_thread: 1,
        }
    }

    #[test]
    fn test_refinement_builds_exponent_points() {
        let exponents: Vec<Scalar> = (1..=32).map(scalar_from_u64).collect();
        let backend = staged_backend(exponents, tiny_geometry());
        for (i, point) in backend.points.iter().enumerate() {
            let expected = ProjectivePoint::GENERATOR * scalar_from_u64(i as u64 + 1);
            assert_eq!(*point, expected, "lane {}", i);
        }
    }

    #[test]
    fn test_zero_exponent_lane_stays_identity() {
        let mut exponents: Vec<Scalar> = (0..32).map(scalar_from_u64).collect();
        exponents[0] = Scalar::ZERO;
        let backend = staged_backend(exponents, tiny_geometry());
        assert_eq!(backend.points[0], ProjectivePoint::IDENTITY);
    }

    #[test]
    fn test_stage_rejects_wrong_lane_count() {
        let mut backend = CpuBackend::new();
        let result = backend.stage_exponents(&tiny_geometry(), vec![Scalar::ONE; 3]);
        assert!(result.is_err());
    }

    #[test]
    fn test_step_matches_and_advances() {
        let exponents: Vec<Scalar> = (1..=32).map(scalar_from_u64).collect();
        let mut backend = staged_backend(exponents, tiny_geometry());
        backend
            .set_incrementor((ProjectivePoint::GENERATOR * scalar_from_u64(32)).to_affine())
            .unwrap();
        // target: compressed digest of key 7 (lane 6)
        let target = hash_public_key(
            &(ProjectivePoint::GENERATOR * scalar_from_u64(7)).to_affine(),
            true,
        );
        backend.set_targets(&[target]).unwrap();

        backend.step(true, Compression::Compressed).unwrap();
        let hits = backend.drain_hits().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].thread, 6);
        assert_eq!(hits[0].digest, target);
        assert!(hits[0].compressed);

        // lane 6 advanced to 7 + 32 = 39
        let expected = ProjectivePoint::GENERATOR * scalar_from_u64(39);
        assert_eq!(backend.points[6], expected);

        // queue was cleared by the drain
        assert!(backend.drain_hits().unwrap().is_empty());
    }

    #[test]
    fn test_step_errors_on_queue_overflow() {
        // 32 lanes sharing one exponent all hit the same digest at once
        let exponents = vec![scalar_from_u64(5); 32];
        let mut backend = staged_backend(exponents, tiny_geometry());
        backend
            .set_incrementor((ProjectivePoint::GENERATOR * scalar_from_u64(32)).to_affine())
            .unwrap();
        let target = hash_public_key(
            &(ProjectivePoint::GENERATOR * scalar_from_u64(5)).to_affine(),
            true,
        );
        backend.set_targets(&[target]).unwrap();

        let result = backend.step(true, Compression::Compressed);
        assert!(matches!(result, Err(SearchError::Device(_))));
    }
}
