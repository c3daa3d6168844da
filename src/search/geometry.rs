//! Lane geometry derivation and the lane index bijection
//!
//! A lane is one parallel search slot, identified on the device by
//! (block, thread, per-thread index). Generation and reconciliation must
//! agree on the same flattening, so both go through this module.

use crate::error::{Result, SearchError};
use crate::types::DeviceCapability;

/// Device warp width; thread budgets must be a multiple of this
pub const WARP_WIDTH: u32 = 32;

/// Fixed lane population layout, immutable for the lifetime of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneGeometry {
    pub block_count: u32,
    pub threads_per_block: u32,
    pub points_per_thread: u32,
}

impl LaneGeometry {
    /// Derive block/thread layout from a requested total thread budget.
    ///
    /// Auto mode (`blocks == 0`): the budget must divide evenly by the
    /// device's multiprocessor count; the initial `threads / mp_count` per
    /// block is halved (and the block count doubled) until it fits the
    /// hardware per-block limit. Explicit mode uses the caller's values
    /// unchanged.
    pub fn derive(
        threads: u32,
        points_per_thread: u32,
        blocks: u32,
        capability: &DeviceCapability,
    ) -> Result<Self> {
        if threads == 0 || threads % WARP_WIDTH != 0 {
            return Err(SearchError::config(format!(
                "thread count must be a positive multiple of {}, got {}",
                WARP_WIDTH, threads
            )));
        }
        if points_per_thread == 0 {
            return Err(SearchError::config("at least 1 point per thread required"));
        }

        let (block_count, threads_per_block) = if blocks == 0 {
            if capability.mp_count == 0 {
                return Err(SearchError::device("device reported zero multiprocessors"));
            }
            if threads % capability.mp_count != 0 {
                return Err(SearchError::config(format!(
                    "thread count must be a multiple of the multiprocessor count ({})",
                    capability.mp_count
                )));
            }
            let mut threads_per_block = threads / capability.mp_count;
            let mut block_count = capability.mp_count;
            while threads_per_block > capability.max_threads_per_block {
                threads_per_block /= 2;
                block_count *= 2;
            }
            (block_count, threads_per_block)
        } else {
            // Caller's responsibility to respect hardware limits here
            (blocks, threads)
        };

        Ok(LaneGeometry {
            block_count,
            threads_per_block,
            points_per_thread,
        })
    }

    /// Total device threads
    pub fn total_threads(&self) -> u64 {
        self.block_count as u64 * self.threads_per_block as u64
    }

    /// Total lanes = blocks * threads * points per thread, fixed for the
    /// lifetime of the search
    pub fn total_lanes(&self) -> u64 {
        self.total_threads() * self.points_per_thread as u64
    }

    /// Flatten device coordinates into the global lane index.
    ///
    /// L = idx * (blocks * threads) + block * threads + thread. This is the
    /// exact inverse of `lane_coordinates`; the starting-point generator
    /// assigns exponent `start + L * stride` to the lane this names.
    pub fn lane_index(&self, block: u32, thread: u32, idx: u32) -> u64 {
        idx as u64 * self.total_threads()
            + block as u64 * self.threads_per_block as u64
            + thread as u64
    }

    /// Inverse of `lane_index`
    pub fn lane_coordinates(&self, lane: u64) -> (u32, u32, u32) {
        let threads = self.total_threads();
        let idx = (lane / threads) as u32;
        let within = lane % threads;
        let block = (within / self.threads_per_block as u64) as u32;
        let thread = (within % self.threads_per_block as u64) as u32;
        (block, thread, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability(mp_count: u32) -> DeviceCapability {
        DeviceCapability {
            name: "test".to_string(),
            mp_count,
            max_threads_per_block: 1024,
        }
    }

    #[test]
    fn test_auto_partition() {
        let geom = LaneGeometry::derive(1280, 4, 0, &capability(20)).unwrap();
        assert_eq!(geom.block_count, 20);
        assert_eq!(geom.threads_per_block, 64);
        assert_eq!(geom.total_lanes(), 1280 * 4);
    }

    #[test]
    fn test_auto_partition_halves_oversized_blocks() {
        // 65536 / 16 = 4096 per block, halved twice to 1024
        let geom = LaneGeometry::derive(65536, 1, 0, &capability(16)).unwrap();
        assert_eq!(geom.threads_per_block, 1024);
        assert_eq!(geom.block_count, 64);
        assert_eq!(geom.total_threads(), 65536);
    }

    #[test]
    fn test_auto_partition_requires_mp_divisibility() {
        assert!(LaneGeometry::derive(256, 1, 0, &capability(20)).is_err());
    }

    #[test]
    fn test_rejects_non_warp_multiple() {
        assert!(LaneGeometry::derive(33, 1, 0, &capability(4)).is_err());
        assert!(LaneGeometry::derive(0, 1, 0, &capability(4)).is_err());
    }

    #[test]
    fn test_rejects_zero_points_per_thread() {
        assert!(LaneGeometry::derive(128, 0, 0, &capability(4)).is_err());
    }

    #[test]
    fn test_explicit_blocks_used_unchanged() {
        let geom = LaneGeometry::derive(96, 2, 7, &capability(20)).unwrap();
        assert_eq!(geom.block_count, 7);
        assert_eq!(geom.threads_per_block, 96);
    }

    #[test]
    fn test_lane_index_bijection() {
        let geom = LaneGeometry {
            block_count: 4,
            threads_per_block: 32,
            points_per_thread: 8,
        };
        for lane in 0..geom.total_lanes() {
            let (block, thread, idx) = geom.lane_coordinates(lane);
            assert!(block < geom.block_count);
            assert!(thread < geom.threads_per_block);
            assert!(idx < geom.points_per_thread);
            assert_eq!(geom.lane_index(block, thread, idx), lane);
        }
    }
}
