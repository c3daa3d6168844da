//! CUDA backend
//!
//! rustacuda implementation of the kernel contract. The device context is
//! configured for blocking synchronization, so every dispatch below blocks
//! the calling thread until the work completes. The compiled PTX module is
//! loaded at runtime from the path in the configuration; its kernels own
//! the per-lane point math entirely.

#![allow(unsafe_code)] // kernel launches and raw device buffers

use std::ffi::CString;
use std::path::Path;

use k256::{AffinePoint, Scalar};
use rustacuda::context::{Context, ContextFlags};
use rustacuda::device::{Device, DeviceAttribute};
use rustacuda::launch;
use rustacuda::memory::{CopyDestination, DeviceBuffer, DeviceCopy};
use rustacuda::module::Module;
use rustacuda::stream::{Stream, StreamFlags};
use rustacuda::CudaFlags;

use crate::error::{Result, SearchError};
use crate::math::affine_coordinates;
use crate::search::LaneGeometry;
use crate::types::{Compression, DeviceCapability, Hash160, RawHit};

use super::{KernelBackend, RESULT_QUEUE_CAPACITY};

/// Result queue entry as the kernel writes it
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct DeviceHit {
    block: u32,
    thread: u32,
    idx: u32,
    compressed: u32,
    digest: [u8; 20],
    x: [u8; 32],
    y: [u8; 32],
}

unsafe impl DeviceCopy for DeviceHit {}

impl DeviceHit {
    fn zeroed() -> Self {
        DeviceHit {
            block: 0,
            thread: 0,
            idx: 0,
            compressed: 0,
            digest: [0; 20],
            x: [0; 32],
            y: [0; 32],
        }
    }
}

fn cuda_err(context: &str, e: impl std::fmt::Display) -> SearchError {
    SearchError::device(format!("{}: {}", context, e))
}

pub struct CudaBackend {
    // field order matters: buffers drop before the context
    dev_exponents: Option<DeviceBuffer<u8>>,
    dev_points: Option<DeviceBuffer<u8>>,
    dev_incrementor: Option<DeviceBuffer<u8>>,
    dev_targets: Option<DeviceBuffer<u8>>,
    dev_results: Option<DeviceBuffer<DeviceHit>>,
    dev_result_count: Option<DeviceBuffer<u32>>,
    target_count: u32,
    geometry: Option<LaneGeometry>,
    refine_pass: u32,
    module: Module,
    stream: Stream,
    capability: DeviceCapability,
    _context: Context,
}

impl CudaBackend {
    /// Select the device, create a blocking-sync context and load the
    /// search kernels from the given PTX module.
    pub fn new(device_id: u32, kernel_ptx: &Path) -> Result<Self> {
        rustacuda::init(CudaFlags::empty()).map_err(|e| cuda_err("CUDA init", e))?;

        let device = Device::get_device(device_id).map_err(|e| cuda_err("device query", e))?;
        let name = device.name().map_err(|e| cuda_err("device name query", e))?;
        let mp_count = device
            .get_attribute(DeviceAttribute::MultiprocessorCount)
            .map_err(|e| cuda_err("device attribute query", e))? as u32;
        let max_threads_per_block = device
            .get_attribute(DeviceAttribute::MaxThreadsPerBlock)
            .map_err(|e| cuda_err("device attribute query", e))? as u32;

        let context = Context::create_and_push(
            ContextFlags::SCHED_BLOCKING_SYNC | ContextFlags::MAP_HOST,
            device,
        )
        .map_err(|e| cuda_err("context creation", e))?;

        let ptx_path = CString::new(kernel_ptx.to_string_lossy().as_bytes())
            .map_err(|e| cuda_err("PTX path", e))?;
        let module =
            Module::load_from_file(&ptx_path).map_err(|e| cuda_err("PTX module load", e))?;
        let stream = Stream::new(StreamFlags::NON_BLOCKING, None)
            .map_err(|e| cuda_err("stream creation", e))?;

        let dev_results = DeviceBuffer::from_slice(&[DeviceHit::zeroed(); RESULT_QUEUE_CAPACITY])
            .map_err(|e| cuda_err("result queue allocation", e))?;
        let dev_result_count =
            DeviceBuffer::from_slice(&[0u32]).map_err(|e| cuda_err("result count allocation", e))?;

        Ok(CudaBackend {
            dev_exponents: None,
            dev_points: None,
            dev_incrementor: None,
            dev_targets: None,
            dev_results: Some(dev_results),
            dev_result_count: Some(dev_result_count),
            target_count: 0,
            geometry: None,
            refine_pass: 0,
            module,
            stream,
            capability: DeviceCapability {
                name,
                mp_count,
                max_threads_per_block,
            },
            _context: context,
        })
    }

    fn geometry(&self) -> Result<LaneGeometry> {
        self.geometry
            .ok_or_else(|| SearchError::device("no staged lane population"))
    }
}

impl KernelBackend for CudaBackend {
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

        let mut bytes = Vec::with_capacity(exponents.len() * 32);
        for exponent in &exponents {
            bytes.extend_from_slice(&exponent.to_bytes());
        }
        let dev_exponents =
            DeviceBuffer::from_slice(&bytes).map_err(|e| cuda_err("exponent upload", e))?;
        // 64 bytes per lane: x and y, zeroed = identity
        let dev_points = DeviceBuffer::from_slice(&vec![0u8; (total * 64) as usize])
            .map_err(|e| cuda_err("point buffer allocation", e))?;

        self.geometry = Some(*geometry);
        self.dev_exponents = Some(dev_exponents);
        self.dev_points = Some(dev_points);
        self.refine_pass = 0;
        Ok(())
    }

    fn refine_points(&mut self) -> Result<()> {
        let geometry = self.geometry()?;
        let exponents = self
            .dev_exponents
            .as_mut()
            .ok_or_else(|| SearchError::device("no staged exponents to refine"))?;
        let points = self
            .dev_points
            .as_mut()
            .ok_or_else(|| SearchError::device("point buffer missing"))?;
        if self.refine_pass >= 256 {
            return Ok(());
        }

        let module = &self.module;
        let stream = &self.stream;
        unsafe {
            launch!(module.refine_points<<<geometry.block_count, geometry.threads_per_block, 0, stream>>>(
                exponents.as_device_ptr(),
                points.as_device_ptr(),
                geometry.points_per_thread,
                self.refine_pass
            ))
            .map_err(|e| cuda_err("refine kernel launch", e))?;
        }
        self.stream
            .synchronize()
            .map_err(|e| cuda_err("refine synchronize", e))?;
        self.refine_pass += 1;
        Ok(())
    }

    fn clear_exponents(&mut self) -> Result<()> {
        // overwrite before freeing so no private scalar stays resident
        if let Some(exponents) = self.dev_exponents.as_mut() {
            let zeros = vec![0u8; exponents.len()];
            exponents
                .copy_from(&zeros)
                .map_err(|e| cuda_err("exponent scrub", e))?;
        }
        self.dev_exponents = None;
        Ok(())
    }

    fn set_incrementor(&mut self, point: AffinePoint) -> Result<()> {
        let (x, y) = affine_coordinates(&point);
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&x);
        bytes[32..].copy_from_slice(&y);
        self.dev_incrementor = Some(
            DeviceBuffer::from_slice(&bytes).map_err(|e| cuda_err("incrementor upload", e))?,
        );
        Ok(())
    }

    fn set_targets(&mut self, digests: &[Hash160]) -> Result<()> {
        let mut bytes = Vec::with_capacity(digests.len() * 20);
        for digest in digests {
            bytes.extend_from_slice(digest.as_bytes());
        }
        self.dev_targets =
            Some(DeviceBuffer::from_slice(&bytes).map_err(|e| cuda_err("target upload", e))?);
        self.target_count = digests.len() as u32;
        Ok(())
    }

    fn step(&mut self, early: bool, compression: Compression) -> Result<()> {
        let geometry = self.geometry()?;
        let points = self
            .dev_points
            .as_mut()
            .ok_or_else(|| SearchError::device("point buffer missing"))?;
        let incrementor = self
            .dev_incrementor
            .as_mut()
            .ok_or_else(|| SearchError::device("incrementor point not set"))?;
        let targets = self
            .dev_targets
            .as_mut()
            .ok_or_else(|| SearchError::device("target structure not set"))?;
        let results = self
            .dev_results
            .as_mut()
            .ok_or_else(|| SearchError::device("result queue missing"))?;
        let result_count = self
            .dev_result_count
            .as_mut()
            .ok_or_else(|| SearchError::device("result counter missing"))?;

        let mode: u32 = match compression {
            Compression::Compressed => 0,
            Compression::Uncompressed => 1,
            Compression::Both => 2,
        };

        let module = &self.module;
        let stream = &self.stream;
        unsafe {
            launch!(module.keysearch_step<<<geometry.block_count, geometry.threads_per_block, 0, stream>>>(
                points.as_device_ptr(),
                incrementor.as_device_ptr(),
                targets.as_device_ptr(),
                self.target_count,
                results.as_device_ptr(),
                result_count.as_device_ptr(),
                geometry.points_per_thread,
                early as u32,
                mode
            ))
            .map_err(|e| cuda_err("step kernel launch", e))?;
        }
        self.stream
            .synchronize()
            .map_err(|e| cuda_err("step synchronize", e))
    }

    fn drain_hits(&mut self) -> Result<Vec<RawHit>> {
        let results = self
            .dev_results
            .as_mut()
            .ok_or_else(|| SearchError::device("result queue missing"))?;
        let result_count = self
            .dev_result_count
            .as_mut()
            .ok_or_else(|| SearchError::device("result counter missing"))?;

        let mut count = [0u32];
        result_count
            .copy_to(&mut count)
            .map_err(|e| cuda_err("result count read", e))?;
        let count = count[0] as usize;
        if count == 0 {
            return Ok(Vec::new());
        }
        if count > RESULT_QUEUE_CAPACITY {
            return Err(SearchError::device(format!(
                "result queue overflow: {} hits exceed capacity {}",
                count, RESULT_QUEUE_CAPACITY
            )));
        }

        let mut entries = vec![DeviceHit::zeroed(); RESULT_QUEUE_CAPACITY];
        results
            .copy_to(&mut entries)
            .map_err(|e| cuda_err("result queue read", e))?;
        result_count
            .copy_from(&[0u32])
            .map_err(|e| cuda_err("result queue clear", e))?;

        Ok(entries[..count]
            .iter()
            .map(|hit| RawHit {
                block: hit.block,
                thread: hit.thread,
                idx: hit.idx,
                digest: Hash160(hit.digest),
                x: hit.x,
                y: hit.y,
                compressed: hit.compressed != 0,
            })
            .collect())
    }
}
