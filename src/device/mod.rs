//! Device backend abstraction
//!
//! The kernel that advances lane points and matches digests each iteration
//! is an external collaborator. `KernelBackend` is the fixed call contract
//! around it: staging, the shared incrementor, the device-resident target
//! structure and the bounded result queue. The orchestration layer in
//! `search` never touches device memory directly.

pub mod cpu;
#[cfg(feature = "cuda")]
pub mod cuda;

use std::path::Path;

use k256::{AffinePoint, Scalar};
use log::warn;

use crate::error::Result;
use crate::search::LaneGeometry;
use crate::types::{Compression, DeviceCapability, Hash160, RawHit};

/// Bounded device result queue capacity. More hits than this inside a
/// single step is reported as a device error, never silently dropped.
pub const RESULT_QUEUE_CAPACITY: usize = 16;

/// Fixed contract with the opaque per-lane kernel and its device state.
///
/// Call order: `stage_exponents`, 256 x `refine_points`, `clear_exponents`,
/// `set_incrementor`, `set_targets`, then repeated `step` + `drain_hits`.
/// All calls block until the dispatched device work completes.
pub trait KernelBackend: Send {
    /// Device capability used for lane geometry derivation
    fn capability(&self) -> Result<DeviceCapability>;

    /// Upload one private scalar per lane, in global lane order
    fn stage_exponents(&mut self, geometry: &LaneGeometry, exponents: Vec<Scalar>) -> Result<()>;

    /// One of the 256 batched point refinement passes that turn staged
    /// scalars into lane points
    fn refine_points(&mut self) -> Result<()>;

    /// Discard the staged private scalars; only derived points remain
    fn clear_exponents(&mut self) -> Result<()>;

    /// Install the shared per-iteration advance, (total_lanes * stride) * G
    fn set_incrementor(&mut self, point: AffinePoint) -> Result<()>;

    /// Full replacement of the device-resident target structure
    fn set_targets(&mut self, digests: &[Hash160]) -> Result<()>;

    /// Advance every lane by the incrementor and queue digest matches.
    /// `early` is a pass-through hint for the kernel's zero-offset boundary
    /// handling during the first iterations.
    fn step(&mut self, early: bool, compression: Compression) -> Result<()>;

    /// Bulk read-and-clear of the bounded result queue
    fn drain_hits(&mut self) -> Result<Vec<RawHit>>;
}

impl<B: KernelBackend + ?Sized> KernelBackend for Box<B> {
    fn capability(&self) -> Result<DeviceCapability> {
        (**self).capability()
    }
    fn stage_exponents(&mut self, geometry: &LaneGeometry, exponents: Vec<Scalar>) -> Result<()> {
        (**self).stage_exponents(geometry, exponents)
    }
    fn refine_points(&mut self) -> Result<()> {
        (**self).refine_points()
    }
    fn clear_exponents(&mut self) -> Result<()> {
        (**self).clear_exponents()
    }
    fn set_incrementor(&mut self, point: AffinePoint) -> Result<()> {
        (**self).set_incrementor(point)
    }
    fn set_targets(&mut self, digests: &[Hash160]) -> Result<()> {
        (**self).set_targets(digests)
    }
    fn step(&mut self, early: bool, compression: Compression) -> Result<()> {
        (**self).step(early, compression)
    }
    fn drain_hits(&mut self) -> Result<Vec<RawHit>> {
        (**self).drain_hits()
    }
}

/// Pick a backend: CUDA when compiled in and not overridden, else the CPU
/// reference implementation.
#[allow(unused_variables)]
pub fn create_backend(device_id: u32, kernel_ptx: &Path, force_cpu: bool) -> Result<Box<dyn KernelBackend>> {
    #[cfg(feature = "cuda")]
    if !force_cpu {
        match cuda::CudaBackend::new(device_id, kernel_ptx) {
            Ok(backend) => return Ok(Box::new(backend)),
            Err(e) => warn!("CUDA backend unavailable ({}), falling back to CPU", e),
        }
    }
    #[cfg(not(feature = "cuda"))]
    if !force_cpu {
        warn!("built without the cuda feature, using the CPU reference backend");
    }
    Ok(Box::new(cpu::CpuBackend::new()))
}
