//! Starting-point generation
//!
//! Expands one (start, stride) pair into a distinct scalar per lane, stages
//! the sequence on the device and drives the 256 batched refinement passes
//! that turn scalars into resident public-key points. The private scalars
//! are discarded from device memory as soon as the points exist.

use k256::Scalar;
use log::info;

use crate::device::KernelBackend;
use crate::error::Result;
use crate::search::LaneGeometry;

/// Device memory per lane point: 32-byte x, 8-byte compressed marker
const BYTES_PER_LANE: u64 = 40;

/// Refinement passes the device staging routine performs, one per scalar bit
const REFINE_PASSES: u32 = 256;

/// Generate `total_lanes` starting points on the device.
///
/// All-or-nothing: any staging failure propagates and the lane population
/// must be considered unusable.
pub fn generate_starting_points<B: KernelBackend + ?Sized>(
    backend: &mut B,
    geometry: &LaneGeometry,
    start: &Scalar,
    stride: &Scalar,
) -> Result<()> {
    let total = geometry.total_lanes();
    info!(
        "Generating {} starting points ({:.1} MB)",
        format_thousands(total),
        (total * BYTES_PER_LANE) as f64 / (1024.0 * 1024.0)
    );

    let mut exponents = Vec::with_capacity(total as usize);
    let mut key = *start;
    exponents.push(key);
    for _ in 1..total {
        key += stride;
        exponents.push(key);
    }

    backend.stage_exponents(geometry, exponents)?;

    let mut pct = 10.0;
    for pass in 1..=REFINE_PASSES {
        backend.refine_points()?;
        if (pass as f64 / REFINE_PASSES as f64) * 100.0 >= pct {
            info!("{:.1}%", pct);
            pct += 10.0;
        }
    }
    info!("Done");

    backend.clear_exponents()
}

/// 1234567 -> "1,234,567"
fn format_thousands(v: u64) -> String {
    let digits = v.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
