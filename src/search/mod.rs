//! Search orchestration
//!
//! Lane geometry, starting-point generation and the step/reconcile engine.

pub mod engine;
pub mod generator;
pub mod geometry;


pub use engine::{verify_key, KeySearchEngine};
pub use geometry::LaneGeometry;
