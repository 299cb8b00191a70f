//! Ray tracing acceleration: packed four-wide triangle tests and the voxel grid.

mod packed;
mod tracer;
mod voxel;

pub use packed::*;
pub use tracer::*;
pub use voxel::*;
