//! Utility types and functions shared by the baker.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - Math type re-exports from glam, [`Aabb`], [`Plane`] and small helpers

mod error;
mod math;

pub use error::*;
pub use math::*;
