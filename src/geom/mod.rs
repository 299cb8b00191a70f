//! Geometry kernel: triangles, UV triangles and rays.
//!
//! Triangle IDs are indices into the scene's flat triangle arrays; every
//! per-triangle array ([`Tri`], [`UvTri`], normals, planes) shares them.

mod ray;
mod tri;

pub use ray::*;
pub use tri::*;
