//! # llightmap
//!
//! CPU static lightmap baker. Scene meshes are flattened into world space
//! triangles, indexed by a voxel grid and rasterized into a UV2 texel
//! atlas. Lighting passes then trace rays per texel (or from each light
//! through a ray bank) and the results are merged into float images.
//!
//! ## Modules
//!
//! - [`util`] - Errors, glam re-exports, bounding boxes and planes
//! - [`geom`] - Triangles, UV triangles and rays
//! - [`trace`] - Packed four-wide triangle tests and the voxel tracer
//! - [`texel`] - Per-texel images and colors
//! - [`scene`] - Scene description input, materials, rasterization
//! - [`bake`] - Settings, lighting passes and [`LightMapper`]
//! - [`post`] - Dilation, seam stitching, noise reduction
//! - [`export`] - Image files and the texel cache (feature `io`)
//!
//! ## Example
//!
//! ```ignore
//! use llightmap::{BakeSettings, LightMapper, NullProgress, SceneDesc};
//!
//! let scene = SceneDesc::load("room.json".as_ref())?;
//! let mut mapper = LightMapper::new(BakeSettings::default());
//! let out = mapper.bake(&scene, &mut NullProgress)?;
//! llightmap::export::save_color_image("room.png".as_ref(), &out.combined)?;
//! ```

pub mod util;
pub mod geom;
pub mod trace;
pub mod texel;
pub mod scene;
pub mod bake;
pub mod post;

#[cfg(feature = "io")]
pub mod export;

// Re-export commonly used types
pub use bake::{BakeMode, BakeOutput, BakeProgress, BakeSettings, CancellationToken, LightMapper, LogProgress, NullProgress, Quality};
pub use scene::SceneDesc;
pub use texel::{FColor, LightImage};
pub use util::{Error, Result};

/// Crate version and the ray tracing lane backend it was built with.
pub fn version_string() -> String {
    format!("llightmap {} ({} tracing)", env!("CARGO_PKG_VERSION"), simd4::BACKEND)
}
