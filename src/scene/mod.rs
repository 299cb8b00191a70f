//! Scene flattening, materials and UV rasterization.

mod input;
mod light_scene;
mod materials;
mod raster;

pub use input::*;
pub use light_scene::*;
pub use materials::*;
pub use raster::*;
