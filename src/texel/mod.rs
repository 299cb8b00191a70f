//! Texel storage: colors, images, bit images.

mod bitimage;
mod color;
mod image;

pub use bitimage::*;
pub use color::*;
pub use image::*;
