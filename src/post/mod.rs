//! Image post processing applied after baking.

mod convolution;
mod denoise;
mod dilate;
mod stitch;

pub use convolution::*;
pub use denoise::*;
pub use dilate::*;
pub use stitch::*;
