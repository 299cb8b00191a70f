//! File output: lightmap images, half float packing and the texel cache.

mod cache;
mod imagefile;

pub use cache::*;
pub use imagefile::*;
