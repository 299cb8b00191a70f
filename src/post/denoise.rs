//! Hook for an external denoiser.

use crate::texel::{FColor, LightImage};
use crate::util::Result;

/// Denoises a packed RGB float buffer in place.
///
/// `rgb` holds `width * height` texels, three floats each, row major.
pub trait Denoiser: Send {
    fn denoise(&mut self, rgb: &mut [f32], width: u32, height: u32) -> Result<()>;
}

/// Run `denoiser` over a lightmap without copying it.
pub fn denoise_image(denoiser: &mut dyn Denoiser, image: &mut LightImage<FColor>) -> Result<()> {
    let (w, h) = (image.width(), image.height());
    let rgb: &mut [f32] = bytemuck::cast_slice_mut(image.pixels_mut());
    denoiser.denoise(rgb, w, h)
}
