//! Image file output and input.
//!
//! `.exr` files keep full float precision. Everything else is written as
//! 8-bit PNG, clamped to `[0, 1]`; callers apply gamma beforehand.

use std::path::Path;

use half::f16;
use image::{DynamicImage, ImageReader, Rgb32FImage, RgbImage};

use crate::texel::{FColor, LightImage};
use crate::util::{Error, Result};

/// True when `path` asks for float output.
pub fn is_float_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("exr"))
}

/// Write a color image as EXR or PNG depending on the extension.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn save_color_image(path: &Path, image: &LightImage<FColor>) -> Result<()> {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 {
        return Err(Error::invalid("cannot save an empty image"));
    }
    if is_float_path(path) {
        let raw: Vec<f32> = bytemuck::cast_slice(image.pixels()).to_vec();
        let buf = Rgb32FImage::from_raw(w, h, raw).ok_or_else(|| Error::other("image buffer size mismatch"))?;
        DynamicImage::ImageRgb32F(buf).save(path)?;
    } else {
        let raw: Vec<u8> = image
            .pixels()
            .iter()
            .flat_map(|c| [to_u8(c.r), to_u8(c.g), to_u8(c.b)])
            .collect();
        let buf = RgbImage::from_raw(w, h, raw).ok_or_else(|| Error::other("image buffer size mismatch"))?;
        buf.save(path)?;
    }
    tracing::debug!(width = w, height = h, "saved image");
    Ok(())
}

/// Write a single channel image (AO) as grey.
pub fn save_scalar_image(path: &Path, image: &LightImage<f32>) -> Result<()> {
    save_color_image(path, &image.map(FColor::splat))
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// RGBA half floats with alpha 1, the layout GPU lightmap textures use.
pub fn pack_rgba_half(image: &LightImage<FColor>) -> Vec<f16> {
    image
        .pixels()
        .iter()
        .flat_map(|c| [f16::from_f32(c.r), f16::from_f32(c.g), f16::from_f32(c.b), f16::ONE])
        .collect()
}

/// Read any supported image (HDR, EXR, PNG) as linear float RGB.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_color_image(path: &Path) -> Result<LightImage<FColor>> {
    let img = ImageReader::open(path)?.decode()?;
    let rgba = img.to_rgba32f();
    let (w, h) = rgba.dimensions();
    let pixels = rgba
        .as_raw()
        .chunks_exact(4)
        .map(|px| FColor::new(px[0], px[1], px[2]))
        .collect();
    LightImage::from_vec(w, h, pixels).ok_or_else(|| Error::other("decoded image size mismatch"))
}
