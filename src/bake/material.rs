//! Original material image: average surface albedo per texel.

use rayon::prelude::*;

use super::context::BakeContext;
use super::sampling::row_rng;
use crate::scene::TexelMaps;
use crate::texel::{FColor, LightImage};

const SALT_MATERIAL: u64 = 0x4d41_5452;

/// Albedo averaged over `kernel_size`² random points per texel. Texels no
/// point landed on stay white.
#[tracing::instrument(skip_all, fields(kernel_size))]
pub fn process_orig_material(ctx: &BakeContext<'_>, kernel_size: u32) -> LightImage<FColor> {
    let w = ctx.width() as usize;
    let mut image = LightImage::filled(ctx.width(), ctx.height(), FColor::WHITE);
    let samples = (kernel_size * kernel_size).max(1);

    image.pixels_mut().par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let y = y as u32;
        let mut rng = row_rng(ctx.seed, SALT_MATERIAL, y);
        for (x, out) in row.iter_mut().enumerate() {
            let x = x as u32;
            let list = ctx.maps.minilist(x, y);
            if list.is_empty() {
                continue;
            }
            let mut total = FColor::BLACK;
            let mut found = 0u32;
            for _ in 0..samples {
                let st = ctx.random_st(&mut rng, x, y);
                if let Some((tri, bary)) = TexelMaps::find_texel_triangle(ctx.scene, list, st) {
                    total += ctx.scene.take_triangle_color_sample(tri, bary).albedo_rgb();
                    found += 1;
                }
            }
            if found > 0 {
                *out = total / found as f32;
            }
        }
    });
    image
}
