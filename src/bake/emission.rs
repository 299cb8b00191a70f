//! Emissive texels as point sources.
//!
//! Every texel covered by an emissive triangle is traced to every other
//! mapped texel in front of it. Cost is emitters times texels, which is
//! fine while emission stays sparse.

use rand::Rng;
use rayon::prelude::*;

use super::bounce::light_bounce;
use super::context::{step_progress, BakeContext, TexelData};
use super::progress::BakeProgress;
use super::sampling::{bounce_ray_with_smoothness, light_distance_falloff, row_rng};
use crate::geom::Ray;
use crate::texel::{FColor, LightImage, SharedImage};
use crate::util::{normalize_and_length, IVec2, Plane, Result};

/// Emitters below this summed RGB are skipped.
const MIN_LUMINOSITY: f32 = 0.01;

/// Bounce rays per unit of received power.
const BOUNCE_SAMPLES_PER_POWER: f32 = 16.0;

/// Progress steps over the emitter list.
const EMITTER_SECTIONS: usize = 16;

const SALT_EMISSION: u64 = 0x454d_4953;

/// Light cast by emitters, and the emitters' own glow.
#[derive(Debug, Clone)]
pub struct EmissionResult {
    pub emission: LightImage<FColor>,
    pub glow: LightImage<FColor>,
}

/// Run every emissive texel against the whole map.
#[tracing::instrument(skip_all, fields(emitters = ctx.maps.emission_pixels.len()))]
pub fn process_emission(ctx: &BakeContext<'_>, progress: &mut dyn BakeProgress) -> Result<EmissionResult> {
    let (w, h) = (ctx.width(), ctx.height());
    let emission = SharedImage::new(w, h);
    let mut glow = LightImage::new(w, h);

    let pixels = &ctx.maps.emission_pixels;
    let per_section = pixels.len().div_ceil(EMITTER_SECTIONS).max(1);
    let num_sections = pixels.len().div_ceil(per_section) as u32;

    for (i, chunk) in pixels.chunks(per_section).enumerate() {
        let first = i * per_section;
        let glows: Vec<(IVec2, FColor)> = chunk
            .par_iter()
            .enumerate()
            .filter_map(|(n, &p)| {
                let mut rng = row_rng(ctx.seed, SALT_EMISSION, (first + n) as u32);
                process_emission_pixel(ctx, &mut rng, &emission, p).map(|g| (p, g))
            })
            .collect();
        for (p, g) in glows {
            glow[(p.x as u32, p.y as u32)] = g;
        }
        step_progress(progress, "emission", i as u32 + 1, num_sections)?;
    }

    Ok(EmissionResult { emission: emission.into_image(), glow })
}

/// Light one emitter texel casts. Returns its glow.
fn process_emission_pixel<R: Rng + ?Sized>(
    ctx: &BakeContext<'_>,
    rng: &mut R,
    image: &SharedImage<FColor>,
    p: IVec2,
) -> Option<FColor> {
    let (ex, ey) = (p.x as u32, p.y as u32);
    let emitter = ctx.load_texel_data(ex, ey)?;
    let emission = ctx.maps.emission_colors[(ex, ey)];
    let s = ctx.settings;
    let glow = emission * (s.glow * s.emission_power);

    if emission.r + emission.g + emission.b < MIN_LUMINOSITY {
        return Some(glow);
    }

    let emission_plane = Plane::from_point_normal(emitter.pos, emitter.plane_normal);
    for y in 0..ctx.height() {
        for x in 0..ctx.width() {
            if (x, y) == (ex, ey) {
                continue;
            }
            let Some(td) = ctx.load_texel_data(x, y) else {
                continue;
            };
            if let Some(color) = receive(ctx, rng, image, &emission_plane, &emitter, emission, &td) {
                image.add(x as i32, y as i32, color);
            }
        }
    }
    Some(glow)
}

/// Direct emission arriving at `td`, spawning bounce rays as a side effect.
fn receive<R: Rng + ?Sized>(
    ctx: &BakeContext<'_>,
    rng: &mut R,
    image: &SharedImage<FColor>,
    emission_plane: &Plane,
    emitter: &TexelData,
    emission: FColor,
    td: &TexelData,
) -> Option<FColor> {
    let s = ctx.settings;
    if emission_plane.distance_to(td.pos) <= 0.0 {
        return None;
    }
    let receiver_plane = Plane::from_point_normal(td.pos, td.plane_normal);
    if receiver_plane.distance_to(emitter.pos) <= 0.0 {
        return None;
    }

    let mut d = emitter.pos - td.pos;
    let dist = normalize_and_length(&mut d);
    if dist <= 0.0 {
        return None;
    }
    let dot = d.dot(td.normal).abs();
    if dot <= 0.0 {
        return None;
    }

    let ray = Ray::new(td.pos, d);
    let visible_dist = dist - 2.0 * s.surface_bias;
    if visible_dist > 0.0 && ctx.scene.test_intersect_ray(&ray, visible_dist, true) {
        return None;
    }

    let mut power = light_distance_falloff(dist) * dot;
    let color = emission * power;

    if s.num_directional_bounces > 0 {
        power *= s.directional_bounce_power;
        let num_bounce = (BOUNCE_SAMPLES_PER_POWER * power) as u32;
        if num_bounce > 0 {
            let albedo = ctx.scene.take_triangle_color_sample(td.tri_id, td.bary).albedo_rgb();
            let bounce_color = emission * (power / num_bounce as f32) * albedo;
            let incoming = Ray::new(td.pos, -d);
            for _ in 0..num_bounce {
                let mut bray = incoming;
                if bounce_ray_with_smoothness(rng, &mut bray, td.plane_normal, s.smoothness, None) {
                    light_bounce(ctx, rng, image, s.num_directional_bounces, bray, bounce_color);
                }
            }
        }
    }
    Some(color)
}
