//! Indirect light: directional bounce chains and ambient bounce passes.

use rand::Rng;
use rayon::prelude::*;

use super::context::{step_progress, texel_sections, BakeContext};
use super::progress::BakeProgress;
use super::sampling::{bounce_ray_with_smoothness, calculate_transmittance, random_hemi_dir, row_rng};
use crate::geom::Ray;
use crate::texel::{FColor, LightImage, SharedImage};
use crate::util::Result;

/// Transparent surfaces a single ray may pass before it is dropped.
pub const MAX_PASS_THROUGH: u32 = 32;

/// Offset used to step through a transparent surface.
const PASS_THROUGH_PUSH: f32 = 0.001;

/// Alpha below which a transparent surface is ignored.
const INVISIBLE_ALPHA: f32 = 0.001;

/// Ambient hits at or above this alpha stop the ray.
const AMBIENT_OPAQUE_ALPHA: f32 = 0.5;

const SALT_AMBIENT: u64 = 0x414d_4249;

/// Follow light reflected off a lit surface, depositing it into the
/// texels it lands on until `bounces_left` runs out.
pub fn light_bounce<R: Rng + ?Sized>(
    ctx: &BakeContext<'_>,
    rng: &mut R,
    image: &SharedImage<FColor>,
    mut bounces_left: u32,
    mut ray: Ray,
    mut color: FColor,
) {
    let s = ctx.settings;
    let mut pass_throughs = 0;

    while bounces_left > 0 {
        color *= s.directional_bounce_power;

        let Some(hit) = ctx.scene.find_intersect_ray(&ray, None) else {
            return;
        };
        let tri = hit.tri_id as usize;
        let vertex_normal = ctx.scene.tri_normals[tri].interpolate(hit.bary).normalize_or_zero();
        let sample = ctx.scene.take_triangle_color_sample(hit.tri_id, hit.bary);

        let mut pass_through = !sample.is_opaque && sample.alpha() < INVISIBLE_ALPHA;
        let backface = vertex_normal.dot(ray.d) >= 0.0;
        if backface && sample.is_opaque {
            return;
        }

        let (tx, ty) = ctx.hit_texel(hit.tri_id, hit.bary);
        if !image.is_within(tx, ty) {
            return;
        }
        let pos = ctx.scene.tris[tri].interpolate(hit.bary);
        let face_normal = ctx.scene.planes[tri].normal;

        if !sample.is_opaque {
            if !pass_through && !backface {
                pass_through = rng.gen::<f32>() > sample.alpha();
            }
            if pass_through {
                calculate_transmittance(&sample, &mut color);
            }
            if backface || pass_through {
                pass_throughs += 1;
                if pass_throughs > MAX_PASS_THROUGH {
                    return;
                }
                let push = if backface { PASS_THROUGH_PUSH } else { -PASS_THROUGH_PUSH };
                ray.o = pos + face_normal * push;
                continue;
            }
        }

        color *= (-vertex_normal.dot(ray.d)).max(0.0);
        image.add(tx, ty, color);

        bounces_left -= 1;
        if bounces_left == 0 {
            return;
        }

        ray.o = pos;
        color *= sample.albedo_rgb();
        if !bounce_ray_with_smoothness(rng, &mut ray, face_normal, s.smoothness, Some(s.surface_bias)) {
            return;
        }
    }
}

/// Run the ambient bounce passes over `main` in place.
///
/// Each pass gathers from the settled `main` into a mirror image, then adds
/// the mirror scaled by the bounce power.
#[tracing::instrument(skip_all, fields(bounces = ctx.settings.num_ambient_bounces))]
pub fn process_ambient_bounces(
    ctx: &BakeContext<'_>,
    main: &mut LightImage<FColor>,
    progress: &mut dyn BakeProgress,
) -> Result<()> {
    let s = ctx.settings;
    let w = ctx.width() as usize;
    let sections = texel_sections(ctx.height());

    for pass in 0..s.num_ambient_bounces {
        let mut mirror: LightImage<FColor> = LightImage::new(ctx.width(), ctx.height());
        let read = &*main;

        for (i, rows) in sections.iter().enumerate() {
            let chunk = &mut mirror.pixels_mut()[rows.start as usize * w..rows.end as usize * w];
            chunk.par_chunks_mut(w).enumerate().for_each(|(r, row)| {
                let y = rows.start + r as u32;
                let mut rng = row_rng(ctx.seed, SALT_AMBIENT + pass as u64, y);
                for (x, out) in row.iter_mut().enumerate() {
                    *out = ambient_texel(ctx, &mut rng, read, x as u32, y);
                }
            });
            step_progress(progress, "ambient bounce", i as u32 + 1, sections.len() as u32)?;
        }

        for (m, b) in main.pixels_mut().iter_mut().zip(mirror.pixels()) {
            *m += *b * s.ambient_bounce_power;
        }
        tracing::debug!(pass, "ambient bounce pass done");
    }
    Ok(())
}

/// Average light `main` reflects onto texel `(x, y)`.
fn ambient_texel<R: Rng + ?Sized>(
    ctx: &BakeContext<'_>,
    rng: &mut R,
    main: &LightImage<FColor>,
    x: u32,
    y: u32,
) -> FColor {
    let Some(td) = ctx.load_texel_data(x, y) else {
        return FColor::BLACK;
    };
    let samples = ctx.settings.num_ambient_bounce_rays.max(1);
    let mut total = FColor::BLACK;
    for _ in 0..samples {
        total += trace_ambient_ray(ctx, main, Ray::new(td.pos, random_hemi_dir(rng, td.plane_normal)));
    }
    total / samples as f32
}

/// Light `main` holds where `ray` lands, tinted by the surface albedo.
/// Transparent surfaces add their tint and let the ray continue.
pub fn trace_ambient_ray(ctx: &BakeContext<'_>, main: &LightImage<FColor>, mut ray: Ray) -> FColor {
    let bias = ctx.settings.surface_bias;
    let mut total = FColor::BLACK;

    for _ in 0..MAX_PASS_THROUGH {
        let Some(hit) = ctx.scene.find_intersect_ray(&ray, None) else {
            break;
        };
        let (dx, dy) = ctx.hit_texel(hit.tri_id, hit.bary);
        let Some(&lit) = main.get(dx, dy) else {
            break;
        };

        let sample = ctx.scene.take_triangle_color_sample(hit.tri_id, hit.bary);
        let opaque = sample.is_opaque || sample.alpha() >= AMBIENT_OPAQUE_ALPHA;
        let mut albedo = sample.albedo_rgb();
        if !sample.is_opaque {
            albedo *= sample.alpha();
        }

        let face_normal = ctx.scene.planes[hit.tri_id as usize].normal;
        let backface = face_normal.dot(ray.d) >= 0.0;

        if !opaque || (backface && !sample.is_opaque) {
            if !backface {
                total += lit * albedo;
            }
            let push = if backface { bias } else { -bias };
            ray.o = ray.at(hit.t) + face_normal * push;
            continue;
        }

        total += lit * albedo;
        break;
    }
    total
}
