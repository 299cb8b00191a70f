//! Backward direct lighting: every texel traces towards every light.

use rand::Rng;
use rayon::prelude::*;

use super::bounce::{light_bounce, MAX_PASS_THROUGH};
use super::context::{step_progress, texel_sections, BakeContext, TexelData};
use super::lights::LLight;
use super::progress::BakeProgress;
use super::sampling::{
    bounce_ray_with_smoothness, calculate_transmittance, light_distance_falloff, random_unit_dir, row_rng,
};
use super::sky::process_texel_sky;
use crate::geom::Ray;
use crate::scene::{ColorSample, LightKind, TexelMaps};
use crate::texel::{FColor, LightImage, SharedImage};
use crate::util::{normalize_and_length, Result, Vec2};

/// Directional lights have no falloff; this keeps them comparable to omnis.
const DIRECTIONAL_POWER: f32 = 0.08;

/// Attempts at finding a jittered spot origin inside the cone.
pub(crate) const MAX_SPOT_ATTEMPTS: u32 = 64;

/// Alpha above which a transparent surface blocks light.
const BLOCKING_ALPHA: f32 = 0.999;

const SALT_DIRECT: u64 = 0x4449_5245;

/// Outcome counts for the samples of one sub-texel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubTexelSample {
    pub num_samples: u32,
    pub num_clear: u32,
    pub num_opaque: u32,
    pub num_transparent: u32,
}

/// Accumulated light of one light over the antialias kernel.
#[derive(Debug, Default)]
struct KernelAccum {
    color: FColor,
    inside: u32,
    clear: u32,
    opaque: u32,
    /// Samples per sub-texel actually taken; point lights take one.
    samples: u32,
}

impl KernelAccum {
    fn samples_or(&self, default: u32) -> u32 {
        if self.samples == 0 {
            default
        } else {
            self.samples
        }
    }
}

/// Gather direct light (plus sky) for every mapped texel.
#[tracing::instrument(skip_all, fields(lights = ctx.lights.len(), width = ctx.width(), height = ctx.height()))]
pub fn process_backward(
    ctx: &BakeContext<'_>,
    kernel: &[Vec2],
    progress: &mut dyn BakeProgress,
) -> Result<LightImage<FColor>> {
    let main = SharedImage::new(ctx.width(), ctx.height());
    let sections = texel_sections(ctx.height());

    for (i, rows) in sections.iter().enumerate() {
        rows.clone().into_par_iter().for_each(|y| {
            let mut rng = row_rng(ctx.seed, SALT_DIRECT, y);
            for x in 0..ctx.width() {
                if let Some(color) = process_texel(ctx, &mut rng, &main, kernel, x, y) {
                    main.add(x as i32, y as i32, color);
                }
            }
        });
        step_progress(progress, "direct light", i as u32 + 1, sections.len() as u32)?;
    }
    Ok(main.into_image())
}

/// Antialiased light for texel `(x, y)`, `None` when no kernel point landed
/// on the texel's triangles.
fn process_texel<R: Rng + ?Sized>(
    ctx: &BakeContext<'_>,
    rng: &mut R,
    main: &SharedImage<FColor>,
    kernel: &[Vec2],
    x: u32,
    y: u32,
) -> Option<FColor> {
    let list = ctx.maps.minilist(x, y);
    if list.is_empty() || ctx.maps.tri_id(x, y).is_none() {
        return None;
    }
    let s = ctx.settings;
    let samples = s.light_samples_per_subtexel;
    let cheap = list.len() == 1 && kernel.len() > 4 && !s.high_shadow_quality;

    let mut total = FColor::BLACK;
    let mut any_inside = false;

    for light in ctx.lights {
        let mut acc = KernelAccum::default();
        if cheap {
            run_kernel(ctx, rng, main, light, list, x, y, &kernel[..4], &mut acc);
            let ns = acc.samples_or(samples);
            let all_same = acc.clear == 4 * ns || acc.opaque == 4 * ns;
            if !(acc.inside == 4 && all_same) {
                run_kernel(ctx, rng, main, light, list, x, y, &kernel[4..], &mut acc);
            }
        } else {
            run_kernel(ctx, rng, main, light, list, x, y, kernel, &mut acc);
        }

        if acc.inside > 0 {
            total += acc.color / (acc.inside * acc.samples_or(samples)) as f32;
            any_inside = true;
        }
    }

    if let Some(td) = ctx.load_texel_data(x, y) {
        if let Some(sky) = process_texel_sky(ctx, rng, td.pos, td.plane_normal) {
            total += sky;
            any_inside = true;
        }
    }

    any_inside.then_some(total)
}

#[allow(clippy::too_many_arguments)]
fn run_kernel<R: Rng + ?Sized>(
    ctx: &BakeContext<'_>,
    rng: &mut R,
    main: &SharedImage<FColor>,
    light: &LLight,
    list: &[u32],
    x: u32,
    y: u32,
    points: &[Vec2],
    acc: &mut KernelAccum,
) {
    for &k in points {
        let st = ctx.subtexel_st(x, y, k);
        let (found, backfacing) = if light.kind == LightKind::Directional {
            TexelMaps::find_texel_triangle_facing(ctx.scene, list, st, |_| -light.dir)
        } else {
            TexelMaps::find_texel_triangle_facing(ctx.scene, list, st, |p| light.pos - p)
        };

        match found {
            Some((tri_id, bary)) => {
                acc.inside += 1;
                let td = ctx.texel_data_at(tri_id, bary);
                let sample = ctx.scene.take_triangle_color_sample(tri_id, bary);
                let mut sts = SubTexelSample {
                    num_samples: ctx.settings.light_samples_per_subtexel,
                    ..Default::default()
                };
                acc.color += process_texel_light(ctx, rng, main, light, &sample, &td, &mut sts);
                acc.clear += sts.num_clear;
                acc.opaque += sts.num_opaque;
                acc.samples = sts.num_samples;
            }
            // faces away from the light: counts, but stays dark
            None if backfacing => acc.inside += 1,
            None => {}
        }
    }
}

/// Light arriving from `light` at one surface point, summed over
/// `sts.num_samples` jittered rays. Traced from the surface towards the light.
pub fn process_texel_light<R: Rng + ?Sized>(
    ctx: &BakeContext<'_>,
    rng: &mut R,
    main: &SharedImage<FColor>,
    light: &LLight,
    surface: &ColorSample,
    td: &TexelData,
    sts: &mut SubTexelSample,
) -> FColor {
    let s = ctx.settings;
    let mut power = light.energy * s.backward_ray_power;
    let mut result = FColor::BLACK;

    match light.kind {
        LightKind::Spot => {
            let d = (td.pos - light.spot_emanation_point).normalize_or_zero();
            if d.dot(light.dir) - light.spot_dot_max <= 0.0 {
                return result;
            }
        }
        LightKind::Directional => power *= DIRECTIONAL_POWER,
        LightKind::Omni => {}
    }

    let mut point_light = false;
    if light.kind == LightKind::Omni {
        let mut light_vec = light.pos - td.pos;
        let light_dist = normalize_and_length(&mut light_vec);
        if s.max_light_distance != 0 && light_dist as u32 > s.max_light_distance {
            return result;
        }

        let radius = light.radius();
        if light_dist > radius {
            // reject surfaces facing away from the whole light sphere
            let theta = (radius / light_dist).clamp(0.0, 1.0).asin();
            let dot_threshold = (theta + std::f32::consts::FRAC_PI_2).cos();
            if td.normal.dot(light_vec) < dot_threshold {
                return result;
            }
        }
        point_light = radius == 0.0;
    }
    if point_light {
        sts.num_samples = 1;
    }

    let mut quick_reject: Option<u32> = None;

    for _ in 0..sts.num_samples {
        let mut cone = 1.0;
        let (mut ray, ray_length) = match light.kind {
            LightKind::Directional => {
                let d = (random_unit_dir(rng) * light.scale + light.dir * -2.0).normalize_or_zero();
                if d.length_squared() < 0.00001 {
                    continue;
                }
                let d = if d.dot(light.dir) > 0.0 { -d } else { d };
                (Ray::new(td.pos, d), f32::MAX)
            }
            LightKind::Spot => {
                let mut found = None;
                for _ in 0..MAX_SPOT_ATTEMPTS {
                    let o = light.pos + random_unit_dir(rng) * light.scale;
                    let mut d = td.pos - o;
                    let len = normalize_and_length(&mut d);
                    let dot = d.dot(light.dir) - light.spot_dot_max;
                    if dot > 0.0 && len > 0.0 {
                        found = Some((d, len, dot));
                        break;
                    }
                }
                let Some((d, len, dot)) = found else {
                    continue;
                };
                let c = dot / (1.0 - light.spot_dot_max);
                cone = c * c * c * c;
                (Ray::new(td.pos, -d), len)
            }
            LightKind::Omni => {
                let mut dest = light.pos;
                if !point_light {
                    dest += random_unit_dir(rng) * light.scale;
                }
                let mut d = dest - td.pos;
                let len = normalize_and_length(&mut d);
                if len == 0.0 {
                    continue;
                }
                (Ray::new(td.pos, d), len)
            }
        };

        if let Some(tri) = quick_reject {
            let blocked = ray
                .test_intersect_edgeform(&ctx.scene.edge_tris[tri as usize])
                .is_some_and(|t| t < ray_length);
            if blocked {
                sts.num_opaque += 1;
                continue;
            }
        }

        let mut light_color = light.color;
        for _ in 0..MAX_PASS_THROUGH {
            let hit = ctx
                .scene
                .find_intersect_ray(&ray, None)
                .filter(|h| h.t <= ray_length);

            let Some(hit) = hit else {
                sts.num_clear += 1;
                let mut local_power = if light.kind == LightKind::Directional {
                    power
                } else {
                    power * light_distance_falloff(ray_length)
                };
                local_power *= cone;
                let dot = ray.d.dot(td.normal).max(0.0);
                light_color *= local_power * dot;
                result += light_color;

                if s.num_directional_bounces > 0 {
                    let mut bounce = Ray::new(td.pos, -ray.d);
                    let color = light_color * surface.albedo_rgb();
                    let smoothness = 1.0 - surface.roughness;
                    if bounce_ray_with_smoothness(rng, &mut bounce, td.plane_normal, smoothness, None) {
                        let share = s.antialias_total_light_samples() as f32;
                        light_bounce(ctx, rng, main, s.num_directional_bounces, bounce, color / share);
                    }
                }
                break;
            };

            let sample = ctx.scene.take_triangle_color_sample(hit.tri_id, hit.bary);
            if sample.is_opaque {
                quick_reject = Some(hit.tri_id);
                sts.num_opaque += 1;
                break;
            }

            sts.num_transparent += 1;
            if sample.alpha() > BLOCKING_ALPHA {
                break;
            }
            let tri = hit.tri_id as usize;
            let normal = ctx.scene.tri_normals[tri].interpolate(hit.bary).normalize_or_zero();
            let backface = normal.dot(ray.d) >= 0.0;
            let push = if backface { s.surface_bias } else { -s.surface_bias };
            ray.o = ctx.scene.tris[tri].interpolate(hit.bary) + normal * push;
            calculate_transmittance(&sample, &mut light_color);
        }
    }
    result
}
