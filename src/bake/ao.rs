//! Ambient occlusion.
//!
//! Before tracing, a "clear" pass marks texels with no geometry in front of
//! them within AO range; those get full visibility for free. Texels whose
//! nearest neighbouring triangle is not right next to them are marked
//! "middle only" and sample just the texel centre instead of random
//! sub-texel points. Ray directions come from the [`Qmc`] table.

use rand::Rng;
use rayon::prelude::*;

use super::context::{row_sections, step_progress, texel_sections, BakeContext, TexelData};
use super::progress::BakeProgress;
use super::qmc::Qmc;
use super::sampling::row_rng;
use crate::geom::Ray;
use crate::scene::TexelMaps;
use crate::texel::{BitImage, LightImage};
use crate::util::{closest_point_in_triangle, vec3_equal_approx, is_equal_approx, Plane, Result, Vec2};

/// Nearest triangle distance above which only the texel centre is sampled.
const MIDDLE_ONLY_DISTANCE: f32 = 0.01;

/// Rows per progress step of the clear pass.
const CLEAR_SECTION_DIVISOR: u32 = 16;

const SALT_AO: u64 = 0x414f_4f43;

/// Per-texel AO shortcuts.
#[derive(Debug, Clone)]
pub struct AoMaps {
    /// Nothing within range in front of the texel.
    pub clear: BitImage,
    pub middle_only: BitImage,
    /// Every sample was occluded.
    pub black: BitImage,
}

/// AO visibility per texel: 1 is fully open, 0 fully occluded.
#[derive(Debug, Clone)]
pub struct AoResult {
    pub visibility: LightImage<f32>,
    pub maps: AoMaps,
}

/// Run the clear pass and then trace every remaining texel.
#[tracing::instrument(skip_all, fields(samples = ctx.settings.num_ao_samples, range = ctx.settings.ao_range))]
pub fn process_ao(ctx: &BakeContext<'_>, progress: &mut dyn BakeProgress) -> Result<AoResult> {
    let (w, h) = (ctx.width(), ctx.height());
    let mut maps = find_clear_texels(ctx, progress)?;
    let qmc = Qmc::new(ctx.settings.num_ao_samples, ctx.seed);
    tracing::info!(
        clear = maps.clear.count(),
        middle_only = maps.middle_only.count(),
        "ao clear texels"
    );

    let mut visibility: LightImage<f32> = LightImage::new(w, h);
    let mut black_rows: Vec<Vec<u32>> = Vec::with_capacity(h as usize);
    let sections = texel_sections(h);

    for (i, rows) in sections.iter().enumerate() {
        let wu = w as usize;
        let chunk = &mut visibility.pixels_mut()[rows.start as usize * wu..rows.end as usize * wu];
        let maps_ref = &maps;
        let qmc = &qmc;
        let blacks: Vec<Vec<u32>> = chunk
            .par_chunks_mut(wu)
            .enumerate()
            .map(|(r, row)| {
                let y = rows.start + r as u32;
                let mut rng = row_rng(ctx.seed, SALT_AO, y);
                let mut variation = Qmc::random_variation(&mut rng);
                let mut black = Vec::new();
                for (x, out) in row.iter_mut().enumerate() {
                    let x = x as u32;
                    variation = Qmc::next_variation(variation);
                    let dirs = AoDirs { qmc, variation };
                    if let Some((vis, all_hit)) = calculate_ao(ctx, &mut rng, maps_ref, &dirs, x, y) {
                        *out = vis;
                        if all_hit {
                            black.push(x);
                        }
                    }
                }
                black
            })
            .collect();
        black_rows.extend(blacks);
        step_progress(progress, "ambient occlusion", i as u32 + 1, sections.len() as u32)?;
    }

    for (y, xs) in black_rows.iter().enumerate() {
        for &x in xs {
            maps.black.set(x as i32, y as i32, true);
        }
    }
    tracing::debug!(black = maps.black.count(), "ao black texels");

    Ok(AoResult { visibility, maps })
}

/// Build the clear and middle-only images.
pub fn find_clear_texels(ctx: &BakeContext<'_>, progress: &mut dyn BakeProgress) -> Result<AoMaps> {
    let (w, h) = (ctx.width(), ctx.height());
    let mut maps = AoMaps {
        clear: BitImage::new(w, h),
        middle_only: BitImage::new(w, h),
        black: BitImage::new(w, h),
    };
    let sections = row_sections(h, h / CLEAR_SECTION_DIVISOR);

    for (i, rows) in sections.iter().enumerate() {
        let flags: Vec<(u32, Vec<(bool, bool)>)> = rows
            .clone()
            .into_par_iter()
            .map(|y| (y, (0..w).map(|x| clear_texel(ctx, x, y)).collect()))
            .collect();
        for (y, row) in flags {
            for (x, (clear, middle)) in row.into_iter().enumerate() {
                maps.clear.set(x as i32, y as i32, clear);
                maps.middle_only.set(x as i32, y as i32, middle);
            }
        }
        step_progress(progress, "ao clear texels", i as u32 + 1, sections.len() as u32)?;
    }
    Ok(maps)
}

/// `(clear, middle_only)` for one texel.
fn clear_texel(ctx: &BakeContext<'_>, x: u32, y: u32) -> (bool, bool) {
    let list = ctx.maps.minilist(x, y);
    if list.is_empty() || !is_coplanar(ctx, list) {
        return (false, false);
    }
    let Some(td) = ctx.load_texel_data(x, y) else {
        return (false, false);
    };

    let range = ctx.settings.ao_range;
    let plane = Plane::from_point_normal(td.pos + td.plane_normal * ctx.settings.surface_bias, td.plane_normal);
    let mut nearest_sq = f32::MAX;

    for (n, tri) in ctx.scene.tris.iter().enumerate() {
        if n as u32 == td.tri_id {
            continue;
        }
        let dists = tri.pos.map(|p| plane.distance_to(p));
        if dists.iter().all(|&d| d < 0.0) {
            continue;
        }
        if dists.iter().copied().fold(f32::MAX, f32::min) > range {
            continue;
        }
        let closest = closest_point_in_triangle(td.pos, tri.pos[0], tri.pos[1], tri.pos[2]);
        nearest_sq = nearest_sq.min(td.pos.distance_squared(closest));
    }

    let nearest = nearest_sq.sqrt();
    (nearest >= range, nearest > MIDDLE_ONLY_DISTANCE)
}

fn is_coplanar(ctx: &BakeContext<'_>, list: &[u32]) -> bool {
    let first = &ctx.scene.planes[list[0] as usize];
    list[1..].iter().all(|&t| {
        let p = &ctx.scene.planes[t as usize];
        is_equal_approx(p.d, first.d) && vec3_equal_approx(p.normal, first.normal)
    })
}

/// Direction set one texel draws its rays from.
struct AoDirs<'a> {
    qmc: &'a Qmc,
    variation: u32,
}

/// Visibility of texel `(x, y)` and whether every sample hit something.
/// `None` for unmapped texels.
fn calculate_ao<R: Rng + ?Sized>(
    ctx: &BakeContext<'_>,
    rng: &mut R,
    maps: &AoMaps,
    dirs: &AoDirs<'_>,
    x: u32,
    y: u32,
) -> Option<(f32, bool)> {
    ctx.maps.tri_id(x, y)?;
    if maps.clear.get(x as i32, y as i32) {
        return Some((1.0, false));
    }

    let s = ctx.settings;
    let list = ctx.maps.minilist(x, y);
    let per_repeat = s.num_ao_samples.max(1);
    let max_attempts = per_repeat * s.ao_abort_timeout;
    let range = s.ao_range;
    let voxel_range = ctx.scene.tracer().distance_in_voxels(range);

    let centre_st = ctx.subtexel_st(x, y, Vec2::splat(0.5));
    let centre = find_origin(ctx, list, centre_st);
    let middle_only = maps.middle_only.get(x as i32, y as i32) && centre.is_some();

    let mut num_samples = per_repeat;
    let mut inside = 0u32;
    let mut hits = 0u32;
    let mut previous_metric = 0.0;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if attempts > max_attempts {
            break;
        }

        let origin = if middle_only {
            centre
        } else {
            let st = if attempts == 1 { centre_st } else { ctx.random_st(rng, x, y) };
            find_origin(ctx, list, st)
        };
        let Some(td) = origin else {
            continue;
        };
        let dir = dirs.qmc.cosine_dir(inside, dirs.variation, td.plane_normal);
        inside += 1;

        let ray = Ray::new(td.pos, dir);
        if ctx.scene.tracer().test_intersect_ray(&ray, range, Some(voxel_range), false) {
            hits += 1;
        }

        if inside >= num_samples {
            let metric = hits as f32 / inside as f32;
            if (metric - previous_metric).abs() <= s.ao_error_metric {
                break;
            }
            num_samples += per_repeat;
            previous_metric = metric;
        }
    }

    if inside == 0 {
        return Some((1.0, false));
    }
    let visibility = (1.0 - hits as f32 / inside as f32).max(0.0);
    Some((visibility, hits == inside))
}

fn find_origin(ctx: &BakeContext<'_>, list: &[u32], st: Vec2) -> Option<TexelData> {
    TexelMaps::find_texel_triangle(ctx.scene, list, st).map(|(tri, bary)| ctx.texel_data_at(tri, bary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::test_scene::{covered_floor_scene, lit_quad_scene, TestBake};
    use crate::bake::NullProgress;

    #[test]
    fn test_open_floor_is_clear() {
        let bake = TestBake::new(lit_quad_scene());
        let ao = process_ao(&bake.context(), &mut NullProgress).unwrap();
        for y in 0..bake.maps.height {
            for x in 0..bake.maps.width {
                if bake.maps.tri_id(x, y).is_some() {
                    assert!(ao.maps.clear.get(x as i32, y as i32));
                    assert_eq!(ao.visibility[(x, y)], 1.0);
                }
            }
        }
    }

    #[test]
    fn test_ceiling_occludes_floor() {
        let bake = TestBake::new(covered_floor_scene());
        let ao = process_ao(&bake.context(), &mut NullProgress).unwrap();

        let mut sum = 0.0;
        let mut count = 0;
        for y in 0..bake.maps.height {
            for x in 0..3 {
                if bake.maps.tri_id(x, y).is_none() {
                    continue;
                }
                assert!(!ao.maps.clear.get(x as i32, y as i32));
                sum += ao.visibility[(x, y)];
                count += 1;
            }
        }
        assert!(count > 0);
        assert!(sum / (count as f32) < 0.5, "mean visibility {}", sum / count as f32);
    }
}
