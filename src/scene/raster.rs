//! UV rasterization into per-texel triangle maps.
//!
//! Every texel gets the ID (plus one) of the triangle covering its centre,
//! the barycentric of that centre, and a mini-list of every triangle that
//! touches the texel square at all.

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use rayon::prelude::*;
use smallvec::SmallVec;

use super::light_scene::LightScene;
use crate::geom::{barycentric_insideness, UvTri};
use crate::texel::{FColor, LightImage};
use crate::util::{IVec2, Vec2, Vec3};

/// Scaled UV area at or below which a triangle is not rasterized.
pub const UV_DEGENERATE_EPSILON: f32 = 0.0001;

/// Insideness a candidate must beat in [`TexelMaps::find_texel_triangle_facing`].
const FACING_INSIDENESS_LIMIT: f32 = 0.51;

/// Run of triangle IDs in [`TexelMaps::minilist_tri_ids`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct MiniList {
    pub first: u32,
    pub num: u32,
}

/// Result of rasterizing the whole scene.
#[derive(Debug, Clone)]
pub struct TexelMaps {
    pub width: u32,
    pub height: u32,
    /// Triangle ID plus one, 0 for unmapped texels.
    pub tri_ids: LightImage<u32>,
    pub barys: LightImage<Vec3>,
    pub minilists: LightImage<MiniList>,
    pub minilist_tri_ids: Vec<u32>,
    /// Texels covered by emissive triangles, row-major order.
    pub emission_pixels: Vec<IVec2>,
    /// Strongest emission seen on each emissive texel.
    pub emission_colors: LightImage<FColor>,
}

/// Rows of one rasterization band.
struct Band<'a> {
    first_row: u32,
    ids: &'a mut [u32],
    barys: &'a mut [Vec3],
    lists: &'a mut [SmallVec<[u32; 4]>],
    emission: &'a mut [Option<FColor>],
}

impl TexelMaps {
    /// Rasterize every non-degenerate UV triangle of `scene`.
    #[tracing::instrument(skip_all, fields(width, height))]
    pub fn rasterize(scene: &LightScene, width: u32, height: u32) -> Self {
        let w = width as usize;
        let n = w * height as usize;

        let bounds: Vec<(IVec2, IVec2)> = scene.uv_tris.iter().map(|t| texel_bounds(t, width, height)).collect();

        let mut ids = vec![0u32; n];
        let mut barys = vec![Vec3::ZERO; n];
        let mut lists: Vec<SmallVec<[u32; 4]>> = vec![SmallVec::new(); n];
        let mut emission: Vec<Option<FColor>> = vec![None; n];
        let emission_pixels = Mutex::new(Vec::new());

        let threads = rayon::current_num_threads().max(1) as u32;
        let band_height = (height / threads + 1) as usize;
        let band_len = (band_height * w).max(1);

        ids.par_chunks_mut(band_len)
            .zip(barys.par_chunks_mut(band_len))
            .zip(lists.par_chunks_mut(band_len))
            .zip(emission.par_chunks_mut(band_len))
            .enumerate()
            .for_each(|(band, (((ids, barys), lists), emission))| {
                let mut band = Band {
                    first_row: (band * band_height) as u32,
                    ids,
                    barys,
                    lists,
                    emission,
                };
                rasterize_band(scene, &bounds, width, height, &mut band, &emission_pixels);
            });

        // flatten the per-texel lists
        let mut minilists: LightImage<MiniList> = LightImage::new(width, height);
        let mut minilist_tri_ids = Vec::new();
        let mut valid = 0usize;
        let mut fallback = 0usize;
        for (i, list) in lists.iter().enumerate() {
            let ml = &mut minilists.pixels_mut()[i];
            ml.first = minilist_tri_ids.len() as u32;
            ml.num = list.len() as u32;
            minilist_tri_ids.extend_from_slice(list);

            if list.is_empty() {
                continue;
            }
            valid += 1;
            if ids[i] == 0 {
                // the square is touched but the centre is outside every triangle
                let tri_id = list[0];
                let st = Vec2::new(((i % w) as f32 + 0.5) / width as f32, ((i / w) as f32 + 0.5) / height as f32);
                ids[i] = tri_id + 1;
                barys[i] = scene.uv_tris[tri_id as usize]
                    .find_barycentric(st)
                    .map_or(Vec3::splat(1.0 / 3.0), clamp_barycentric);
                fallback += 1;
            }
        }

        let mut emission_pixels = emission_pixels.into_inner();
        emission_pixels.sort_by_key(|p| (p.y, p.x));
        let emission_colors = LightImage::from_vec(width, height, emission.into_iter().map(Option::unwrap_or_default).collect())
            .unwrap_or_else(|| LightImage::new(width, height));

        tracing::info!(
            valid,
            fallback,
            overlapped = minilist_tri_ids.len(),
            emission_pixels = emission_pixels.len(),
            "rasterized"
        );

        Self {
            width,
            height,
            tri_ids: LightImage::from_vec(width, height, ids).unwrap_or_else(|| LightImage::new(width, height)),
            barys: LightImage::from_vec(width, height, barys).unwrap_or_else(|| LightImage::new(width, height)),
            minilists,
            minilist_tri_ids,
            emission_pixels,
            emission_colors,
        }
    }

    /// Triangle IDs touching texel `(x, y)`.
    pub fn minilist(&self, x: u32, y: u32) -> &[u32] {
        let ml = self.minilists[(x, y)];
        &self.minilist_tri_ids[ml.first as usize..(ml.first + ml.num) as usize]
    }

    /// Triangle ID at `(x, y)`, or `None` for an unmapped texel.
    pub fn tri_id(&self, x: u32, y: u32) -> Option<u32> {
        self.tri_ids[(x, y)].checked_sub(1)
    }

    /// First triangle of `list` containing UV point `st`, with its barycentric.
    pub fn find_texel_triangle(scene: &LightScene, list: &[u32], st: Vec2) -> Option<(u32, Vec3)> {
        list.iter().find_map(|&tri_id| {
            scene.uv_tris[tri_id as usize]
                .find_barycentric_inside(st)
                .map(|b| (tri_id, b))
        })
    }

    /// Most central triangle of `list` around `st` whose face looks towards
    /// `to_target(surface_pos)`.
    ///
    /// The flag reports whether any near-enough triangle faced away.
    pub fn find_texel_triangle_facing<F>(
        scene: &LightScene,
        list: &[u32],
        st: Vec2,
        to_target: F,
    ) -> (Option<(u32, Vec3)>, bool)
    where
        F: Fn(Vec3) -> Vec3,
    {
        let mut best = None;
        let mut best_insideness = FACING_INSIDENESS_LIMIT;
        let mut backfacing = false;

        for &tri_id in list {
            let i = tri_id as usize;
            let Some(bary) = scene.uv_tris[i].find_barycentric(st) else {
                continue;
            };
            let insideness = barycentric_insideness(bary);
            if insideness >= best_insideness {
                continue;
            }
            let pos = scene.tris[i].interpolate(bary);
            if scene.planes[i].normal.dot(to_target(pos)) > 0.0 {
                best_insideness = insideness;
                best = Some((tri_id, bary));
            } else {
                backfacing = true;
            }
        }
        (best, backfacing)
    }

    /// Mark texels covered by too few antialias kernel points as unmapped.
    ///
    /// Returns the per-texel coverage counts.
    #[tracing::instrument(skip_all, fields(kernel = kernel.len()))]
    pub fn reclaim_texels(&mut self, scene: &LightScene, kernel: &[Vec2]) -> LightImage<u32> {
        let threshold = (kernel.len() / 4).max(1) as u32;
        let (width, height) = (self.width, self.height);
        let mut coverage = LightImage::new(width, height);
        let mut reclaimed = 0usize;

        for y in 0..height {
            for x in 0..width {
                let list = self.minilist(x, y);
                if list.is_empty() {
                    continue;
                }
                let found = kernel
                    .iter()
                    .filter(|k| {
                        let st = (**k + Vec2::new(x as f32, y as f32)) / Vec2::new(width as f32, height as f32);
                        Self::find_texel_triangle(scene, list, st).is_some()
                    })
                    .count() as u32;

                coverage[(x, y)] = found;
                if found < threshold {
                    self.tri_ids[(x, y)] = 0;
                    reclaimed += 1;
                }
            }
        }

        tracing::debug!(reclaimed, "texels reclaimed");
        coverage
    }
}

fn rasterize_band(
    scene: &LightScene,
    bounds: &[(IVec2, IVec2)],
    width: u32,
    height: u32,
    band: &mut Band<'_>,
    emission_pixels: &Mutex<Vec<IVec2>>,
) {
    let w = width as i32;
    let rows = (band.ids.len() / width.max(1) as usize) as i32;
    let row_min = band.first_row as i32;
    let row_max = row_min + rows;

    for (tri_id, tri) in scene.uv_tris.iter().enumerate() {
        if tri.is_degenerate(UV_DEGENERATE_EPSILON) {
            continue;
        }
        let (lo, hi) = bounds[tri_id];
        let min_y = lo.y.clamp(row_min, row_max);
        let max_y = hi.y.clamp(row_min, row_max);
        if min_y >= max_y || lo.x >= hi.x {
            continue;
        }
        let is_emitter = scene.is_emission_tri(tri_id as u32);
        let mut new_emission = Vec::new();

        for y in min_y..max_y {
            for x in lo.x..hi.x {
                if !tri.contains_texel(x, y, width, height) {
                    continue;
                }
                let i = ((y - row_min) * w + x) as usize;
                band.lists[i].push(tri_id as u32);

                let st = Vec2::new((x as f32 + 0.5) / width as f32, (y as f32 + 0.5) / height as f32);
                let Some(bary) = tri.find_barycentric_inside(st) else {
                    continue;
                };
                band.ids[i] = tri_id as u32 + 1;
                band.barys[i] = bary;

                if is_emitter {
                    let emission = scene.take_triangle_color_sample(tri_id as u32, bary).emission;
                    match &mut band.emission[i] {
                        Some(col) => *col = col.max(emission),
                        slot @ None => {
                            *slot = Some(emission);
                            new_emission.push(IVec2::new(x, y));
                        }
                    }
                }
            }
        }

        if !new_emission.is_empty() {
            emission_pixels.lock().extend(new_emission);
        }
    }
}

/// Texel range covered by a UV triangle, one texel of slack each side.
/// Max is exclusive.
fn texel_bounds(tri: &UvTri, width: u32, height: u32) -> (IVec2, IVec2) {
    let (min, max) = tri.bounds();
    let size = Vec2::new(width as f32, height as f32);
    let dims = IVec2::new(width as i32, height as i32);
    let lo = (min * size).as_ivec2() - IVec2::ONE;
    let hi = (max * size).as_ivec2() + IVec2::ONE;
    (lo.clamp(IVec2::ZERO, dims), hi.clamp(IVec2::ZERO, dims))
}

/// Pull a barycentric back onto the triangle.
fn clamp_barycentric(b: Vec3) -> Vec3 {
    let c = b.max(Vec3::ZERO);
    let sum = c.x + c.y + c.z;
    if sum > 0.0 {
        c / sum
    } else {
        Vec3::splat(1.0 / 3.0)
    }
}

/// Antialias kernel: `size` x `size` points spanning the texel, corners first.
pub fn antialias_kernel(size: u32) -> Vec<Vec2> {
    let size = size.max(1) as i32;
    let mut points: Vec<IVec2> = Vec::with_capacity((size * size) as usize);
    if size > 2 {
        let corners = [
            IVec2::new(0, 0),
            IVec2::new(size - 1, 0),
            IVec2::new(0, size - 1),
            IVec2::new(size - 1, size - 1),
        ];
        points.extend(corners);
        for y in 0..size {
            for x in 0..size {
                let p = IVec2::new(x, y);
                if !corners.contains(&p) {
                    points.push(p);
                }
            }
        }
    } else {
        for y in 0..size {
            for x in 0..size {
                points.push(IVec2::new(x, y));
            }
        }
    }

    let (step, offset) = if size > 1 { (1.0 / (size - 1) as f32, 0.0) } else { (0.0, 0.5) };
    points
        .into_iter()
        .map(|p| p.as_vec2() * step + Vec2::splat(offset))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::input::{MeshDesc, SceneDesc, SurfaceDesc};
    use crate::scene::light_scene::SceneParams;
    use crate::util::Mat4;

    fn tri_scene(uv: [Vec2; 3]) -> LightScene {
        let surf = SurfaceDesc {
            positions: vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0)],
            normals: vec![Vec3::Y; 3],
            uv2: uv.to_vec(),
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        let desc = SceneDesc {
            meshes: vec![MeshDesc {
                name: "tri".into(),
                transform: Mat4::IDENTITY,
                surfaces: vec![surf],
            }],
            ..Default::default()
        };
        let params = SceneParams {
            width: 8,
            height: 8,
            voxel_density: 4,
            max_material_size: 32,
            emission_density: 1.0,
            use_sdf: false,
        };
        LightScene::build(&desc, &params).unwrap()
    }

    #[test]
    fn test_rasterize_half_square() {
        let scene = tri_scene([Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)]);
        let maps = TexelMaps::rasterize(&scene, 8, 8);

        // centres strictly below the diagonal are mapped with a valid barycentric
        for y in 0..8u32 {
            for x in 0..8u32 {
                let inside = x + y < 7;
                if inside {
                    assert_eq!(maps.tri_id(x, y), Some(0), "({x}, {y})");
                    let b = maps.barys[(x, y)];
                    assert!((b.x + b.y + b.z - 1.0).abs() < 1e-4);
                }
                if x + y > 8 {
                    assert_eq!(maps.tri_id(x, y), None, "({x}, {y})");
                    assert!(maps.minilist(x, y).is_empty());
                }
            }
        }
        // the diagonal texels are only touched, they fall back to the toucher
        assert_eq!(maps.tri_id(4, 3), Some(0));
        assert_eq!(maps.minilist(4, 3), &[0]);
    }

    #[test]
    fn test_degenerate_uv_is_skipped() {
        let scene = tri_scene([Vec2::splat(0.5); 3]);
        let maps = TexelMaps::rasterize(&scene, 8, 8);
        assert!(maps.tri_ids.pixels().iter().all(|&id| id == 0));
        assert!(maps.minilist_tri_ids.is_empty());
        assert!(scene.tris[0].area() > 0.0);
    }

    #[test]
    fn test_kernel_corners_first() {
        let k = antialias_kernel(3);
        assert_eq!(k.len(), 9);
        assert_eq!(&k[..4], &[Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0)]);
        assert!(k.contains(&Vec2::new(0.5, 0.5)));
        assert_eq!(antialias_kernel(1), vec![Vec2::splat(0.5)]);
    }

    #[test]
    fn test_reclaim_keeps_covered_texels() {
        let scene = tri_scene([Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)]);
        let mut maps = TexelMaps::rasterize(&scene, 8, 8);
        let coverage = maps.reclaim_texels(&scene, &antialias_kernel(3));
        assert_eq!(coverage[(0, 0)], 9);
        assert_eq!(maps.tri_id(0, 0), Some(0));
        // (7, 1) only touches the triangle at one corner
        assert!(coverage[(7, 1)] < 2);
        assert_eq!(maps.tri_id(7, 1), None);
    }
}
