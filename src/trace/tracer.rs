//! Uniform voxel grid over the scene triangles and the ray walk through it.

use super::packed::{PackedRay, PackedTriangles};
use super::voxel::{calculate_sdf, Voxel};
use crate::geom::{EdgeTri, Ray, Tri, INTERSECT_EPSILON};
use crate::util::{Aabb, Error, IVec3, Result, Vec3};

/// Growth of the world bound that defines the voxel grid.
pub const EXPANDED_BOUND: f32 = 0.2;
/// Growth used when clipping rays that start outside the grid.
pub const HALF_EXPANSION: f32 = 0.1;
/// Growth of each triangle AABB before it is binned.
const TRI_BIN_EPSILON: f32 = 0.001;
/// Upper bound on voxels along the longest axis.
pub const MAX_VOXEL_DENSITY: u32 = 512;

/// Nearest hit found by [`VoxelTracer::find_intersect_ray`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceHit {
    pub tri_id: u32,
    pub t: f32,
}

/// State of one ray walking through the grid, in voxel space.
#[derive(Debug, Clone, Copy)]
pub struct VoxelWalk {
    /// Ray in voxel units; the origin advances to each exit point.
    pub ray: Ray,
    /// Voxel the next call to [`VoxelTracer::raytrace`] will visit.
    pub voxel: IVec3,
    steps_left: u32,
}

/// Voxel grid acceleration structure.
#[derive(Debug, Clone)]
pub struct VoxelTracer {
    voxels: Vec<Voxel>,
    dims: IVec3,
    voxel_size: Vec3,
    world_bound: Aabb,
    world_bound_mid: Aabb,
    world_bound_expanded: Aabb,
    max_test_dist: f32,
    use_sdf: bool,
    use_simd: bool,
}

impl VoxelTracer {
    /// Bin `tris` (and their edge forms) into a grid with `voxel_density`
    /// voxels along the longest axis.
    #[tracing::instrument(skip_all, fields(tris = tris.len(), density = voxel_density))]
    pub fn new(tris: &[Tri], edge_tris: &[EdgeTri], voxel_density: u32, use_sdf: bool) -> Result<Self> {
        if tris.is_empty() {
            return Err(Error::InvalidScene("no triangles to trace against".into()));
        }
        if tris.len() != edge_tris.len() {
            return Err(Error::invalid(format!(
                "{} triangles but {} edge forms",
                tris.len(),
                edge_tris.len()
            )));
        }

        let mut world_bound = Aabb::EMPTY;
        for tri in tris {
            world_bound.expand_by_box(&tri.aabb());
        }
        if !world_bound.min.is_finite() || !world_bound.max.is_finite() {
            return Err(Error::InvalidScene("non-finite vertex positions".into()));
        }
        let world_bound_expanded = world_bound.grown(EXPANDED_BOUND);
        let world_bound_mid = world_bound.grown(HALF_EXPANSION);

        let density = voxel_density.clamp(1, MAX_VOXEL_DENSITY);
        let dims = Self::estimate_voxel_dims(&world_bound_expanded, density);
        let voxel_size = world_bound_expanded.size() / dims.as_vec3();
        let max_test_dist = world_bound_expanded.longest_axis_size() * 3.0;

        let mut tracer = Self {
            voxels: Vec::new(),
            dims,
            voxel_size,
            world_bound,
            world_bound_mid,
            world_bound_expanded,
            max_test_dist,
            use_sdf,
            use_simd: true,
        };
        tracer.fill_voxels(tris, edge_tris);
        if use_sdf {
            calculate_sdf(&mut tracer.voxels, dims);
        }

        tracing::debug!(?dims, ?voxel_size, "voxel grid built");
        Ok(tracer)
    }

    /// Voxel counts per axis, proportional to the bound's aspect.
    pub fn estimate_voxel_dims(bound: &Aabb, density: u32) -> IVec3 {
        let size = bound.size();
        let longest = bound.longest_axis_size();
        let density = density as f32;
        let axis = |s: f32| {
            let n = if longest > 0.0 {
                (s / longest * density + 0.01) as i32
            } else {
                1
            };
            n.max(1)
        };
        IVec3::new(axis(size.x), axis(size.y), axis(size.z))
    }

    fn fill_voxels(&mut self, tris: &[Tri], edge_tris: &[EdgeTri]) {
        let count = (self.dims.x * self.dims.y * self.dims.z) as usize;
        self.voxels = vec![Voxel::default(); count];

        for (id, (tri, edge)) in tris.iter().zip(edge_tris).enumerate() {
            let bb = tri.aabb().grown(TRI_BIN_EPSILON);
            let lo = ((bb.min - self.world_bound_expanded.min) / self.voxel_size).floor().as_ivec3();
            let hi = ((bb.max - self.world_bound_expanded.min) / self.voxel_size).ceil().as_ivec3();
            let lo = lo.clamp(IVec3::ZERO, self.dims);
            let hi = hi.clamp(IVec3::ZERO, self.dims);

            for z in lo.z..hi.z {
                for y in lo.y..hi.y {
                    for x in lo.x..hi.x {
                        let i = self.index(IVec3::new(x, y, z));
                        self.voxels[i].add_triangle(edge, id as u32);
                    }
                }
            }
        }

        for v in self.voxels.iter_mut() {
            v.finalize();
        }
    }

    #[inline]
    fn index(&self, c: IVec3) -> usize {
        (c.z * self.dims.x * self.dims.y + c.y * self.dims.x + c.x) as usize
    }

    pub fn dims(&self) -> IVec3 {
        self.dims
    }

    pub fn voxel_size(&self) -> Vec3 {
        self.voxel_size
    }

    /// Bound of the triangles themselves.
    pub fn world_bound(&self) -> &Aabb {
        &self.world_bound
    }

    pub fn world_bound_mid(&self) -> &Aabb {
        &self.world_bound_mid
    }

    /// Bound covered by the grid.
    pub fn world_bound_expanded(&self) -> &Aabb {
        &self.world_bound_expanded
    }

    pub fn max_test_dist(&self) -> f32 {
        self.max_test_dist
    }

    /// Switch between the packed kernel and one scalar test per triangle.
    pub fn set_use_simd(&mut self, use_simd: bool) {
        self.use_simd = use_simd;
    }

    #[inline]
    pub fn voxel_within_bounds(&self, c: IVec3) -> bool {
        c.x >= 0 && c.y >= 0 && c.z >= 0 && c.x < self.dims.x && c.y < self.dims.y && c.z < self.dims.z
    }

    pub fn voxel(&self, c: IVec3) -> Option<&Voxel> {
        if self.voxel_within_bounds(c) {
            Some(&self.voxels[self.index(c)])
        } else {
            None
        }
    }

    /// Voxel holding world point `pt` (may be out of bounds).
    pub fn find_nearest_voxel(&self, pt: Vec3) -> IVec3 {
        ((pt - self.world_bound_expanded.min) / self.voxel_size).as_ivec3()
    }

    /// World distance expressed as a voxel count per axis, rounded up by one.
    pub fn distance_in_voxels(&self, dist: f32) -> IVec3 {
        if self.voxel_size.cmpeq(Vec3::ZERO).any() {
            return IVec3::ZERO;
        }
        let dist = dist.min(self.max_test_dist);
        (Vec3::splat(dist) / self.voxel_size).as_ivec3() + IVec3::ONE
    }

    /// Clip a ray that starts outside `aabb` onto it.
    ///
    /// Returns a point just inside the box on success.
    pub fn intersect_ray_aabb(ray: &Ray, aabb: &Aabb) -> Option<Vec3> {
        let mut nearest: Option<(f32, Vec3)> = None;
        for axis in 0..3 {
            let constant = if ray.d[axis] <= 0.0 {
                aabb.max[axis]
            } else {
                aabb.min[axis]
            };
            let Some(pt) = ray.intersect_aa_plane(axis, constant) else {
                continue;
            };
            if (pt - ray.o).dot(ray.d) < 0.0 || !aabb.contains_point(pt) {
                continue;
            }
            let dist_sq = (pt - ray.o).length_squared();
            if nearest.map_or(true, |(best, _)| dist_sq < best) {
                nearest = Some((dist_sq, pt));
            }
        }

        let (dist_sq, _) = nearest?;
        let pt = ray.o + ray.d * (dist_sq.sqrt() + HALF_EXPANSION);
        aabb.contains_point(pt).then_some(pt)
    }

    /// Convert a world ray into a walk starting at its first voxel.
    ///
    /// `None` when the ray never enters the grid.
    pub fn raytrace_start(&self, ray: &Ray) -> Option<VoxelWalk> {
        let mut o = ray.o;
        if !self.world_bound_expanded.contains_point(o) {
            o = Self::intersect_ray_aabb(ray, &self.world_bound_expanded)?;
        }

        let vo = (o - self.world_bound_expanded.min) / self.voxel_size;
        let vd = (ray.d / self.voxel_size).normalize_or_zero();
        if vd == Vec3::ZERO {
            return None;
        }
        let voxel = vo.floor().as_ivec3();
        if !self.voxel_within_bounds(voxel) {
            return None;
        }

        let steps_left = (self.dims.x + self.dims.y + self.dims.z + 3) as u32;
        Some(VoxelWalk {
            ray: Ray::new(vo, vd),
            voxel,
            steps_left,
        })
    }

    /// Visit the walk's current voxel and advance to the next one.
    ///
    /// Returns `None` once the walk leaves the grid. Every axis coordinate
    /// moves monotonically in the direction's sign, so a walk takes at most
    /// `dims.x + dims.y + dims.z` steps.
    pub fn raytrace<'a>(&'a self, walk: &mut VoxelWalk) -> Option<&'a Voxel> {
        if walk.steps_left == 0 || !self.voxel_within_bounds(walk.voxel) {
            return None;
        }
        walk.steps_left -= 1;

        let current = walk.voxel;
        let voxel = &self.voxels[self.index(current)];

        let radius = if self.use_sdf {
            voxel.sdf.saturating_sub(1).min(self.dims.max_element() as u32) as i32
        } else {
            0
        };
        let mins = (current - IVec3::splat(radius)).as_vec3();
        let maxs = (current + IVec3::splat(radius + 1)).as_vec3();

        let mut nearest: Option<(f32, usize, Vec3)> = None;
        for axis in 0..3 {
            let constant = if walk.ray.d[axis] >= 0.0 { maxs[axis] } else { mins[axis] };
            let Some(pt) = walk.ray.intersect_aa_plane(axis, constant) else {
                continue;
            };
            let dist_sq = (pt - walk.ray.o).length_squared();
            if nearest.map_or(true, |(best, _, _)| dist_sq < best) {
                nearest = Some((dist_sq, axis, pt));
            }
        }

        match nearest {
            Some((_, axis, pt)) => {
                walk.ray.o = pt;
                let positive = walk.ray.d[axis] >= 0.0;
                if radius == 0 {
                    walk.voxel[axis] += if positive { 1 } else { -1 };
                } else {
                    // leave the empty cube: land on the voxel holding the exit
                    // point, kept inside the cube's range on the other axes
                    let lo = current - IVec3::splat(radius);
                    let hi = current + IVec3::splat(radius);
                    let mut next = pt.floor().as_ivec3().clamp(lo, hi);
                    for a in 0..3 {
                        if walk.ray.d[a] >= 0.0 {
                            next[a] = next[a].max(current[a]);
                        } else {
                            next[a] = next[a].min(current[a]);
                        }
                    }
                    next[axis] = if positive { hi[axis] + 1 } else { lo[axis] - 1 };
                    walk.voxel = next;
                }
            }
            None => walk.steps_left = 0,
        }

        Some(voxel)
    }

    /// Nearest triangle hit along `ray`.
    ///
    /// With `voxel_range` set, the walk gives up when it strays that many
    /// voxels from the start before finding anything. Once something is hit,
    /// the walk continues only while a closer hit is still possible.
    pub fn find_intersect_ray(&self, ray: &Ray, voxel_range: Option<IVec3>) -> Option<TraceHit> {
        let mut walk = self.raytrace_start(ray)?;
        let start = walk.voxel;
        let pray = PackedRay::new(ray);

        let mut nearest_t = f32::MAX;
        let mut winner: Option<u32> = None;
        let mut terminate_sq: i32 = i32::MAX;

        while let Some(voxel) = self.raytrace(&mut walk) {
            for (group, packed) in voxel.packed.iter().enumerate() {
                let lane = if self.use_simd {
                    pray.intersect(packed, &mut nearest_t)
                } else {
                    scalar_intersect(ray, packed, &mut nearest_t)
                };
                if lane != 0 {
                    winner = Some(voxel.tri_id(group, lane - 1));
                    let hit_voxel = self.find_nearest_voxel(ray.at(nearest_t));
                    let len = (hit_voxel - start).as_vec3().length() as i32 + 2;
                    terminate_sq = len.saturating_mul(len).saturating_add(1);
                }
            }

            let offset = walk.voxel - start;
            if winner.is_none() {
                if let Some(range) = voxel_range {
                    if offset.abs().cmpgt(range).any() {
                        break;
                    }
                }
            } else if offset.length_squared() >= terminate_sq {
                break;
            }
        }

        winner.map(|tri_id| TraceHit { tri_id, t: nearest_t })
    }

    /// True when anything lies along `ray` within `max_dist`.
    pub fn test_intersect_ray(
        &self,
        ray: &Ray,
        max_dist: f32,
        voxel_range: Option<IVec3>,
        cull_backfaces: bool,
    ) -> bool {
        let Some(mut walk) = self.raytrace_start(ray) else {
            return false;
        };
        let start = walk.voxel;
        let pray = PackedRay::new(ray);

        while let Some(voxel) = self.raytrace(&mut walk) {
            for packed in &voxel.packed {
                let hit = match (self.use_simd, cull_backfaces) {
                    (true, true) => pray.intersect_test_cullbackfaces(packed, max_dist),
                    (true, false) => pray.intersect_test(packed, max_dist),
                    (false, cull) => scalar_test(ray, packed, max_dist, cull),
                };
                if hit {
                    return true;
                }
            }

            if let Some(range) = voxel_range {
                if (walk.voxel - start).abs().cmpgt(range).any() {
                    break;
                }
            }
        }
        false
    }

    /// Every voxel holding triangle `tri_id`, for diagnostics and tests.
    pub fn voxels_containing(&self, tri_id: u32) -> Vec<IVec3> {
        let mut out = Vec::new();
        for z in 0..self.dims.z {
            for y in 0..self.dims.y {
                for x in 0..self.dims.x {
                    let c = IVec3::new(x, y, z);
                    if self.voxels[self.index(c)].tri_ids.contains(&tri_id) {
                        out.push(c);
                    }
                }
            }
        }
        out
    }
}

/// Scalar equivalent of [`PackedRay::intersect`].
fn scalar_intersect(ray: &Ray, packed: &PackedTriangles, nearest_t: &mut f32) -> usize {
    let mut winner = 0;
    for lane in 0..4 {
        if packed.inactive.test(lane) {
            continue;
        }
        if let Some(t) = ray.test_intersect_edgeform(&packed.lane(lane)) {
            if t < *nearest_t {
                *nearest_t = t;
                winner = lane + 1;
            }
        }
    }
    winner
}

/// Scalar equivalent of the packed any-hit tests.
fn scalar_test(ray: &Ray, packed: &PackedTriangles, max_dist: f32, cull_backfaces: bool) -> bool {
    (0..4).any(|lane| {
        if packed.inactive.test(lane) {
            return false;
        }
        let tri = packed.lane(lane);
        if cull_backfaces && tri.edge1.dot(ray.d.cross(tri.edge2)) < INTERSECT_EPSILON {
            return false;
        }
        matches!(ray.test_intersect_edgeform(&tri), Some(t) if t <= max_dist)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_forms(tris: &[Tri]) -> Vec<EdgeTri> {
        tris.iter().map(Tri::to_edge_form).collect()
    }

    /// Floor quad at y = 0 plus a wall at x = 2.
    fn scene() -> Vec<Tri> {
        vec![
            Tri::new(Vec3::new(-2.0, 0.0, -2.0), Vec3::new(2.0, 0.0, -2.0), Vec3::new(-2.0, 0.0, 2.0)),
            Tri::new(Vec3::new(2.0, 0.0, -2.0), Vec3::new(2.0, 0.0, 2.0), Vec3::new(-2.0, 0.0, 2.0)),
            Tri::new(Vec3::new(2.0, 0.0, -2.0), Vec3::new(2.0, 3.0, -2.0), Vec3::new(2.0, 0.0, 2.0)),
            Tri::new(Vec3::new(2.0, 3.0, -2.0), Vec3::new(2.0, 3.0, 2.0), Vec3::new(2.0, 0.0, 2.0)),
        ]
    }

    fn tracer(use_sdf: bool) -> VoxelTracer {
        let tris = scene();
        VoxelTracer::new(&tris, &edge_forms(&tris), 16, use_sdf).unwrap()
    }

    #[test]
    fn test_empty_scene_fails() {
        assert!(VoxelTracer::new(&[], &[], 16, false).is_err());
    }

    #[test]
    fn test_dims_follow_aspect() {
        let bb = Aabb::new(Vec3::ZERO, Vec3::new(4.0, 1.0, 2.0));
        assert_eq!(VoxelTracer::estimate_voxel_dims(&bb, 8), IVec3::new(8, 2, 4));
        let flat = Aabb::new(Vec3::ZERO, Vec3::new(4.0, 0.0, 4.0));
        assert_eq!(VoxelTracer::estimate_voxel_dims(&flat, 8).y, 1);
    }

    #[test]
    fn test_nearest_hit_floor() {
        let t = tracer(false);
        let ray = Ray::new(Vec3::new(-1.0, 2.0, -1.5), Vec3::NEG_Y);
        let hit = t.find_intersect_ray(&ray, None).unwrap();
        assert_eq!(hit.tri_id, 0);
        assert!((hit.t - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_nearest_hit_from_outside_grid() {
        let t = tracer(false);
        let ray = Ray::new(Vec3::new(-10.0, 1.0, 0.5), Vec3::X);
        let hit = t.find_intersect_ray(&ray, None).unwrap();
        assert!(hit.tri_id == 2 || hit.tri_id == 3);
        assert!((hit.t - 12.0).abs() < 1e-3);
    }

    #[test]
    fn test_miss_and_range() {
        let t = tracer(false);
        let up = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::Y);
        assert!(t.find_intersect_ray(&up, None).is_none());
        assert!(!t.test_intersect_ray(&up, f32::MAX, None, false));

        let down = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::NEG_Y);
        assert!(t.test_intersect_ray(&down, 2.0, None, false));
        assert!(!t.test_intersect_ray(&down, 0.5, None, false));
    }

    #[test]
    fn test_any_hit_culls_backfaces() {
        let t = tracer(false);
        // floor normal (edge1 x edge2) points down
        let from_above = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::NEG_Y);
        let from_below = Ray::new(Vec3::new(0.0, -0.1, 0.0), Vec3::Y);
        assert!(!t.test_intersect_ray(&from_above, 5.0, None, true));
        assert!(t.test_intersect_ray(&from_below, 5.0, None, true));
    }

    #[test]
    fn test_walk_terminates() {
        let t = tracer(false);
        let limit = (t.dims().x + t.dims().y + t.dims().z) as usize + 3;
        for dir in [
            Vec3::new(1.0, 0.3, 0.2),
            Vec3::new(-0.2, -1.0, 0.7),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(-1.0, 1.0, -1.0),
        ] {
            let ray = Ray::new(Vec3::new(0.1, 0.5, 0.1), dir.normalize());
            let mut walk = t.raytrace_start(&ray).unwrap();
            let mut steps = 0;
            while t.raytrace(&mut walk).is_some() {
                steps += 1;
                assert!(steps <= limit);
            }
        }
    }

    #[test]
    fn test_sdf_matches_plain_walk() {
        let plain = tracer(false);
        let sdf = tracer(true);
        for i in 0..64 {
            let a = i as f32 * 0.37;
            let dir = Vec3::new(a.cos(), -0.4 - (i % 5) as f32 * 0.1, a.sin()).normalize();
            let ray = Ray::new(Vec3::new(-1.0 + (i % 7) as f32 * 0.3, 2.0, 0.2), dir);
            let h1 = plain.find_intersect_ray(&ray, None).map(|h| h.tri_id);
            let h2 = sdf.find_intersect_ray(&ray, None).map(|h| h.tri_id);
            assert_eq!(h1, h2, "ray {i}");
        }
    }

    #[test]
    fn test_scalar_path_matches_packed() {
        let packed = tracer(false);
        let mut scalar = tracer(false);
        scalar.set_use_simd(false);
        for i in 0..48 {
            let a = i as f32 * 0.53;
            let dir = Vec3::new(a.cos(), -0.7, a.sin() * 0.8).normalize();
            let ray = Ray::new(Vec3::new(0.3, 1.5, -0.4), dir);
            assert_eq!(packed.find_intersect_ray(&ray, None), scalar.find_intersect_ray(&ray, None));
            assert_eq!(
                packed.test_intersect_ray(&ray, 3.0, None, true),
                scalar.test_intersect_ray(&ray, 3.0, None, true)
            );
        }
    }

    #[test]
    fn test_distance_in_voxels() {
        let t = tracer(false);
        let d = t.distance_in_voxels(0.0);
        assert_eq!(d, IVec3::ONE);
        let far = t.distance_in_voxels(1.0e9);
        assert!(far.x <= t.dims().x * 3 + 1);
    }
}
