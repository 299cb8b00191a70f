//! World-space and UV-space triangles.

use crate::util::{Aabb, Plane, Vec2, Vec3};

/// Scale applied to both edges before the degenerate area test.
const DEGENERATE_EDGE_SCALE: f32 = 1024.0;

/// Triangle with three absolute positions.
///
/// Also used for per-vertex normals, which interpolate the same way.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tri {
    pub pos: [Vec3; 3],
}

/// Triangle stored as two edges from its first vertex.
///
/// Precomputed once per triangle so intersection tests skip the subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EdgeTri {
    /// `p1 - p0`
    pub edge1: Vec3,
    /// `p2 - p0`
    pub edge2: Vec3,
    /// `p0`
    pub origin: Vec3,
}

impl EdgeTri {
    /// Back to three absolute positions.
    pub fn to_tri(&self) -> Tri {
        Tri::new(self.origin, self.origin + self.edge1, self.origin + self.edge2)
    }
}

impl Tri {
    #[inline]
    pub const fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { pos: [a, b, c] }
    }

    #[inline]
    pub fn to_edge_form(&self) -> EdgeTri {
        EdgeTri {
            edge1: self.pos[1] - self.pos[0],
            edge2: self.pos[2] - self.pos[0],
            origin: self.pos[0],
        }
    }

    pub fn centre(&self) -> Vec3 {
        (self.pos[0] + self.pos[1] + self.pos[2]) / 3.0
    }

    /// Swap the first and last vertex.
    pub fn flip_winding(&mut self) {
        self.pos.swap(0, 2);
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.pos)
    }

    /// Barycentric `(u, v, w)` of `pt`, weights for `pos[0]`, `pos[1]`, `pos[2]`.
    ///
    /// `pt` is assumed to lie in the triangle's plane.
    pub fn find_barycentric(&self, pt: Vec3) -> Vec3 {
        let [a, b, c] = self.pos;
        let v0 = b - a;
        let v1 = c - a;
        let v2 = pt - a;
        let d00 = v0.dot(v0);
        let d01 = v0.dot(v1);
        let d11 = v1.dot(v1);
        let d20 = v2.dot(v0);
        let d21 = v2.dot(v1);
        let inv_denom = 1.0 / (d00 * d11 - d01 * d01);
        let v = (d11 * d20 - d01 * d21) * inv_denom;
        let w = (d00 * d21 - d01 * d20) * inv_denom;
        Vec3::new(1.0 - v - w, v, w)
    }

    #[inline]
    pub fn interpolate(&self, bary: Vec3) -> Vec3 {
        let [a, b, c] = self.pos;
        a * bary.x + b * bary.y + c * bary.z
    }

    /// Squared length of the edge cross product (four times the squared area).
    pub fn twice_area_squared(&self) -> f32 {
        let e1 = self.pos[1] - self.pos[0];
        let e2 = self.pos[2] - self.pos[0];
        e1.cross(e2).length_squared()
    }

    pub fn area(&self) -> f32 {
        self.twice_area_squared().sqrt() * 0.5
    }

    /// True when the (scaled) edge cross product is at or below `epsilon`.
    pub fn is_degenerate(&self, epsilon: f32) -> bool {
        let e1 = (self.pos[1] - self.pos[0]) * DEGENERATE_EDGE_SCALE;
        let e2 = (self.pos[2] - self.pos[0]) * DEGENERATE_EDGE_SCALE;
        e1.cross(e2).length_squared() <= epsilon
    }

    /// Face plane, clockwise winding facing the viewer.
    pub fn plane(&self) -> Plane {
        Plane::from_points(self.pos[0], self.pos[1], self.pos[2])
    }
}

/// True when every weight lies in `[0, 1]`.
#[inline]
pub fn barycentric_inside(bary: Vec3) -> bool {
    (0.0..=1.0).contains(&bary.x) && (0.0..=1.0).contains(&bary.y) && (0.0..=1.0).contains(&bary.z)
}

/// How far outside the triangle a barycentric lies: the worst weight's
/// distance from the centre of the unit range. Below 0.5 is inside.
#[inline]
pub fn barycentric_insideness(bary: Vec3) -> f32 {
    let d = (bary - Vec3::splat(0.5)).abs();
    d.max_element()
}

/// Triangle in lightmap UV space, parallel to [`Tri`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UvTri {
    pub uv: [Vec2; 3],
}

impl UvTri {
    #[inline]
    pub const fn new(a: Vec2, b: Vec2, c: Vec2) -> Self {
        Self { uv: [a, b, c] }
    }

    /// Barycentric of a UV point; `None` when the triangle has no area.
    pub fn find_barycentric(&self, pt: Vec2) -> Option<Vec3> {
        let [a, b, c] = self.uv;
        let v0 = b - a;
        let v1 = c - a;
        let v2 = pt - a;
        let d00 = v0.dot(v0);
        let d01 = v0.dot(v1);
        let d11 = v1.dot(v1);
        let d20 = v2.dot(v0);
        let d21 = v2.dot(v1);
        let denom = d00 * d11 - d01 * d01;
        if denom == 0.0 {
            return None;
        }
        let inv_denom = 1.0 / denom;
        let v = (d11 * d20 - d01 * d21) * inv_denom;
        let w = (d00 * d21 - d01 * d20) * inv_denom;
        Some(Vec3::new(1.0 - v - w, v, w))
    }

    /// Barycentric of `pt` if it lies inside (edges inclusive).
    pub fn find_barycentric_inside(&self, pt: Vec2) -> Option<Vec3> {
        self.find_barycentric(pt).filter(|b| barycentric_inside(*b))
    }

    pub fn interpolate(&self, bary: Vec3) -> Vec2 {
        self.uv[0] * bary.x + self.uv[1] * bary.y + self.uv[2] * bary.z
    }

    /// Signed doubled area; negative for clockwise winding.
    pub fn signed_twice_area(&self) -> f32 {
        let e1 = self.uv[1] - self.uv[0];
        let e2 = self.uv[2] - self.uv[0];
        e1.perp_dot(e2)
    }

    pub fn is_winding_cw(&self) -> bool {
        self.signed_twice_area() < 0.0
    }

    pub fn flip_winding(&mut self) {
        self.uv.swap(0, 2);
    }

    /// Near-zero area in UV space.
    pub fn is_degenerate(&self, epsilon: f32) -> bool {
        let e1 = (self.uv[1] - self.uv[0]) * DEGENERATE_EDGE_SCALE;
        let e2 = (self.uv[2] - self.uv[0]) * DEGENERATE_EDGE_SCALE;
        e1.perp_dot(e2).abs() <= epsilon
    }

    /// Min and max corners.
    pub fn bounds(&self) -> (Vec2, Vec2) {
        let min = self.uv[0].min(self.uv[1]).min(self.uv[2]);
        let max = self.uv[0].max(self.uv[1]).max(self.uv[2]);
        (min, max)
    }

    /// True when the triangle overlaps the square covered by texel `(x, y)`
    /// of a `width` x `height` image, edges inclusive.
    pub fn contains_texel(&self, x: i32, y: i32, width: u32, height: u32) -> bool {
        let cell = Vec2::new(1.0 / width as f32, 1.0 / height as f32);
        let lo = Vec2::new(x as f32, y as f32) * cell;
        let hi = lo + cell;

        let (tmin, tmax) = self.bounds();
        if tmax.x < lo.x || tmin.x > hi.x || tmax.y < lo.y || tmin.y > hi.y {
            return false;
        }

        let corners = [lo, Vec2::new(hi.x, lo.y), hi, Vec2::new(lo.x, hi.y)];
        for i in 0..3 {
            let a = self.uv[i];
            let b = self.uv[(i + 1) % 3];
            let c = self.uv[(i + 2) % 3];
            let axis = (b - a).perp();
            let tri_side = axis.dot(c - a);
            if tri_side == 0.0 {
                continue;
            }
            // separated if every corner lies strictly on the far side of this edge
            if corners.iter().all(|&p| axis.dot(p - a) * tri_side < 0.0) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tri() -> Tri {
        Tri::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.5, 0.0),
            Vec3::new(0.3, 0.1, 3.0),
        )
    }

    #[test]
    fn test_barycentric_corners() {
        let t = sample_tri();
        let b = t.find_barycentric(t.pos[1]);
        assert!((b - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);
        assert!((t.interpolate(b) - t.pos[1]).length() < 1e-5);
    }

    #[test]
    fn test_edge_form_round_trip() {
        let t = sample_tri();
        let e = t.to_edge_form();
        assert_eq!(e.origin, t.pos[0]);
        assert_eq!(e.edge1, t.pos[1] - t.pos[0]);
        assert!((e.to_tri().pos[2] - t.pos[2]).length() < 1e-6);
    }

    #[test]
    fn test_degenerate_and_area() {
        let flat = Tri::new(Vec3::ZERO, Vec3::X, Vec3::X * 2.0);
        assert!(flat.is_degenerate(0.0001));
        assert_eq!(flat.area(), 0.0);

        let t = Tri::new(Vec3::ZERO, Vec3::X, Vec3::Z);
        assert!(!t.is_degenerate(0.0001));
        assert!((t.area() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_uv_winding_and_contains() {
        let mut uvt = UvTri::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0));
        assert!(!uvt.is_winding_cw());
        uvt.flip_winding();
        assert!(uvt.is_winding_cw());

        assert!(uvt.find_barycentric_inside(Vec2::new(0.25, 0.25)).is_some());
        assert!(uvt.find_barycentric_inside(Vec2::new(0.75, 0.75)).is_none());
    }

    #[test]
    fn test_uv_degenerate_has_no_barycentric() {
        let uvt = UvTri::new(Vec2::splat(0.5), Vec2::splat(0.5), Vec2::splat(0.5));
        assert!(uvt.is_degenerate(0.0001));
        assert!(uvt.find_barycentric(Vec2::splat(0.5)).is_none());
    }

    #[test]
    fn test_contains_texel() {
        // covers the lower left half of a 4x4 image
        let uvt = UvTri::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0));
        assert!(uvt.contains_texel(0, 0, 4, 4));
        // the diagonal touches the corner of texel (2, 1)
        assert!(uvt.contains_texel(2, 1, 4, 4));
        assert!(!uvt.contains_texel(3, 3, 4, 4));
        // only the corner touches the diagonal, edges are inclusive
        assert!(uvt.contains_texel(2, 2, 4, 4));
    }

    #[test]
    fn test_insideness() {
        assert!(barycentric_insideness(Vec3::new(0.3, 0.3, 0.4)) < 0.5);
        assert!(barycentric_insideness(Vec3::new(-0.2, 0.6, 0.6)) > 0.5);
    }
}
