//! Rays and single-triangle intersection.

use super::tri::{EdgeTri, Tri};
use crate::util::Vec3;

/// Determinant / distance epsilon of the Möller–Trumbore test.
pub const INTERSECT_EPSILON: f32 = 0.000001;

/// Direction component below which a ray never reaches an axis aligned plane.
pub const AA_PLANE_EPSILON: f32 = 0.0001;

/// Smallest squared direction length accepted by [`Ray::try_new`].
const MIN_DIR_LENGTH_SQ: f32 = 1e-12;

/// Origin plus direction. The direction is expected to be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ray {
    pub o: Vec3,
    pub d: Vec3,
}

impl Ray {
    #[inline]
    pub const fn new(o: Vec3, d: Vec3) -> Self {
        Self { o, d }
    }

    /// Build a ray, normalizing `d`. Rejects (near) zero directions.
    pub fn try_new(o: Vec3, d: Vec3) -> Option<Self> {
        let sl = d.length_squared();
        if !(sl > MIN_DIR_LENGTH_SQ) || !sl.is_finite() {
            return None;
        }
        Some(Self { o, d: d / sl.sqrt() })
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.o + self.d * t
    }

    /// Möller–Trumbore against three raw vertices, no backface culling.
    ///
    /// Returns the hit distance.
    pub fn test_intersect(&self, tri: &Tri) -> Option<f32> {
        let [a, b, c] = tri.pos;
        self.intersect_edges(b - a, c - a, a)
    }

    /// Same math as [`Ray::test_intersect`] on a precomputed edge form.
    #[inline]
    pub fn test_intersect_edgeform(&self, tri: &EdgeTri) -> Option<f32> {
        self.intersect_edges(tri.edge1, tri.edge2, tri.origin)
    }

    #[inline]
    fn intersect_edges(&self, e1: Vec3, e2: Vec3, a: Vec3) -> Option<f32> {
        let p = self.d.cross(e2);
        let det = e1.dot(p);

        if det > -INTERSECT_EPSILON && det < INTERSECT_EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        let t_vec = self.o - a;
        let u = t_vec.dot(p) * inv_det;
        if u < 0.0 || u > 1.0 {
            return None;
        }

        let q = t_vec.cross(e1);
        let v = self.d.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = e2.dot(q) * inv_det;
        if t > INTERSECT_EPSILON {
            Some(t)
        } else {
            None
        }
    }

    /// Barycentric coordinates of the hit at distance `t`.
    pub fn find_intersect(&self, tri: &Tri, t: f32) -> Vec3 {
        tri.find_barycentric(self.at(t))
    }

    /// Point where the ray crosses the plane `p[axis] == constant`.
    ///
    /// `None` when the direction is (nearly) parallel to the plane.
    pub fn intersect_aa_plane(&self, axis: usize, constant: f32) -> Option<Vec3> {
        let d = self.d[axis];
        if d.abs() < AA_PLANE_EPSILON {
            return None;
        }
        let t = (constant - self.o[axis]) / d;
        let mut pt = self.o + self.d * t;
        pt[axis] = constant;
        Some(pt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_tri() -> Tri {
        Tri::new(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 0.0, -1.0), Vec3::new(0.0, 0.0, 1.0))
    }

    #[test]
    fn test_hit_from_above_and_below() {
        let tri = floor_tri();
        let down = Ray::new(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y);
        let t = down.test_intersect(&tri).unwrap();
        assert!((t - 2.0).abs() < 1e-6);

        // no culling in the single triangle test
        let up = Ray::new(Vec3::new(0.0, -3.0, 0.0), Vec3::Y);
        assert!((up.test_intersect(&tri).unwrap() - 3.0).abs() < 1e-6);

        // behind the origin
        let away = Ray::new(Vec3::new(0.0, 2.0, 0.0), Vec3::Y);
        assert!(away.test_intersect(&tri).is_none());
    }

    #[test]
    fn test_parallel_ray_misses() {
        let tri = floor_tri();
        let r = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::X);
        assert!(r.test_intersect(&tri).is_none());
        assert!(r.test_intersect_edgeform(&tri.to_edge_form()).is_none());
    }

    #[test]
    fn test_find_intersect_barycentric() {
        let tri = floor_tri();
        let r = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::NEG_Y);
        let t = r.test_intersect(&tri).unwrap();
        let bary = r.find_intersect(&tri, t);
        assert!((tri.interpolate(bary) - Vec3::ZERO).length() < 1e-5);
        assert!((bary.x + bary.y + bary.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_try_new_rejects_zero() {
        assert!(Ray::try_new(Vec3::ZERO, Vec3::ZERO).is_none());
        let r = Ray::try_new(Vec3::ZERO, Vec3::new(0.0, 3.0, 4.0)).unwrap();
        assert!((r.d.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_aa_plane() {
        let r = Ray::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0).normalize());
        let pt = r.intersect_aa_plane(0, 2.0).unwrap();
        assert!((pt - Vec3::new(2.0, 2.0, 0.0)).length() < 1e-5);
        assert!(r.intersect_aa_plane(2, 1.0).is_none());
    }
}
