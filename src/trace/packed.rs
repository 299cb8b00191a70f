//! Four-wide ray / triangle intersection.
//!
//! [`PackedTriangles`] holds up to four edge-form triangles in
//! structure-of-arrays layout; [`PackedRay`] tests one ray against all four
//! lanes at once. The rejection predicate is evaluated in the same order and
//! with the same epsilon as [`Ray::test_intersect_edgeform`], so a lane passes
//! exactly when the scalar test on that triangle hits.

use simd4::{F32x4, U32x4, Vec3x4};

use crate::geom::{EdgeTri, Ray, INTERSECT_EPSILON};

/// Up to four triangles in edge form, one per lane.
#[derive(Debug, Clone, Copy)]
pub struct PackedTriangles {
    pub e1: Vec3x4,
    pub e2: Vec3x4,
    pub v0: Vec3x4,
    /// All bits set for lanes that must never report a hit.
    pub inactive: U32x4,
}

impl Default for PackedTriangles {
    fn default() -> Self {
        Self {
            e1: Vec3x4::default(),
            e2: Vec3x4::default(),
            v0: Vec3x4::default(),
            inactive: U32x4::default(),
        }
    }
}

impl PackedTriangles {
    /// Fill lane `lane` (0..4) with a triangle.
    pub fn set(&mut self, lane: usize, tri: &EdgeTri) {
        debug_assert!(lane < 4);
        self.e1.set_lane(lane, tri.edge1.to_array());
        self.e2.set_lane(lane, tri.edge2.to_array());
        self.v0.set_lane(lane, tri.origin.to_array());
    }

    /// Mark lanes `>= active_count` as permanently inactive.
    pub fn finalize(&mut self, active_count: usize) {
        let flags = [0usize, 1, 2, 3].map(|lane| lane >= active_count);
        self.inactive = U32x4::from_bools(flags);
    }

    /// Edge form stored in `lane`.
    pub fn lane(&self, lane: usize) -> EdgeTri {
        EdgeTri {
            edge1: self.e1.lane(lane).into(),
            edge2: self.e2.lane(lane).into(),
            origin: self.v0.lane(lane).into(),
        }
    }

    /// Pack a run of up to four triangles.
    pub fn from_tris(tris: &[EdgeTri]) -> Self {
        let mut packed = Self::default();
        for (lane, tri) in tris.iter().take(4).enumerate() {
            packed.set(lane, tri);
        }
        packed.finalize(tris.len().min(4));
        packed
    }
}

/// Per-lane Möller–Trumbore results.
struct LaneResults {
    det: F32x4,
    t: F32x4,
    failed: U32x4,
}

/// One ray broadcast to all four lanes.
#[derive(Debug, Clone, Copy)]
pub struct PackedRay {
    pub origin: Vec3x4,
    pub direction: Vec3x4,
}

impl PackedRay {
    pub fn new(ray: &Ray) -> Self {
        Self {
            origin: Vec3x4::splat(ray.o.to_array()),
            direction: Vec3x4::splat(ray.d.to_array()),
        }
    }

    #[inline]
    fn evaluate(&self, tris: &PackedTriangles) -> LaneResults {
        let eps = F32x4::splat(INTERSECT_EPSILON);
        let zero = F32x4::splat(0.0);
        let one = F32x4::splat(1.0);

        let p = self.direction.cross(tris.e2);
        let det = tris.e1.dot(p);
        let inv_det = one / det;

        let s = self.origin - tris.v0;
        let u = s.dot(p) * inv_det;

        let q = s.cross(tris.e1);
        let v = self.direction.dot(q) * inv_det;
        let t = tris.e2.dot(q) * inv_det;

        let mut failed = det.packed_gt(-eps) & det.packed_lt(eps);
        failed = failed | u.packed_lt(zero) | u.packed_gt(one);
        failed = failed | v.packed_lt(zero) | (u + v).packed_gt(one);
        failed = failed | !t.packed_gt(eps);
        failed = failed | tris.inactive;

        LaneResults { det, t, failed }
    }

    /// Nearest-hit accumulation.
    ///
    /// Returns the winning lane plus one, or 0 when no lane hits closer than
    /// `*nearest_t`. On a win `*nearest_t` is updated.
    pub fn intersect(&self, tris: &PackedTriangles, nearest_t: &mut f32) -> usize {
        let res = self.evaluate(tris);
        let passed = !res.failed;
        if !passed.any() {
            return 0;
        }

        let t = res.t.to_array();
        let mut winner = 0;
        for (lane, &lane_t) in t.iter().enumerate() {
            if passed.test(lane) && lane_t < *nearest_t {
                *nearest_t = lane_t;
                winner = lane + 1;
            }
        }
        winner
    }

    /// Any-hit test within `max_dist`.
    pub fn intersect_test(&self, tris: &PackedTriangles, max_dist: f32) -> bool {
        let res = self.evaluate(tris);
        let within = res.t.packed_le(F32x4::splat(max_dist));
        (!res.failed & within).any()
    }

    /// Any-hit test that ignores back faces.
    ///
    /// The front face is the side `edge1 x edge2` points to.
    pub fn intersect_test_cullbackfaces(&self, tris: &PackedTriangles, max_dist: f32) -> bool {
        let res = self.evaluate(tris);
        let backface = res.det.packed_lt(F32x4::splat(INTERSECT_EPSILON));
        let within = res.t.packed_le(F32x4::splat(max_dist));
        (!(res.failed | backface) & within).any()
    }
}
