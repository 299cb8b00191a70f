//! Four-lane f32 vector math.
//!
//! On `x86_64` with SSE2 the lanes live in a single `__m128` register;
//! every other target, and any build with `SIMD4_FORCE_SCALAR` set, uses
//! the array-backed [`scalar`] implementation. Both backends
//! use plain IEEE single precision add/sub/mul/div (no reciprocal
//! approximations, no fused multiply-add), so a calculation written
//! against [`F32x4`] produces bit-identical lanes on either backend and
//! matches the equivalent scalar `f32` expression evaluated in the same
//! order.

pub mod scalar;

#[cfg(simd4_sse2)]
pub mod x86;

#[cfg(simd4_sse2)]
pub use x86::{F32x4, U32x4};

#[cfg(not(simd4_sse2))]
pub use scalar::{F32x4, U32x4};

use std::ops::Sub;

/// Name of the backend selected for this target.
pub const BACKEND: &str = if cfg!(simd4_sse2) { "sse2" } else { "scalar" };

/// Three [`F32x4`] components: four 3D vectors in structure-of-arrays form.
#[derive(Clone, Copy, Debug)]
pub struct Vec3x4 {
    pub x: F32x4,
    pub y: F32x4,
    pub z: F32x4,
}

impl Default for Vec3x4 {
    fn default() -> Self {
        Self::splat([0.0; 3])
    }
}

impl Vec3x4 {
    #[inline]
    pub fn new(x: F32x4, y: F32x4, z: F32x4) -> Self {
        Self { x, y, z }
    }

    /// Broadcast one vector to all four lanes.
    #[inline]
    pub fn splat(v: [f32; 3]) -> Self {
        Self {
            x: F32x4::splat(v[0]),
            y: F32x4::splat(v[1]),
            z: F32x4::splat(v[2]),
        }
    }

    /// Write `v` into a single lane.
    #[inline]
    pub fn set_lane(&mut self, lane: usize, v: [f32; 3]) {
        self.x = self.x.with_lane(lane, v[0]);
        self.y = self.y.with_lane(lane, v[1]);
        self.z = self.z.with_lane(lane, v[2]);
    }

    #[inline]
    pub fn lane(&self, lane: usize) -> [f32; 3] {
        [self.x.lane(lane), self.y.lane(lane), self.z.lane(lane)]
    }

    /// Cross product, component order `a.y*b.z - b.y*a.z` etc.
    #[inline]
    pub fn cross(self, rhs: Self) -> Self {
        Self {
            x: self.y * rhs.z - rhs.y * self.z,
            y: self.z * rhs.x - rhs.z * self.x,
            z: self.x * rhs.y - rhs.x * self.y,
        }
    }

    /// Dot product, summed left to right.
    #[inline]
    pub fn dot(self, rhs: Self) -> F32x4 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }
}

impl Sub for Vec3x4 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_matches_scalar_order() {
        let a = [1.5f32, -2.25, 0.125];
        let b = [0.3f32, 4.0, -1.75];
        let c = Vec3x4::splat(a).cross(Vec3x4::splat(b)).lane(2);
        let expected = [
            a[1] * b[2] - b[1] * a[2],
            a[2] * b[0] - b[2] * a[0],
            a[0] * b[1] - b[0] * a[1],
        ];
        assert_eq!(c, expected);
    }

    #[test]
    fn test_dot_and_set_lane() {
        let mut v = Vec3x4::default();
        v.set_lane(1, [1.0, 2.0, 3.0]);
        let d = v.dot(Vec3x4::splat([1.0, 1.0, 1.0])).to_array();
        assert_eq!(d, [0.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn test_backend_matches_target() {
        if cfg!(simd4_sse2) {
            assert!(cfg!(target_arch = "x86_64"));
            assert_eq!(BACKEND, "sse2");
        } else {
            assert_eq!(BACKEND, "scalar");
        }
        assert_eq!(F32x4::splat(2.0).to_array(), [2.0; 4]);
    }

    #[cfg(simd4_sse2)]
    #[test]
    fn test_backends_agree() {
        let a = [0.1f32, -3.5, 7.25, 1e-7];
        let b = [3.0f32, 0.7, -0.001, 2.0];

        let sa = scalar::F32x4::from_array(a);
        let sb = scalar::F32x4::from_array(b);
        let xa = x86::F32x4::from_array(a);
        let xb = x86::F32x4::from_array(b);

        assert_eq!((sa * sb - sa).to_array(), (xa * xb - xa).to_array());
        assert_eq!((sa / sb).to_array(), (xa / xb).to_array());
        assert_eq!(sa.packed_lt(sb).bits(), xa.packed_lt(xb).bits());
        assert_eq!(sa.packed_ge(sb).bits(), xa.packed_ge(xb).bits());
        assert_eq!(
            (sa.packed_gt(sb) | sa.packed_le(scalar::F32x4::splat(0.0))).bits(),
            (xa.packed_gt(xb) | xa.packed_le(x86::F32x4::splat(0.0))).bits()
        );
    }
}
