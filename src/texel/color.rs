//! Float RGB color used by every accumulation image.

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::util::Vec3;

/// Linear RGB, unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct FColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl FColor {
    pub const BLACK: Self = Self::splat(0.0);
    pub const WHITE: Self = Self::splat(1.0);
    pub const MAGENTA: Self = Self::new(1.0, 0.0, 1.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    #[inline]
    pub const fn splat(v: f32) -> Self {
        Self { r: v, g: v, b: v }
    }

    pub fn from_vec3(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }

    #[inline]
    pub fn max_channel(self) -> f32 {
        self.r.max(self.g).max(self.b)
    }

    pub fn is_black(self) -> bool {
        self.r == 0.0 && self.g == 0.0 && self.b == 0.0
    }

    /// Per-channel `powf`.
    pub fn powf(self, e: f32) -> Self {
        Self::new(self.r.powf(e), self.g.powf(e), self.b.powf(e))
    }

    pub fn max(self, o: Self) -> Self {
        Self::new(self.r.max(o.r), self.g.max(o.g), self.b.max(o.b))
    }

    /// Linear blend towards `o` by `t`.
    pub fn lerp(self, o: Self, t: f32) -> Self {
        self + (o - self) * t
    }
}

impl From<[f32; 3]> for FColor {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl Add for FColor {
    type Output = Self;
    #[inline]
    fn add(self, o: Self) -> Self {
        Self::new(self.r + o.r, self.g + o.g, self.b + o.b)
    }
}

impl AddAssign for FColor {
    #[inline]
    fn add_assign(&mut self, o: Self) {
        *self = *self + o;
    }
}

impl Sub for FColor {
    type Output = Self;
    #[inline]
    fn sub(self, o: Self) -> Self {
        Self::new(self.r - o.r, self.g - o.g, self.b - o.b)
    }
}

impl SubAssign for FColor {
    #[inline]
    fn sub_assign(&mut self, o: Self) {
        *self = *self - o;
    }
}

impl Mul for FColor {
    type Output = Self;
    #[inline]
    fn mul(self, o: Self) -> Self {
        Self::new(self.r * o.r, self.g * o.g, self.b * o.b)
    }
}

impl MulAssign for FColor {
    #[inline]
    fn mul_assign(&mut self, o: Self) {
        *self = *self * o;
    }
}

impl Mul<f32> for FColor {
    type Output = Self;
    #[inline]
    fn mul(self, s: f32) -> Self {
        Self::new(self.r * s, self.g * s, self.b * s)
    }
}

impl MulAssign<f32> for FColor {
    #[inline]
    fn mul_assign(&mut self, s: f32) {
        *self = *self * s;
    }
}

impl Div<f32> for FColor {
    type Output = Self;
    #[inline]
    fn div(self, s: f32) -> Self {
        Self::new(self.r / s, self.g / s, self.b / s)
    }
}

impl DivAssign<f32> for FColor {
    #[inline]
    fn div_assign(&mut self, s: f32) {
        *self = *self / s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let mut c = FColor::new(1.0, 2.0, 3.0);
        c += FColor::splat(1.0);
        assert_eq!(c, FColor::new(2.0, 3.0, 4.0));
        assert_eq!(c * 0.5, FColor::new(1.0, 1.5, 2.0));
        assert_eq!(c * FColor::new(0.0, 1.0, 2.0), FColor::new(0.0, 3.0, 8.0));
        assert_eq!(c.max_channel(), 4.0);
    }

    #[test]
    fn test_lerp() {
        let a = FColor::BLACK;
        let b = FColor::splat(2.0);
        assert_eq!(a.lerp(b, 0.25), FColor::splat(0.5));
        assert_eq!(b.lerp(a, 1.0), FColor::BLACK);
    }
}
