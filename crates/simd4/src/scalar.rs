//! Array-backed lanes, used on targets without SSE and as a reference.

use std::fmt::{self, Debug, Formatter};
use std::ops::{Add, BitAnd, BitOr, Div, Mul, Neg, Not, Sub};

/// Four 32-bit floats.
#[derive(Clone, Copy, Default, PartialEq)]
pub struct F32x4(pub [f32; 4]);

impl F32x4 {
    #[inline]
    pub fn new(a: f32, b: f32, c: f32, d: f32) -> F32x4 {
        F32x4([a, b, c, d])
    }

    #[inline]
    pub fn splat(x: f32) -> F32x4 {
        F32x4([x; 4])
    }

    #[inline]
    pub fn from_array(a: [f32; 4]) -> F32x4 {
        F32x4(a)
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        self.0
    }

    #[inline]
    pub fn lane(self, i: usize) -> f32 {
        self.0[i]
    }

    #[inline]
    pub fn with_lane(mut self, i: usize, v: f32) -> F32x4 {
        self.0[i] = v;
        self
    }

    #[inline]
    fn cmp(self, other: F32x4, f: impl Fn(f32, f32) -> bool) -> U32x4 {
        let mut out = [0u32; 4];
        for i in 0..4 {
            if f(self.0[i], other.0[i]) {
                out[i] = !0;
            }
        }
        U32x4(out)
    }

    #[inline]
    pub fn packed_lt(self, other: F32x4) -> U32x4 {
        self.cmp(other, |a, b| a < b)
    }

    #[inline]
    pub fn packed_gt(self, other: F32x4) -> U32x4 {
        self.cmp(other, |a, b| a > b)
    }

    #[inline]
    pub fn packed_le(self, other: F32x4) -> U32x4 {
        self.cmp(other, |a, b| a <= b)
    }

    #[inline]
    pub fn packed_ge(self, other: F32x4) -> U32x4 {
        self.cmp(other, |a, b| a >= b)
    }

    #[inline]
    fn zip(self, other: F32x4, f: impl Fn(f32, f32) -> f32) -> F32x4 {
        F32x4([
            f(self.0[0], other.0[0]),
            f(self.0[1], other.0[1]),
            f(self.0[2], other.0[2]),
            f(self.0[3], other.0[3]),
        ])
    }
}

impl Add for F32x4 {
    type Output = F32x4;
    #[inline]
    fn add(self, other: F32x4) -> F32x4 {
        self.zip(other, |a, b| a + b)
    }
}

impl Sub for F32x4 {
    type Output = F32x4;
    #[inline]
    fn sub(self, other: F32x4) -> F32x4 {
        self.zip(other, |a, b| a - b)
    }
}

impl Mul for F32x4 {
    type Output = F32x4;
    #[inline]
    fn mul(self, other: F32x4) -> F32x4 {
        self.zip(other, |a, b| a * b)
    }
}

impl Div for F32x4 {
    type Output = F32x4;
    #[inline]
    fn div(self, other: F32x4) -> F32x4 {
        self.zip(other, |a, b| a / b)
    }
}

impl Neg for F32x4 {
    type Output = F32x4;
    #[inline]
    fn neg(self) -> F32x4 {
        F32x4([-self.0[0], -self.0[1], -self.0[2], -self.0[3]])
    }
}

impl Debug for F32x4 {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "<{}, {}, {}, {}>", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// Four lane masks, all bits set for true.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct U32x4(pub [u32; 4]);

impl U32x4 {
    #[inline]
    pub fn from_bools(b: [bool; 4]) -> U32x4 {
        U32x4([
            if b[0] { !0 } else { 0 },
            if b[1] { !0 } else { 0 },
            if b[2] { !0 } else { 0 },
            if b[3] { !0 } else { 0 },
        ])
    }

    /// One bit per lane, lane 0 in bit 0.
    #[inline]
    pub fn bits(self) -> u32 {
        let mut out = 0;
        for i in 0..4 {
            out |= (self.0[i] >> 31) << i;
        }
        out
    }

    #[inline]
    pub fn test(self, lane: usize) -> bool {
        self.0[lane] != 0
    }

    #[inline]
    pub fn all(self) -> bool {
        self.bits() == 0xf
    }

    #[inline]
    pub fn any(self) -> bool {
        self.bits() != 0
    }
}

impl BitAnd for U32x4 {
    type Output = U32x4;
    #[inline]
    fn bitand(self, other: U32x4) -> U32x4 {
        U32x4([
            self.0[0] & other.0[0],
            self.0[1] & other.0[1],
            self.0[2] & other.0[2],
            self.0[3] & other.0[3],
        ])
    }
}

impl BitOr for U32x4 {
    type Output = U32x4;
    #[inline]
    fn bitor(self, other: U32x4) -> U32x4 {
        U32x4([
            self.0[0] | other.0[0],
            self.0[1] | other.0[1],
            self.0[2] | other.0[2],
            self.0[3] | other.0[3],
        ])
    }
}

impl Not for U32x4 {
    type Output = U32x4;
    #[inline]
    fn not(self) -> U32x4 {
        U32x4([!self.0[0], !self.0[1], !self.0[2], !self.0[3]])
    }
}

impl Debug for U32x4 {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "<{:#x}, {:#x}, {:#x}, {:#x}>", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}
