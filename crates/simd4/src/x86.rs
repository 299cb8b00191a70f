//! SSE2 lanes. SSE2 is part of the `x86_64` baseline so no runtime
//! detection is needed.

use std::fmt::{self, Debug, Formatter};
use std::ops::{Add, BitAnd, BitOr, Div, Mul, Neg, Not, Sub};

use std::arch::x86_64 as x86;
use std::arch::x86_64::{__m128, __m128i};

/// Four 32-bit floats.
#[derive(Clone, Copy)]
pub struct F32x4(pub __m128);

impl F32x4 {
    #[inline]
    pub fn new(a: f32, b: f32, c: f32, d: f32) -> F32x4 {
        unsafe { F32x4(x86::_mm_setr_ps(a, b, c, d)) }
    }

    #[inline]
    pub fn splat(x: f32) -> F32x4 {
        unsafe { F32x4(x86::_mm_set1_ps(x)) }
    }

    #[inline]
    pub fn from_array(a: [f32; 4]) -> F32x4 {
        unsafe { F32x4(x86::_mm_loadu_ps(a.as_ptr())) }
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        let mut out = [0.0f32; 4];
        unsafe { x86::_mm_storeu_ps(out.as_mut_ptr(), self.0) };
        out
    }

    #[inline]
    pub fn lane(self, i: usize) -> f32 {
        self.to_array()[i]
    }

    #[inline]
    pub fn with_lane(self, i: usize, v: f32) -> F32x4 {
        let mut a = self.to_array();
        a[i] = v;
        F32x4::from_array(a)
    }

    #[inline]
    pub fn packed_lt(self, other: F32x4) -> U32x4 {
        unsafe { U32x4(x86::_mm_castps_si128(x86::_mm_cmplt_ps(self.0, other.0))) }
    }

    #[inline]
    pub fn packed_gt(self, other: F32x4) -> U32x4 {
        unsafe { U32x4(x86::_mm_castps_si128(x86::_mm_cmpgt_ps(self.0, other.0))) }
    }

    #[inline]
    pub fn packed_le(self, other: F32x4) -> U32x4 {
        unsafe { U32x4(x86::_mm_castps_si128(x86::_mm_cmple_ps(self.0, other.0))) }
    }

    #[inline]
    pub fn packed_ge(self, other: F32x4) -> U32x4 {
        unsafe { U32x4(x86::_mm_castps_si128(x86::_mm_cmpge_ps(self.0, other.0))) }
    }
}

impl Default for F32x4 {
    #[inline]
    fn default() -> F32x4 {
        unsafe { F32x4(x86::_mm_setzero_ps()) }
    }
}

impl PartialEq for F32x4 {
    #[inline]
    fn eq(&self, other: &F32x4) -> bool {
        self.to_array() == other.to_array()
    }
}

impl Add for F32x4 {
    type Output = F32x4;
    #[inline]
    fn add(self, other: F32x4) -> F32x4 {
        unsafe { F32x4(x86::_mm_add_ps(self.0, other.0)) }
    }
}

impl Sub for F32x4 {
    type Output = F32x4;
    #[inline]
    fn sub(self, other: F32x4) -> F32x4 {
        unsafe { F32x4(x86::_mm_sub_ps(self.0, other.0)) }
    }
}

impl Mul for F32x4 {
    type Output = F32x4;
    #[inline]
    fn mul(self, other: F32x4) -> F32x4 {
        unsafe { F32x4(x86::_mm_mul_ps(self.0, other.0)) }
    }
}

impl Div for F32x4 {
    type Output = F32x4;
    #[inline]
    fn div(self, other: F32x4) -> F32x4 {
        unsafe { F32x4(x86::_mm_div_ps(self.0, other.0)) }
    }
}

impl Neg for F32x4 {
    type Output = F32x4;
    #[inline]
    fn neg(self) -> F32x4 {
        unsafe { F32x4(x86::_mm_xor_ps(self.0, x86::_mm_set1_ps(-0.0))) }
    }
}

impl Debug for F32x4 {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let a = self.to_array();
        write!(f, "<{}, {}, {}, {}>", a[0], a[1], a[2], a[3])
    }
}

/// Four lane masks, all bits set for true.
#[derive(Clone, Copy)]
pub struct U32x4(pub __m128i);

impl U32x4 {
    #[inline]
    pub fn from_bools(b: [bool; 4]) -> U32x4 {
        let l = |v: bool| if v { -1i32 } else { 0 };
        unsafe { U32x4(x86::_mm_setr_epi32(l(b[0]), l(b[1]), l(b[2]), l(b[3]))) }
    }

    /// One bit per lane, lane 0 in bit 0.
    #[inline]
    pub fn bits(self) -> u32 {
        unsafe { x86::_mm_movemask_ps(x86::_mm_castsi128_ps(self.0)) as u32 }
    }

    #[inline]
    pub fn test(self, lane: usize) -> bool {
        self.bits() & (1 << lane) != 0
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

impl Default for U32x4 {
    #[inline]
    fn default() -> U32x4 {
        unsafe { U32x4(x86::_mm_setzero_si128()) }
    }
}

impl PartialEq for U32x4 {
    #[inline]
    fn eq(&self, other: &U32x4) -> bool {
        unsafe {
            let eq = x86::_mm_cmpeq_epi32(self.0, other.0);
            x86::_mm_movemask_epi8(eq) == 0xffff
        }
    }
}

impl BitAnd for U32x4 {
    type Output = U32x4;
    #[inline]
    fn bitand(self, other: U32x4) -> U32x4 {
        unsafe { U32x4(x86::_mm_and_si128(self.0, other.0)) }
    }
}

impl BitOr for U32x4 {
    type Output = U32x4;
    #[inline]
    fn bitor(self, other: U32x4) -> U32x4 {
        unsafe { U32x4(x86::_mm_or_si128(self.0, other.0)) }
    }
}

impl Not for U32x4 {
    type Output = U32x4;
    #[inline]
    fn not(self) -> U32x4 {
        unsafe { U32x4(x86::_mm_xor_si128(self.0, x86::_mm_set1_epi32(-1))) }
    }
}

impl Debug for U32x4 {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "U32x4({:#06b})", self.bits())
    }
}
