//! One bit per texel.

/// Packed boolean image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BitImage {
    width: u32,
    height: u32,
    bits: Vec<u64>,
}

impl BitImage {
    pub fn new(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            bits: vec![0; n.div_ceil(64)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn is_within(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    #[inline]
    fn bit(&self, x: i32, y: i32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Out of range reads return false.
    pub fn get(&self, x: i32, y: i32) -> bool {
        if !self.is_within(x, y) {
            return false;
        }
        let b = self.bit(x, y);
        self.bits[b / 64] & (1 << (b % 64)) != 0
    }

    /// Out of range writes are ignored.
    pub fn set(&mut self, x: i32, y: i32, value: bool) {
        if !self.is_within(x, y) {
            return;
        }
        let b = self.bit(x, y);
        if value {
            self.bits[b / 64] |= 1 << (b % 64);
        } else {
            self.bits[b / 64] &= !(1 << (b % 64));
        }
    }

    /// Number of set texels.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}
