//! Per-texel images.
//!
//! [`LightImage`] is the plain owned 2D buffer every pass reads and writes.
//! [`SharedImage`] wraps one for passes that scatter additions into texels
//! owned by other worker threads.

use std::ops::{AddAssign, Index, IndexMut, Sub};

use parking_lot::Mutex;

/// Row-major 2D buffer of `T`, one entry per lightmap texel.
#[derive(Debug, Clone, PartialEq)]
pub struct LightImage<T> {
    width: u32,
    height: u32,
    pixels: Vec<T>,
}

impl<T: Copy + Default> LightImage<T> {
    /// Image of `width` x `height` default (zero) texels.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, T::default())
    }

    pub fn filled(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    /// Wrap an existing buffer; `None` if the length does not match.
    pub fn from_vec(width: u32, height: u32, pixels: Vec<T>) -> Option<Self> {
        (pixels.len() == width as usize * height as usize).then_some(Self { width, height, pixels })
    }

    pub fn fill(&mut self, value: T) {
        self.pixels.fill(value);
    }

    pub fn map<U, F: Fn(T) -> U>(&self, f: F) -> LightImage<U> {
        LightImage {
            width: self.width,
            height: self.height,
            pixels: self.pixels.iter().map(|&p| f(p)).collect(),
        }
    }
}

impl<T> LightImage<T> {
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn is_within(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn get(&self, x: i32, y: i32) -> Option<&T> {
        if self.is_within(x, y) {
            Some(&self.pixels[self.offset(x as u32, y as u32)])
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, x: i32, y: i32) -> Option<&mut T> {
        if self.is_within(x, y) {
            let i = self.offset(x as u32, y as u32);
            Some(&mut self.pixels[i])
        } else {
            None
        }
    }

    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }

    pub fn same_size<U>(&self, other: &LightImage<U>) -> bool {
        self.width == other.width && self.height == other.height
    }
}

impl<T: Copy + Sub<Output = T>> LightImage<T> {
    /// Replace every texel with `other - self`.
    pub fn subtract_from(&mut self, other: &Self) {
        debug_assert_eq!(self.pixels.len(), other.pixels.len());
        for (p, &o) in self.pixels.iter_mut().zip(&other.pixels) {
            *p = o - *p;
        }
    }
}

impl<T: Copy + AddAssign> LightImage<T> {
    /// Add `other` texel by texel.
    pub fn add_image(&mut self, other: &Self) {
        debug_assert_eq!(self.pixels.len(), other.pixels.len());
        for (p, &o) in self.pixels.iter_mut().zip(&other.pixels) {
            *p += o;
        }
    }
}

impl<T> Index<(u32, u32)> for LightImage<T> {
    type Output = T;
    #[inline]
    fn index(&self, (x, y): (u32, u32)) -> &T {
        assert!(x < self.width && y < self.height, "texel ({x}, {y}) out of range");
        &self.pixels[self.offset(x, y)]
    }
}

impl<T> IndexMut<(u32, u32)> for LightImage<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (u32, u32)) -> &mut T {
        assert!(x < self.width && y < self.height, "texel ({x}, {y}) out of range");
        let i = self.offset(x, y);
        &mut self.pixels[i]
    }
}

/// Image accepting concurrent additions from many threads.
///
/// Each row sits behind its own lock, so two threads only contend when they
/// hit the same row.
#[derive(Debug)]
pub struct SharedImage<T> {
    width: u32,
    height: u32,
    rows: Vec<Mutex<Vec<T>>>,
}

impl<T: Copy + Default + AddAssign> SharedImage<T> {
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_image(LightImage::new(width, height))
    }

    pub fn from_image(image: LightImage<T>) -> Self {
        let (width, height) = (image.width, image.height);
        let rows = if width == 0 {
            (0..height).map(|_| Mutex::new(Vec::new())).collect()
        } else {
            image
                .pixels
                .chunks(width as usize)
                .map(|row| Mutex::new(row.to_vec()))
                .collect()
        };
        Self { width, height, rows }
    }

    #[inline]
    pub fn is_within(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    /// Add `value` to texel `(x, y)`. Out of range texels are ignored.
    pub fn add(&self, x: i32, y: i32, value: T) {
        if !self.is_within(x, y) {
            return;
        }
        let mut row = self.rows[y as usize].lock();
        row[x as usize] += value;
    }

    pub fn get(&self, x: i32, y: i32) -> Option<T> {
        self.is_within(x, y).then(|| self.rows[y as usize].lock()[x as usize])
    }

    pub fn into_image(self) -> LightImage<T> {
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize);
        for row in self.rows {
            pixels.extend(row.into_inner());
        }
        LightImage {
            width: self.width,
            height: self.height,
            pixels,
        }
    }
}
