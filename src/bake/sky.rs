//! Equirectangular sky light.

use rand::Rng;

use super::context::BakeContext;
use super::sampling::random_hemi_dir;
use crate::geom::Ray;
use crate::texel::{FColor, LightImage};
use crate::util::{Vec2, Vec3};

/// Sky result is scaled so this many samples give unit weight.
const SKY_SAMPLE_SCALE: f32 = 64.0;

/// Backward light sample count at which sky and lights are balanced.
const SKY_LIGHT_BALANCE: f32 = 1024.0;

/// Blurred, resampled sky image. Only the upper hemisphere is mapped.
#[derive(Debug, Clone)]
pub struct Sky {
    image: LightImage<FColor>,
}

impl Sky {
    /// Box blur `image` by `blur` of its width, then resample it to
    /// `size` x `size / 2`.
    #[tracing::instrument(skip_all, fields(width = image.width(), height = image.height(), blur, size))]
    pub fn new(image: &LightImage<FColor>, blur: f32, size: u32) -> Option<Self> {
        if image.num_pixels() == 0 {
            tracing::warn!("empty sky image ignored");
            return None;
        }
        let radius = (blur.max(0.0) * image.width() as f32 * 0.5) as u32;
        let blurred = box_blur(image, radius);

        let w = size.max(2);
        let h = (w / 2).max(1);
        let mut out = LightImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let uv = Vec2::new((x as f32 + 0.5) / w as f32, (y as f32 + 0.5) / h as f32);
                out[(x, y)] = bilinear_sample(&blurred, uv);
            }
        }
        Some(Self { image: out })
    }

    pub fn image(&self) -> &LightImage<FColor> {
        &self.image
    }

    /// Sky color seen along `dir`.
    pub fn read_sky(&self, dir: Vec3) -> FColor {
        bilinear_sample(&self.image, dir_to_st(dir))
    }
}

/// Longitude / latitude of `dir`, both in `[0, 1]`. Downward directions
/// read the horizon.
pub fn dir_to_st(dir: Vec3) -> Vec2 {
    let dir_y = dir.y.clamp(0.0, 1.0);
    let lon = (dir.z.atan2(dir.x) + std::f32::consts::PI) / std::f32::consts::TAU;
    let lat = dir_y.acos() / std::f32::consts::PI;
    Vec2::new((lon + 0.75) % 1.0, lat)
}

/// Bilinear sample with x wrapped and y clamped.
pub fn bilinear_sample(image: &LightImage<FColor>, uv: Vec2) -> FColor {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let u = uv.x.rem_euclid(1.0);
    let v = uv.y.clamp(0.0, 1.0);
    let xf = u * w as f32;
    let yf = v * h as f32;
    let xi = xf as i32;
    let yi = yf as i32;

    let texel = |i: i32| {
        let sx = (xi + i % 2).rem_euclid(w);
        let sy = (yi + i / 2).clamp(0, h - 1);
        image[(sx as u32, sy as u32)]
    };
    let tx = xf - xi as f32;
    let ty = yf - yi as f32;

    let a = texel(0).lerp(texel(1), tx);
    let b = texel(2).lerp(texel(3), tx);
    a.lerp(b, ty)
}

/// Separable box blur, wrapping in x and clamping in y.
fn box_blur(image: &LightImage<FColor>, radius: u32) -> LightImage<FColor> {
    if radius == 0 {
        return image.clone();
    }
    let (w, h) = (image.width() as i32, image.height() as i32);
    let r = radius as i32;
    let norm = 1.0 / (2 * r + 1) as f32;

    let mut horizontal = LightImage::new(image.width(), image.height());
    for y in 0..h {
        let mut sum = FColor::BLACK;
        for k in -r..=r {
            sum += image[(k.rem_euclid(w) as u32, y as u32)];
        }
        for x in 0..w {
            horizontal[(x as u32, y as u32)] = sum * norm;
            sum += image[((x + r + 1).rem_euclid(w) as u32, y as u32)];
            sum -= image[((x - r).rem_euclid(w) as u32, y as u32)];
        }
    }

    let mut out = LightImage::new(image.width(), image.height());
    for x in 0..w {
        let at = |y: i32| horizontal[(x as u32, y.clamp(0, h - 1) as u32)];
        let mut sum = FColor::BLACK;
        for k in -r..=r {
            sum += at(k);
        }
        for y in 0..h {
            out[(x as u32, y as u32)] = sum * norm;
            sum += at(y + r + 1);
            sum -= at(y - r);
        }
    }
    out
}

/// Unoccluded sky light arriving at a surface point.
pub fn process_texel_sky<R: Rng + ?Sized>(ctx: &BakeContext<'_>, rng: &mut R, pos: Vec3, face_normal: Vec3) -> Option<FColor> {
    let sky = ctx.sky?;
    let s = ctx.settings;
    if s.sky_brightness == 0.0 || s.num_sky_samples == 0 {
        return None;
    }

    let mut total = FColor::BLACK;
    for _ in 0..s.num_sky_samples {
        let ray = Ray::new(pos, random_hemi_dir(rng, face_normal));
        if !ctx.scene.test_intersect_ray(&ray, f32::MAX, false) {
            total += sky.read_sky(ray.d);
        }
    }
    let scale = s.sky_brightness * (SKY_SAMPLE_SCALE / s.num_sky_samples as f32);
    Some(total * scale * (s.backward_num_rays as f32 / SKY_LIGHT_BALANCE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> LightImage<FColor> {
        let mut im = LightImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                im[(x, y)] = FColor::new(x as f32, y as f32, 1.0);
            }
        }
        im
    }

    #[test]
    fn test_dir_to_st() {
        // straight up is the top row
        assert!(dir_to_st(Vec3::Y).y.abs() < 1e-6);
        // the horizon and everything below it is the middle row
        assert!((dir_to_st(Vec3::X).y - 0.5).abs() < 1e-6);
        assert!((dir_to_st(Vec3::NEG_Y).y - 0.5).abs() < 1e-6);
        let st = dir_to_st(Vec3::new(0.3, 0.2, -0.9).normalize());
        assert!((0.0..1.0).contains(&st.x));
    }

    #[test]
    fn test_bilinear_wraps_x() {
        let im = gradient(4, 2);
        let c = bilinear_sample(&im, Vec2::new(0.0, 0.0));
        assert_eq!(c, FColor::new(0.0, 0.0, 1.0));
        // halfway between the last column and the wrapped first one
        let c = bilinear_sample(&im, Vec2::new(0.875, 0.0));
        assert!((c.r - 1.5).abs() < 1e-5);
        // y clamps at the bottom
        let c = bilinear_sample(&im, Vec2::new(0.0, 1.0));
        assert_eq!(c.g, 1.0);
    }

    #[test]
    fn test_blur_keeps_flat_image() {
        let im = LightImage::filled(16, 8, FColor::splat(0.5));
        let sky = Sky::new(&im, 0.25, 32).unwrap();
        assert_eq!((sky.image().width(), sky.image().height()), (32, 16));
        for c in sky.image().pixels() {
            assert!((c.r - 0.5).abs() < 1e-5);
        }
        assert!((sky.read_sky(Vec3::new(0.0, 0.7, 0.7).normalize()).g - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_empty_sky_rejected() {
        assert!(Sky::new(&LightImage::new(0, 0), 0.1, 16).is_none());
    }
}
