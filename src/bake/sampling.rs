//! Random directions, falloff and transmittance shared by the passes.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::geom::Ray;
use crate::scene::ColorSample;
use crate::texel::FColor;
use crate::util::Vec3;

/// Per-row generator. `salt` keeps stages from replaying each other's samples.
pub fn row_rng(seed: u64, salt: u64, row: u32) -> ChaCha8Rng {
    let mixed = seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (row as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    ChaCha8Rng::seed_from_u64(mixed)
}

/// Uniform direction on the unit sphere.
pub fn random_unit_dir<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        let l = v.length_squared();
        if l > 0.0001 && l <= 1.0 {
            return v / l.sqrt();
        }
    }
}

/// Uniform direction on the hemisphere around `normal`.
pub fn random_hemi_dir<R: Rng + ?Sized>(rng: &mut R, normal: Vec3) -> Vec3 {
    let d = random_unit_dir(rng);
    if d.dot(normal) < 0.0 {
        -d
    } else {
        d
    }
}

/// Softened inverse square falloff.
#[inline]
pub fn light_distance_falloff(dist: f32) -> f32 {
    let d = 0.2 * dist + 0.282;
    1.0 / (4.0 * std::f32::consts::PI * d * d)
}

/// Tint `color` by a transparent surface it passes through.
pub fn calculate_transmittance(sample: &ColorSample, color: &mut FColor) {
    let alpha = sample.alpha();
    let surface = *color * sample.albedo_rgb();
    *color = color.lerp(surface, (alpha * 2.0).min(1.0));

    let dark = ((alpha - 0.5) * 2.0).max(0.0);
    *color *= 1.0 - dark;
}

/// Redirect `ray` off a surface with `normal`, mixing a hemisphere sample with
/// the mirror direction by `smoothness`. Fails when the ray leaves the front.
pub fn bounce_ray_with_smoothness<R: Rng + ?Sized>(
    rng: &mut R,
    ray: &mut Ray,
    normal: Vec3,
    smoothness: f32,
    bias: Option<f32>,
) -> bool {
    let fd = normal.dot(ray.d);
    if fd >= 0.0 {
        return false;
    }
    let mirror = ray.d - normal * (2.0 * fd);
    let hemi = random_hemi_dir(rng, normal);
    let d = hemi.lerp(mirror, smoothness).normalize_or_zero();
    if d == Vec3::ZERO {
        return false;
    }
    ray.d = d;
    if let Some(bias) = bias {
        ray.o += normal * bias;
    }
    true
}
