//! Forward tracing through a per-voxel ray bank.
//!
//! Rays are queued in the voxel holding their origin. Each round swaps the
//! read and write queues, traces every queued ray in parallel, then flushes
//! the results on the calling thread: hits land in the image and surviving
//! bounce rays are queued again. Rounds repeat until both sides are empty.

use rand::Rng;
use rayon::prelude::*;

use super::bounce::MAX_PASS_THROUGH;
use super::context::{step_progress, BakeContext};
use super::lights::LLight;
use super::progress::BakeProgress;
use super::sampling::{bounce_ray_with_smoothness, calculate_transmittance, random_unit_dir, row_rng};
use crate::geom::Ray;
use crate::scene::LightKind;
use crate::texel::{FColor, LightImage};
use crate::trace::VoxelTracer;
use crate::util::{Quat, Result};

/// Rays emitted per light before the bank is drained.
pub const RAYS_PER_SECTION: u32 = 65536;

/// Rays traced per rayon task.
const RAYS_PER_TASK: usize = 256;

/// Base power of one forward ray.
const FORWARD_RAY_POWER: f32 = 0.01;

/// Pull-back applied before clipping an outside ray onto the grid.
const OUTSIDE_PULL_BACK: f32 = 10.0;

/// Step through a transparent surface.
const PASS_THROUGH_PUSH: f32 = 0.001;

const INVISIBLE_ALPHA: f32 = 0.001;

/// Fraction of the spot cone at full strength.
const SPOT_FALLOFF_START: f32 = 0.5;

/// Attempts at placing a directional ray that reaches the scene.
const MAX_DIRECTIONAL_ATTEMPTS: u32 = 64;

const SALT_FORWARD: u64 = 0x464f_5257;

/// A ray waiting in the bank.
#[derive(Debug, Clone, Copy)]
struct FRay {
    ray: Ray,
    /// Hits still to take, including the pending one.
    num_rays_left: u32,
    color: FColor,
    bounce_color: FColor,
    hit: Option<(i32, i32)>,
    pass_throughs: u32,
}

/// Double-buffered per-voxel ray queues.
pub struct RayBank {
    read: Vec<Vec<FRay>>,
    write: Vec<Vec<FRay>>,
    dropped: usize,
}

impl RayBank {
    pub fn new(tracer: &VoxelTracer) -> Self {
        let d = tracer.dims();
        let n = (d.x.max(0) * d.y.max(0) * d.z.max(0)) as usize;
        Self {
            read: vec![Vec::new(); n],
            write: vec![Vec::new(); n],
            dropped: 0,
        }
    }

    /// Rays waiting to be traced.
    pub fn pending(&self) -> usize {
        self.read.iter().chain(&self.write).map(Vec::len).sum()
    }

    pub fn is_clear(&self) -> bool {
        self.read.iter().chain(&self.write).all(Vec::is_empty)
    }

    /// Rays discarded for starting outside the grid.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Queue a ray taking `num_rays_left` hits. Rays outside the scene are
    /// clipped onto the grid, or dropped if they miss it.
    pub fn request_new_ray(&mut self, tracer: &VoxelTracer, ray: Ray, num_rays_left: u32, color: FColor) -> bool {
        self.request(tracer, ray, num_rays_left, color, 0)
    }

    fn request(&mut self, tracer: &VoxelTracer, mut ray: Ray, num_rays_left: u32, color: FColor, pass_throughs: u32) -> bool {
        if !tracer.world_bound_mid().contains_point(ray.o) {
            ray.o -= ray.d * OUTSIDE_PULL_BACK;
            let Some(clip) = VoxelTracer::intersect_ray_aabb(&ray, tracer.world_bound_expanded()) else {
                self.dropped += 1;
                return false;
            };
            ray.o = clip;
        }

        let c = tracer.find_nearest_voxel(ray.o);
        if !tracer.voxel_within_bounds(c) {
            self.dropped += 1;
            return false;
        }
        let d = tracer.dims();
        let idx = (c.z * d.x * d.y + c.y * d.x + c.x) as usize;
        self.write[idx].push(FRay {
            ray,
            num_rays_left,
            color,
            bounce_color: FColor::BLACK,
            hit: None,
            pass_throughs,
        });
        true
    }

    /// Swap queues and trace everything now in the read side.
    pub fn process(&mut self, ctx: &BakeContext<'_>, round: u64) {
        std::mem::swap(&mut self.read, &mut self.write);
        let seed = ctx.seed;
        self.read.par_iter_mut().enumerate().for_each(|(v, rays)| {
            rays.par_chunks_mut(RAYS_PER_TASK).enumerate().for_each(|(c, chunk)| {
                let salt = SALT_FORWARD ^ round.wrapping_mul(0x1_0000_0001) ^ (v as u64) << 20;
                let mut rng = row_rng(seed, salt, c as u32);
                for fray in chunk {
                    process_ray(ctx, &mut rng, fray);
                }
            });
        });
    }

    /// Write hits into `image` and requeue surviving rays.
    pub fn flush(&mut self, tracer: &VoxelTracer, image: &mut LightImage<FColor>) {
        let mut read = std::mem::take(&mut self.read);
        for rays in &mut read {
            for fray in rays.drain(..) {
                if fray.num_rays_left > 0 {
                    self.request(tracer, fray.ray, fray.num_rays_left, fray.bounce_color, fray.pass_throughs);
                }
                if let Some((tx, ty)) = fray.hit {
                    if let Some(px) = image.get_mut(tx, ty) {
                        *px += fray.color;
                    }
                }
            }
        }
        self.read = read;
    }

    /// Process and flush until no rays remain. Returns the rounds taken.
    pub fn drain(&mut self, ctx: &BakeContext<'_>, image: &mut LightImage<FColor>, round: &mut u64) -> u32 {
        let mut rounds = 0;
        while !self.is_clear() {
            self.process(ctx, *round);
            self.flush(ctx.scene.tracer(), image);
            *round += 1;
            rounds += 1;
        }
        rounds
    }
}

/// Trace one banked ray to its next surface.
fn process_ray<R: Rng + ?Sized>(ctx: &BakeContext<'_>, rng: &mut R, fray: &mut FRay) {
    let s = ctx.settings;
    fray.num_rays_left = fray.num_rays_left.saturating_sub(1);
    fray.hit = None;

    let Some(ray) = Ray::try_new(fray.ray.o, fray.ray.d) else {
        fray.num_rays_left = 0;
        return;
    };
    let Some(hit) = ctx.scene.find_intersect_ray(&ray, None) else {
        fray.num_rays_left = 0;
        return;
    };

    let tri = hit.tri_id as usize;
    let vertex_normal = ctx.scene.tri_normals[tri].interpolate(hit.bary).normalize_or_zero();
    let sample = ctx.scene.take_triangle_color_sample(hit.tri_id, hit.bary);
    let mut pass_through = !sample.is_opaque && sample.alpha() < INVISIBLE_ALPHA;

    let face_normal = ctx.scene.planes[tri].normal;
    let backface = face_normal.dot(ray.d) >= 0.0;
    if backface && sample.is_opaque {
        fray.num_rays_left = 0;
        return;
    }

    let (tx, ty) = ctx.hit_texel(hit.tri_id, hit.bary);
    if tx < 0 || ty < 0 || tx >= ctx.width() as i32 || ty >= ctx.height() as i32 {
        fray.num_rays_left = 0;
        return;
    }
    let pos = ctx.scene.tris[tri].interpolate(hit.bary);

    if !sample.is_opaque {
        if !pass_through && !backface {
            pass_through = rng.gen::<f32>() > sample.alpha();
        }
        if pass_through {
            calculate_transmittance(&sample, &mut fray.color);
        }
        if backface || pass_through {
            fray.pass_throughs += 1;
            if fray.pass_throughs > MAX_PASS_THROUGH {
                fray.num_rays_left = 0;
                return;
            }
            // passing through does not count as a hit
            fray.bounce_color = fray.color;
            fray.num_rays_left += 1;
            let push = if backface { PASS_THROUGH_PUSH } else { -PASS_THROUGH_PUSH };
            fray.ray = Ray::new(pos + face_normal * push, ray.d);
            return;
        }
    }

    fray.hit = Some((tx, ty));
    fray.color *= (-vertex_normal.dot(ray.d)).max(0.0);

    if fray.num_rays_left > 0 {
        fray.bounce_color = fray.color * sample.albedo_rgb() * s.directional_bounce_power;
        let mut bounce = Ray::new(pos, ray.d);
        if bounce_ray_with_smoothness(rng, &mut bounce, face_normal, s.smoothness, Some(s.surface_bias)) {
            fray.ray = bounce;
        } else {
            fray.num_rays_left = 0;
        }
    }
}

/// Shoot rays from every light into the bank and accumulate the hits.
#[tracing::instrument(skip_all, fields(lights = ctx.lights.len(), rays = ctx.settings.forward_num_rays))]
pub fn process_forward(ctx: &BakeContext<'_>, progress: &mut dyn BakeProgress) -> Result<LightImage<FColor>> {
    let mut image = LightImage::new(ctx.width(), ctx.height());
    let total = ctx.settings.forward_num_rays as u64 * ctx.width() as u64 * ctx.height() as u64;
    let full_sections = (total / RAYS_PER_SECTION as u64) as u32;
    let leftover = (total % RAYS_PER_SECTION as u64) as u32;
    let num_steps = (full_sections + 1) * ctx.lights.len().max(1) as u32;
    let mut round = 0u64;

    for (l, light) in ctx.lights.iter().enumerate() {
        let mut bank = RayBank::new(ctx.scene.tracer());
        for section in 0..=full_sections {
            let num = if section == full_sections { leftover } else { RAYS_PER_SECTION };
            let mut rng = row_rng(ctx.seed, SALT_FORWARD + l as u64, section);
            emit_light_rays(ctx, &mut rng, &mut bank, light, num);
            bank.drain(ctx, &mut image, &mut round);
            step_progress(progress, "forward light", l as u32 * (full_sections + 1) + section + 1, num_steps)?;
        }
        if bank.dropped() > 0 {
            tracing::debug!(light = l, dropped = bank.dropped(), "rays outside the grid");
        }
    }
    Ok(image)
}

/// Queue one section of rays from `light`.
pub fn emit_light_rays<R: Rng + ?Sized>(
    ctx: &BakeContext<'_>,
    rng: &mut R,
    bank: &mut RayBank,
    light: &LLight,
    num_rays: u32,
) {
    let tracer = ctx.scene.tracer();
    let mut num_rays = (num_rays as f32 * light.indirect_energy) as u32;
    let mut power = FORWARD_RAY_POWER;
    if light.indirect_energy > 0.0001 {
        power /= light.indirect_energy;
    }
    if light.kind == LightKind::Directional {
        if light.dir.y >= 0.0 {
            // only downward directional lights are traced forward
            return;
        }
        num_rays *= 2;
        power *= 4.0;
    }

    let color = light.color * power;
    let hits = ctx.settings.num_directional_bounces + 1;

    for _ in 0..num_rays {
        let ray = match light.kind {
            LightKind::Directional => directional_ray(rng, tracer, light),
            LightKind::Spot => Some(spot_ray(rng, light)),
            LightKind::Omni => Some(Ray::new(light.pos + random_unit_dir(rng) * light.scale, random_unit_dir(rng))),
        };
        if let Some(ray) = ray {
            bank.request_new_ray(tracer, ray, hits, color);
        }
    }
}

/// Ray from the light's source plane above the scene.
fn directional_ray<R: Rng + ?Sized>(rng: &mut R, tracer: &VoxelTracer, light: &LLight) -> Option<Ray> {
    let bound = tracer.world_bound_expanded();
    for _ in 0..MAX_DIRECTIONAL_ATTEMPTS {
        let mut o = light.dl_plane_pt
            + light.dl_tangent * rng.gen_range(0.0..=light.dl_tangent_range.max(0.0))
            + light.dl_bitangent * rng.gen_range(0.0..=light.dl_bitangent_range.max(0.0));

        let mut d = random_unit_dir(rng) * light.scale;
        if light.dir.dot(d) < 0.0 {
            d = -d;
        }
        let d = (d + light.dir * 2.0).normalize_or_zero();
        if d.y >= 0.0 {
            continue;
        }

        // lift the origin above the scene along the ray
        o += d * ((bound.size().y + 1.0) / d.y);
        let ray = Ray::new(o, d);
        if VoxelTracer::intersect_ray_aabb(&ray, bound).is_some() || bound.contains_point(o) {
            return Some(ray);
        }
    }
    None
}

/// Ray inside the spot cone, denser towards the axis.
fn spot_ray<R: Rng + ?Sized>(rng: &mut R, light: &LLight) -> Ray {
    let o = light.pos + random_unit_dir(rng) * light.scale;
    let axis = random_unit_dir(rng);

    let ang_max = light.spot_angle_radians;
    let ang_falloff = ang_max * SPOT_FALLOFF_START;
    let mut a = rng.gen::<f32>() * 2.0;
    a = if a > 1.0 {
        ang_falloff + (a - 1.0) * (ang_max - ang_falloff)
    } else {
        a.sqrt() * ang_falloff
    };

    let d = Quat::from_axis_angle(axis, a) * light.dir;
    Ray::new(o, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::lights::LLight;
    use crate::bake::test_scene::{lit_quad_scene, TestBake};
    use crate::scene::LightDesc;
    use crate::util::{Mat4, Vec3};

    fn is_unit(v: Vec3) -> bool {
        (v.length() - 1.0).abs() < 1e-4
    }

    #[test]
    fn test_spot_rays_stay_in_cone() {
        let desc = LightDesc {
            kind: LightKind::Spot,
            spot_angle: 30.0,
            ..LightDesc::default()
        };
        let light = LLight::from_desc(&desc).unwrap();
        let mut rng = row_rng(3, 0, 0);
        let cos_max = light.spot_angle_radians.cos();
        for _ in 0..500 {
            let r = spot_ray(&mut rng, &light);
            assert!(is_unit(r.d));
            assert!(r.d.dot(light.dir) >= cos_max - 1e-4);
        }
    }

    #[test]
    fn test_upward_directional_is_skipped() {
        let bake = TestBake::new(lit_quad_scene());
        let ctx = bake.context();
        let mut bank = RayBank::new(ctx.scene.tracer());

        let desc = LightDesc {
            kind: LightKind::Directional,
            // pointing up: -z rotated onto +y
            transform: Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2),
            ..LightDesc::default()
        };
        let light = LLight::from_desc(&desc).unwrap();
        assert!(light.dir.y > 0.0);
        let mut rng = row_rng(0, 0, 0);
        emit_light_rays(&ctx, &mut rng, &mut bank, &light, 1000);
        assert!(bank.is_clear());
    }

    #[test]
    fn test_forward_omni_lights_quad() {
        let bake = TestBake::new(lit_quad_scene());
        let ctx = bake.context();
        let mut bank = RayBank::new(ctx.scene.tracer());
        let mut rng = row_rng(0, 0, 0);
        let light = &ctx.lights[0];
        emit_light_rays(&ctx, &mut rng, &mut bank, light, 4000);
        assert!(bank.pending() > 0);

        let mut image = LightImage::new(ctx.width(), ctx.height());
        let mut round = 0;
        bank.drain(&ctx, &mut image, &mut round);
        assert!(bank.is_clear());
        assert!(round >= 1);

        let lit = image.pixels().iter().filter(|c| !c.is_black()).count();
        assert!(lit > 0);
    }

    #[test]
    fn test_outside_ray_is_clipped_or_dropped() {
        let bake = TestBake::new(lit_quad_scene());
        let tracer = bake.scene.tracer();
        let mut bank = RayBank::new(tracer);
        // far outside, pointing at the scene
        let toward = Ray::new(Vec3::new(0.5, 50.0, 0.5), Vec3::NEG_Y);
        assert!(bank.request_new_ray(tracer, toward, 1, FColor::WHITE));
        // far outside, pointing away
        let away = Ray::new(Vec3::new(0.5, 50.0, 0.5), Vec3::Y);
        assert!(!bank.request_new_ray(tracer, away, 1, FColor::WHITE));
        assert_eq!(bank.pending(), 1);
        assert_eq!(bank.dropped(), 1);
    }
}
