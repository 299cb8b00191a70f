//! Light probes.
//!
//! A regular grid of points filling the scene bound. Each probe records
//! which lights reach it, with the fraction of jittered samples that got
//! through, and the indirect light it would pick up from the baked
//! surfaces around it. Runtimes use the grid to light dynamic objects.

use std::path::Path;

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::bounce::trace_ambient_ray;
use super::context::{step_progress, BakeContext};
use super::direct::MAX_SPOT_ATTEMPTS;
use super::lights::LLight;
use super::progress::BakeProgress;
use super::sampling::{random_unit_dir, row_rng};
use crate::geom::Ray;
use crate::scene::LightKind;
use crate::texel::{FColor, LightImage};
use crate::trace::VoxelTracer;
use crate::util::{Aabb, Error, IVec3, Result, Vec3};

pub const PROBES_VERSION: u32 = 100;

/// Light samples per probe are this fraction of the probe samples.
const LIGHT_SAMPLE_DIVISOR: u32 = 8;

const SALT_PROBES: u64 = 0x5052_4f42;

/// Grid density and sample counts for [`process_probes`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeParams {
    /// Probes along the longest axis of the scene.
    pub density: u32,
    pub samples: u32,
    pub gamma: f32,
}

/// One light reaching a probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeContribution {
    pub light_id: u32,
    /// Linear, 0 to 1.
    pub power: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightProbe {
    pub contributions: Vec<ProbeContribution>,
    /// Gamma corrected, normalized over the grid.
    pub indirect: FColor,
}

/// Light as stored next to the probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeLight {
    pub kind: LightKind,
    pub pos: Vec3,
    pub dir: Vec3,
    pub energy: f32,
    pub range: f32,
    /// Premultiplied by energy.
    pub color: FColor,
    /// Degrees.
    pub spot_angle: f32,
}

impl From<&LLight> for ProbeLight {
    fn from(l: &LLight) -> Self {
        Self {
            kind: l.kind,
            pos: l.pos,
            dir: l.dir,
            energy: l.energy,
            range: l.range,
            color: l.color,
            spot_angle: l.spot_angle_radians.to_degrees(),
        }
    }
}

/// The probe grid. Probe `(x, y, z)` sits at `pt_min + (x, y, z) * voxel_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightProbes {
    pub version: u32,
    pub dims: IVec3,
    pub pt_min: Vec3,
    pub voxel_size: Vec3,
    pub lights: Vec<ProbeLight>,
    /// Z slices of Y rows of X.
    pub probes: Vec<LightProbe>,
}

impl LightProbes {
    /// Empty grid over `bound`, one probe in the middle of each cell.
    /// Fails when the bound is flat along any axis.
    pub fn new(bound: &Aabb, density: u32, lights: &[LLight]) -> Result<Self> {
        let size = bound.size();
        if !(size.min_element() > 0.0) {
            return Err(Error::invalid(format!("scene bound {size:?} has no volume for probes")));
        }
        let dims = VoxelTracer::estimate_voxel_dims(bound, density.max(1));
        let voxel_size = size / dims.as_vec3();
        let count = (dims.x * dims.y * dims.z) as usize;
        Ok(Self {
            version: PROBES_VERSION,
            dims,
            pt_min: bound.min + voxel_size * 0.5,
            voxel_size,
            lights: lights.iter().map(ProbeLight::from).collect(),
            probes: vec![LightProbe::default(); count],
        })
    }

    pub fn index(&self, c: IVec3) -> Option<usize> {
        let inside = c.cmpge(IVec3::ZERO).all() && c.cmplt(self.dims).all();
        inside.then(|| (c.z * self.dims.x * self.dims.y + c.y * self.dims.x + c.x) as usize)
    }

    pub fn probe(&self, c: IVec3) -> Option<&LightProbe> {
        self.probes.get(self.index(c)?)
    }

    pub fn position(&self, c: IVec3) -> Vec3 {
        self.pt_min + c.as_vec3() * self.voxel_size
    }

    /// Scale indirect colors so the brightest channel in the grid is 1.
    pub fn normalize_indirect(&mut self) {
        let max = self.probes.iter().map(|p| p.indirect.max_channel()).fold(0.0, f32::max);
        if max <= 0.0 {
            tracing::warn!("no indirect light reached the probes");
            return;
        }
        for p in &mut self.probes {
            p.indirect /= max;
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and check the grid is complete.
    pub fn from_json(text: &str) -> Result<Self> {
        let probes: Self = serde_json::from_str(text)?;
        if probes.version != PROBES_VERSION {
            return Err(Error::invalid(format!("probe file version {} unsupported", probes.version)));
        }
        let d = probes.dims;
        if d.min_element() < 1 || probes.probes.len() != (d.x * d.y * d.z) as usize {
            return Err(Error::invalid(format!(
                "probe grid {d} does not match {} probes",
                probes.probes.len()
            )));
        }
        let num_lights = probes.lights.len() as u32;
        let bad_light = probes
            .probes
            .iter()
            .flat_map(|p| &p.contributions)
            .any(|c| c.light_id >= num_lights);
        if bad_light {
            return Err(Error::invalid("probe references a missing light"));
        }
        Ok(probes)
    }

    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Fill a probe grid over the scene. Indirect light is gathered from `lit`,
/// the settled surface light.
#[tracing::instrument(skip_all, fields(density = params.density, samples = params.samples))]
pub fn process_probes(
    ctx: &BakeContext<'_>,
    lit: &LightImage<FColor>,
    params: &ProbeParams,
    progress: &mut dyn BakeProgress,
) -> Result<LightProbes> {
    let mut grid = LightProbes::new(ctx.scene.tracer().world_bound(), params.density, ctx.lights)?;
    let dims = grid.dims;
    tracing::info!(?dims, voxel_size = ?grid.voxel_size, "probe grid");

    let slice = (dims.x * dims.y) as usize;
    let gamma = 1.0 / params.gamma;
    for z in 0..dims.z {
        let start = z as usize * slice;
        let (pt_min, voxel_size) = (grid.pt_min, grid.voxel_size);
        grid.probes[start..start + slice]
            .par_chunks_mut(dims.x as usize)
            .enumerate()
            .for_each(|(y, row)| {
                let mut rng = row_rng(ctx.seed, SALT_PROBES + z as u64, y as u32);
                for (x, probe) in row.iter_mut().enumerate() {
                    let c = IVec3::new(x as i32, y as i32, z);
                    let pos = pt_min + c.as_vec3() * voxel_size;
                    *probe = calculate_probe(ctx, &mut rng, lit, params, pos);
                    probe.indirect = probe.indirect.powf(gamma);
                }
            });
        step_progress(progress, "light probes", z as u32 + 1, dims.z as u32)?;
    }

    grid.normalize_indirect();
    Ok(grid)
}

fn calculate_probe<R: Rng + ?Sized>(
    ctx: &BakeContext<'_>,
    rng: &mut R,
    lit: &LightImage<FColor>,
    params: &ProbeParams,
    pos: Vec3,
) -> LightProbe {
    let light_samples = (params.samples / LIGHT_SAMPLE_DIVISOR).max(1);
    let mut contributions = Vec::new();

    for (id, light) in ctx.lights.iter().enumerate() {
        if light.kind == LightKind::Spot && !in_spot_cone(light, pos) {
            continue;
        }
        let mut clear = 0.0;
        let mut counted = 0u32;
        for _ in 0..light_samples {
            match sample_to_light(ctx, rng, light, pos) {
                LightSample::Clear(multiplier) => {
                    clear += multiplier;
                    counted += 1;
                }
                LightSample::Blocked => counted += 1,
                LightSample::Disallowed => {}
            }
        }
        if clear > 0.0 && counted > 0 {
            contributions.push(ProbeContribution {
                light_id: id as u32,
                power: clear / counted as f32,
            });
        }
    }

    LightProbe {
        contributions,
        indirect: indirect_light(ctx, rng, lit, params.samples, pos),
    }
}

fn in_spot_cone(light: &LLight, pos: Vec3) -> bool {
    let d = (pos - light.spot_emanation_point).normalize_or_zero();
    d.dot(light.dir) - light.spot_dot_max > 0.0
}

/// Outcome of one jittered sample from a probe to a light.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LightSample {
    /// Nothing in the way; carries the spot cone falloff.
    Clear(f32),
    Blocked,
    /// The jittered light point is itself hidden from the light centre.
    Disallowed,
}

fn sample_to_light<R: Rng + ?Sized>(ctx: &BakeContext<'_>, rng: &mut R, light: &LLight, pos: Vec3) -> LightSample {
    let scene = ctx.scene;
    match light.kind {
        LightKind::Directional => {
            let d = (random_unit_dir(rng) * light.scale + light.dir * -2.0).normalize_or_zero();
            if d == Vec3::ZERO {
                return LightSample::Disallowed;
            }
            let d = if d.dot(light.dir) > 0.0 { -d } else { d };
            if scene.find_intersect_ray(&Ray::new(pos, d), None).is_some() {
                LightSample::Blocked
            } else {
                LightSample::Clear(1.0)
            }
        }
        LightKind::Spot | LightKind::Omni => {
            let mut multiplier = 1.0;
            let point = if light.kind == LightKind::Spot {
                let mut found = None;
                for _ in 0..MAX_SPOT_ATTEMPTS {
                    let o = light.pos + random_unit_dir(rng) * light.scale;
                    let dot = (pos - o).normalize_or_zero().dot(light.dir) - light.spot_dot_max;
                    if dot > 0.0 {
                        found = Some((o, dot));
                        break;
                    }
                }
                let Some((o, dot)) = found else {
                    return LightSample::Disallowed;
                };
                let c = dot / (1.0 - light.spot_dot_max);
                multiplier = c * c * c * c;
                o
            } else {
                light.pos + random_unit_dir(rng) * light.scale
            };

            if scene.test_intersect_line(light.pos, point, false) {
                return LightSample::Disallowed;
            }
            if scene.test_intersect_line(pos, point, false) {
                LightSample::Blocked
            } else {
                LightSample::Clear(multiplier)
            }
        }
    }
}

/// Average surface light seen from `pos` over the whole sphere.
fn indirect_light<R: Rng + ?Sized>(
    ctx: &BakeContext<'_>,
    rng: &mut R,
    lit: &LightImage<FColor>,
    samples: u32,
    pos: Vec3,
) -> FColor {
    let samples = samples.max(1);
    let mut total = FColor::BLACK;
    for _ in 0..samples {
        total += trace_ambient_ray(ctx, lit, Ray::new(pos, random_unit_dir(rng)));
    }
    total / samples as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::test_scene::{omni_at, quad, TestBake};
    use crate::bake::NullProgress;
    use crate::scene::{MeshDesc, SceneDesc};
    use crate::util::{Mat4, Vec2};

    fn params() -> ProbeParams {
        ProbeParams {
            density: 4,
            samples: 64,
            gamma: 2.2,
        }
    }

    /// Floor and ceiling two units apart, omni light between them.
    fn room() -> SceneDesc {
        SceneDesc {
            meshes: vec![MeshDesc {
                name: "room".into(),
                transform: Mat4::IDENTITY,
                surfaces: vec![
                    quad(0.0, true, Vec2::new(0.0, 0.0), Vec2::new(0.5, 1.0)),
                    quad(2.0, false, Vec2::new(0.5, 0.0), Vec2::new(1.0, 1.0)),
                ],
            }],
            lights: vec![omni_at(Vec3::new(0.0, 1.0, 0.0))],
            ..Default::default()
        }
    }

    #[test]
    fn test_grid_layout() {
        let bound = Aabb::new(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let grid = LightProbes::new(&bound, 4, &[]).unwrap();
        assert_eq!(grid.dims, IVec3::new(4, 2, 4));
        assert_eq!(grid.probes.len(), 32);
        assert!((grid.voxel_size - Vec3::splat(0.5)).length() < 1e-6);
        assert!((grid.position(IVec3::ZERO) - Vec3::new(-0.75, 0.25, -0.75)).length() < 1e-6);
        assert!((grid.position(IVec3::new(3, 1, 3)) - Vec3::new(0.75, 0.75, 0.75)).length() < 1e-6);
        assert_eq!(grid.index(IVec3::new(1, 1, 1)), Some(4 * 2 + 4 + 1));
        assert_eq!(grid.index(IVec3::new(4, 0, 0)), None);
        assert!(grid.probe(IVec3::new(0, -1, 0)).is_none());
    }

    #[test]
    fn test_flat_bound_has_no_grid() {
        let bound = Aabb::new(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 0.0, 1.0));
        assert!(matches!(LightProbes::new(&bound, 4, &[]), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_open_room_sees_light() {
        let bake = TestBake::new(room());
        let lit = LightImage::filled(bake.maps.width, bake.maps.height, FColor::WHITE);
        let grid = process_probes(&bake.context(), &lit, &params(), &mut NullProgress).unwrap();

        assert_eq!(grid.lights.len(), 1);
        for p in &grid.probes {
            assert_eq!(p.contributions.len(), 1);
            assert_eq!(p.contributions[0].light_id, 0);
            assert!((p.contributions[0].power - 1.0).abs() < 1e-6);
            assert!(p.indirect.max_channel() <= 1.0 + 1e-5);
        }
        // brightest probe scaled to one
        assert!(grid.probes.iter().any(|p| (p.indirect.max_channel() - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_probes_under_floor_are_dark() {
        let desc = SceneDesc {
            meshes: vec![MeshDesc {
                name: "stack".into(),
                transform: Mat4::IDENTITY,
                surfaces: vec![
                    quad(0.0, true, Vec2::new(0.0, 0.0), Vec2::new(0.5, 1.0)),
                    quad(-1.0, true, Vec2::new(0.5, 0.0), Vec2::new(1.0, 1.0)),
                ],
            }],
            lights: vec![omni_at(Vec3::new(0.0, 0.5, 0.0))],
            ..Default::default()
        };
        let bake = TestBake::new(desc);
        let lit = LightImage::filled(bake.maps.width, bake.maps.height, FColor::WHITE);
        let grid = process_probes(&bake.context(), &lit, &params(), &mut NullProgress).unwrap();

        assert_eq!(grid.dims, IVec3::new(4, 2, 4));
        assert!(grid.position(IVec3::new(3, 1, 3)).y < 0.0);
        assert!(grid.probes.iter().all(|p| p.contributions.is_empty()));
    }

    #[test]
    fn test_file_round_trip() {
        let bake = TestBake::new(room());
        let lit = LightImage::filled(bake.maps.width, bake.maps.height, FColor::new(0.5, 0.25, 0.0));
        let grid = process_probes(&bake.context(), &lit, &params(), &mut NullProgress).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probes.json");
        grid.save(&path).unwrap();
        assert_eq!(LightProbes::load(&path).unwrap(), grid);

        let mut broken = grid.clone();
        broken.probes.pop();
        assert!(LightProbes::from_json(&broken.to_json().unwrap()).is_err());

        let mut broken = grid;
        broken.probes[0].contributions.push(ProbeContribution { light_id: 9, power: 1.0 });
        assert!(LightProbes::from_json(&broken.to_json().unwrap()).is_err());
    }
}
