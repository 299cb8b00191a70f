//! Light snapshots taken once per bake.

use crate::scene::{LightDesc, LightKind, SceneDesc};
use crate::texel::FColor;
use crate::util::{Aabb, Vec3};

/// Cone cosine cap; keeps the spot falloff denominator away from zero.
const MAX_SPOT_DOT: f32 = 0.9999;

/// A light as the passes see it.
#[derive(Debug, Clone, PartialEq)]
pub struct LLight {
    pub kind: LightKind,
    pub pos: Vec3,
    /// Normalized shine direction.
    pub dir: Vec3,
    /// Soft shadow jitter radius per axis.
    pub scale: Vec3,
    pub energy: f32,
    pub indirect_energy: f32,
    pub range: f32,
    /// Color premultiplied by energy.
    pub color: FColor,
    pub spot_angle_radians: f32,
    pub spot_dot_max: f32,
    /// `pos` pushed back along `dir` by the jitter radius, used for cone culling.
    pub spot_emanation_point: Vec3,
    /// Source plane of a directional light.
    pub dl_plane_pt: Vec3,
    pub dl_tangent: Vec3,
    pub dl_bitangent: Vec3,
    pub dl_tangent_range: f32,
    pub dl_bitangent_range: f32,
}

impl LLight {
    /// Snapshot `desc`. Lights that are not baked give `None`.
    pub fn from_desc(desc: &LightDesc) -> Option<Self> {
        if !desc.bake {
            return None;
        }
        let (scale, _rotation, pos) = desc.transform.to_scale_rotation_translation();
        let dir = (-desc.transform.z_axis.truncate()).try_normalize().unwrap_or(Vec3::NEG_Z);
        let scale = scale.abs();

        let spot_angle_radians = desc.spot_angle.to_radians();
        let radius = scale.max_element();

        Some(Self {
            kind: desc.kind,
            pos,
            dir,
            scale,
            energy: desc.energy,
            indirect_energy: desc.indirect_energy,
            range: desc.range,
            color: desc.color * desc.energy,
            spot_angle_radians,
            spot_dot_max: spot_angle_radians.cos().min(MAX_SPOT_DOT),
            spot_emanation_point: pos - dir * radius,
            dl_plane_pt: Vec3::ZERO,
            dl_tangent: Vec3::X,
            dl_bitangent: Vec3::Z,
            dl_tangent_range: 0.0,
            dl_bitangent_range: 0.0,
        })
    }

    /// Largest jitter radius.
    pub fn radius(&self) -> f32 {
        self.scale.max_element()
    }

    /// Lay the directional source plane over the top of `bound`, widened so
    /// slanted rays from it still cover the whole scene.
    pub fn light_to_plane(&mut self, bound: &Aabb) {
        if self.dir.y == 0.0 {
            return;
        }
        let mut min = bound.min;
        let mut max = bound.max;
        let size = bound.size();

        let units = size.y / self.dir.y;
        let offset = self.dir * -units;
        if offset.x >= 0.0 {
            max.x += offset.x;
        } else {
            min.x += offset.x;
        }
        if offset.z >= 0.0 {
            max.z += offset.z;
        } else {
            min.z += offset.z;
        }

        self.dl_plane_pt = min;
        self.dl_tangent = Vec3::X;
        self.dl_bitangent = Vec3::Z;
        self.dl_tangent_range = max.x - min.x;
        self.dl_bitangent_range = max.z - min.z;
        tracing::debug!(min = ?min, max = ?max, "directional light plane");
    }
}

/// Snapshot every baked light, preparing directional planes against `bound`.
pub fn find_lights(desc: &SceneDesc, bound: &Aabb) -> Vec<LLight> {
    let lights: Vec<LLight> = desc
        .lights
        .iter()
        .filter_map(LLight::from_desc)
        .map(|mut l| {
            if l.kind == LightKind::Directional {
                l.light_to_plane(bound);
            }
            l
        })
        .collect();
    tracing::info!(lights = lights.len(), skipped = desc.lights.len() - lights.len(), "lights found");
    lights
}
