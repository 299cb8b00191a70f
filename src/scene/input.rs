//! Plain scene description handed to the baker.
//!
//! Whatever owns the real scene graph flattens it into a [`SceneDesc`]:
//! world transforms, per-surface vertex arrays, materials and lights. The
//! description can be read from JSON so the CLI can bake standalone scenes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::texel::FColor;
use crate::util::{Mat4, Result, Vec2, Vec3, Vec4};

/// Everything needed to bake one lightmap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDesc {
    pub meshes: Vec<MeshDesc>,
    pub materials: Vec<MaterialDesc>,
    pub lights: Vec<LightDesc>,
    /// Equirectangular sky image, relative paths resolve against the scene file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sky: Option<PathBuf>,
}

impl SceneDesc {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One mesh instance: a world transform plus its surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshDesc {
    pub name: String,
    pub transform: Mat4,
    pub surfaces: Vec<SurfaceDesc>,
}

impl Default for MeshDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Mat4::IDENTITY,
            surfaces: Vec::new(),
        }
    }
}

/// Indexed triangle list in mesh-local space.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceDesc {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Primary UVs, used to sample material textures.
    pub uv: Vec<Vec2>,
    /// Lightmap UVs. Falls back to `uv` when empty.
    pub uv2: Vec<Vec2>,
    pub indices: Vec<u32>,
    /// Index into [`SceneDesc::materials`].
    pub material: Option<usize>,
}

/// RGBA texture in linear float.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Vec4>,
}

/// Surface material as far as light transport cares.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDesc {
    pub name: String,
    pub albedo: Vec4,
    pub albedo_texture: Option<TextureDesc>,
    /// Lets light through according to the albedo alpha.
    pub transparent: bool,
    pub roughness: f32,
    pub emission: FColor,
    /// Emission energy; zero disables emission.
    pub emission_energy: f32,
    pub emission_texture: Option<TextureDesc>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            albedo: Vec4::ONE,
            albedo_texture: None,
            transparent: false,
            roughness: 1.0,
            emission: FColor::WHITE,
            emission_energy: 0.0,
            emission_texture: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKind {
    #[default]
    Omni,
    Spot,
    Directional,
}

/// A light node snapshot.
///
/// The light shines down its local -Z axis. The transform's scale sets the
/// soft shadow radius.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightDesc {
    pub kind: LightKind,
    pub transform: Mat4,
    pub color: FColor,
    pub energy: f32,
    pub indirect_energy: f32,
    pub range: f32,
    /// Spot cone half angle in degrees.
    pub spot_angle: f32,
    /// Lights with baking disabled are ignored.
    pub bake: bool,
}

impl Default for LightDesc {
    fn default() -> Self {
        Self {
            kind: LightKind::Omni,
            transform: Mat4::IDENTITY,
            color: FColor::WHITE,
            energy: 1.0,
            indirect_energy: 1.0,
            range: 5.0,
            spot_angle: 45.0,
            bake: true,
        }
    }
}
