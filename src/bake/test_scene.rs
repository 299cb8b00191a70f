//! Small scenes shared by the bake unit tests.

use super::context::BakeContext;
use super::lights::{find_lights, LLight};
use super::settings::{AdjustedSettings, BakeSettings, Quality};
use super::sky::Sky;
use crate::scene::{LightDesc, LightScene, MaterialDesc, MeshDesc, SceneDesc, SceneParams, SurfaceDesc, TexelMaps};
use crate::texel::FColor;
use crate::util::{Mat4, Quat, Vec2, Vec3, Vec4};

pub const TEST_SIZE: u32 = 8;

/// Square at height `y`, spanning -1..1 in x and z, UVs covering
/// `uv_min..uv_max`.
pub fn quad(y: f32, up: bool, uv_min: Vec2, uv_max: Vec2) -> SurfaceDesc {
    let n = if up { Vec3::Y } else { Vec3::NEG_Y };
    SurfaceDesc {
        positions: vec![
            Vec3::new(-1.0, y, -1.0),
            Vec3::new(1.0, y, -1.0),
            Vec3::new(1.0, y, 1.0),
            Vec3::new(-1.0, y, 1.0),
        ],
        normals: vec![n; 4],
        uv: vec![],
        uv2: vec![
            Vec2::new(uv_min.x, uv_min.y),
            Vec2::new(uv_max.x, uv_min.y),
            Vec2::new(uv_max.x, uv_max.y),
            Vec2::new(uv_min.x, uv_max.y),
        ],
        indices: vec![0, 1, 2, 0, 2, 3],
        material: None,
    }
}

pub fn omni_at(pos: Vec3) -> LightDesc {
    LightDesc {
        transform: Mat4::from_scale_rotation_translation(Vec3::splat(0.05), Quat::IDENTITY, pos),
        ..LightDesc::default()
    }
}

fn scene(surfaces: Vec<SurfaceDesc>, lights: Vec<LightDesc>) -> SceneDesc {
    SceneDesc {
        meshes: vec![MeshDesc {
            name: "test".into(),
            transform: Mat4::IDENTITY,
            surfaces,
        }],
        lights,
        ..Default::default()
    }
}

/// Floor covering the whole map, one omni light above it.
pub fn lit_quad_scene() -> SceneDesc {
    scene(vec![quad(0.0, true, Vec2::ZERO, Vec2::ONE)], vec![omni_at(Vec3::new(0.0, 1.0, 0.0))])
}

/// Floor in the left half of the map under a low ceiling in the right half.
pub fn covered_floor_scene() -> SceneDesc {
    scene(
        vec![
            quad(0.0, true, Vec2::new(0.0, 0.0), Vec2::new(0.5, 1.0)),
            quad(0.2, false, Vec2::new(0.5, 0.0), Vec2::new(1.0, 1.0)),
        ],
        vec![omni_at(Vec3::new(0.0, 0.1, 0.0))],
    )
}

/// Floor in the left half, a glowing panel facing it in the right half.
pub fn emissive_scene() -> SceneDesc {
    let mut panel = quad(1.0, false, Vec2::new(0.5, 0.0), Vec2::new(1.0, 1.0));
    panel.material = Some(0);
    let mut desc = scene(vec![quad(0.0, true, Vec2::new(0.0, 0.0), Vec2::new(0.5, 1.0)), panel], vec![]);
    desc.materials.push(MaterialDesc {
        name: "panel".into(),
        albedo: Vec4::ONE,
        emission: FColor::WHITE,
        emission_energy: 1000.0,
        ..Default::default()
    });
    desc
}

/// Everything a pass needs, built the way the mapper builds it.
pub struct TestBake {
    pub scene: LightScene,
    pub maps: TexelMaps,
    pub settings: AdjustedSettings,
    pub lights: Vec<LLight>,
    pub sky: Option<Sky>,
}

impl TestBake {
    pub fn new(desc: SceneDesc) -> Self {
        Self::with_settings(desc, test_settings())
    }

    pub fn with_settings(desc: SceneDesc, settings: BakeSettings) -> Self {
        let settings = settings.adjusted();
        let params = SceneParams {
            width: settings.width,
            height: settings.height,
            voxel_density: 8,
            max_material_size: settings.max_material_size,
            emission_density: settings.emission_density,
            use_sdf: true,
        };
        let scene = LightScene::build(&desc, &params).unwrap();
        let maps = TexelMaps::rasterize(&scene, settings.width, settings.height);
        let lights = find_lights(&desc, scene.tracer().world_bound());
        Self {
            scene,
            maps,
            settings,
            lights,
            sky: None,
        }
    }

    pub fn context(&self) -> BakeContext<'_> {
        BakeContext {
            scene: &self.scene,
            maps: &self.maps,
            settings: &self.settings,
            lights: &self.lights,
            sky: self.sky.as_ref(),
            seed: 7,
        }
    }
}

pub fn test_settings() -> BakeSettings {
    BakeSettings {
        width: TEST_SIZE,
        height: TEST_SIZE,
        quality: Quality::High,
        num_primary_rays: 4,
        ao_num_samples: 16,
        num_ambient_bounce_rays: 16,
        sky_num_samples: 16,
        ..BakeSettings::default()
    }
}
