//! Whole-bake scenarios through the public API.

use std::f32::consts::FRAC_PI_2;

use llightmap::bake::{BakeProgress, Mode, NoiseReduction};
use llightmap::post::dilate_image;
use llightmap::scene::{LightDesc, LightKind, MeshDesc, SurfaceDesc};
use llightmap::util::{Mat4, Quat, Vec2, Vec3};
use llightmap::{BakeMode, BakeSettings, Error, FColor, LightMapper, NullProgress, Quality, SceneDesc};

fn surface(positions: Vec<Vec3>, uv2: Vec<Vec2>, indices: Vec<u32>) -> SurfaceDesc {
    let normals = vec![Vec3::Y; positions.len()];
    SurfaceDesc {
        positions,
        normals,
        uv2,
        indices,
        ..Default::default()
    }
}

/// Floor triangle mapped to the lower-left half of the UV square.
fn floor_triangle() -> SurfaceDesc {
    surface(
        vec![Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 0.0, -1.0), Vec3::new(-1.0, 0.0, 1.0)],
        vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)],
        vec![0, 2, 1],
    )
}

fn floor_quad() -> SurfaceDesc {
    surface(
        vec![
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
        ],
        vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)],
        vec![0, 2, 1, 0, 3, 2],
    )
}

fn omni_above() -> LightDesc {
    LightDesc {
        transform: Mat4::from_scale_rotation_translation(Vec3::splat(0.05), Quat::IDENTITY, Vec3::new(0.0, 1.0, 0.0)),
        ..Default::default()
    }
}

fn scene(surfaces: Vec<SurfaceDesc>, lights: Vec<LightDesc>) -> SceneDesc {
    SceneDesc {
        meshes: vec![MeshDesc {
            name: "floor".into(),
            surfaces,
            ..Default::default()
        }],
        lights,
        ..Default::default()
    }
}

fn small_settings(size: u32) -> BakeSettings {
    BakeSettings {
        width: size,
        height: size,
        quality: Quality::Low,
        voxel_density: 8,
        ..Default::default()
    }
}

#[test]
fn test_single_triangle_under_omni() {
    let settings = BakeSettings {
        dilate: false,
        ..small_settings(4)
    };
    let out = LightMapper::new(settings)
        .bake(&scene(vec![floor_triangle()], vec![omni_above()]), &mut NullProgress)
        .unwrap();

    let energy = 1.0;
    for y in 0..4u32 {
        for x in 0..4u32 {
            let mapped = out.maps.tri_ids[(x, y)] != 0;
            let light = out.lightmap[(x, y)];
            if x + y <= 1 {
                assert!(mapped, "texel {x},{y} should be mapped");
                assert!(light.max_channel() > 0.0);
            }
            if x + y >= 5 {
                assert!(!mapped, "texel {x},{y} is outside the triangle");
                assert_eq!(light, FColor::BLACK);
            }
            assert!(light.r >= 0.0 && light.max_channel() <= energy + 1e-5);
        }
    }
}

#[test]
fn test_lone_triangle_is_unoccluded() {
    let settings = BakeSettings {
        bake_mode: BakeMode::Ao,
        ao_num_samples: 16,
        ..small_settings(8)
    };
    let out = LightMapper::new(settings)
        .bake(&scene(vec![floor_triangle()], vec![]), &mut NullProgress)
        .unwrap();
    let ao = out.ao.unwrap();
    for (id, v) in out.maps.tri_ids.pixels().iter().zip(ao.pixels()) {
        if *id != 0 {
            assert!((v - 1.0).abs() < 1e-6, "occlusion found with nothing around");
        }
    }
}

#[test]
fn test_dilate_is_idempotent() {
    let out = LightMapper::new(small_settings(8))
        .bake(&scene(vec![floor_triangle()], vec![omni_above()]), &mut NullProgress)
        .unwrap();
    let mut again = out.combined.clone();
    dilate_image(&mut again, &out.maps.tri_ids, 256);
    assert_eq!(again, out.combined);
    assert!(out.combined.pixels().iter().all(|c| *c != FColor::MAGENTA));
}

#[test]
fn test_degenerate_uv_triangle_is_skipped() {
    let mut degenerate = floor_triangle();
    degenerate.uv2 = vec![Vec2::splat(0.5); 3];
    for p in &mut degenerate.positions {
        p.y = 0.5;
    }
    let out = LightMapper::new(small_settings(8))
        .bake(&scene(vec![floor_quad(), degenerate], vec![omni_above()]), &mut NullProgress)
        .unwrap();
    // the quad is triangles 0 and 1
    assert!(out.maps.tri_ids.pixels().iter().all(|&id| id <= 2));
    assert!(out.maps.tri_ids.pixels().iter().any(|&id| id != 0));
}

#[test]
fn test_zero_area_triangle_owns_no_texels() {
    // collinear in world space, a full half of the map in UV space
    let collapsed = surface(
        vec![Vec3::new(0.0, 0.5, 0.0), Vec3::new(1.0, 0.5, 0.0), Vec3::new(2.0, 0.5, 0.0)],
        vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)],
        vec![0, 1, 2],
    );
    let out = LightMapper::new(small_settings(8))
        .bake(&scene(vec![floor_quad(), collapsed], vec![omni_above()]), &mut NullProgress)
        .unwrap();
    assert!(out.maps.tri_ids.pixels().iter().all(|&id| id <= 2));
    assert!(out.lightmap.pixels().iter().all(|c| c.max_channel() > 0.0));
}

#[test]
fn test_upward_directional_light_adds_nothing_forward() {
    let light = LightDesc {
        kind: LightKind::Directional,
        transform: Mat4::from_rotation_x(FRAC_PI_2),
        ..Default::default()
    };
    let settings = BakeSettings {
        mode: Mode::Forward,
        ..small_settings(8)
    };
    let out = LightMapper::new(settings)
        .bake(&scene(vec![floor_quad()], vec![light]), &mut NullProgress)
        .unwrap();
    assert!(out.lightmap.pixels().iter().all(|c| c.is_black()));
}

#[test]
fn test_forward_mode_lights_floor() {
    let settings = BakeSettings {
        mode: Mode::Forward,
        quality: Quality::High,
        num_primary_rays: 64,
        ..small_settings(8)
    };
    let out = LightMapper::new(settings)
        .bake(&scene(vec![floor_quad()], vec![omni_above()]), &mut NullProgress)
        .unwrap();
    assert!(out.lightmap.pixels().iter().any(|c| c.max_channel() > 0.0));
}

/// Cancels as soon as direct lighting starts.
struct CancelAt(&'static str, bool);

impl BakeProgress for CancelAt {
    fn step(&mut self, stage: &str, _fraction: f32) -> bool {
        stage == self.0
    }

    fn end(&mut self) {
        self.1 = true;
    }
}

#[test]
fn test_cancel_mid_bake() {
    let mut progress = CancelAt("direct light", false);
    let err = LightMapper::new(small_settings(8))
        .bake(&scene(vec![floor_quad()], vec![omni_above()]), &mut progress)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(progress.1, "end is reported after a cancel");
}

#[test]
fn test_missing_uv2_fails_setup() {
    let mut surf = floor_quad();
    surf.uv2.clear();
    let err = LightMapper::new(small_settings(8))
        .bake(&scene(vec![surf], vec![omni_above()]), &mut NullProgress)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_) | Error::InvalidScene(_)));
}

#[test]
fn test_noise_reduction_modes_agree_on_flat_light() {
    let mut images = Vec::new();
    for nr in [NoiseReduction::Disabled, NoiseReduction::Simple, NoiseReduction::Denoiser] {
        let settings = BakeSettings {
            noise_reduction: nr,
            ..small_settings(8)
        };
        let out = LightMapper::new(settings)
            .bake(&scene(vec![floor_quad()], vec![omni_above()]), &mut NullProgress)
            .unwrap();
        images.push(out.combined);
    }
    // without a denoiser set the simple filter runs instead
    assert_eq!(images[1], images[2]);
}
