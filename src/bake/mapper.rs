//! The bake pipeline.
//!
//! [`LightMapper::bake`] runs every stage in order: scene build, UV
//! rasterization, AO, direct light, emission, bounces, light probes,
//! material, then the merge and post passes. Each stage finishes completely before the next
//! starts. A cancelled or failed bake returns an error and no images.

use std::sync::Once;
use std::time::Instant;

use super::ao::process_ao;
use super::bounce::process_ambient_bounces;
use super::context::BakeContext;
use super::direct::process_backward;
use super::emission::process_emission;
use super::lights::find_lights;
use super::material::process_orig_material;
use super::merge::{mark_unmapped, merge_for_ambient_bounces, merge_to_combined, normalize_image, MergeSources};
use super::probes::{process_probes, LightProbes, ProbeParams};
use super::progress::BakeProgress;
use super::raybank::process_forward;
use super::settings::{AdjustedSettings, BakeSettings, Mode, NoiseReduction};
use super::sky::Sky;
use crate::post::{denoise_image, dilate_image, smooth_image, stitch_seams, Denoiser, StitchParams, MAX_DILATE_DISTANCE};
use crate::scene::{antialias_kernel, LightScene, SceneDesc, SceneParams, TexelMaps};
use crate::texel::{FColor, LightImage};
use crate::util::{Error, Result};

/// Every image a bake produces. Unused images are black.
#[derive(Debug, Clone)]
pub struct BakeOutput {
    /// Direct light, always scaled to a maximum of 1.
    ///
    /// [`BakeSettings::normalize`] does not apply here. It only controls the
    /// light part of [`BakeOutput::combined`].
    pub lightmap: LightImage<FColor>,
    /// AO visibility when the bake mode asked for it.
    pub ao: Option<LightImage<f32>>,
    /// Final image after merge and post processing.
    pub combined: LightImage<FColor>,
    pub emission: LightImage<FColor>,
    pub glow: LightImage<FColor>,
    /// Light added by the ambient bounce passes.
    pub bounce: LightImage<FColor>,
    pub orig_material: Option<LightImage<FColor>>,
    /// Probe grid when [`BakeSettings::process_probes`] is set and the scene
    /// has volume.
    pub probes: Option<LightProbes>,
    /// Rasterization result, reusable through [`LightMapper::set_texel_maps`].
    pub maps: TexelMaps,
}

/// Bakes lightmaps for scene descriptions.
pub struct LightMapper {
    settings: BakeSettings,
    sky: Option<LightImage<FColor>>,
    denoiser: Option<Box<dyn Denoiser>>,
    cached_maps: Option<TexelMaps>,
    normalize_warning: Once,
    seed: u64,
}

impl LightMapper {
    pub fn new(settings: BakeSettings) -> Self {
        let seed = settings.seed;
        Self {
            settings,
            sky: None,
            denoiser: None,
            cached_maps: None,
            normalize_warning: Once::new(),
            seed,
        }
    }

    pub fn settings(&self) -> &BakeSettings {
        &self.settings
    }

    /// Equirectangular environment used for sky light.
    pub fn set_sky(&mut self, image: LightImage<FColor>) {
        self.sky = Some(image);
    }

    /// Denoiser used when noise reduction is [`NoiseReduction::Denoiser`].
    pub fn set_denoiser(&mut self, denoiser: Box<dyn Denoiser>) {
        self.denoiser = Some(denoiser);
    }

    /// Reuse a previous rasterization instead of running it again.
    pub fn set_texel_maps(&mut self, maps: TexelMaps) {
        self.cached_maps = Some(maps);
    }

    /// Bake `desc`. `progress` is stepped throughout and may cancel.
    pub fn bake(&mut self, desc: &SceneDesc, progress: &mut dyn BakeProgress) -> Result<BakeOutput> {
        let start = Instant::now();
        let result = self.bake_stages(desc, progress);
        progress.end();
        match &result {
            Ok(_) => tracing::info!(ms = start.elapsed().as_millis() as u64, "bake finished"),
            Err(Error::Cancelled) => tracing::info!("bake cancelled, no output"),
            Err(e) => tracing::warn!(error = %e, "bake failed"),
        }
        result
    }

    fn bake_stages(&mut self, desc: &SceneDesc, progress: &mut dyn BakeProgress) -> Result<BakeOutput> {
        self.settings.validate()?;
        let settings = self.settings.adjusted();
        let s = self.settings.clone();

        let scene = timed("scene", || {
            LightScene::build(
                desc,
                &SceneParams {
                    width: s.width,
                    height: s.height,
                    voxel_density: s.voxel_density,
                    max_material_size: settings.max_material_size,
                    emission_density: settings.emission_density,
                    use_sdf: s.use_sdf,
                },
            )
        })?;
        let lights = find_lights(desc, scene.tracer().world_bound());
        tracing::info!(tris = scene.num_tris(), lights = lights.len(), "scene built");

        let kernel = antialias_kernel(settings.antialias_size);
        let maps = match self.cached_maps.take() {
            Some(maps) if cache_fits(&maps, &scene, &settings) => maps,
            cached => {
                if cached.is_some() {
                    tracing::warn!("cached texel maps do not fit this bake, rasterizing");
                }
                timed("rasterize", || {
                    let mut maps = TexelMaps::rasterize(&scene, settings.width, settings.height);
                    maps.reclaim_texels(&scene, &kernel);
                    maps
                })
            }
        };

        let sky = self.sky.as_ref().and_then(|im| Sky::new(im, s.sky_blur, s.sky_size));
        let ctx = BakeContext {
            scene: &scene,
            maps: &maps,
            settings: &settings,
            lights: &lights,
            sky: sky.as_ref(),
            seed: self.seed,
        };
        let (w, h) = (settings.width, settings.height);

        let ao = if s.bake_mode.wants_ao() {
            Some(timed("ao", || process_ao(&ctx, progress))?.visibility)
        } else {
            None
        };

        let mut lightmap = if s.bake_mode.wants_lightmap() {
            match s.mode {
                Mode::Backward => timed("direct light", || process_backward(&ctx, &kernel, progress))?,
                Mode::Forward => timed("forward light", || process_forward(&ctx, progress))?,
            }
        } else {
            LightImage::new(w, h)
        };
        normalize_image(&mut lightmap, 1.0);

        let (mut emission, mut glow) = if s.emission_enabled && s.bake_mode.wants_lightmap() && !maps.emission_pixels.is_empty() {
            let r = timed("emission", || process_emission(&ctx, progress))?;
            (r.emission, r.glow)
        } else {
            (LightImage::new(w, h), LightImage::new(w, h))
        };
        normalize_image(&mut emission, 1.0);
        normalize_image(&mut glow, 1.0);

        let bounce = if settings.num_ambient_bounces > 0 && s.bake_mode.wants_lightmap() {
            let mut main = merge_for_ambient_bounces(&lightmap, Some(&emission));
            let mut bounce = main.clone();
            timed("ambient bounces", || process_ambient_bounces(&ctx, &mut main, progress))?;
            bounce.subtract_from(&main);
            bounce
        } else {
            LightImage::new(w, h)
        };

        let probes = if s.process_probes && s.bake_mode.wants_lightmap() {
            if scene.tracer().world_bound().size().min_element() > 0.0 {
                let mut lit = merge_for_ambient_bounces(&lightmap, Some(&emission));
                lit.add_image(&bounce);
                let params = ProbeParams {
                    density: s.probe_density,
                    samples: s.probe_samples,
                    gamma: s.gamma,
                };
                Some(timed("light probes", || process_probes(&ctx, &lit, &params, progress))?)
            } else {
                tracing::warn!("scene is flat, no light probes");
                None
            }
        } else {
            None
        };

        let orig_material = s
            .merge_orig_material
            .then(|| timed("material", || process_orig_material(&ctx, settings.antialias_size)));

        let src = MergeSources {
            lightmap: &lightmap,
            bounce: Some(&bounce),
            emission: Some(&emission),
            glow: Some(&glow),
            ao: ao.as_ref(),
            orig_material: orig_material.as_ref(),
        };
        let mut combined = self.merge(&scene, &src)?;

        let mut ao = ao;
        if s.dilate {
            dilate_image(&mut combined, &maps.tri_ids, MAX_DILATE_DISTANCE);
            dilate_image(&mut lightmap, &maps.tri_ids, MAX_DILATE_DISTANCE);
            if let Some(ao) = ao.as_mut() {
                dilate_image(ao, &maps.tri_ids, MAX_DILATE_DISTANCE);
            }
        } else {
            mark_unmapped(&mut combined, &maps.tri_ids);
        }

        Ok(BakeOutput {
            lightmap,
            ao,
            combined,
            emission,
            glow,
            bounce,
            orig_material,
            probes,
            maps,
        })
    }

    /// Combine the pass images and run noise reduction and stitching.
    fn merge(&mut self, scene: &LightScene, src: &MergeSources<'_>) -> Result<LightImage<FColor>> {
        let start = Instant::now();
        let s = &self.settings;
        let combined = merge_to_combined(src, s);
        if combined.normalize_skipped {
            self.normalize_warning
                .call_once(|| tracing::warn!("lightmap too dark to normalize, left unscaled"));
        }
        let mut image = combined.image;

        match s.noise_reduction {
            NoiseReduction::Disabled => {}
            NoiseReduction::Simple => smooth_image(&mut image, s.noise_threshold, s.noise_reduction_amount),
            NoiseReduction::Denoiser => match self.denoiser.as_mut() {
                Some(denoiser) => denoise_image(denoiser.as_mut(), &mut image)?,
                None => {
                    tracing::warn!("no denoiser set, using the simple filter");
                    smooth_image(&mut image, s.noise_threshold, s.noise_reduction_amount);
                }
            },
        }

        if s.seam_stitching {
            let params = StitchParams {
                distance: s.seam_distance_threshold,
                normal_angle: s.seam_normal_threshold,
            };
            stitch_seams(scene, &mut image, params);
        }
        tracing::info!(stage = "merge", ms = start.elapsed().as_millis() as u64, "stage done");
        Ok(image)
    }
}

/// Run one stage and log how long it took.
fn timed<T>(stage: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    tracing::info!(stage, ms = start.elapsed().as_millis() as u64, "stage done");
    out
}

/// Cached maps must match the image size and reference only existing
/// triangles.
fn cache_fits(maps: &TexelMaps, scene: &LightScene, settings: &AdjustedSettings) -> bool {
    let num_tris = scene.num_tris() as u32;
    maps.width == settings.width
        && maps.height == settings.height
        && maps.tri_ids.pixels().iter().all(|&id| id <= num_tris)
        && maps.minilist_tri_ids.iter().all(|&id| id < num_tris)
}
