//! Bake settings and their quality-adjusted form

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::util::{Error, Result};

/// Sample count tier applied on top of the raw settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
    Final,
}

/// Which images end up in the combined output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BakeMode {
    #[default]
    Lightmap,
    Ao,
    Combined,
}

impl BakeMode {
    pub fn wants_lightmap(self) -> bool {
        matches!(self, Self::Lightmap | Self::Combined)
    }

    pub fn wants_ao(self) -> bool {
        matches!(self, Self::Ao | Self::Combined)
    }
}

/// Direct light gathering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Per texel towards each light.
    #[default]
    Backward,
    /// From each light into the scene through the ray bank.
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseReduction {
    Disabled,
    #[default]
    Simple,
    /// Hand the image to a [`crate::post::Denoiser`].
    Denoiser,
}

/// Everything the user can tune about a bake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeSettings {
    // Output
    pub width: u32,
    pub height: u32,
    pub mode: Mode,
    pub bake_mode: BakeMode,
    pub quality: Quality,
    pub hdr: bool,

    // Direct light
    pub num_primary_rays: u32,
    pub max_light_distance: u32,
    pub high_shadow_quality: bool,

    // Ambient occlusion
    pub ao_num_samples: u32,
    pub ao_range: f32,
    pub ao_error_metric: f32,
    pub ao_abort_timeout: u32,

    // Sky
    pub sky_num_samples: u32,
    pub sky_size: u32,
    pub sky_blur: f32,
    pub sky_brightness: f32,

    // Bounces
    pub num_directional_bounces: u32,
    pub directional_bounce_power: f32,
    pub num_ambient_bounces: u32,
    pub num_ambient_bounce_rays: u32,
    pub ambient_bounce_power: f32,
    pub roughness: f32,

    // Emission
    pub emission_enabled: bool,
    pub emission_density: f32,
    pub emission_power: f32,
    pub glow: f32,

    // Scene
    pub voxel_density: u32,
    pub surface_bias: f32,
    pub max_material_size: u32,
    pub use_sdf: bool,
    pub merge_orig_material: bool,

    // Light probes
    pub process_probes: bool,
    /// Probes along the longest axis of the scene.
    pub probe_density: u32,
    pub probe_samples: u32,

    // Post
    pub normalize: bool,
    pub normalize_multiplier: f32,
    pub light_ao_ratio: f32,
    pub gamma: f32,
    pub noise_reduction: NoiseReduction,
    pub noise_threshold: f32,
    pub noise_reduction_amount: f32,
    pub dilate: bool,
    pub seam_stitching: bool,
    pub seam_distance_threshold: f32,
    /// Degrees.
    pub seam_normal_threshold: f32,

    pub seed: u64,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            mode: Mode::Backward,
            bake_mode: BakeMode::Lightmap,
            quality: Quality::Medium,
            hdr: false,
            num_primary_rays: 32,
            max_light_distance: 0,
            high_shadow_quality: false,
            ao_num_samples: 256,
            ao_range: 2.0,
            ao_error_metric: 0.05,
            ao_abort_timeout: 4,
            sky_num_samples: 512,
            sky_size: 256,
            sky_blur: 0.18,
            sky_brightness: 1.0,
            num_directional_bounces: 0,
            directional_bounce_power: 1.0,
            num_ambient_bounces: 0,
            num_ambient_bounce_rays: 128,
            ambient_bounce_power: 0.5,
            roughness: 0.5,
            emission_enabled: true,
            emission_density: 1.0,
            emission_power: 1.0,
            glow: 1.0,
            voxel_density: 20,
            surface_bias: 0.005,
            max_material_size: 256,
            use_sdf: true,
            merge_orig_material: false,
            process_probes: false,
            probe_density: 64,
            probe_samples: 4096,
            normalize: true,
            normalize_multiplier: 4.0,
            light_ao_ratio: 0.5,
            gamma: 2.2,
            noise_reduction: NoiseReduction::Simple,
            noise_threshold: 0.1,
            noise_reduction_amount: 1.0,
            dilate: true,
            seam_stitching: true,
            seam_distance_threshold: 0.001,
            seam_normal_threshold: 45.0,
            seed: 0,
        }
    }
}

impl BakeSettings {
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

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reject settings no bake can start with.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::invalid(format!(
                "lightmap size {}x{} has no texels",
                self.width, self.height
            )));
        }
        if self.voxel_density == 0 {
            return Err(Error::invalid("voxel density must be at least 1"));
        }
        if self.process_probes && self.probe_density == 0 {
            return Err(Error::invalid("probe density must be at least 1"));
        }
        if !(self.gamma > 0.0) {
            return Err(Error::invalid(format!("gamma {} must be positive", self.gamma)));
        }
        if !(self.surface_bias >= 0.0) {
            return Err(Error::invalid(format!("surface bias {} is negative", self.surface_bias)));
        }
        Ok(())
    }

    /// Apply the quality tier and the sample count minimums.
    pub fn adjusted(&self) -> AdjustedSettings {
        let mut primary = self.num_primary_rays;
        let mut ao = self.ao_num_samples;
        let mut bounce_rays = self.num_ambient_bounce_rays;
        let mut sky = self.sky_num_samples;
        let mut material = self.max_material_size;
        let mut ambient_bounces = self.num_ambient_bounces;
        let mut dir_bounces = self.num_directional_bounces;
        let mut low = false;

        match self.quality {
            Quality::Low => {
                low = true;
                primary = 1;
                ao = 1;
                material = 32;
                ambient_bounces = 0;
                dir_bounces = 0;
                sky = 64;
            }
            Quality::Medium => {
                primary /= 2;
                ao /= 2;
                bounce_rays /= 2;
                sky /= 2;
                material /= 4;
            }
            Quality::High => {}
            Quality::Final => {
                primary *= 2;
                ao *= 2;
                bounce_rays *= 2;
                sky *= 2;
            }
        }

        let primary = primary.max(1);
        let (forward, backward) = if low {
            (1, 4)
        } else {
            ((primary * 16 / 32).max(1), (primary * 128 / 32).max(1))
        };
        let antialias_size = ANTIALIAS_KERNEL_SIZE;
        let kernel_points = antialias_size * antialias_size;

        AdjustedSettings {
            width: self.width,
            height: self.height,
            num_primary_rays: primary,
            forward_num_rays: forward,
            backward_num_rays: backward,
            num_ao_samples: ao.max(1),
            ao_range: self.ao_range,
            ao_error_metric: self.ao_error_metric,
            ao_abort_timeout: self.ao_abort_timeout.max(1),
            max_material_size: material.max(32),
            num_ambient_bounces: ambient_bounces,
            num_ambient_bounce_rays: bounce_rays.max(1),
            ambient_bounce_power: self.ambient_bounce_power,
            num_directional_bounces: dir_bounces,
            directional_bounce_power: self.directional_bounce_power,
            num_sky_samples: sky,
            sky_brightness: self.sky_brightness * self.sky_brightness,
            emission_density: self.emission_density.max(1.0),
            emission_power: self.emission_power,
            glow: self.glow * self.glow,
            smoothness: (1.0 - self.roughness).clamp(0.0, 1.0),
            max_light_distance: self.max_light_distance,
            high_shadow_quality: self.high_shadow_quality,
            surface_bias: self.surface_bias,
            antialias_size,
            light_samples_per_subtexel: (backward / kernel_points).max(1),
            backward_ray_power: 1.0,
        }
    }
}

/// Width of the per-texel antialias kernel.
pub const ANTIALIAS_KERNEL_SIZE: u32 = 3;

/// Settings as the passes use them.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedSettings {
    pub width: u32,
    pub height: u32,
    pub num_primary_rays: u32,
    pub forward_num_rays: u32,
    pub backward_num_rays: u32,
    pub num_ao_samples: u32,
    pub ao_range: f32,
    pub ao_error_metric: f32,
    pub ao_abort_timeout: u32,
    pub max_material_size: u32,
    pub num_ambient_bounces: u32,
    pub num_ambient_bounce_rays: u32,
    pub ambient_bounce_power: f32,
    pub num_directional_bounces: u32,
    pub directional_bounce_power: f32,
    pub num_sky_samples: u32,
    /// Squared.
    pub sky_brightness: f32,
    pub emission_density: f32,
    pub emission_power: f32,
    /// Squared.
    pub glow: f32,
    pub smoothness: f32,
    pub max_light_distance: u32,
    pub high_shadow_quality: bool,
    pub surface_bias: f32,
    pub antialias_size: u32,
    pub light_samples_per_subtexel: u32,
    pub backward_ray_power: f32,
}

impl AdjustedSettings {
    /// Light samples taken for one texel across the whole kernel.
    pub fn antialias_total_light_samples(&self) -> u32 {
        self.antialias_size * self.antialias_size * self.light_samples_per_subtexel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = BakeSettings::default();
        assert_eq!((s.width, s.height), (512, 512));
        assert_eq!(s.quality, Quality::Medium);
        assert_eq!(s.bake_mode, BakeMode::Lightmap);
        assert_eq!(s.noise_reduction, NoiseReduction::Simple);
        assert!(!s.process_probes);
        assert_eq!((s.probe_density, s.probe_samples), (64, 4096));
        s.validate().unwrap();
    }

    #[test]
    fn test_quality_tiers() {
        let mut s = BakeSettings::default();

        s.quality = Quality::High;
        let a = s.adjusted();
        assert_eq!(a.num_primary_rays, 32);
        assert_eq!(a.forward_num_rays, 16);
        assert_eq!(a.backward_num_rays, 128);
        assert_eq!(a.light_samples_per_subtexel, 14);
        assert_eq!(a.max_material_size, 256);

        s.quality = Quality::Medium;
        let a = s.adjusted();
        assert_eq!(a.num_primary_rays, 16);
        assert_eq!(a.num_ao_samples, 128);
        assert_eq!(a.num_ambient_bounce_rays, 64);
        assert_eq!(a.num_sky_samples, 256);
        assert_eq!(a.max_material_size, 64);

        s.quality = Quality::Final;
        let a = s.adjusted();
        assert_eq!(a.num_primary_rays, 64);
        assert_eq!(a.num_ao_samples, 512);

        s.quality = Quality::Low;
        s.num_ambient_bounces = 3;
        let a = s.adjusted();
        assert_eq!(a.num_primary_rays, 1);
        assert_eq!(a.forward_num_rays, 1);
        assert_eq!(a.backward_num_rays, 4);
        assert_eq!(a.num_ao_samples, 1);
        assert_eq!(a.num_ambient_bounces, 0);
        assert_eq!(a.num_sky_samples, 64);
        assert_eq!(a.light_samples_per_subtexel, 1);
    }

    #[test]
    fn test_minimums_and_squares() {
        let s = BakeSettings {
            quality: Quality::High,
            num_primary_rays: 0,
            ao_num_samples: 0,
            num_ambient_bounce_rays: 0,
            max_material_size: 4,
            emission_density: 0.0,
            glow: 3.0,
            sky_brightness: 2.0,
            roughness: 0.25,
            ..Default::default()
        };
        let a = s.adjusted();
        assert_eq!(a.num_primary_rays, 1);
        assert_eq!(a.forward_num_rays, 1);
        assert_eq!(a.backward_num_rays, 4);
        assert_eq!(a.num_ao_samples, 1);
        assert_eq!(a.num_ambient_bounce_rays, 1);
        assert_eq!(a.max_material_size, 32);
        assert_eq!(a.emission_density, 1.0);
        assert_eq!(a.glow, 9.0);
        assert_eq!(a.sky_brightness, 4.0);
        assert_eq!(a.smoothness, 0.75);
        assert_eq!(a.antialias_total_light_samples(), 9);
    }

    #[test]
    fn test_json_partial() {
        let s = BakeSettings::from_json(r#"{"width": 64, "bake_mode": "combined", "quality": "final"}"#).unwrap();
        assert_eq!(s.width, 64);
        assert_eq!(s.height, 512);
        assert_eq!(s.bake_mode, BakeMode::Combined);
        assert!(s.bake_mode.wants_ao() && s.bake_mode.wants_lightmap());
        assert_eq!(s.quality, Quality::Final);

        let back = BakeSettings::from_json(&s.to_json().unwrap()).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_validate() {
        let s = BakeSettings {
            width: 0,
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(Error::InvalidInput(_))));

        let s = BakeSettings {
            gamma: 0.0,
            ..Default::default()
        };
        assert!(s.validate().is_err());

        let s = BakeSettings {
            process_probes: true,
            probe_density: 0,
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(Error::InvalidInput(_))));
    }
}
