//! Combining the per-pass images into the final lightmap.

use rayon::prelude::*;

use super::settings::{BakeMode, BakeSettings};
use crate::texel::{FColor, LightImage};

/// Images with a smaller maximum are left alone by [`normalize_image`].
pub const MIN_NORMALIZE_MAX: f32 = 0.001;

/// Scale `image` so its brightest channel becomes `multiplier`.
///
/// Returns `false` and leaves the image untouched when it is (nearly) black.
pub fn normalize_image(image: &mut LightImage<FColor>, multiplier: f32) -> bool {
    let max = image.pixels().par_iter().map(|c| c.max_channel()).reduce(|| 0.0, f32::max);
    if max < MIN_NORMALIZE_MAX {
        return false;
    }
    let scale = multiplier / max;
    image.pixels_mut().par_iter_mut().for_each(|c| *c *= scale);
    true
}

/// Starting point for the ambient bounce passes: direct light plus emission.
pub fn merge_for_ambient_bounces(lightmap: &LightImage<FColor>, emission: Option<&LightImage<FColor>>) -> LightImage<FColor> {
    let mut main = lightmap.clone();
    if let Some(emission) = emission {
        main.add_image(emission);
    }
    main
}

/// Everything that can feed the combined image.
#[derive(Debug, Clone, Copy)]
pub struct MergeSources<'a> {
    pub lightmap: &'a LightImage<FColor>,
    pub bounce: Option<&'a LightImage<FColor>>,
    pub emission: Option<&'a LightImage<FColor>>,
    pub glow: Option<&'a LightImage<FColor>>,
    /// Visibility, 1 for fully open.
    pub ao: Option<&'a LightImage<f32>>,
    pub orig_material: Option<&'a LightImage<FColor>>,
}

/// Result of [`merge_to_combined`].
#[derive(Debug, Clone)]
pub struct Combined {
    pub image: LightImage<FColor>,
    /// The light part was too dark to normalize.
    pub normalize_skipped: bool,
}

/// Blend light and AO per the bake mode, then gamma correct.
///
/// Post processing (noise reduction, stitching, dilation) runs afterwards
/// on the returned image.
#[tracing::instrument(skip_all, fields(mode = ?settings.bake_mode))]
pub fn merge_to_combined(src: &MergeSources<'_>, settings: &BakeSettings) -> Combined {
    let mut lum = src.lightmap.clone();
    for extra in [src.bounce, src.emission, src.glow].into_iter().flatten() {
        lum.add_image(extra);
    }
    if let Some(material) = src.orig_material {
        for (l, m) in lum.pixels_mut().iter_mut().zip(material.pixels()) {
            *l *= *m;
        }
    }

    let mut normalize_skipped = false;
    if settings.normalize && settings.bake_mode.wants_lightmap() {
        normalize_skipped = !normalize_image(&mut lum, settings.normalize_multiplier);
    }

    let ratio = settings.light_ao_ratio.clamp(0.0, 1.0);
    let mode = settings.bake_mode;
    let inv_gamma = 1.0 / settings.gamma;
    let hdr = settings.hdr;

    lum.pixels_mut().par_iter_mut().enumerate().for_each(|(i, c)| {
        let ao = src.ao.map_or(1.0, |ao| ao.pixels()[i]);
        let f = blend(mode, ratio, *c, ao);
        *c = if hdr { f } else { f.max(FColor::BLACK).powf(inv_gamma) };
    });

    Combined { image: lum, normalize_skipped }
}

/// Mix one texel. Below a ratio of one half AO dominates, lit by a growing
/// share of the light; above it the light takes over.
fn blend(mode: BakeMode, ratio: f32, lum: FColor, ao: f32) -> FColor {
    match mode {
        BakeMode::Lightmap => lum,
        BakeMode::Ao => FColor::splat(ao),
        BakeMode::Combined => {
            if ratio < 0.5 {
                let r = ratio / 0.5;
                FColor::splat((1.0 - r) * ao) + lum * (ao * r)
            } else {
                let r = (ratio - 0.5) / 0.5;
                lum * (ao * (1.0 - r)) + lum * r
            }
        }
    }
}

/// Paint unmapped texels magenta so gaps are visible without dilation.
pub fn mark_unmapped(image: &mut LightImage<FColor>, tri_ids: &LightImage<u32>) {
    for (c, &id) in image.pixels_mut().iter_mut().zip(tri_ids.pixels()) {
        if id == 0 {
            *c = FColor::MAGENTA;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(w: u32, h: u32, v: f32) -> LightImage<FColor> {
        LightImage::filled(w, h, FColor::splat(v))
    }

    #[test]
    fn test_normalize_scales_to_multiplier() {
        let mut im = lit(2, 2, 0.25);
        im[(1, 1)] = FColor::new(0.5, 0.1, 0.0);
        assert!(normalize_image(&mut im, 4.0));
        assert!((im[(1, 1)].r - 4.0).abs() < 1e-5);
        assert!((im[(0, 0)].g - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_normalize_skips_black() {
        let mut im = lit(2, 2, 0.0005);
        assert!(!normalize_image(&mut im, 4.0));
        assert_eq!(im[(0, 0)], FColor::splat(0.0005));
    }

    #[test]
    fn test_blend_endpoints() {
        let l = FColor::new(0.8, 0.4, 0.2);
        assert_eq!(blend(BakeMode::Combined, 0.0, l, 0.5), FColor::splat(0.5));
        assert_eq!(blend(BakeMode::Combined, 1.0, l, 0.5), l);
        let mid = blend(BakeMode::Combined, 0.5, l, 0.5);
        assert!((mid.r - 0.4).abs() < 1e-6);
        assert_eq!(blend(BakeMode::Ao, 0.3, l, 0.25), FColor::splat(0.25));
        assert_eq!(blend(BakeMode::Lightmap, 0.3, l, 0.25), l);
    }

    #[test]
    fn test_combined_adds_light_terms_and_gamma() {
        let light = lit(2, 1, 0.25);
        let bounce = lit(2, 1, 0.25);
        let settings = BakeSettings {
            normalize: false,
            gamma: 2.0,
            ..Default::default()
        };
        let src = MergeSources {
            lightmap: &light,
            bounce: Some(&bounce),
            emission: None,
            glow: None,
            ao: None,
            orig_material: None,
        };
        let out = merge_to_combined(&src, &settings);
        assert!(!out.normalize_skipped);
        assert!((out.image[(0, 0)].r - 0.5f32.sqrt()).abs() < 1e-5);

        let hdr = BakeSettings { hdr: true, ..settings };
        let out = merge_to_combined(&src, &hdr);
        assert!((out.image[(1, 0)].g - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_combined_reports_dark_normalize() {
        let light = lit(2, 2, 0.0);
        let src = MergeSources {
            lightmap: &light,
            bounce: None,
            emission: None,
            glow: None,
            ao: None,
            orig_material: None,
        };
        let out = merge_to_combined(&src, &BakeSettings::default());
        assert!(out.normalize_skipped);
    }

    #[test]
    fn test_material_tints_light() {
        let light = lit(1, 1, 1.0);
        let material = LightImage::filled(1, 1, FColor::new(1.0, 0.5, 0.0));
        let settings = BakeSettings {
            normalize: false,
            hdr: true,
            ..Default::default()
        };
        let src = MergeSources {
            lightmap: &light,
            bounce: None,
            emission: None,
            glow: None,
            ao: None,
            orig_material: Some(&material),
        };
        let out = merge_to_combined(&src, &settings);
        assert_eq!(out.image[(0, 0)], FColor::new(1.0, 0.5, 0.0));
    }

    #[test]
    fn test_mark_unmapped() {
        let mut im = lit(2, 1, 0.5);
        let mut ids = LightImage::new(2, 1);
        ids[(1, 0)] = 3;
        mark_unmapped(&mut im, &ids);
        assert_eq!(im[(0, 0)], FColor::MAGENTA);
        assert_eq!(im[(1, 0)], FColor::splat(0.5));
    }
}
