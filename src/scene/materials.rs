//! Bake-time materials: albedo, transparency, roughness and emission.

use super::input::{MaterialDesc, TextureDesc};
use crate::texel::FColor;
use crate::util::{Vec2, Vec4};

/// Emission energy is divided by this to be comparable with light energy.
const EMISSION_ENERGY_SCALE: f32 = 1000.0;

/// Small RGBA texture, sampled nearest with wrap-around.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    width: u32,
    height: u32,
    colors: Vec<Vec4>,
}

impl Texture {
    /// One texel of `color`.
    pub fn solid(color: Vec4) -> Self {
        Self {
            width: 1,
            height: 1,
            colors: vec![color],
        }
    }

    /// Copy `desc`, multiply RGB by `mul` and halve until both sides fit `max_size`.
    ///
    /// A malformed description (pixel count not matching the size) becomes a
    /// solid `mul` texture.
    pub fn from_desc(desc: &TextureDesc, mul: Vec4, max_size: u32) -> Self {
        let expected = desc.width as usize * desc.height as usize;
        if expected == 0 || desc.pixels.len() != expected {
            tracing::warn!(
                width = desc.width,
                height = desc.height,
                pixels = desc.pixels.len(),
                "texture size mismatch, using flat color"
            );
            return Self::solid(mul);
        }

        let mut tex = Self {
            width: desc.width,
            height: desc.height,
            colors: desc
                .pixels
                .iter()
                .map(|c| Vec4::new(c.x * mul.x, c.y * mul.y, c.z * mul.z, c.w))
                .collect(),
        };
        let max_size = max_size.max(1);
        while tex.width > max_size || tex.height > max_size {
            tex = tex.halved();
        }
        tex
    }

    /// 2x2 box downsample.
    fn halved(&self) -> Self {
        let w = (self.width / 2).max(1);
        let h = (self.height / 2).max(1);
        let mut colors = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                let mut sum = Vec4::ZERO;
                let mut n = 0.0;
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let sx = (x * 2 + dx).min(self.width - 1);
                    let sy = (y * 2 + dy).min(self.height - 1);
                    sum += self.colors[(sy * self.width + sx) as usize];
                    n += 1.0;
                }
                colors.push(sum / n);
            }
        }
        Self {
            width: w,
            height: h,
            colors,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Nearest sample with the UV wrapped into `[0, 1)`.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let mut x = uv.x % 1.0;
        let mut y = uv.y % 1.0;
        if x < 0.0 {
            x += 1.0;
        }
        if y < 0.0 {
            y += 1.0;
        }
        let tx = ((x * self.width as f32) as u32).min(self.width - 1);
        let ty = ((y * self.height as f32) as u32).min(self.height - 1);
        self.colors[(ty * self.width + tx) as usize]
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub albedo: Texture,
    pub emission_texture: Option<Texture>,
    pub is_transparent: bool,
    pub is_emitter: bool,
    pub roughness: f32,
    /// Emission energy after scaling.
    pub power_emission: f32,
    /// Emission color multiplied by `power_emission`.
    pub color_emission: FColor,
}

impl Material {
    pub fn from_desc(desc: &MaterialDesc, max_material_size: u32) -> Self {
        let albedo = match &desc.albedo_texture {
            Some(tex) => Texture::from_desc(tex, desc.albedo, max_material_size),
            None => Texture::solid(desc.albedo),
        };
        let emission_texture = desc
            .emission_texture
            .as_ref()
            .map(|tex| Texture::from_desc(tex, Vec4::ONE, max_material_size));

        let is_emitter = desc.emission_energy > 0.0;
        let power_emission = if is_emitter {
            desc.emission_energy / EMISSION_ENERGY_SCALE
        } else {
            0.0
        };

        Self {
            name: desc.name.clone(),
            albedo,
            emission_texture,
            is_transparent: desc.transparent,
            is_emitter,
            roughness: desc.roughness.clamp(0.0, 1.0),
            power_emission,
            color_emission: desc.emission * power_emission,
        }
    }
}

/// Surface colors at one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSample {
    /// RGB albedo, alpha is opacity.
    pub albedo: Vec4,
    pub emission: FColor,
    pub is_opaque: bool,
    pub is_emitter: bool,
    pub roughness: f32,
}

impl Default for ColorSample {
    fn default() -> Self {
        Self {
            albedo: Vec4::ONE,
            emission: FColor::BLACK,
            is_opaque: true,
            is_emitter: false,
            roughness: 1.0,
        }
    }
}

impl ColorSample {
    pub fn albedo_rgb(&self) -> FColor {
        FColor::new(self.albedo.x, self.albedo.y, self.albedo.z)
    }

    pub fn alpha(&self) -> f32 {
        self.albedo.w
    }
}

/// All materials of a scene. IDs are 1-based; 0 means "no material".
#[derive(Debug, Clone, Default)]
pub struct Materials {
    materials: Vec<Material>,
}

impl Materials {
    pub fn new(descs: &[MaterialDesc], max_material_size: u32) -> Self {
        Self {
            materials: descs.iter().map(|d| Material::from_desc(d, max_material_size)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Material by 1-based ID.
    pub fn get(&self, id_p1: u32) -> Option<&Material> {
        id_p1.checked_sub(1).and_then(|i| self.materials.get(i as usize))
    }

    /// Keep emitted brightness constant when more emission samples are taken.
    pub fn adjust_for_emission_density(&mut self, emission_density: f32) {
        if emission_density == 0.0 {
            return;
        }
        let mult = 1.0 / emission_density;
        for mat in self.materials.iter_mut().filter(|m| m.is_emitter) {
            mat.power_emission *= mult;
            mat.color_emission *= mult;
        }
    }

    /// Colors of material `id_p1` at primary UV `uv`.
    pub fn find_colors(&self, id_p1: u32, uv: Vec2) -> ColorSample {
        let Some(mat) = self.get(id_p1) else {
            return ColorSample::default();
        };

        let mut sample = ColorSample {
            albedo: mat.albedo.sample(uv),
            is_opaque: !mat.is_transparent,
            is_emitter: mat.is_emitter,
            roughness: mat.roughness,
            ..Default::default()
        };
        if mat.is_emitter {
            let tex = mat
                .emission_texture
                .as_ref()
                .map_or(FColor::WHITE, |t| FColor::from_vec3(t.sample(uv).truncate()));
            sample.emission = mat.color_emission * tex;
        }
        sample
    }
}
