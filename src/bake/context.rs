//! Read-only state every lighting pass shares.

use rand::Rng;

use super::lights::LLight;
use super::progress::BakeProgress;
use super::settings::AdjustedSettings;
use super::sky::Sky;
use crate::scene::{LightScene, TexelMaps};
use crate::util::{Error, Result, Vec2, Vec3};

/// Rows per progress step in the texel passes.
const ROWS_PER_SECTION_DIVISOR: u32 = 64;

/// Surface data at one texel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexelData {
    pub tri_id: u32,
    pub bary: Vec3,
    /// Surface point pushed off the face plane by the surface bias.
    pub pos: Vec3,
    /// Interpolated vertex normal.
    pub normal: Vec3,
    pub plane_normal: Vec3,
}

pub struct BakeContext<'a> {
    pub scene: &'a LightScene,
    pub maps: &'a TexelMaps,
    pub settings: &'a AdjustedSettings,
    pub lights: &'a [LLight],
    pub sky: Option<&'a Sky>,
    pub seed: u64,
}

impl<'a> BakeContext<'a> {
    pub fn width(&self) -> u32 {
        self.maps.width
    }

    pub fn height(&self) -> u32 {
        self.maps.height
    }

    /// Surface data at a triangle barycentric.
    pub fn texel_data_at(&self, tri_id: u32, bary: Vec3) -> TexelData {
        let (pos, normal) = self.scene.surface_at(tri_id, bary);
        let plane_normal = self.scene.planes[tri_id as usize].normal;
        TexelData {
            tri_id,
            bary,
            pos: pos + plane_normal * self.settings.surface_bias,
            normal,
            plane_normal,
        }
    }

    /// Surface data at the centre of texel `(x, y)`; `None` when unmapped.
    pub fn load_texel_data(&self, x: u32, y: u32) -> Option<TexelData> {
        let tri_id = self.maps.tri_id(x, y)?;
        Some(self.texel_data_at(tri_id, self.maps.barys[(x, y)]))
    }

    /// Lightmap texel holding the primary hit of `tri_id` at `bary`.
    pub fn hit_texel(&self, tri_id: u32, bary: Vec3) -> (i32, i32) {
        let uv = self.scene.uv_tris[tri_id as usize].interpolate(bary);
        texel_of(uv, self.width(), self.height())
    }

    /// UV of a kernel point inside texel `(x, y)`.
    pub fn subtexel_st(&self, x: u32, y: u32, k: Vec2) -> Vec2 {
        Vec2::new(
            (x as f32 + k.x) / self.width() as f32,
            (y as f32 + k.y) / self.height() as f32,
        )
    }

    /// Random UV inside texel `(x, y)`.
    pub fn random_st<R: Rng + ?Sized>(&self, rng: &mut R, x: u32, y: u32) -> Vec2 {
        self.subtexel_st(x, y, Vec2::new(rng.gen(), rng.gen()))
    }
}

/// Texel containing UV `uv`; may be outside the image.
pub fn texel_of(uv: Vec2, width: u32, height: u32) -> (i32, i32) {
    ((uv.x * width as f32).floor() as i32, (uv.y * height as f32).floor() as i32)
}

/// Split `height` rows into progress sections.
pub fn row_sections(height: u32, divisor: u32) -> Vec<std::ops::Range<u32>> {
    let per = (height / divisor.max(1)).max(1);
    let mut out = Vec::new();
    let mut y = 0;
    while y < height {
        let end = (y + per).min(height);
        out.push(y..end);
        y = end;
    }
    out
}

/// Sections for the per-texel passes.
pub fn texel_sections(height: u32) -> Vec<std::ops::Range<u32>> {
    row_sections(height, ROWS_PER_SECTION_DIVISOR)
}

/// Report a section and turn a cancel request into an error.
pub fn step_progress(progress: &mut dyn BakeProgress, stage: &str, done: u32, total: u32) -> Result<()> {
    let fraction = if total == 0 { 1.0 } else { done as f32 / total as f32 };
    if progress.step(stage, fraction) {
        tracing::info!(stage, "bake cancelled");
        return Err(Error::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_cover_rows() {
        let s = row_sections(130, 64);
        assert_eq!(s.first(), Some(&(0..2)));
        assert_eq!(s.last().map(|r| r.end), Some(130));
        assert_eq!(s.iter().map(|r| r.len()).sum::<usize>(), 130);

        // fewer rows than sections
        assert_eq!(row_sections(4, 64).len(), 4);
        assert!(row_sections(0, 64).is_empty());
    }

    #[test]
    fn test_texel_of() {
        assert_eq!(texel_of(Vec2::new(0.0, 0.99), 4, 4), (0, 3));
        assert_eq!(texel_of(Vec2::new(1.0, -0.01), 4, 4), (4, -1));
    }

    #[test]
    fn test_step_progress_cancels() {
        struct StopAt(f32);
        impl BakeProgress for StopAt {
            fn step(&mut self, _stage: &str, fraction: f32) -> bool {
                fraction >= self.0
            }
        }
        let mut p = StopAt(0.5);
        assert!(step_progress(&mut p, "ao", 1, 4).is_ok());
        assert!(matches!(step_progress(&mut p, "ao", 2, 4), Err(Error::Cancelled)));
    }
}
