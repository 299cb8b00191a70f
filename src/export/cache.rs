//! Binary texel cache.
//!
//! Stores a [`TexelMaps`] so a later run can skip rasterization. Layout,
//! native endian:
//!
//! ```text
//! magic "LLTC" | version u32 | width u32 | height u32
//! tri_ids     [u32; w*h]
//! barys       [Vec3; w*h]
//! minilists   [MiniList; w*h]
//! num_ids u32 | minilist_tri_ids [u32; num_ids]
//! num_emit u32 | emission_pixels [IVec2; num_emit]
//! emission_colors [FColor; w*h]
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bytemuck::Pod;

use crate::scene::{MiniList, TexelMaps};
use crate::texel::{FColor, LightImage};
use crate::util::{Error, IVec2, Result, Vec3};

const CACHE_MAGIC: [u8; 4] = *b"LLTC";
const CACHE_VERSION: u32 = 1;
/// Largest side accepted when reading.
const MAX_CACHE_SIDE: u32 = 16384;
const MAX_LIST_ENTRIES_PER_TEXEL: usize = 256;

/// Write `maps` to `path`.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn save_texel_cache(path: &Path, maps: &TexelMaps) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    write_texel_cache(&mut w, maps)?;
    w.flush()?;
    Ok(())
}

/// Read maps written by [`save_texel_cache`].
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_texel_cache(path: &Path) -> Result<TexelMaps> {
    let mut r = BufReader::new(File::open(path)?);
    read_texel_cache(&mut r)
}

pub fn write_texel_cache<W: Write>(w: &mut W, maps: &TexelMaps) -> Result<()> {
    w.write_all(&CACHE_MAGIC)?;
    for v in [CACHE_VERSION, maps.width, maps.height] {
        w.write_all(&v.to_ne_bytes())?;
    }
    w.write_all(bytemuck::cast_slice(maps.tri_ids.pixels()))?;
    w.write_all(bytemuck::cast_slice(maps.barys.pixels()))?;
    w.write_all(bytemuck::cast_slice(maps.minilists.pixels()))?;
    w.write_all(&(maps.minilist_tri_ids.len() as u32).to_ne_bytes())?;
    w.write_all(bytemuck::cast_slice(&maps.minilist_tri_ids))?;
    w.write_all(&(maps.emission_pixels.len() as u32).to_ne_bytes())?;
    w.write_all(bytemuck::cast_slice(&maps.emission_pixels))?;
    w.write_all(bytemuck::cast_slice(maps.emission_colors.pixels()))?;
    Ok(())
}

pub fn read_texel_cache<R: Read>(r: &mut R) -> Result<TexelMaps> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != CACHE_MAGIC {
        return Err(Error::InvalidCache("bad magic".into()));
    }
    let version = read_u32(r)?;
    if version != CACHE_VERSION {
        return Err(Error::InvalidCache(format!("unsupported version {version}")));
    }
    let width = read_u32(r)?;
    let height = read_u32(r)?;
    if width == 0 || height == 0 || width > MAX_CACHE_SIDE || height > MAX_CACHE_SIDE {
        return Err(Error::InvalidCache(format!("bad size {width}x{height}")));
    }
    let n = width as usize * height as usize;

    let tri_ids: Vec<u32> = read_array(r, n)?;
    let barys: Vec<Vec3> = read_array(r, n)?;
    let minilists: Vec<MiniList> = read_array(r, n)?;

    let num_ids = read_u32(r)? as usize;
    if num_ids > n * MAX_LIST_ENTRIES_PER_TEXEL {
        return Err(Error::InvalidCache(format!("{num_ids} list entries for {n} texels")));
    }
    if minilists.iter().any(|l| l.first as usize + l.num as usize > num_ids) {
        return Err(Error::InvalidCache("mini-list out of range".into()));
    }
    let minilist_tri_ids: Vec<u32> = read_array(r, num_ids)?;

    let num_emit = read_u32(r)? as usize;
    if num_emit > n {
        return Err(Error::InvalidCache(format!("{num_emit} emission texels in {n}")));
    }
    let emission_pixels: Vec<IVec2> = read_array(r, num_emit)?;
    if emission_pixels
        .iter()
        .any(|p| p.x < 0 || p.y < 0 || p.x >= width as i32 || p.y >= height as i32)
    {
        return Err(Error::InvalidCache("emission texel outside the image".into()));
    }
    let emission_colors: Vec<FColor> = read_array(r, n)?;

    Ok(TexelMaps {
        width,
        height,
        tri_ids: to_image(width, height, tri_ids)?,
        barys: to_image(width, height, barys)?,
        minilists: to_image(width, height, minilists)?,
        minilist_tri_ids,
        emission_pixels,
        emission_colors: to_image(width, height, emission_colors)?,
    })
}

fn to_image<T: Copy + Default>(width: u32, height: u32, pixels: Vec<T>) -> Result<LightImage<T>> {
    LightImage::from_vec(width, height, pixels).ok_or_else(|| Error::InvalidCache("image size".into()))
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_ne_bytes(b))
}

fn read_array<T: Pod, R: Read>(r: &mut R, len: usize) -> Result<Vec<T>> {
    let mut out = vec![T::zeroed(); len];
    r.read_exact(bytemuck::cast_slice_mut(&mut out))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::test_scene::{emissive_scene, TestBake};

    #[test]
    fn test_cache_roundtrip() {
        let bake = TestBake::new(emissive_scene());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maps.lltc");
        save_texel_cache(&path, &bake.maps).unwrap();

        let back = load_texel_cache(&path).unwrap();
        assert_eq!(back.tri_ids, bake.maps.tri_ids);
        assert_eq!(back.barys, bake.maps.barys);
        assert_eq!(back.minilists, bake.maps.minilists);
        assert_eq!(back.minilist_tri_ids, bake.maps.minilist_tri_ids);
        assert_eq!(back.emission_pixels, bake.maps.emission_pixels);
        assert!(!back.emission_pixels.is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let data = b"NOPE\x01\x00\x00\x00".to_vec();
        let err = read_texel_cache(&mut data.as_slice()).unwrap_err();
        assert!(matches!(err, Error::InvalidCache(_)));
    }

    #[test]
    fn test_truncated_cache_fails() {
        let bake = TestBake::new(emissive_scene());
        let mut data = Vec::new();
        write_texel_cache(&mut data, &bake.maps).unwrap();
        data.truncate(data.len() / 2);
        assert!(read_texel_cache(&mut data.as_slice()).is_err());
    }

    #[test]
    fn test_wrong_version() {
        let mut data = CACHE_MAGIC.to_vec();
        data.extend_from_slice(&99u32.to_ne_bytes());
        let err = read_texel_cache(&mut data.as_slice()).unwrap_err();
        assert!(err.to_string().contains("version"));
    }
}
