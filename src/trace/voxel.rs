//! Voxel cells and the empty-space distance field.

use super::packed::PackedTriangles;
use crate::geom::EdgeTri;
use crate::util::IVec3;

/// SDF value of a voxel that has not been reached by relaxation.
pub const SDF_UNSET: u32 = u32::MAX;

/// One grid cell: the triangles overlapping it, packed in fours.
#[derive(Debug, Clone)]
pub struct Voxel {
    pub tri_ids: Vec<u32>,
    pub packed: Vec<PackedTriangles>,
    /// Voxel steps to the nearest non-empty voxel; 0 when this one has triangles.
    pub sdf: u32,
}

impl Default for Voxel {
    fn default() -> Self {
        Self {
            tri_ids: Vec::new(),
            packed: Vec::new(),
            sdf: SDF_UNSET,
        }
    }
}

impl Voxel {
    pub fn add_triangle(&mut self, tri: &EdgeTri, tri_id: u32) {
        let n = self.tri_ids.len();
        let (group, lane) = (n / 4, n % 4);
        if group >= self.packed.len() {
            self.packed.push(PackedTriangles::default());
        }
        self.packed[group].set(lane, tri);
        self.tri_ids.push(tri_id);
    }

    /// Mask the unused lanes of the last group and seed the SDF.
    pub fn finalize(&mut self) {
        let n = self.tri_ids.len();
        if let Some(last) = self.packed.last_mut() {
            let rem = n % 4;
            last.finalize(if rem == 0 { 4 } else { rem });
        }
        if n > 0 {
            self.sdf = 0;
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tri_ids.is_empty()
    }

    /// Triangle ID stored at `lane` of packed group `group`.
    #[inline]
    pub fn tri_id(&self, group: usize, lane: usize) -> u32 {
        self.tri_ids[group * 4 + lane]
    }
}

/// Relax the distance field against the 26 neighbours until stable.
///
/// Runs at most `max(dims)` sweeps, which is enough for any voxel to hear
/// from the furthest non-empty one.
pub fn calculate_sdf(voxels: &mut [Voxel], dims: IVec3) {
    let index = |x: i32, y: i32, z: i32| (z * dims.x * dims.y + y * dims.x + x) as usize;
    let iterations = dims.max_element();

    for _ in 0..iterations {
        let mut changed = false;
        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    let mut lowest = SDF_UNSET - 1;
                    for nz in -1..=1 {
                        for ny in -1..=1 {
                            for nx in -1..=1 {
                                if nx == 0 && ny == 0 && nz == 0 {
                                    continue;
                                }
                                let (px, py, pz) = (x + nx, y + ny, z + nz);
                                if px < 0 || py < 0 || pz < 0 || px >= dims.x || py >= dims.y || pz >= dims.z {
                                    continue;
                                }
                                lowest = lowest.min(voxels[index(px, py, pz)].sdf);
                            }
                        }
                    }
                    let candidate = lowest.saturating_add(1);
                    let vox = &mut voxels[index(x, y, z)];
                    if vox.sdf > candidate {
                        vox.sdf = candidate;
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
}
