//! Flattened, world-space triangle soup with everything the passes query.

use super::input::SceneDesc;
use super::materials::{ColorSample, Materials};
use crate::geom::{EdgeTri, Ray, Tri, UvTri};
use crate::trace::VoxelTracer;
use crate::util::{Error, IVec3, Mat3, Plane, Result, Vec2, Vec3};

/// World triangles at or below this (scaled) cross product are dropped.
pub const WORLD_DEGENERATE_EPSILON: f32 = 0.0001;

/// Nearest scene hit along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneHit {
    pub tri_id: u32,
    pub t: f32,
    /// Barycentric of the hit point on `tri_id`.
    pub bary: Vec3,
}

/// A triangle whose material emits light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionTri {
    pub tri_id: u32,
    pub area: f32,
}

/// Scene build parameters.
#[derive(Debug, Clone, Copy)]
pub struct SceneParams {
    pub width: u32,
    pub height: u32,
    pub voxel_density: u32,
    pub max_material_size: u32,
    pub emission_density: f32,
    pub use_sdf: bool,
}

/// All per-triangle arrays share the triangle ID as index.
#[derive(Debug, Clone)]
pub struct LightScene {
    pub tris: Vec<Tri>,
    /// Vertex normals, stored as a triangle of vectors.
    pub tri_normals: Vec<Tri>,
    pub edge_tris: Vec<EdgeTri>,
    /// Face planes, oriented to agree with the vertex normals.
    pub planes: Vec<Plane>,
    /// Lightmap UVs, wound counter-clockwise.
    pub uv_tris: Vec<UvTri>,
    /// Material UVs.
    pub uv_tris_primary: Vec<UvTri>,
    /// 1-based material ID, 0 for none.
    pub material_ids: Vec<u32>,
    /// World size of one texel on each triangle.
    pub texel_size_world: Vec<f32>,
    pub emission_tris: Vec<EmissionTri>,
    emission_flags: Vec<bool>,
    pub materials: Materials,
    tracer: VoxelTracer,
}

impl LightScene {
    /// Flatten every mesh surface into world space and build the voxel grid.
    #[tracing::instrument(skip_all, fields(meshes = desc.meshes.len()))]
    pub fn build(desc: &SceneDesc, params: &SceneParams) -> Result<Self> {
        if desc.meshes.is_empty() {
            return Err(Error::InvalidScene("no meshes".into()));
        }

        let mut materials = Materials::new(&desc.materials, params.max_material_size);

        let mut tris = Vec::new();
        let mut tri_normals = Vec::new();
        let mut edge_tris = Vec::new();
        let mut planes = Vec::new();
        let mut uv_tris = Vec::new();
        let mut uv_tris_primary = Vec::new();
        let mut material_ids = Vec::new();
        let mut texel_size_world = Vec::new();
        let mut emission_tris = Vec::new();
        let mut degenerate = 0usize;

        for (mesh_id, mesh) in desc.meshes.iter().enumerate() {
            let xform = mesh.transform;
            let normal_xform = Mat3::from_mat4(xform).inverse().transpose();
            let mut bad_normals = 0usize;
            let mut invalid_normals = 0usize;

            for (surf_id, surf) in mesh.surfaces.iter().enumerate() {
                let uvs = if surf.uv2.is_empty() { &surf.uv } else { &surf.uv2 };
                let what = |missing: &str| {
                    Error::invalid(format!("mesh {mesh_id} '{}' surface {surf_id}: {missing}", mesh.name))
                };
                if surf.positions.is_empty() {
                    return Err(what("no vertex positions"));
                }
                if surf.normals.len() != surf.positions.len() {
                    return Err(what("normal count does not match vertex count"));
                }
                if uvs.len() != surf.positions.len() {
                    return Err(what("no lightmap UVs for every vertex"));
                }
                if surf.indices.is_empty() || surf.indices.len() % 3 != 0 {
                    return Err(what("index count is not a positive multiple of 3"));
                }
                if let Some(&index) = surf.indices.iter().find(|&&i| i as usize >= surf.positions.len()) {
                    return Err(Error::IndexOutOfBounds {
                        mesh: mesh_id,
                        index,
                        count: surf.positions.len(),
                    });
                }

                let positions: Vec<Vec3> = surf.positions.iter().map(|&p| xform.transform_point3(p)).collect();
                let normals: Vec<Vec3> = surf
                    .normals
                    .iter()
                    .map(|&n| {
                        let n = (normal_xform * n).normalize_or_zero();
                        if n.length_squared() < 0.9 {
                            invalid_normals += 1;
                        }
                        n
                    })
                    .collect();
                let has_primary = surf.uv.len() == surf.positions.len();

                let mat_id = match surf.material {
                    Some(m) if m < materials.len() => m as u32 + 1,
                    Some(m) => {
                        tracing::warn!(mesh = mesh_id, surface = surf_id, material = m, "unknown material, using none");
                        0
                    }
                    None => 0,
                };
                let emits = materials.get(mat_id).is_some_and(|m| m.is_emitter);

                for face in surf.indices.chunks_exact(3) {
                    let [a, b, c] = [face[0] as usize, face[1] as usize, face[2] as usize];
                    let mut tri = Tri::new(positions[a], positions[b], positions[c]);
                    if tri.is_degenerate(WORLD_DEGENERATE_EPSILON) {
                        degenerate += 1;
                        continue;
                    }
                    let mut tri_norm = Tri::new(normals[a], normals[b], normals[c]);
                    let mut uvt = UvTri::new(uvs[a], uvs[b], uvs[c]);
                    let mut uvt_primary = if has_primary {
                        UvTri::new(surf.uv[a], surf.uv[b], surf.uv[c])
                    } else {
                        UvTri::default()
                    };

                    // the face plane follows the world winding, so take it before any flip
                    let mut plane = tri.plane();
                    let average_normal = (tri_norm.pos[0] + tri_norm.pos[1] + tri_norm.pos[2]) * (1.0 / 3.0);
                    if average_normal.dot(plane.normal) < 0.0 {
                        bad_normals += 1;
                        plane = plane.flipped();
                    }
                    let edge = tri.to_edge_form();

                    if uvt.is_winding_cw() {
                        uvt.flip_winding();
                        uvt_primary.flip_winding();
                        tri.flip_winding();
                        tri_norm.flip_winding();
                    }

                    let tri_id = tris.len() as u32;
                    if emits {
                        emission_tris.push(EmissionTri {
                            tri_id,
                            area: tri.area(),
                        });
                    }
                    texel_size_world.push(texel_size(&tri, &uvt, params.width, params.height));
                    tris.push(tri);
                    tri_normals.push(tri_norm);
                    edge_tris.push(edge);
                    planes.push(plane);
                    uv_tris.push(uvt);
                    uv_tris_primary.push(uvt_primary);
                    material_ids.push(mat_id);
                }
            }

            if bad_normals > 0 {
                tracing::info!(mesh = mesh_id, bad_normals, "face normal and vertex normals disagree, face flipped");
            }
            if invalid_normals > 0 {
                tracing::warn!(mesh = mesh_id, invalid_normals, "zero length vertex normals");
            }
        }

        if degenerate > 0 {
            tracing::warn!(degenerate, "zero area triangles skipped");
        }

        let tracer = VoxelTracer::new(&tris, &edge_tris, params.voxel_density, params.use_sdf)?;

        let mut emission_flags = vec![false; tris.len()];
        for et in &emission_tris {
            emission_flags[et.tri_id as usize] = true;
        }
        materials.adjust_for_emission_density(params.emission_density);

        tracing::info!(
            tris = tris.len(),
            emission_tris = emission_tris.len(),
            materials = materials.len(),
            "scene built"
        );

        Ok(Self {
            tris,
            tri_normals,
            edge_tris,
            planes,
            uv_tris,
            uv_tris_primary,
            material_ids,
            texel_size_world,
            emission_tris,
            emission_flags,
            materials,
            tracer,
        })
    }

    pub fn num_tris(&self) -> usize {
        self.tris.len()
    }

    pub fn tracer(&self) -> &VoxelTracer {
        &self.tracer
    }

    pub fn is_emission_tri(&self, tri_id: u32) -> bool {
        self.emission_flags.get(tri_id as usize).copied().unwrap_or(false)
    }

    /// Nearest hit, optionally giving up `voxel_range` voxels from the start.
    pub fn find_intersect_ray(&self, ray: &Ray, voxel_range: Option<IVec3>) -> Option<SceneHit> {
        let hit = self.tracer.find_intersect_ray(ray, voxel_range)?;
        let bary = ray.find_intersect(&self.tris[hit.tri_id as usize], hit.t);
        Some(SceneHit {
            tri_id: hit.tri_id,
            t: hit.t,
            bary,
        })
    }

    /// Anything within `max_dist` along `ray`.
    pub fn test_intersect_ray(&self, ray: &Ray, max_dist: f32, cull_backfaces: bool) -> bool {
        let range = self.tracer.distance_in_voxels(max_dist);
        self.tracer.test_intersect_ray(ray, max_dist, Some(range), cull_backfaces)
    }

    /// Anything between `a` and `b`. Coincident points never intersect.
    pub fn test_intersect_line(&self, a: Vec3, b: Vec3, cull_backfaces: bool) -> bool {
        let d = b - a;
        let dist = d.length();
        if !(dist > 0.0) {
            return false;
        }
        self.test_intersect_ray(&Ray::new(a, d / dist), dist, cull_backfaces)
    }

    /// World position and normals at a barycentric point.
    pub fn surface_at(&self, tri_id: u32, bary: Vec3) -> (Vec3, Vec3) {
        let i = tri_id as usize;
        let pos = self.tris[i].interpolate(bary);
        let normal = self.tri_normals[i].interpolate(bary).normalize_or_zero();
        (pos, normal)
    }

    /// Material colors at a barycentric point.
    pub fn take_triangle_color_sample(&self, tri_id: u32, bary: Vec3) -> ColorSample {
        let i = tri_id as usize;
        let uv = self.uv_tris_primary[i].interpolate(bary);
        self.materials.find_colors(self.material_ids[i], uv)
    }
}

/// World length of one texel along the longer UV edge of the triangle.
fn texel_size(tri: &Tri, uvt: &UvTri, width: u32, height: u32) -> f32 {
    let l0 = (tri.pos[1] - tri.pos[0]).length();
    let l1 = (tri.pos[2] - tri.pos[0]).length();
    let scale = Vec2::new(width as f32, height as f32);
    let tl0 = ((uvt.uv[1] - uvt.uv[0]) * scale).length();
    let tl1 = ((uvt.uv[2] - uvt.uv[0]) * scale).length();

    if tl0 >= tl1 {
        if tl0 > 0.00001 {
            return l0 / tl0;
        }
    } else if tl1 > 0.00001 {
        return l1 / tl1;
    }
    1.0
}
