//! UV seam stitching.
//!
//! Triangle edges that share a world-space edge but sit in different UV
//! charts are found with a sort and sweep over the edge list. Texels along
//! both sides of each seam are then blended towards each other.

use crate::scene::LightScene;
use crate::texel::{FColor, LightImage};
use crate::util::{Vec2, Vec3};

/// Blend passes over every seam.
const STITCH_ITERATIONS: u32 = 5;
/// Weight kept by the texel being written.
const KEEP_WEIGHT: f32 = 0.6;
/// Edges shorter than this squared world length are ignored.
const MIN_EDGE_LENGTH_SQ: f32 = 1e-6;

#[derive(Debug, Clone, Copy)]
struct SeamEdge {
    pos: [Vec3; 2],
    normal: [Vec3; 2],
    uv: [Vec2; 2],
}

impl SeamEdge {
    /// Endpoints ordered by position so shared edges line up.
    fn new(pos: [Vec3; 2], normal: [Vec3; 2], uv: [Vec2; 2]) -> Self {
        let (a, b) = (pos[0], pos[1]);
        let swap = (a.x, a.y, a.z) > (b.x, b.y, b.z);
        if swap {
            Self {
                pos: [b, a],
                normal: [normal[1], normal[0]],
                uv: [uv[1], uv[0]],
            }
        } else {
            Self { pos, normal, uv }
        }
    }
}

/// Pair of edges with matching world geometry and different UVs.
#[derive(Debug, Clone, Copy)]
struct Seam {
    a: SeamEdge,
    b: SeamEdge,
}

/// Thresholds for seam detection.
#[derive(Debug, Clone, Copy)]
pub struct StitchParams {
    /// World distance within which edge endpoints are considered the same.
    pub distance: f32,
    /// Maximum angle in degrees between the normals on either side.
    pub normal_angle: f32,
}

/// Blend lightmap texels across every seam in the scene. Returns the number
/// of seams found.
#[tracing::instrument(skip_all, fields(distance = params.distance, normal_angle = params.normal_angle))]
pub fn stitch_seams(scene: &LightScene, image: &mut LightImage<FColor>, params: StitchParams) -> usize {
    if image.num_pixels() == 0 {
        return 0;
    }
    let size = Vec2::new(image.width() as f32, image.height() as f32);
    let seams = find_seams(scene, size, params);
    if seams.is_empty() {
        return 0;
    }

    for _ in 0..STITCH_ITERATIONS {
        let read = image.clone();
        for seam in &seams {
            blend_edge(&read, image, &seam.a, &seam.b);
            blend_edge(&read, image, &seam.b, &seam.a);
        }
    }
    tracing::debug!(seams = seams.len(), "stitched");
    seams.len()
}

fn find_seams(scene: &LightScene, size: Vec2, params: StitchParams) -> Vec<Seam> {
    let texel = Vec2::ONE / size;
    let mut edges = Vec::with_capacity(scene.tris.len() * 3);
    for ((tri, normals), uvs) in scene.tris.iter().zip(&scene.tri_normals).zip(&scene.uv_tris) {
        for i in 0..3 {
            let j = (i + 1) % 3;
            let edge = SeamEdge::new(
                [tri.pos[i], tri.pos[j]],
                [normals.pos[i], normals.pos[j]],
                [uvs.uv[i], uvs.uv[j]],
            );
            if is_degenerate(&edge, texel) {
                continue;
            }
            edges.push(edge);
        }
    }
    edges.sort_by(|a, b| a.pos[0].x.total_cmp(&b.pos[0].x));

    let dist_sq = params.distance * params.distance;
    let min_dot = params.normal_angle.to_radians().cos();
    let mut seams = Vec::new();
    for (i, a) in edges.iter().enumerate() {
        for b in &edges[i + 1..] {
            if b.pos[0].x > a.pos[0].x + params.distance {
                break;
            }
            if !matches(a, b, dist_sq, min_dot) || same_chart(a, b, size) {
                continue;
            }
            seams.push(Seam { a: *a, b: *b });
        }
    }
    seams
}

fn is_degenerate(edge: &SeamEdge, texel: Vec2) -> bool {
    let uv_len = ((edge.uv[1] - edge.uv[0]) / texel).length();
    uv_len < 0.5 || edge.pos[0].distance_squared(edge.pos[1]) < MIN_EDGE_LENGTH_SQ
}

fn matches(a: &SeamEdge, b: &SeamEdge, dist_sq: f32, min_dot: f32) -> bool {
    (0..2).all(|k| a.pos[k].distance_squared(b.pos[k]) <= dist_sq && a.normal[k].dot(b.normal[k]) >= min_dot)
}

/// Both endpoints land within a texel of each other.
fn same_chart(a: &SeamEdge, b: &SeamEdge, size: Vec2) -> bool {
    (0..2).all(|k| ((a.uv[k] - b.uv[k]) * size).length() < 1.0)
}

/// Walk `dst` through texel space, pulling each texel towards the matching
/// point on `src`.
fn blend_edge(read: &LightImage<FColor>, write: &mut LightImage<FColor>, dst: &SeamEdge, src: &SeamEdge) {
    let size = Vec2::new(read.width() as f32, read.height() as f32);
    let d0 = dst.uv[0] * size;
    let d1 = dst.uv[1] * size;
    let steps = (d1 - d0).abs().max_element().ceil().max(1.0) as u32;

    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        let target = texel_at(read, d0.lerp(d1, t));
        let source = texel_at(read, src.uv[0].lerp(src.uv[1], t) * size);
        let (Some(target), Some(source)) = (target, source) else {
            continue;
        };
        let current = read[target];
        let sampled = read[source];
        write[target] = current * KEEP_WEIGHT + sampled * (1.0 - KEEP_WEIGHT);
    }
}

fn texel_at(image: &LightImage<FColor>, p: Vec2) -> Option<(u32, u32)> {
    let x = p.x.floor() as i32;
    let y = p.y.floor() as i32;
    let x = x.clamp(0, image.width() as i32 - 1);
    let y = y.clamp(0, image.height() as i32 - 1);
    image.is_within(x, y).then_some((x as u32, y as u32))
}
