//! Geometry kernel and tracer properties over random inputs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use llightmap::geom::{EdgeTri, Ray, Tri};
use llightmap::trace::{PackedRay, PackedTriangles, VoxelTracer};
use llightmap::util::{IVec3, Vec3};

fn random_point(rng: &mut ChaCha8Rng, extent: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
    )
}

/// Random triangle with a reasonable area.
fn random_tri(rng: &mut ChaCha8Rng, extent: f32) -> Tri {
    loop {
        let tri = Tri::new(random_point(rng, extent), random_point(rng, extent), random_point(rng, extent));
        if tri.area() > 0.05 * extent * extent {
            return tri;
        }
    }
}

fn random_dir(rng: &mut ChaCha8Rng) -> Vec3 {
    loop {
        let d = random_point(rng, 1.0);
        if d.length_squared() > 0.01 {
            return d.normalize();
        }
    }
}

#[test]
fn test_barycentric_round_trip() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    for _ in 0..500 {
        let tri = random_tri(&mut rng, 10.0);
        let (mut u, mut v) = (rng.gen_range(0.01..0.98f32), rng.gen_range(0.01..0.98f32));
        if u + v >= 0.99 {
            u = 1.0 - u;
            v = 0.98 - v;
        }
        let bary = Vec3::new(1.0 - u - v, u, v);
        let pt = tri.interpolate(bary);

        let found = tri.find_barycentric(pt);
        let back = tri.interpolate(found);
        assert!((back - pt).abs().max_element() < 1e-4, "{pt} -> {back}");
    }
}

#[test]
fn test_edge_form_matches_plain() {
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let mut hits = 0;
    for _ in 0..2000 {
        let tri = random_tri(&mut rng, 1.0);
        let ray = Ray::new(random_point(&mut rng, 2.0), random_dir(&mut rng));

        let plain = ray.test_intersect(&tri);
        let edge = ray.test_intersect_edgeform(&tri.to_edge_form());
        assert_eq!(plain.is_some(), edge.is_some());
        if let (Some(a), Some(b)) = (plain, edge) {
            assert!((a - b).abs() < 1e-5);
            hits += 1;
        }
    }
    assert!(hits > 0);
}

#[test]
fn test_packed_matches_scalar() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    for round in 0..500 {
        let count = 1 + round % 4;
        let tris: Vec<Tri> = (0..count).map(|_| random_tri(&mut rng, 1.0)).collect();
        let edges: Vec<EdgeTri> = tris.iter().map(Tri::to_edge_form).collect();
        let packed = PackedTriangles::from_tris(&edges);

        // aim at one centroid so most rounds hit something
        let target = tris[rng.gen_range(0..count)].centre();
        let o = random_point(&mut rng, 3.0);
        let Some(ray) = Ray::try_new(o, target - o) else {
            continue;
        };

        let mut scalar_t = f32::MAX;
        let mut scalar_winner = 0;
        for (lane, e) in edges.iter().enumerate() {
            if let Some(t) = ray.test_intersect_edgeform(e) {
                if t < scalar_t {
                    scalar_t = t;
                    scalar_winner = lane + 1;
                }
            }
        }

        let mut packed_t = f32::MAX;
        let packed_winner = PackedRay::new(&ray).intersect(&packed, &mut packed_t);
        assert_eq!(packed_winner, scalar_winner, "round {round}");
        if scalar_winner > 0 {
            assert!((packed_t - scalar_t).abs() <= 1e-5 * scalar_t.max(1.0));
        }
    }
}

#[test]
fn test_parallel_ray_misses() {
    let tri = Tri::new(Vec3::ZERO, Vec3::X, Vec3::Z);
    let ray = Ray::new(Vec3::new(-1.0, 0.0, 0.25), Vec3::X);
    assert!(ray.test_intersect(&tri).is_none());
    assert!(ray.test_intersect_edgeform(&tri.to_edge_form()).is_none());
    let mut t = f32::MAX;
    assert_eq!(PackedRay::new(&ray).intersect(&PackedTriangles::from_tris(&[tri.to_edge_form()]), &mut t), 0);
}

fn random_tracer(seed: u64, count: usize, density: u32) -> (Vec<Tri>, VoxelTracer) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let tris: Vec<Tri> = (0..count)
        .map(|_| {
            let c = random_point(&mut rng, 4.0);
            let mut t = random_tri(&mut rng, 0.7);
            for p in &mut t.pos {
                *p += c;
            }
            t
        })
        .collect();
    let edges: Vec<EdgeTri> = tris.iter().map(Tri::to_edge_form).collect();
    let tracer = VoxelTracer::new(&tris, &edges, density, true).unwrap();
    (tris, tracer)
}

#[test]
fn test_voxel_coverage() {
    let (tris, tracer) = random_tracer(4, 40, 12);
    let origin = tracer.world_bound_expanded().min;
    let size = tracer.voxel_size();
    let dims = tracer.dims();
    // margin in voxel units around the binning epsilon
    let margin = 0.01;

    for (id, tri) in tris.iter().enumerate() {
        let bb = tri.aabb().grown(0.001);
        let lo = (bb.min - origin) / size;
        let hi = (bb.max - origin) / size;
        let holding = tracer.voxels_containing(id as u32);

        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    let c = IVec3::new(x, y, z);
                    let v = c.as_vec3();
                    let inside = (0..3).all(|a| v[a] + 1.0 > lo[a] + margin && v[a] < hi[a] - margin);
                    let outside = (0..3).any(|a| v[a] + 1.0 < lo[a] - margin || v[a] > hi[a] + margin);
                    if inside {
                        assert!(holding.contains(&c), "tri {id} missing from {c}");
                    }
                    if outside {
                        assert!(!holding.contains(&c), "tri {id} wrongly in {c}");
                    }
                }
            }
        }
    }
}

#[test]
fn test_voxel_walk_terminates() {
    let (_, tracer) = random_tracer(5, 30, 16);
    let dims = tracer.dims();
    let limit = (dims.x + dims.y + dims.z + 3) as usize;
    let mut rng = ChaCha8Rng::seed_from_u64(6);

    for _ in 0..300 {
        let ray = Ray::new(random_point(&mut rng, 8.0), random_dir(&mut rng));
        let Some(mut walk) = tracer.raytrace_start(&ray) else {
            continue;
        };
        let mut steps = 0;
        while tracer.raytrace(&mut walk).is_some() {
            steps += 1;
            assert!(steps <= limit, "walk exceeded {limit} steps");
        }
    }
}
