//! Low discrepancy direction sets for AO.
//!
//! Each variation is a set of unit directions built by best-candidate
//! sampling: every new direction is the one out of a few random candidates
//! lying furthest from the directions already chosen. Texels walk through
//! the variations so neighbours do not share a pattern.

use rand::Rng;
use rayon::prelude::*;

use super::sampling::{random_unit_dir, row_rng};
use crate::util::Vec3;

/// Independent direction sets kept in the table.
pub const QMC_VARIATIONS: u32 = 64;

/// Random candidates tried per direction.
const CANDIDATES: usize = 8;

const SALT_QMC: u64 = 0x514d_4353;

#[derive(Debug, Clone)]
pub struct Qmc {
    sets: Vec<Vec<Vec3>>,
}

impl Qmc {
    /// Build `num_samples` directions for every variation.
    #[tracing::instrument(skip_all, fields(num_samples = num_samples))]
    pub fn new(num_samples: u32, seed: u64) -> Self {
        let n = num_samples.max(1) as usize;
        let sets = (0..QMC_VARIATIONS)
            .into_par_iter()
            .map(|v| best_candidate_set(&mut row_rng(seed, SALT_QMC, v), n))
            .collect();
        Self { sets }
    }

    pub fn num_samples(&self) -> usize {
        self.sets[0].len()
    }

    /// Direction `n` of `variation` on the unit sphere. Indices past the
    /// set length continue into the following variations.
    pub fn unit_dir(&self, n: u32, variation: u32) -> Vec3 {
        let len = self.num_samples();
        let n = n as usize;
        let set = (variation as usize + n / len) % self.sets.len();
        self.sets[set][n % len]
    }

    /// Cosine weighted direction around `normal`.
    pub fn cosine_dir(&self, n: u32, variation: u32, normal: Vec3) -> Vec3 {
        let d = normal + self.unit_dir(n, variation);
        let l = d.length_squared();
        if l > 1e-8 {
            d / l.sqrt()
        } else {
            normal
        }
    }

    pub fn random_variation<R: Rng + ?Sized>(rng: &mut R) -> u32 {
        rng.gen_range(0..QMC_VARIATIONS)
    }

    pub fn next_variation(previous: u32) -> u32 {
        (previous + 1) % QMC_VARIATIONS
    }
}

fn best_candidate_set<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<Vec3> {
    let mut set: Vec<Vec3> = Vec::with_capacity(n);
    for _ in 0..n {
        let mut best = random_unit_dir(rng);
        let mut best_dot = nearest_dot(&set, best);
        for _ in 1..CANDIDATES {
            let c = random_unit_dir(rng);
            let dot = nearest_dot(&set, c);
            if dot < best_dot {
                best = c;
                best_dot = dot;
            }
        }
        set.push(best);
    }
    set
}

/// Cosine of the angle to the closest direction already in `set`.
fn nearest_dot(set: &[Vec3], d: Vec3) -> f32 {
    set.iter().map(|s| s.dot(d)).fold(-1.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_are_unit_and_facing() {
        let qmc = Qmc::new(16, 1);
        assert_eq!(qmc.num_samples(), 16);
        let normal = Vec3::new(0.0, 0.0, 1.0);
        for v in 0..QMC_VARIATIONS {
            for n in 0..40 {
                assert!((qmc.unit_dir(n, v).length() - 1.0).abs() < 1e-4);
                assert!(qmc.cosine_dir(n, v, normal).dot(normal) >= -1e-6);
            }
        }
    }

    #[test]
    fn test_table_is_seeded() {
        let a = Qmc::new(8, 5);
        let b = Qmc::new(8, 5);
        let c = Qmc::new(8, 6);
        assert_eq!(a.unit_dir(3, 9), b.unit_dir(3, 9));
        assert_ne!(a.unit_dir(3, 9), c.unit_dir(3, 9));
        // past the end of a set
        assert_eq!(a.unit_dir(8, 9), a.unit_dir(0, 10));
        assert_eq!(Qmc::next_variation(QMC_VARIATIONS - 1), 0);
    }

    /// Squared error of the fraction of directions leaning towards `+x`
    /// and towards `+z`, both exactly one half.
    fn half_space_error(dirs: &[Vec3]) -> f32 {
        let n = dirs.len() as f32;
        let fx = dirs.iter().filter(|d| d.x > 0.0).count() as f32 / n;
        let fz = dirs.iter().filter(|d| d.z > 0.0).count() as f32 / n;
        (fx - 0.5).powi(2) + (fz - 0.5).powi(2)
    }

    #[test]
    fn test_less_error_than_random() {
        const N: u32 = 32;
        let normal = Vec3::Y;
        let qmc = Qmc::new(N, 11);

        let qmc_err: f32 = (0..QMC_VARIATIONS)
            .map(|v| {
                let dirs: Vec<Vec3> = (0..N).map(|n| qmc.cosine_dir(n, v, normal)).collect();
                half_space_error(&dirs)
            })
            .sum::<f32>()
            / QMC_VARIATIONS as f32;

        let trials = 1024;
        let random_err: f32 = (0..trials)
            .map(|t| {
                let mut rng = row_rng(11, 0, t);
                let dirs: Vec<Vec3> = (0..N)
                    .map(|_| (normal + random_unit_dir(&mut rng)).normalize_or_zero())
                    .collect();
                half_space_error(&dirs)
            })
            .sum::<f32>()
            / trials as f32;

        assert!(qmc_err < random_err, "qmc {qmc_err} random {random_err}");
    }
}
