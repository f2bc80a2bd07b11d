use crate::core::utils::geometry::Dimensionality;
use nalgebra::Vector3;
use serde::Serialize;

/// Running sums for every pair sampled at one lag.
///
/// Accumulators only hold sums and counts, so [`LagAccumulator::merge`] is associative
/// and commutative and partial results from parallel workers can be combined in any
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LagAccumulator {
    pairs: usize,
    particles: usize,
    samples: u64,
    sum_r2: f64,
    sum_r4: f64,
    sum_overlap: f64,
    sum_q2: f64,
    rotation_pairs: usize,
    sum_theta2: f64,
    sum_cos_theta: f64,
}

/// Finalized ensemble averages at one lag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LagStatistics {
    pub lag: u64,
    pub origins: usize,
    pub mean_squared_displacement: f64,
    pub mean_quartic_displacement: f64,
    pub non_gaussian: f64,
    pub overlap: f64,
    pub chi4: f64,
    pub mean_squared_rotation: Option<f64>,
    pub rotational_correlation: Option<f64>,
}

impl LagAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator holding a single (origin, target) pair.
    pub fn from_pair(
        displacements: &[Vector3<f64>],
        rotations: Option<&[f64]>,
        mobility_threshold: f64,
    ) -> Self {
        let mut acc = Self::default();
        acc.add_pair(displacements, rotations, mobility_threshold);
        acc
    }

    pub fn add_pair(
        &mut self,
        displacements: &[Vector3<f64>],
        rotations: Option<&[f64]>,
        mobility_threshold: f64,
    ) {
        if displacements.is_empty() {
            return;
        }
        let threshold_sq = mobility_threshold * mobility_threshold;
        let mut sum_r2 = 0.0;
        let mut sum_r4 = 0.0;
        let mut stayed = 0usize;
        for delta in displacements {
            let r2 = delta.norm_squared();
            sum_r2 += r2;
            sum_r4 += r2 * r2;
            if r2 < threshold_sq {
                stayed += 1;
            }
        }
        let n = displacements.len();
        let q = stayed as f64 / n as f64;

        self.pairs += 1;
        self.particles = self.particles.max(n);
        self.samples += n as u64;
        self.sum_r2 += sum_r2;
        self.sum_r4 += sum_r4;
        self.sum_overlap += q;
        self.sum_q2 += q * q;

        if let Some(angles) = rotations.filter(|a| !a.is_empty()) {
            let count = angles.len() as f64;
            self.rotation_pairs += 1;
            self.sum_theta2 += angles.iter().map(|t| t * t).sum::<f64>() / count;
            self.sum_cos_theta += angles.iter().map(|t| t.cos()).sum::<f64>() / count;
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            pairs: self.pairs + other.pairs,
            particles: self.particles.max(other.particles),
            samples: self.samples + other.samples,
            sum_r2: self.sum_r2 + other.sum_r2,
            sum_r4: self.sum_r4 + other.sum_r4,
            sum_overlap: self.sum_overlap + other.sum_overlap,
            sum_q2: self.sum_q2 + other.sum_q2,
            rotation_pairs: self.rotation_pairs + other.rotation_pairs,
            sum_theta2: self.sum_theta2 + other.sum_theta2,
            sum_cos_theta: self.sum_cos_theta + other.sum_cos_theta,
        }
    }

    pub fn pairs(&self) -> usize {
        self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs == 0
    }

    pub fn finalize(&self, lag: u64, dimensions: Dimensionality) -> LagStatistics {
        if self.pairs == 0 || self.samples == 0 {
            return LagStatistics {
                lag,
                origins: 0,
                mean_squared_displacement: 0.0,
                mean_quartic_displacement: 0.0,
                non_gaussian: 0.0,
                overlap: 0.0,
                chi4: 0.0,
                mean_squared_rotation: None,
                rotational_correlation: None,
            };
        }

        let samples = self.samples as f64;
        let pairs = self.pairs as f64;
        let msd = self.sum_r2 / samples;
        let mqd = self.sum_r4 / samples;

        let d = dimensions.count() as f64;
        let non_gaussian = if msd > 0.0 {
            d * mqd / ((d + 2.0) * msd * msd) - 1.0
        } else {
            0.0
        };

        let mean_q = self.sum_overlap / pairs;
        let chi4 = if self.pairs > 1 {
            let variance = self.sum_q2 / pairs - mean_q * mean_q;
            self.particles as f64 * variance.max(0.0)
        } else {
            0.0
        };

        let has_rotations = self.rotation_pairs == self.pairs;
        LagStatistics {
            lag,
            origins: self.pairs,
            mean_squared_displacement: msd,
            mean_quartic_displacement: mqd,
            non_gaussian,
            overlap: mean_q,
            chi4,
            mean_squared_rotation: has_rotations.then(|| self.sum_theta2 / pairs),
            rotational_correlation: has_rotations.then(|| self.sum_cos_theta / pairs),
        }
    }
}
