use crate::core::models::snapshot::Snapshot;
use crate::engine::config::DisplacementConfig;
use crate::engine::displacement::{self, DisplacementError};
use crate::engine::utils::neighbors::neighbor_lists;
use serde::Serialize;
use thiserror::Error;

pub const SQ_DISPLACEMENT: &str = "sq_displacement";
pub const OVERLAP: &str = "overlap";
pub const SQ_ROTATION: &str = "sq_rotation";
pub const NEIGHBORS: &str = "neighbors";
pub const NEIGHBOR_CHANGE: &str = "neighbor_change";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeatureError {
    #[error("Column '{column}' has {found} values, expected one per particle ({expected})")]
    ColumnLength {
        column: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Feature table has no column named '{0}'")]
    MissingColumn(&'static str),
    #[error("Classifier failed: {0}")]
    Classifier(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mobility {
    Mobile,
    Immobile,
}

/// Per-particle feature vectors at a reference lag, averaged over origins.
///
/// Rows are particles in trajectory order; columns are named features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    lag: u64,
    origins: usize,
    rows: usize,
    columns: Vec<(&'static str, Vec<f64>)>,
}

impl FeatureTable {
    pub fn new(lag: u64, origins: usize, rows: usize) -> Self {
        Self {
            lag,
            origins,
            rows,
            columns: Vec::new(),
        }
    }

    pub fn add_column(&mut self, name: &'static str, values: Vec<f64>) -> Result<(), FeatureError> {
        if values.len() != self.rows {
            return Err(FeatureError::ColumnLength {
                column: name,
                expected: self.rows,
                found: values.len(),
            });
        }
        match self.columns.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, column)) => *column = values,
            None => self.columns.push((name, values)),
        }
        Ok(())
    }

    pub fn lag(&self) -> u64 {
        self.lag
    }

    pub fn origins(&self) -> usize {
        self.origins
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(name, _)| *name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Feature vector of one particle, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<f64>> {
        (index < self.rows).then(|| self.columns.iter().map(|(_, v)| v[index]).collect())
    }
}

/// Seam for an external mobility classifier consuming engineered features.
pub trait MobilityClassifier {
    fn classify(&self, features: &FeatureTable) -> Result<Vec<Mobility>, FeatureError>;
}

/// Labels a particle mobile when its mean squared displacement exceeds `threshold²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdClassifier {
    threshold: f64,
}

impl ThresholdClassifier {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl MobilityClassifier for ThresholdClassifier {
    fn classify(&self, features: &FeatureTable) -> Result<Vec<Mobility>, FeatureError> {
        let sq_displacement = features
            .column(SQ_DISPLACEMENT)
            .ok_or(FeatureError::MissingColumn(SQ_DISPLACEMENT))?;
        let limit = self.threshold * self.threshold;
        Ok(sq_displacement
            .iter()
            .map(|&r2| {
                if r2 > limit {
                    Mobility::Mobile
                } else {
                    Mobility::Immobile
                }
            })
            .collect())
    }
}

fn lost_fraction(before: &[usize], after: &[usize]) -> f64 {
    if before.is_empty() {
        return 0.0;
    }
    let lost = before
        .iter()
        .filter(|n| after.binary_search(n).is_err())
        .count();
    lost as f64 / before.len() as f64
}

/// Per-particle running sums over the pairs of the reference lag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureAccumulator {
    pairs: usize,
    sum_r2: Vec<f64>,
    stayed: Vec<f64>,
    rotation_pairs: usize,
    sum_theta2: Vec<f64>,
    neighbor_pairs: usize,
    sum_neighbors: Vec<f64>,
    sum_neighbor_change: Vec<f64>,
}

fn add_into(into: &mut Vec<f64>, values: impl ExactSizeIterator<Item = f64>) {
    if into.is_empty() {
        into.resize(values.len(), 0.0);
    }
    for (slot, v) in into.iter_mut().zip(values) {
        *slot += v;
    }
}

fn merge_sums(mut a: Vec<f64>, b: Vec<f64>) -> Vec<f64> {
    if a.is_empty() {
        return b;
    }
    for (slot, v) in a.iter_mut().zip(b) {
        *slot += v;
    }
    a
}

impl FeatureAccumulator {
    pub fn from_pair(
        origin: &Snapshot,
        target: &Snapshot,
        displacement_config: &DisplacementConfig,
        mobility_threshold: f64,
        neighbor_cutoff: Option<f64>,
    ) -> Result<Self, DisplacementError> {
        let dims = displacement_config.dimensions;
        let deltas = displacement::displacement(origin, target, displacement_config)?;
        let selected = deltas.len();
        let threshold_sq = mobility_threshold * mobility_threshold;

        let mut acc = Self {
            pairs: 1,
            ..Self::default()
        };
        add_into(&mut acc.sum_r2, deltas.iter().map(|d| d.norm_squared()));
        add_into(
            &mut acc.stayed,
            deltas
                .iter()
                .map(|d| if d.norm_squared() < threshold_sq { 1.0 } else { 0.0 }),
        );

        if origin.orientations().is_some() && target.orientations().is_some() {
            let angles = displacement::rotations(origin, target, displacement_config)?;
            acc.rotation_pairs = 1;
            add_into(&mut acc.sum_theta2, angles.iter().map(|t| t * t));
        }

        if let Some(cutoff) = neighbor_cutoff {
            let before = neighbor_lists(
                &origin.positions()[..selected],
                origin.simulation_box(),
                cutoff,
                dims,
            );
            let after = neighbor_lists(
                &target.positions()[..selected],
                target.simulation_box(),
                cutoff,
                dims,
            );
            acc.neighbor_pairs = 1;
            add_into(&mut acc.sum_neighbors, before.iter().map(|n| n.len() as f64));
            add_into(
                &mut acc.sum_neighbor_change,
                before.iter().zip(&after).map(|(b, a)| lost_fraction(b, a)),
            );
        }
        Ok(acc)
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            pairs: self.pairs + other.pairs,
            sum_r2: merge_sums(self.sum_r2, other.sum_r2),
            stayed: merge_sums(self.stayed, other.stayed),
            rotation_pairs: self.rotation_pairs + other.rotation_pairs,
            sum_theta2: merge_sums(self.sum_theta2, other.sum_theta2),
            neighbor_pairs: self.neighbor_pairs + other.neighbor_pairs,
            sum_neighbors: merge_sums(self.sum_neighbors, other.sum_neighbors),
            sum_neighbor_change: merge_sums(self.sum_neighbor_change, other.sum_neighbor_change),
        }
    }

    pub fn pairs(&self) -> usize {
        self.pairs
    }

    pub fn finish(self, lag: u64) -> Result<FeatureTable, FeatureError> {
        let rows = self.sum_r2.len();
        let mut table = FeatureTable::new(lag, self.pairs, rows);
        if self.pairs == 0 {
            return Ok(table);
        }
        let scale = 1.0 / self.pairs as f64;
        let mean = |sums: Vec<f64>| sums.into_iter().map(|s| s * scale).collect::<Vec<_>>();

        table.add_column(SQ_DISPLACEMENT, mean(self.sum_r2))?;
        table.add_column(OVERLAP, mean(self.stayed))?;
        if self.rotation_pairs == self.pairs {
            table.add_column(SQ_ROTATION, mean(self.sum_theta2))?;
        }
        if self.neighbor_pairs == self.pairs {
            table.add_column(NEIGHBORS, mean(self.sum_neighbors))?;
            table.add_column(NEIGHBOR_CHANGE, mean(self.sum_neighbor_change))?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::simulation_box::SimulationBox;
    use crate::core::utils::geometry::Dimensionality;
    use crate::engine::config::{BoxPolicy, ParticleSelection};
    use nalgebra::Vector3;

    const TOLERANCE: f64 = 1e-9;

    fn displacement_config() -> DisplacementConfig {
        DisplacementConfig {
            dimensions: Dimensionality::Three,
            box_policy: BoxPolicy::OriginBox,
            remove_drift: false,
            particles: ParticleSelection::All,
        }
    }

    fn frame(positions: Vec<Vector3<f64>>) -> Snapshot {
        Snapshot::new(0, positions, SimulationBox::orthorhombic(10.0, 10.0, 10.0).unwrap())
    }

    #[test]
    fn features_average_over_origins() {
        let origin = frame(vec![
            Vector3::zeros(),
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(3.0, 0.0, 0.0),
        ]);
        let near = frame(vec![
            Vector3::zeros(),
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(3.0, 0.0, 0.0),
        ]);
        let far = frame(vec![
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(3.0, 0.0, 0.0),
        ]);
        let cfg = displacement_config();
        let acc = FeatureAccumulator::from_pair(&origin, &near, &cfg, 0.5, Some(1.0))
            .unwrap()
            .merge(FeatureAccumulator::from_pair(&origin, &far, &cfg, 0.5, Some(1.0)).unwrap());
        let table = acc.finish(100).unwrap();

        assert_eq!(table.origins(), 2);
        assert_eq!(table.rows(), 3);
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec![SQ_DISPLACEMENT, OVERLAP, NEIGHBORS, NEIGHBOR_CHANGE]
        );
        let r2 = table.column(SQ_DISPLACEMENT).unwrap();
        assert!((r2[0] - 2.0).abs() < TOLERANCE);
        assert!((table.column(OVERLAP).unwrap()[0] - 0.5).abs() < TOLERANCE);
        assert!((table.column(NEIGHBORS).unwrap()[1] - 1.0).abs() < TOLERANCE);
        // Particle 1 loses its only neighbour in one of the two origins.
        assert!((table.column(NEIGHBOR_CHANGE).unwrap()[1] - 0.5).abs() < TOLERANCE);
        assert!(table.column(SQ_ROTATION).is_none());
    }

    #[test]
    fn neighbour_features_cover_selected_particles_only() {
        let origin = frame(vec![
            Vector3::zeros(),
            Vector3::new(5.0, 0.0, 0.0),
            Vector3::new(0.5, 0.0, 0.0),
        ]);
        let mut cfg = displacement_config();
        cfg.particles = ParticleSelection::Leading(2);
        let table = FeatureAccumulator::from_pair(&origin, &origin, &cfg, 0.5, Some(1.0))
            .unwrap()
            .finish(10)
            .unwrap();
        assert_eq!(table.rows(), 2);
        // The site at 0.5 is excluded, so the first centre has no neighbours.
        assert_eq!(table.column(NEIGHBORS).unwrap(), &[0.0, 0.0]);
    }

    #[test]
    fn rows_follow_column_order() {
        let mut table = FeatureTable::new(10, 1, 2);
        table.add_column(SQ_DISPLACEMENT, vec![0.1, 0.9]).unwrap();
        table.add_column(OVERLAP, vec![1.0, 0.0]).unwrap();
        assert_eq!(table.row(1), Some(vec![0.9, 0.0]));
        assert_eq!(table.row(2), None);
    }

    #[test]
    fn column_length_is_checked() {
        let mut table = FeatureTable::new(10, 1, 2);
        assert_eq!(
            table.add_column(OVERLAP, vec![1.0]),
            Err(FeatureError::ColumnLength {
                column: OVERLAP,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn threshold_classifier_labels_mobile_particles() {
        let mut table = FeatureTable::new(10, 1, 3);
        table
            .add_column(SQ_DISPLACEMENT, vec![0.01, 0.5, 0.09])
            .unwrap();
        let labels = ThresholdClassifier::new(0.3).classify(&table).unwrap();
        assert_eq!(
            labels,
            vec![Mobility::Immobile, Mobility::Mobile, Mobility::Immobile]
        );
    }

    #[test]
    fn classifier_requires_displacement_column() {
        let table = FeatureTable::new(10, 1, 0);
        assert_eq!(
            ThresholdClassifier::new(0.3).classify(&table),
            Err(FeatureError::MissingColumn(SQ_DISPLACEMENT))
        );
    }
}
