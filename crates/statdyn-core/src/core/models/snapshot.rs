use super::simulation_box::SimulationBox;
use nalgebra::{UnitQuaternion, Vector3};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Per-particle field '{field}' has {found} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Immutable state of every particle at one timestep.
///
/// Per-particle arrays are index-aligned: entry `i` of positions, orientations and
/// images all describe the same particle, and that identity is stable across every
/// snapshot of a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    timestep: u64,
    positions: Vec<Vector3<f64>>,
    orientations: Option<Vec<UnitQuaternion<f64>>>,
    images: Option<Vec<[i32; 3]>>,
    simulation_box: SimulationBox,
}

impl Snapshot {
    pub fn new(timestep: u64, positions: Vec<Vector3<f64>>, simulation_box: SimulationBox) -> Self {
        Self {
            timestep,
            positions,
            orientations: None,
            images: None,
            simulation_box,
        }
    }

    pub fn with_orientations(
        mut self,
        orientations: Vec<UnitQuaternion<f64>>,
    ) -> Result<Self, SnapshotError> {
        self.check_length("orientations", orientations.len())?;
        self.orientations = Some(orientations);
        Ok(self)
    }

    pub fn with_images(mut self, images: Vec<[i32; 3]>) -> Result<Self, SnapshotError> {
        self.check_length("images", images.len())?;
        self.images = Some(images);
        Ok(self)
    }

    fn check_length(&self, field: &'static str, found: usize) -> Result<(), SnapshotError> {
        if found != self.positions.len() {
            return Err(SnapshotError::LengthMismatch {
                field,
                expected: self.positions.len(),
                found,
            });
        }
        Ok(())
    }

    pub fn timestep(&self) -> u64 {
        self.timestep
    }

    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn orientations(&self) -> Option<&[UnitQuaternion<f64>]> {
        self.orientations.as_deref()
    }

    pub fn images(&self) -> Option<&[[i32; 3]]> {
        self.images.as_deref()
    }

    pub fn simulation_box(&self) -> &SimulationBox {
        &self.simulation_box
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> SimulationBox {
        SimulationBox::orthorhombic(1.0, 1.0, 1.0).unwrap()
    }

    #[test]
    fn optional_fields_default_to_none() {
        let snapshot = Snapshot::new(5, vec![Vector3::zeros(); 3], unit_box());
        assert_eq!(snapshot.timestep(), 5);
        assert_eq!(snapshot.particle_count(), 3);
        assert!(snapshot.orientations().is_none());
        assert!(snapshot.images().is_none());
    }

    #[test]
    fn orientations_must_match_particle_count() {
        let snapshot = Snapshot::new(0, vec![Vector3::zeros(); 2], unit_box());
        let result = snapshot.with_orientations(vec![UnitQuaternion::identity()]);
        assert_eq!(
            result,
            Err(SnapshotError::LengthMismatch {
                field: "orientations",
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn images_are_attached_when_lengths_agree() {
        let snapshot = Snapshot::new(0, vec![Vector3::zeros(); 2], unit_box())
            .with_images(vec![[0, 0, 0], [1, 0, -1]])
            .unwrap();
        assert_eq!(snapshot.images().unwrap()[1], [1, 0, -1]);
    }
}
