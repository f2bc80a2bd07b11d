use super::snapshot::Snapshot;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("Corrupt trajectory: {0}")]
    Corrupt(String),

    #[error(
        "Frame {index} has timestep {current}, which does not follow the previous timestep {previous}"
    )]
    UnorderedFrame {
        index: usize,
        previous: u64,
        current: u64,
    },

    #[error("Frame index {index} is out of range for a trajectory of {count} frames")]
    FrameOutOfRange { index: usize, count: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: ParseErrorKind },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseErrorKind {
    #[error("Invalid integer in {field} (value: '{value}')")]
    InvalidInt { field: &'static str, value: String },
    #[error("Invalid float in {field} (value: '{value}')")]
    InvalidFloat { field: &'static str, value: String },
    #[error("Required field '{0}' is missing")]
    MissingField(&'static str),
    #[error("Expected at least {expected} columns, found {found}")]
    TooFewColumns { expected: usize, found: usize },
    #[error("Malformed header: {0}")]
    MalformedHeader(String),
}

/// Read-only, timestep-ordered access to the frames of one simulation run.
///
/// Implementors guarantee that `timesteps()` is strictly increasing and that every
/// frame holds the same number of particles; both are checked when the trajectory is
/// opened so downstream code never re-validates them.
pub trait Trajectory {
    fn frame_count(&self) -> usize;

    fn particle_count(&self) -> usize;

    /// Timesteps of every frame, in frame order.
    fn timesteps(&self) -> &[u64];

    fn frame_at(&mut self, index: usize) -> Result<Snapshot, TrajectoryError>;

    /// Lazily decodes frames in timestep order.
    fn frames(&mut self) -> Frames<'_, Self> {
        Frames {
            trajectory: self,
            next: 0,
        }
    }
}

pub struct Frames<'a, T: ?Sized> {
    trajectory: &'a mut T,
    next: usize,
}

impl<T: Trajectory + ?Sized> Iterator for Frames<'_, T> {
    type Item = Result<Snapshot, TrajectoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.trajectory.frame_count() {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.trajectory.frame_at(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.trajectory.frame_count().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

/// Checks that timesteps are strictly increasing.
pub fn validate_timesteps(timesteps: &[u64]) -> Result<(), TrajectoryError> {
    for (index, window) in timesteps.windows(2).enumerate() {
        if window[1] <= window[0] {
            return Err(TrajectoryError::UnorderedFrame {
                index: index + 1,
                previous: window[0],
                current: window[1],
            });
        }
    }
    Ok(())
}

/// A fully decoded trajectory held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryTrajectory {
    frames: Vec<Snapshot>,
    timesteps: Vec<u64>,
}

impl InMemoryTrajectory {
    pub fn new(frames: Vec<Snapshot>) -> Result<Self, TrajectoryError> {
        let Some(first) = frames.first() else {
            return Err(TrajectoryError::Corrupt(
                "trajectory contains no frames".to_string(),
            ));
        };
        let particle_count = first.particle_count();
        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.particle_count() != particle_count)
        {
            return Err(TrajectoryError::Corrupt(format!(
                "frame {} has {} particles, expected {}",
                index,
                frame.particle_count(),
                particle_count
            )));
        }

        let timesteps: Vec<u64> = frames.iter().map(Snapshot::timestep).collect();
        validate_timesteps(&timesteps)?;
        Ok(Self { frames, timesteps })
    }
}

impl Trajectory for InMemoryTrajectory {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn particle_count(&self) -> usize {
        self.frames.first().map_or(0, Snapshot::particle_count)
    }

    fn timesteps(&self) -> &[u64] {
        &self.timesteps
    }

    fn frame_at(&mut self, index: usize) -> Result<Snapshot, TrajectoryError> {
        self.frames
            .get(index)
            .cloned()
            .ok_or(TrajectoryError::FrameOutOfRange {
                index,
                count: self.frames.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::simulation_box::SimulationBox;
    use nalgebra::Vector3;

    fn frame(timestep: u64, particles: usize) -> Snapshot {
        Snapshot::new(
            timestep,
            vec![Vector3::zeros(); particles],
            SimulationBox::orthorhombic(5.0, 5.0, 5.0).unwrap(),
        )
    }

    #[test]
    fn valid_frames_build_a_trajectory() {
        let mut trajectory =
            InMemoryTrajectory::new(vec![frame(0, 4), frame(10, 4), frame(30, 4)]).unwrap();
        assert_eq!(trajectory.frame_count(), 3);
        assert_eq!(trajectory.particle_count(), 4);
        assert_eq!(trajectory.timesteps(), &[0, 10, 30]);
        assert_eq!(trajectory.frame_at(2).unwrap().timestep(), 30);
    }

    #[test]
    fn frames_iterator_yields_in_order() {
        let mut trajectory = InMemoryTrajectory::new(vec![frame(1, 2), frame(2, 2)]).unwrap();
        let steps: Vec<u64> = trajectory
            .frames()
            .map(|f| f.unwrap().timestep())
            .collect();
        assert_eq!(steps, vec![1, 2]);
    }

    #[test]
    fn decreasing_timesteps_are_rejected() {
        let result = InMemoryTrajectory::new(vec![frame(0, 1), frame(20, 1), frame(10, 1)]);
        assert!(matches!(
            result,
            Err(TrajectoryError::UnorderedFrame {
                index: 2,
                previous: 20,
                current: 10
            })
        ));
    }

    #[test]
    fn duplicate_timesteps_are_rejected() {
        let result = InMemoryTrajectory::new(vec![frame(5, 1), frame(5, 1)]);
        assert!(matches!(result, Err(TrajectoryError::UnorderedFrame { .. })));
    }

    #[test]
    fn particle_count_mismatch_is_corrupt() {
        let result = InMemoryTrajectory::new(vec![frame(0, 3), frame(1, 2)]);
        assert!(matches!(result, Err(TrajectoryError::Corrupt(_))));
    }

    #[test]
    fn empty_trajectory_is_corrupt() {
        assert!(matches!(
            InMemoryTrajectory::new(Vec::new()),
            Err(TrajectoryError::Corrupt(_))
        ));
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let mut trajectory = InMemoryTrajectory::new(vec![frame(0, 1)]).unwrap();
        assert!(matches!(
            trajectory.frame_at(3),
            Err(TrajectoryError::FrameOutOfRange { index: 3, count: 1 })
        ));
    }
}
