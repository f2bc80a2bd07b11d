use crate::core::models::simulation_box::{BoxError, SimulationBox};
use crate::core::models::snapshot::Snapshot;
use crate::core::utils::geometry;
use crate::engine::config::{BoxPolicy, DisplacementConfig, ParticleSelection};
use nalgebra::Vector3;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DisplacementError {
    #[error("Origin frame has {origin} particles but target frame has {target}")]
    DimensionMismatch { origin: usize, target: usize },
    #[error("Image-flag unwrapping needs periodic images on both frames")]
    MissingImages,
    #[error("Rotations need orientations on both frames")]
    MissingOrientations,
    #[error("Selection keeps the first {requested} particles but frames hold only {available}")]
    SelectionOutOfRange { requested: usize, available: usize },
    #[error("Averaged simulation box is invalid: {0}")]
    Box(#[from] BoxError),
}

fn check_counts(origin: &Snapshot, target: &Snapshot) -> Result<(), DisplacementError> {
    if origin.particle_count() != target.particle_count() {
        return Err(DisplacementError::DimensionMismatch {
            origin: origin.particle_count(),
            target: target.particle_count(),
        });
    }
    Ok(())
}

/// Number of leading particles kept by `particles` in frames of `available` particles.
pub fn selected_count(
    particles: ParticleSelection,
    available: usize,
) -> Result<usize, DisplacementError> {
    match particles {
        ParticleSelection::All => Ok(available),
        ParticleSelection::Leading(requested) if requested <= available => Ok(requested),
        ParticleSelection::Leading(requested) => Err(DisplacementError::SelectionOutOfRange {
            requested,
            available,
        }),
    }
}

/// Per-particle displacement from `origin` to `target` for the selected particles,
/// index-aligned with the snapshots.
pub fn displacement(
    origin: &Snapshot,
    target: &Snapshot,
    config: &DisplacementConfig,
) -> Result<Vec<Vector3<f64>>, DisplacementError> {
    check_counts(origin, target)?;
    let selected = selected_count(config.particles, origin.particle_count())?;
    let dims = config.dimensions;

    let mut deltas: Vec<Vector3<f64>> = match config.box_policy {
        BoxPolicy::OriginBox | BoxPolicy::AveragedBox => {
            let cell: Cow<'_, SimulationBox> = match config.box_policy {
                BoxPolicy::AveragedBox => Cow::Owned(
                    origin
                        .simulation_box()
                        .averaged_with(target.simulation_box())?,
                ),
                _ => Cow::Borrowed(origin.simulation_box()),
            };
            origin
                .positions()
                .iter()
                .zip(target.positions())
                .take(selected)
                .map(|(r0, rt)| cell.minimum_image(&(rt - r0), dims))
                .collect()
        }
        BoxPolicy::ImageFlags => {
            let (Some(images0), Some(images_t)) = (origin.images(), target.images()) else {
                return Err(DisplacementError::MissingImages);
            };
            let box0 = origin.simulation_box();
            let box_t = target.simulation_box();
            origin
                .positions()
                .iter()
                .zip(target.positions())
                .zip(images0.iter().zip(images_t))
                .take(selected)
                .map(|((r0, rt), (n0, nt))| {
                    dims.project(box_t.unwrap(rt, *nt) - box0.unwrap(r0, *n0))
                })
                .collect()
        }
    };

    if config.remove_drift && !deltas.is_empty() {
        let drift = deltas.iter().sum::<Vector3<f64>>() / deltas.len() as f64;
        for delta in &mut deltas {
            *delta -= drift;
        }
    }
    Ok(deltas)
}

/// Per-particle rotation angle from `origin` to `target` for the selected particles.
///
/// Signed about z in two dimensions, unsigned in three.
pub fn rotations(
    origin: &Snapshot,
    target: &Snapshot,
    config: &DisplacementConfig,
) -> Result<Vec<f64>, DisplacementError> {
    check_counts(origin, target)?;
    let selected = selected_count(config.particles, origin.particle_count())?;
    let (Some(q0), Some(qt)) = (origin.orientations(), target.orientations()) else {
        return Err(DisplacementError::MissingOrientations);
    };
    Ok(q0
        .iter()
        .zip(qt)
        .take(selected)
        .map(|(from, to)| geometry::rotation_angle(from, to, config.dimensions))
        .collect())
}
