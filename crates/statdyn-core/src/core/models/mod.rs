//! # Core Models Module
//!
//! Data structures describing the particle configurations that every analysis
//! consumes.
//!
//! ## Key Components
//!
//! - [`simulation_box`] - Periodic cell with cached inverse, covering orthorhombic and triclinic boxes
//! - [`snapshot`] - Immutable per-frame particle state (positions, orientations, image flags, box)
//! - [`trajectory`] - The [`trajectory::Trajectory`] trait and an in-memory implementation
//!
//! ## Usage
//!
//! ```ignore
//! use statdyn::core::models::{simulation_box::SimulationBox, snapshot::Snapshot};
//!
//! let cell = SimulationBox::orthorhombic(10.0, 10.0, 10.0)?;
//! let frame = Snapshot::new(0, positions, cell).with_images(images)?;
//! ```

pub mod simulation_box;
pub mod snapshot;
pub mod trajectory;
