//! # Core Module
//!
//! Stateless building blocks for trajectory analysis: the particle data model,
//! periodic geometry and trajectory file formats.
//!
//! ## Architecture
//!
//! - **Particle Representation** ([`models`]) - Snapshots, simulation boxes and the trajectory abstraction
//! - **File I/O** ([`io`]) - Reading and writing trajectory files
//! - **Geometry** ([`utils`]) - Minimum-image reduction, angle wrapping and least-squares fits
//!
//! Nothing in this module keeps state between calls; the [`crate::engine`] layer
//! builds the stateful analysis on top of it.

pub mod io;
pub mod models;
pub mod utils;
