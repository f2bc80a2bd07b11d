//! # statdyn Core Library
//!
//! Dynamics analysis for molecular-dynamics trajectories of glass-forming
//! particle systems: displacement statistics over many time origins and lags,
//! relaxation times and per-particle mobility features.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Snapshot`, `SimulationBox`,
//!   the `Trajectory` trait), periodic geometry and trajectory file I/O.
//!
//! - **[`engine`]: The Logic Core.** Configuration, the time-origin sampler
//!   (`LagSchedule`), the associative per-lag accumulators, the relaxation estimator,
//!   feature extraction, the bounded frame cache and progress/cancellation plumbing.
//!
//! - **[`workflows`]: The Public API.** Ties the `engine` and `core` together into a
//!   complete analysis run producing a `DynamicsReport`, plus writers for its results.

pub mod core;
pub mod engine;
pub mod workflows;
