//! # Workflows Module
//!
//! High-level entry points that turn a trajectory and an [`AnalysisConfig`](crate::engine::config::AnalysisConfig)
//! into finished results.
//!
//! - **Dynamics Workflow** ([`dynamics`]) - Schedules (origin, target) frame pairs for every
//!   requested lag, aggregates the displacement statistics, estimates relaxation times and
//!   optionally extracts per-particle features at a reference lag.
//! - **Export** ([`export`]) - Writes a [`DynamicsReport`](dynamics::DynamicsReport) as CSV
//!   curves, a TOML relaxation summary and a per-particle feature table.

pub mod dynamics;
pub mod export;
