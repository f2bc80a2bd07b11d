//! # Engine Module
//!
//! The stateful analysis machinery that turns a trajectory into dynamical observables.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Fully enumerated, eagerly validated analysis parameters
//! - **Displacements** ([`displacement`]) - Minimum-image or image-unwrapped displacements and rotations
//! - **Time-Origin Sampling** ([`schedule`]) - Deterministic (origin, target) pairs grouped by lag
//! - **Aggregation** ([`accumulator`]) - Associative per-lag running sums and their finalized statistics
//! - **Observables** ([`observables`]) - Stable names for the reported curves
//! - **Relaxation** ([`relaxation`]) - Characteristic times from finalized curves
//! - **Features** ([`features`]) - Per-particle feature tables and the mobility classifier seam
//! - **Frame Cache** ([`cache`]) - Bounded FIFO store of decoded snapshots
//! - **Progress Monitoring** ([`progress`]) and **Cancellation** ([`cancel`])
//! - **Error Handling** ([`error`]) - The workflow-level error type
//!
//! With the `parallel` feature (on by default) the pairs of each lag are processed on the
//! rayon thread pool and combined through the accumulator merge.

pub mod accumulator;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod displacement;
pub mod error;
pub mod features;
pub mod observables;
pub mod progress;
pub mod relaxation;
pub mod schedule;
pub mod utils;
