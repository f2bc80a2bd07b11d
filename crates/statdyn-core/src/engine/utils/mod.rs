//! Utility functions for the engine module.
//!
//! Holds the linear-per-decade step generator shared by the lag generators and the
//! output-schedule planner, and the periodic neighbour search used by feature extraction.

pub mod neighbors;
pub mod steps;
