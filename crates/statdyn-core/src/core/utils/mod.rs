//! Geometric helpers shared by the models and the analysis engine.

pub mod geometry;
