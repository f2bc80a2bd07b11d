//! Provides input/output functionality for trajectory file formats.
//!
//! Formats implement the [`traits::TrajectoryFile`] trait, which pairs an indexed,
//! lazily decoding reader with a writer for the same format.

pub mod traits;
pub mod xyz;
