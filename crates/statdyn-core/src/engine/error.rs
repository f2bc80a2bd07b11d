use thiserror::Error;

use super::config::ConfigError;
use super::displacement::DisplacementError;
use super::features::FeatureError;
use super::relaxation::RelaxationError;
use crate::core::models::trajectory::TrajectoryError;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Trajectory error: {source}")]
    Trajectory {
        #[from]
        source: TrajectoryError,
    },

    #[error("Displacement failed between frames {origin} and {target}: {source}")]
    Displacement {
        origin: usize,
        target: usize,
        source: DisplacementError,
    },

    #[error("Relaxation estimate failed: {source}")]
    Relaxation {
        #[from]
        source: RelaxationError,
    },

    #[error("Feature extraction failed: {source}")]
    Feature {
        #[from]
        source: FeatureError,
    },

    #[error("Insufficient data for lag {lag}: {reason}")]
    InsufficientData { lag: u64, reason: String },
}
