use crate::engine::accumulator::LagStatistics;
use phf::{Map, phf_map};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Ensemble observables reported as curves over lag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Observable {
    MeanSquaredDisplacement,
    MeanQuarticDisplacement,
    NonGaussian,
    Overlap,
    Chi4,
    MeanSquaredRotation,
    RotationalCorrelation,
}

static OBSERVABLE_NAMES: Map<&'static str, Observable> = phf_map! {
    "msd" => Observable::MeanSquaredDisplacement,
    "mqd" => Observable::MeanQuarticDisplacement,
    "alpha2" => Observable::NonGaussian,
    "overlap" => Observable::Overlap,
    "chi4" => Observable::Chi4,
    "msr" => Observable::MeanSquaredRotation,
    "rotcorr" => Observable::RotationalCorrelation,
};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown observable name: '{0}'")]
pub struct UnknownObservable(pub String);

impl Observable {
    pub const ALL: [Observable; 7] = [
        Self::MeanSquaredDisplacement,
        Self::MeanQuarticDisplacement,
        Self::NonGaussian,
        Self::Overlap,
        Self::Chi4,
        Self::MeanSquaredRotation,
        Self::RotationalCorrelation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::MeanSquaredDisplacement => "msd",
            Self::MeanQuarticDisplacement => "mqd",
            Self::NonGaussian => "alpha2",
            Self::Overlap => "overlap",
            Self::Chi4 => "chi4",
            Self::MeanSquaredRotation => "msr",
            Self::RotationalCorrelation => "rotcorr",
        }
    }

    /// Value of this observable at one lag; `None` for rotational observables when the
    /// trajectory carries no orientations.
    pub fn value(self, stats: &LagStatistics) -> Option<f64> {
        match self {
            Self::MeanSquaredDisplacement => Some(stats.mean_squared_displacement),
            Self::MeanQuarticDisplacement => Some(stats.mean_quartic_displacement),
            Self::NonGaussian => Some(stats.non_gaussian),
            Self::Overlap => Some(stats.overlap),
            Self::Chi4 => Some(stats.chi4),
            Self::MeanSquaredRotation => stats.mean_squared_rotation,
            Self::RotationalCorrelation => stats.rotational_correlation,
        }
    }
}

impl fmt::Display for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Observable {
    type Err = UnknownObservable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OBSERVABLE_NAMES
            .get(s.trim().to_ascii_lowercase().as_str())
            .copied()
            .ok_or_else(|| UnknownObservable(s.to_string()))
    }
}
