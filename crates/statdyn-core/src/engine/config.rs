use crate::core::utils::geometry::Dimensionality;
use crate::engine::utils::steps::generate_steps;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

/// How periodic boundaries are resolved when the box changes between two frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoxPolicy {
    /// Minimum image in the origin frame's box.
    OriginBox,
    /// Minimum image in the element-wise mean of the origin and target boxes.
    AveragedBox,
    /// Unwrap with periodic image flags; no minimum-image reduction.
    ImageFlags,
}

impl fmt::Display for BoxPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OriginBox => "origin-box",
            Self::AveragedBox => "averaged-box",
            Self::ImageFlags => "image-flags",
        };
        f.write_str(name)
    }
}

impl FromStr for BoxPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "origin-box" => Ok(Self::OriginBox),
            "averaged-box" => Ok(Self::AveragedBox),
            "image-flags" => Ok(Self::ImageFlags),
            other => Err(invalid(
                "box_policy",
                format!(
                    "'{}' is not one of origin-box, averaged-box, image-flags",
                    other
                ),
            )),
        }
    }
}

/// Upper bound on geometric lag density; finer grids only repeat integer lags.
pub const MAX_POINTS_PER_DECADE: u32 = 1000;

/// Generator for the set of lags (in timesteps) to analyze.
#[derive(Debug, Clone, PartialEq)]
pub enum LagSpec {
    Explicit(Vec<u64>),
    Geometric {
        start: u64,
        stop: u64,
        points_per_decade: u32,
    },
    LinearPerDecade {
        stop: u64,
        num_linear: u64,
    },
}

impl LagSpec {
    /// Sorted, de-duplicated lags described by this generator.
    pub fn lags(&self) -> Vec<u64> {
        let mut lags: Vec<u64> = match self {
            Self::Explicit(values) => values.clone(),
            Self::Geometric {
                start,
                stop,
                points_per_decade,
            } => {
                let mut values: Vec<u64> = Vec::new();
                if *start == 0 || *points_per_decade == 0 {
                    return values;
                }
                let start = *start as f64;
                let ppd = f64::from(*points_per_decade);
                let mut k = 0.0f64;
                loop {
                    let value = (start * 10f64.powf(k / ppd)).round();
                    if !value.is_finite() || value > *stop as f64 {
                        break;
                    }
                    if values.last() != Some(&(value as u64)) {
                        values.push(value as u64);
                    }
                    // First exponent rounding above `value`, one early to absorb rounding error.
                    let next = (ppd * ((value + 0.5) / start).log10()).ceil() - 1.0;
                    k = next.max(k + 1.0);
                }
                values
            }
            Self::LinearPerDecade { stop, num_linear } => {
                let stop = i64::try_from(*stop).unwrap_or(i64::MAX);
                generate_steps(stop, *num_linear, 0)
                    .filter_map(|v| u64::try_from(v).ok())
                    .collect()
            }
        };
        lags.sort_unstable();
        lags.dedup();
        lags
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Explicit(values) => {
                if values.is_empty() {
                    return Err(invalid("lags", "explicit lag list is empty"));
                }
                if values.contains(&0) {
                    return Err(invalid("lags", "lags must be positive"));
                }
            }
            Self::Geometric {
                start,
                stop,
                points_per_decade,
            } => {
                if *start == 0 || start > stop {
                    return Err(invalid(
                        "lags",
                        format!("geometric lags need 0 < start <= stop (got {start}..{stop})"),
                    ));
                }
                if *points_per_decade == 0 || *points_per_decade > MAX_POINTS_PER_DECADE {
                    return Err(invalid(
                        "lags",
                        format!(
                            "points_per_decade must lie in 1..={MAX_POINTS_PER_DECADE}, got {points_per_decade}"
                        ),
                    ));
                }
            }
            Self::LinearPerDecade { stop, num_linear } => {
                if *stop == 0 {
                    return Err(invalid("lags", "stop must be positive"));
                }
                if *num_linear == 0 {
                    return Err(invalid("lags", "num_linear must be positive"));
                }
            }
        }
        Ok(())
    }
}

/// Which particles enter the analysis.
///
/// Rigid-body trajectories list the body centres first and their constituent sites after
/// them; `Leading(bodies)` keeps only the centres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParticleSelection {
    #[default]
    All,
    Leading(usize),
}

impl fmt::Display for ParticleSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Leading(count) => write!(f, "first {}", count),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplacementConfig {
    pub dimensions: Dimensionality,
    pub box_policy: BoxPolicy,
    pub remove_drift: bool,
    pub particles: ParticleSelection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Resolved lags, sorted and unique.
    pub lags: Vec<u64>,
    pub min_origins: usize,
    pub max_origins: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservableConfig {
    pub mobility_threshold: f64,
    pub relaxation_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureConfig {
    pub reference_lag: u64,
    pub neighbor_cutoff: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub displacement: DisplacementConfig,
    pub sampling: SamplingConfig,
    pub observables: ObservableConfig,
    pub features: Option<FeatureConfig>,
    pub frame_cache_capacity: usize,
}

#[derive(Default)]
pub struct AnalysisConfigBuilder {
    dimensions: Option<u8>,
    box_policy: Option<BoxPolicy>,
    remove_drift: Option<bool>,
    particles: Option<ParticleSelection>,
    mobility_threshold: Option<f64>,
    relaxation_threshold: Option<f64>,
    lags: Option<LagSpec>,
    min_origins: Option<usize>,
    max_origins: Option<usize>,
    features: Option<Option<FeatureConfig>>,
    frame_cache_capacity: Option<usize>,
}

impl AnalysisConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimensions(mut self, dimensions: u8) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
    pub fn box_policy(mut self, policy: BoxPolicy) -> Self {
        self.box_policy = Some(policy);
        self
    }
    pub fn remove_drift(mut self, remove: bool) -> Self {
        self.remove_drift = Some(remove);
        self
    }
    pub fn particles(mut self, particles: ParticleSelection) -> Self {
        self.particles = Some(particles);
        self
    }
    pub fn mobility_threshold(mut self, threshold: f64) -> Self {
        self.mobility_threshold = Some(threshold);
        self
    }
    pub fn relaxation_threshold(mut self, threshold: f64) -> Self {
        self.relaxation_threshold = Some(threshold);
        self
    }
    pub fn lags(mut self, lags: LagSpec) -> Self {
        self.lags = Some(lags);
        self
    }
    pub fn min_origins(mut self, n: usize) -> Self {
        self.min_origins = Some(n);
        self
    }
    pub fn max_origins(mut self, n: usize) -> Self {
        self.max_origins = Some(n);
        self
    }
    pub fn features(mut self, features: FeatureConfig) -> Self {
        self.features = Some(Some(features));
        self
    }
    pub fn no_features(mut self) -> Self {
        self.features = Some(None);
        self
    }
    pub fn frame_cache_capacity(mut self, capacity: usize) -> Self {
        self.frame_cache_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Result<AnalysisConfig, ConfigError> {
        let dimensions_count = self
            .dimensions
            .ok_or(ConfigError::MissingParameter("dimensions"))?;
        let dimensions = Dimensionality::from_count(dimensions_count).ok_or_else(|| {
            invalid(
                "dimensions",
                format!("must be 2 or 3, got {}", dimensions_count),
            )
        })?;
        let displacement = DisplacementConfig {
            dimensions,
            box_policy: self
                .box_policy
                .ok_or(ConfigError::MissingParameter("box_policy"))?,
            remove_drift: self
                .remove_drift
                .ok_or(ConfigError::MissingParameter("remove_drift"))?,
            particles: self
                .particles
                .ok_or(ConfigError::MissingParameter("particles"))?,
        };
        if displacement.particles == ParticleSelection::Leading(0) {
            return Err(invalid("particles", "the selection must keep at least one particle"));
        }

        let mobility_threshold = self
            .mobility_threshold
            .ok_or(ConfigError::MissingParameter("mobility_threshold"))?;
        if !(mobility_threshold.is_finite() && mobility_threshold > 0.0) {
            return Err(invalid(
                "mobility_threshold",
                format!("must be a positive finite distance, got {}", mobility_threshold),
            ));
        }
        let relaxation_threshold = self
            .relaxation_threshold
            .ok_or(ConfigError::MissingParameter("relaxation_threshold"))?;
        if !(relaxation_threshold > 0.0 && relaxation_threshold < 1.0) {
            return Err(invalid(
                "relaxation_threshold",
                format!("must lie strictly between 0 and 1, got {}", relaxation_threshold),
            ));
        }
        let observables = ObservableConfig {
            mobility_threshold,
            relaxation_threshold,
        };

        let lag_spec = self.lags.ok_or(ConfigError::MissingParameter("lags"))?;
        lag_spec.validate()?;
        let lags = lag_spec.lags();
        if lags.is_empty() {
            return Err(invalid("lags", "lag generator produced no lags"));
        }
        let min_origins = self
            .min_origins
            .ok_or(ConfigError::MissingParameter("min_origins"))?;
        if min_origins == 0 {
            return Err(invalid("min_origins", "must be at least 1"));
        }
        let max_origins = self
            .max_origins
            .ok_or(ConfigError::MissingParameter("max_origins"))?;
        if max_origins < min_origins {
            return Err(invalid(
                "max_origins",
                format!(
                    "must be at least min_origins ({}), got {}",
                    min_origins, max_origins
                ),
            ));
        }
        let sampling = SamplingConfig {
            lags,
            min_origins,
            max_origins,
        };

        let features = self
            .features
            .ok_or(ConfigError::MissingParameter("features"))?;
        if let Some(features) = &features {
            if features.reference_lag == 0 {
                return Err(invalid("reference_lag", "must be positive"));
            }
            if sampling.lags.binary_search(&features.reference_lag).is_err() {
                return Err(invalid(
                    "reference_lag",
                    format!("{} is not one of the configured lags", features.reference_lag),
                ));
            }
            if let Some(cutoff) = features.neighbor_cutoff {
                if !(cutoff.is_finite() && cutoff > 0.0) {
                    return Err(invalid(
                        "neighbor_cutoff",
                        format!("must be a positive finite distance, got {}", cutoff),
                    ));
                }
            }
        }

        let frame_cache_capacity = self
            .frame_cache_capacity
            .ok_or(ConfigError::MissingParameter("frame_cache_capacity"))?;
        if frame_cache_capacity < 2 {
            return Err(invalid(
                "frame_cache_capacity",
                "must hold at least one origin and one target frame",
            ));
        }

        Ok(AnalysisConfig {
            displacement,
            sampling,
            observables,
            features,
            frame_cache_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::new()
            .dimensions(3)
            .box_policy(BoxPolicy::OriginBox)
            .remove_drift(false)
            .particles(ParticleSelection::All)
            .mobility_threshold(0.3)
            .relaxation_threshold(1.0 / std::f64::consts::E)
            .lags(LagSpec::Explicit(vec![100, 10, 100]))
            .min_origins(1)
            .max_origins(10)
            .no_features()
            .frame_cache_capacity(16)
    }

    #[test]
    fn complete_builder_produces_config() {
        let config = complete().build().unwrap();
        assert_eq!(config.displacement.dimensions, Dimensionality::Three);
        assert_eq!(config.sampling.lags, vec![10, 100]);
        assert!(config.features.is_none());
    }

    #[test]
    fn each_field_is_required() {
        let mut builder = complete();
        builder.box_policy = None;
        assert_eq!(
            builder.build(),
            Err(ConfigError::MissingParameter("box_policy"))
        );

        let mut builder = complete();
        builder.particles = None;
        assert_eq!(
            builder.build(),
            Err(ConfigError::MissingParameter("particles"))
        );

        let mut builder = complete();
        builder.features = None;
        assert_eq!(
            builder.build(),
            Err(ConfigError::MissingParameter("features"))
        );
    }

    #[test]
    fn invalid_dimensions_are_rejected() {
        let result = complete().dimensions(4).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "dimensions",
                ..
            })
        ));
    }

    #[test]
    fn thresholds_are_range_checked() {
        assert!(complete().mobility_threshold(0.0).build().is_err());
        assert!(complete().mobility_threshold(f64::INFINITY).build().is_err());
        assert!(complete().relaxation_threshold(1.0).build().is_err());
        assert!(complete().relaxation_threshold(0.0).build().is_err());
    }

    #[test]
    fn origin_bounds_are_checked() {
        assert!(complete().min_origins(0).build().is_err());
        assert!(matches!(
            complete().min_origins(5).max_origins(4).build(),
            Err(ConfigError::InvalidParameter {
                name: "max_origins",
                ..
            })
        ));
    }

    #[test]
    fn empty_or_zero_lags_are_rejected() {
        assert!(complete().lags(LagSpec::Explicit(vec![])).build().is_err());
        assert!(complete().lags(LagSpec::Explicit(vec![0, 5])).build().is_err());
        assert!(
            complete()
                .lags(LagSpec::Geometric {
                    start: 10,
                    stop: 5,
                    points_per_decade: 3
                })
                .build()
                .is_err()
        );
    }

    #[test]
    fn cache_must_hold_a_pair() {
        assert!(complete().frame_cache_capacity(1).build().is_err());
    }

    #[test]
    fn feature_cutoff_must_be_positive() {
        let result = complete()
            .features(FeatureConfig {
                reference_lag: 100,
                neighbor_cutoff: Some(-1.0),
            })
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "neighbor_cutoff",
                ..
            })
        ));
    }

    #[test]
    fn reference_lag_must_be_configured() {
        let features = |reference_lag| FeatureConfig {
            reference_lag,
            neighbor_cutoff: None,
        };
        assert!(complete().features(features(10)).build().is_ok());
        assert!(matches!(
            complete().features(features(50)).build(),
            Err(ConfigError::InvalidParameter {
                name: "reference_lag",
                ..
            })
        ));
    }

    #[test]
    fn empty_particle_selection_is_rejected() {
        assert!(matches!(
            complete().particles(ParticleSelection::Leading(0)).build(),
            Err(ConfigError::InvalidParameter {
                name: "particles",
                ..
            })
        ));
        let config = complete()
            .particles(ParticleSelection::Leading(64))
            .build()
            .unwrap();
        assert_eq!(config.displacement.particles, ParticleSelection::Leading(64));
    }

    #[test]
    fn points_per_decade_is_bounded() {
        let geometric = |points_per_decade| LagSpec::Geometric {
            start: 1,
            stop: 100,
            points_per_decade,
        };
        let config = complete()
            .lags(geometric(MAX_POINTS_PER_DECADE))
            .build()
            .unwrap();
        // Dense grids saturate at every integer lag.
        assert_eq!(config.sampling.lags, (1..=100).collect::<Vec<u64>>());
        assert!(matches!(
            complete().lags(geometric(MAX_POINTS_PER_DECADE + 1)).build(),
            Err(ConfigError::InvalidParameter { name: "lags", .. })
        ));
    }

    #[test]
    fn geometric_lags_skip_repeated_values() {
        let lags = LagSpec::Geometric {
            start: 1,
            stop: 20,
            points_per_decade: 100,
        }
        .lags();
        assert_eq!(lags, (1..=20).collect::<Vec<u64>>());
    }

    #[test]
    fn geometric_lags_are_rounded_and_unique() {
        let lags = LagSpec::Geometric {
            start: 1,
            stop: 1000,
            points_per_decade: 3,
        }
        .lags();
        assert_eq!(lags, vec![1, 2, 5, 10, 22, 46, 100, 215, 464, 1000]);
    }

    #[test]
    fn linear_per_decade_lags_follow_step_series() {
        let lags = LagSpec::LinearPerDecade {
            stop: 250,
            num_linear: 9,
        }
        .lags();
        assert_eq!(
            lags,
            vec![
                1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 200, 250
            ]
        );
    }

    #[test]
    fn box_policy_parses_kebab_case() {
        assert_eq!("averaged-box".parse::<BoxPolicy>(), Ok(BoxPolicy::AveragedBox));
        assert!("nearest".parse::<BoxPolicy>().is_err());
        assert_eq!(BoxPolicy::ImageFlags.to_string(), "image-flags");
    }
}
