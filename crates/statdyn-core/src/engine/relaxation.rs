use crate::core::utils::geometry::{self, Dimensionality};
use crate::engine::accumulator::LagStatistics;
use crate::engine::observables::Observable;
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RelaxationError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    #[error("Invalid curve: {0}")]
    InvalidCurve(String),
}

/// Outcome of locating a characteristic time on a curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RelaxationEstimate {
    /// The curve crossed the threshold; `time` is interpolated in log(lag).
    Crossed { time: f64 },
    /// The first sampled lag was already past the threshold.
    AlreadyRelaxed { first_lag: u64 },
    /// The curve never reached the threshold within the sampled lags.
    NotReached { last_lag: u64 },
}

impl RelaxationEstimate {
    pub fn time(&self) -> Result<f64, RelaxationError> {
        match *self {
            Self::Crossed { time } => Ok(time),
            Self::AlreadyRelaxed { first_lag } => Err(RelaxationError::InsufficientData(
                format!("curve is already below threshold at the first lag ({first_lag})"),
            )),
            Self::NotReached { last_lag } => Err(RelaxationError::InsufficientData(format!(
                "curve does not relax within the sampled lags (last lag {last_lag})"
            ))),
        }
    }
}

/// Key of the χ₄ peak estimate; the other estimates are keyed by observable name.
pub const CHI4_PEAK: &str = "chi4_peak";

/// Relaxation summary keyed by observable name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelaxationResult {
    /// Diffusion constant from the long-time slope of the MSD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diffusion: Option<f64>,
    pub estimates: BTreeMap<String, RelaxationEstimate>,
}

impl RelaxationResult {
    pub fn get(&self, observable: Observable) -> Option<&RelaxationEstimate> {
        self.estimates.get(observable.name())
    }

    pub fn chi4_peak(&self) -> Option<&RelaxationEstimate> {
        self.estimates.get(CHI4_PEAK)
    }
}

fn validate_curve(lags: &[u64], values: &[f64]) -> Result<(), RelaxationError> {
    if lags.is_empty() {
        return Err(RelaxationError::InvalidCurve("curve is empty".to_string()));
    }
    if lags.len() != values.len() {
        return Err(RelaxationError::InvalidCurve(format!(
            "{} lags but {} values",
            lags.len(),
            values.len()
        )));
    }
    if lags[0] == 0 {
        return Err(RelaxationError::InvalidCurve(
            "lags must be positive".to_string(),
        ));
    }
    if lags.windows(2).any(|w| w[1] <= w[0]) {
        return Err(RelaxationError::InvalidCurve(
            "lags must be strictly increasing".to_string(),
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(RelaxationError::InvalidCurve(
            "curve contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// First downward crossing of `threshold`, interpolated linearly in value against ln(lag).
pub fn crossing_time(
    lags: &[u64],
    values: &[f64],
    threshold: f64,
) -> Result<RelaxationEstimate, RelaxationError> {
    validate_curve(lags, values)?;
    if values[0] < threshold {
        return Ok(RelaxationEstimate::AlreadyRelaxed { first_lag: lags[0] });
    }

    let crossing = lags
        .iter()
        .zip(values)
        .tuple_windows()
        .find(|&((_, &v0), (_, &v1))| v0 >= threshold && threshold > v1);
    if let Some(((&lag0, &v0), (&lag1, &v1))) = crossing {
        let (l0, l1) = ((lag0 as f64).ln(), (lag1 as f64).ln());
        let fraction = (threshold - v0) / (v1 - v0);
        let time = (l0 + fraction * (l1 - l0)).exp();
        return Ok(RelaxationEstimate::Crossed { time });
    }

    Ok(RelaxationEstimate::NotReached {
        last_lag: lags[lags.len() - 1],
    })
}

/// Lag of the curve maximum, used for the peak of the four-point susceptibility.
pub fn peak_time(lags: &[u64], values: &[f64]) -> Result<RelaxationEstimate, RelaxationError> {
    validate_curve(lags, values)?;
    let last = lags.len() - 1;
    let (peak, peak_value) = values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_value), (i, v)| {
            if v > best_value { (i, v) } else { (best, best_value) }
        });

    Ok(if peak_value <= 0.0 || peak == last {
        RelaxationEstimate::NotReached {
            last_lag: lags[last],
        }
    } else if peak == 0 {
        RelaxationEstimate::AlreadyRelaxed { first_lag: lags[0] }
    } else {
        RelaxationEstimate::Crossed {
            time: lags[peak] as f64,
        }
    })
}

/// Diffusion constant `slope / 2d` from a least-squares fit of MSD against lag.
///
/// Only lags at or after `from_time` are fitted; `None` when fewer than two remain.
pub fn diffusion_constant(
    lags: &[u64],
    msd: &[f64],
    from_time: Option<f64>,
    dimensions: Dimensionality,
) -> Option<f64> {
    let start = from_time.unwrap_or(0.0);
    let (xs, ys): (Vec<f64>, Vec<f64>) = lags
        .iter()
        .zip(msd)
        .filter(|(lag, _)| **lag as f64 >= start)
        .map(|(lag, value)| (*lag as f64, *value))
        .unzip();
    let (slope, _) = geometry::linear_fit(&xs, &ys)?;
    Some(slope / (2.0 * dimensions.count() as f64))
}

#[instrument(skip_all, name = "relaxation_estimate")]
pub fn estimate(
    statistics: &[LagStatistics],
    threshold: f64,
    dimensions: Dimensionality,
) -> Result<RelaxationResult, RelaxationError> {
    let mut result = RelaxationResult::default();
    if statistics.is_empty() {
        return Ok(result);
    }

    let lags: Vec<u64> = statistics.iter().map(|s| s.lag).collect();
    let curve = |observable: Observable| -> Option<Vec<f64>> {
        statistics.iter().map(|s| observable.value(s)).collect()
    };

    let mut overlap_time = None;
    for observable in [Observable::Overlap, Observable::RotationalCorrelation] {
        if let Some(values) = curve(observable) {
            let estimate = crossing_time(&lags, &values, threshold)?;
            debug!(observable = observable.name(), ?estimate, "Relaxation estimate");
            if observable == Observable::Overlap {
                overlap_time = estimate.time().ok();
            }
            result
                .estimates
                .insert(observable.name().to_string(), estimate);
        }
    }

    if let Some(chi4) = curve(Observable::Chi4) {
        let estimate = peak_time(&lags, &chi4)?;
        result
            .estimates
            .insert(CHI4_PEAK.to_string(), estimate);
    }

    if let Some(msd) = curve(Observable::MeanSquaredDisplacement) {
        result.diffusion = diffusion_constant(&lags, &msd, overlap_time, dimensions);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn stats(lag: u64, msd: f64, overlap: f64, chi4: f64) -> LagStatistics {
        LagStatistics {
            lag,
            origins: 4,
            mean_squared_displacement: msd,
            mean_quartic_displacement: 0.0,
            non_gaussian: 0.0,
            overlap,
            chi4,
            mean_squared_rotation: None,
            rotational_correlation: None,
        }
    }

    #[test]
    fn crossing_lies_strictly_between_bracketing_lags() {
        let lags = [1, 10, 100, 1000];
        let values = [0.95, 0.8, 0.2, 0.05];
        let estimate = crossing_time(&lags, &values, 0.5).unwrap();
        let time = estimate.time().unwrap();
        assert!(time > 10.0 && time < 100.0);
        // Halfway in value between 0.8 and 0.2 is halfway in log space.
        assert!((time - 10f64.powf(1.5)).abs() < 1e-6);
    }

    #[test]
    fn crossing_exactly_at_sample_returns_that_lag() {
        let estimate = crossing_time(&[10, 20], &[0.5, 0.1], 0.5).unwrap();
        assert!((estimate.time().unwrap() - 10.0).abs() < TOLERANCE);
    }

    #[test]
    fn flat_curve_never_relaxes() {
        let estimate = crossing_time(&[100, 200, 300], &[1.0, 1.0, 1.0], 0.36).unwrap();
        assert_eq!(estimate, RelaxationEstimate::NotReached { last_lag: 300 });
        assert!(matches!(
            estimate.time(),
            Err(RelaxationError::InsufficientData(_))
        ));
    }

    #[test]
    fn curve_starting_below_threshold_is_already_relaxed() {
        let estimate = crossing_time(&[5, 50], &[0.2, 0.1], 0.36).unwrap();
        assert_eq!(estimate, RelaxationEstimate::AlreadyRelaxed { first_lag: 5 });
        assert!(estimate.time().is_err());
    }

    #[test]
    fn misuse_is_an_invalid_curve() {
        assert!(matches!(
            crossing_time(&[], &[], 0.5),
            Err(RelaxationError::InvalidCurve(_))
        ));
        assert!(matches!(
            crossing_time(&[0, 1], &[1.0, 0.0], 0.5),
            Err(RelaxationError::InvalidCurve(_))
        ));
        assert!(matches!(
            crossing_time(&[10, 10], &[1.0, 0.0], 0.5),
            Err(RelaxationError::InvalidCurve(_))
        ));
        assert!(matches!(
            crossing_time(&[1, 2], &[1.0, f64::NAN], 0.5),
            Err(RelaxationError::InvalidCurve(_))
        ));
    }

    #[test]
    fn chi4_peak_is_located() {
        let lags = [1, 10, 100, 1000];
        assert_eq!(
            peak_time(&lags, &[0.1, 0.5, 2.0, 1.0]).unwrap(),
            RelaxationEstimate::Crossed { time: 100.0 }
        );
        assert_eq!(
            peak_time(&lags, &[0.1, 0.5, 1.0, 2.0]).unwrap(),
            RelaxationEstimate::NotReached { last_lag: 1000 }
        );
        assert_eq!(
            peak_time(&lags, &[0.0; 4]).unwrap(),
            RelaxationEstimate::NotReached { last_lag: 1000 }
        );
    }

    #[test]
    fn diffusion_uses_long_time_slope() {
        let lags = [1, 2, 4, 8, 16];
        let msd = [0.5, 0.9, 2.4, 4.8, 9.6];
        let d = diffusion_constant(&lags, &msd, Some(3.0), Dimensionality::Three).unwrap();
        assert!((d - 0.6 / 6.0).abs() < TOLERANCE);
        assert!(diffusion_constant(&lags, &msd, Some(10.0), Dimensionality::Three).is_none());
    }

    #[test]
    fn estimate_collects_overlap_chi4_and_diffusion() {
        let statistics = vec![
            stats(10, 0.1, 0.9, 0.5),
            stats(100, 1.0, 0.5, 3.0),
            stats(1000, 10.0, 0.1, 1.0),
            stats(10_000, 100.0, 0.01, 0.2),
        ];
        let result = estimate(&statistics, 0.3, Dimensionality::Three).unwrap();

        let tau = result.get(Observable::Overlap).unwrap().time().unwrap();
        assert!(tau > 100.0 && tau < 1000.0);
        assert_eq!(
            result.chi4_peak(),
            Some(&RelaxationEstimate::Crossed { time: 100.0 })
        );
        assert!(result.get(Observable::Chi4).is_none());
        assert!(result.get(Observable::RotationalCorrelation).is_none());
        assert!((result.diffusion.unwrap() - 0.01 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn estimate_of_no_statistics_is_empty() {
        let result = estimate(&[], 0.3, Dimensionality::Two).unwrap();
        assert!(result.estimates.is_empty());
        assert!(result.diffusion.is_none());
    }
}
