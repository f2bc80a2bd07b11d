use crate::core::models::snapshot::Snapshot;
use crate::core::models::trajectory::{Trajectory, TrajectoryError};
use crate::engine::accumulator::{LagAccumulator, LagStatistics};
use crate::engine::cache::FrameCache;
use crate::engine::cancel::CancellationToken;
use crate::engine::config::AnalysisConfig;
use crate::engine::displacement;
use crate::engine::error::AnalysisError;
use crate::engine::features::{FeatureAccumulator, FeatureTable};
use crate::engine::observables::Observable;
use crate::engine::progress::{Progress, ProgressReporter, TaskGuard};
use crate::engine::relaxation::{self, RelaxationResult};
use crate::engine::schedule::{FramePair, LagSchedule, SkippedLag};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

type LoadedPair = (FramePair, Arc<Snapshot>, Arc<Snapshot>);

#[derive(Debug, Clone)]
pub struct DynamicsReport {
    /// Finalized statistics, one entry per analyzed lag in ascending order.
    pub statistics: Vec<LagStatistics>,
    pub relaxation: RelaxationResult,
    pub features: Option<FeatureTable>,
    pub skipped: Vec<SkippedLag>,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

impl DynamicsReport {
    pub fn lags(&self) -> Vec<u64> {
        self.statistics.iter().map(|s| s.lag).collect()
    }

    pub fn statistics_for(&self, lag: u64) -> Option<&LagStatistics> {
        self.statistics.iter().find(|s| s.lag == lag)
    }

    /// `(lag, value)` points of one observable, or `None` when it was not measured.
    pub fn curve(&self, observable: Observable) -> Option<Vec<(u64, f64)>> {
        self.statistics
            .iter()
            .map(|s| observable.value(s).map(|v| (s.lag, v)))
            .collect()
    }
}

#[instrument(skip_all, name = "dynamics_workflow")]
pub fn run<T: Trajectory + ?Sized>(
    trajectory: &mut T,
    config: &AnalysisConfig,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<DynamicsReport, AnalysisError> {
    info!(
        frames = trajectory.frame_count(),
        particles = trajectory.particle_count(),
        selection = %config.displacement.particles,
        lags = config.sampling.lags.len(),
        "Starting dynamics analysis."
    );

    // === Phase 1: Time-origin schedule ===
    let planning = reporter.phase("Planning Schedule");
    let schedule = LagSchedule::build(
        trajectory.timesteps(),
        &config.sampling.lags,
        config.sampling.min_origins,
        config.sampling.max_origins,
    );
    let mut warnings = Vec::new();
    for skipped in schedule.skipped() {
        let message = format!(
            "Lag {} skipped: {} origin(s) available, {} required",
            skipped.lag, skipped.available, skipped.required
        );
        warn!("{}", message);
        reporter.report(Progress::LagSkipped {
            lag: skipped.lag,
            available: skipped.available,
        });
        warnings.push(message);
    }
    drop(planning);

    // === Phase 2: Aggregate every lag group ===
    let aggregating = reporter.phase("Aggregating Dynamics");
    let task = reporter.task(schedule.total_pairs() as u64);

    let mut cache = FrameCache::new(config.frame_cache_capacity);
    let mut accumulators: BTreeMap<u64, LagAccumulator> = BTreeMap::new();
    let mut cancelled = false;
    for group in schedule.groups() {
        if cancel.is_cancelled() {
            cancelled = true;
            warn!(
                completed = accumulators.len(),
                "Analysis cancelled; returning completed lags."
            );
            break;
        }
        let accumulator = aggregate_pairs(trajectory, &mut cache, &group.pairs, config, &task)?;
        debug!(lag = group.lag, origins = accumulator.pairs(), "Lag complete");
        reporter.report(Progress::LagComplete {
            lag: group.lag,
            origins: accumulator.pairs(),
        });
        accumulators.insert(group.lag, accumulator);
    }

    drop(task);
    drop(aggregating);

    // === Phase 3: Finalize and estimate relaxation ===
    let dimensions = config.displacement.dimensions;
    let statistics: Vec<LagStatistics> = accumulators
        .iter()
        .map(|(lag, acc)| acc.finalize(*lag, dimensions))
        .collect();
    let relaxation = relaxation::estimate(
        &statistics,
        config.observables.relaxation_threshold,
        dimensions,
    )?;

    // === Phase 4: Per-particle features at the reference lag ===
    let features = match config.features {
        Some(feature_config) if !cancelled => {
            let lag = feature_config.reference_lag;
            let pairs = schedule
                .pairs_for(lag)
                .ok_or_else(|| AnalysisError::InsufficientData {
                    lag,
                    reason: "the feature reference lag has no usable origins".to_string(),
                })?;
            let _extracting = reporter.phase("Extracting Features");
            let table = extract_features(
                trajectory,
                &mut cache,
                pairs,
                config,
                lag,
                feature_config.neighbor_cutoff,
            )?;
            Some(table)
        }
        _ => None,
    };

    let (hits, misses) = cache.stats();
    info!(
        analyzed_lags = statistics.len(),
        skipped_lags = schedule.skipped().len(),
        cache_hits = hits,
        cache_misses = misses,
        cancelled,
        "Dynamics analysis finished."
    );

    Ok(DynamicsReport {
        statistics,
        relaxation,
        features,
        skipped: schedule.skipped().to_vec(),
        warnings,
        cancelled,
    })
}

/// Number of pairs whose frames are decoded together, keeping memory bounded by the cache.
fn chunk_size(config: &AnalysisConfig) -> usize {
    (config.frame_cache_capacity / 2).max(1)
}

fn load_chunk<T: Trajectory + ?Sized>(
    trajectory: &mut T,
    cache: &mut FrameCache,
    pairs: &[FramePair],
) -> Result<Vec<LoadedPair>, TrajectoryError> {
    pairs
        .iter()
        .map(|&pair| {
            let origin = cache.get_or_load(pair.origin, &mut *trajectory)?;
            let target = cache.get_or_load(pair.target, &mut *trajectory)?;
            Ok((pair, origin, target))
        })
        .collect()
}

fn sample_pair(
    (pair, origin, target): &LoadedPair,
    config: &AnalysisConfig,
) -> Result<LagAccumulator, AnalysisError> {
    let to_error = |source| AnalysisError::Displacement {
        origin: pair.origin,
        target: pair.target,
        source,
    };
    let deltas = displacement::displacement(origin, target, &config.displacement)
        .map_err(to_error)?;
    let rotations = match (origin.orientations(), target.orientations()) {
        (Some(_), Some(_)) => Some(
            displacement::rotations(origin, target, &config.displacement).map_err(to_error)?,
        ),
        _ => None,
    };
    Ok(LagAccumulator::from_pair(
        &deltas,
        rotations.as_deref(),
        config.observables.mobility_threshold,
    ))
}

fn aggregate_pairs<T: Trajectory + ?Sized>(
    trajectory: &mut T,
    cache: &mut FrameCache,
    pairs: &[FramePair],
    config: &AnalysisConfig,
    task: &TaskGuard,
) -> Result<LagAccumulator, AnalysisError> {
    let mut total = LagAccumulator::new();
    for chunk in pairs.chunks(chunk_size(config)) {
        let loaded = load_chunk(trajectory, cache, chunk)?;

        #[cfg(not(feature = "parallel"))]
        let iterator = loaded.iter();

        #[cfg(feature = "parallel")]
        let iterator = loaded.par_iter();

        let results: Vec<Result<LagAccumulator, AnalysisError>> =
            iterator.map(|item| sample_pair(item, config)).collect();

        for result in results {
            total = total.merge(result?);
            task.increment();
        }
    }
    Ok(total)
}

fn extract_features<T: Trajectory + ?Sized>(
    trajectory: &mut T,
    cache: &mut FrameCache,
    pairs: &[FramePair],
    config: &AnalysisConfig,
    lag: u64,
    neighbor_cutoff: Option<f64>,
) -> Result<FeatureTable, AnalysisError> {
    let mut total = FeatureAccumulator::default();
    for chunk in pairs.chunks(chunk_size(config)) {
        let loaded = load_chunk(trajectory, cache, chunk)?;

        #[cfg(not(feature = "parallel"))]
        let iterator = loaded.iter();

        #[cfg(feature = "parallel")]
        let iterator = loaded.par_iter();

        let results: Vec<Result<FeatureAccumulator, AnalysisError>> = iterator
            .map(|(pair, origin, target)| {
                FeatureAccumulator::from_pair(
                    origin,
                    target,
                    &config.displacement,
                    config.observables.mobility_threshold,
                    neighbor_cutoff,
                )
                .map_err(|source| AnalysisError::Displacement {
                    origin: pair.origin,
                    target: pair.target,
                    source,
                })
            })
            .collect();

        for result in results {
            total = total.merge(result?);
        }
    }
    info!(lag, origins = total.pairs(), "Extracted per-particle features.");
    Ok(total.finish(lag)?)
}
