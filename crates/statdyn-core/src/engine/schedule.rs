use std::collections::HashMap;
use tracing::debug;

/// Indices of an origin frame and the frame one lag later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramePair {
    pub origin: usize,
    pub target: usize,
}

/// All sampled pairs sharing one nominal lag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LagGroup {
    pub lag: u64,
    pub pairs: Vec<FramePair>,
    /// Origins available before striding down to the configured maximum.
    pub available: usize,
}

/// A requested lag that could not be sampled from enough origins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedLag {
    pub lag: u64,
    pub available: usize,
    pub required: usize,
}

/// Deterministic selection of (origin, target) frame pairs, grouped by lag.
///
/// A pair exists for lag `L` when some frame sits exactly `L` timesteps after the origin,
/// so irregular and logarithmic output schedules are handled the same way as uniform ones.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LagSchedule {
    groups: Vec<LagGroup>,
    skipped: Vec<SkippedLag>,
}

impl LagSchedule {
    pub fn build(
        timesteps: &[u64],
        lags: &[u64],
        min_origins: usize,
        max_origins: usize,
    ) -> Self {
        let index_of: HashMap<u64, usize> = timesteps
            .iter()
            .enumerate()
            .map(|(index, &timestep)| (timestep, index))
            .collect();

        let mut requested = lags.to_vec();
        requested.sort_unstable();
        requested.dedup();

        let mut schedule = Self::default();
        for lag in requested {
            let candidates: Vec<FramePair> = timesteps
                .iter()
                .enumerate()
                .filter_map(|(origin, &timestep)| {
                    let target_step = timestep.checked_add(lag)?;
                    index_of
                        .get(&target_step)
                        .map(|&target| FramePair { origin, target })
                })
                .collect();
            let available = candidates.len();

            if lag == 0 || available < min_origins.max(1) {
                debug!(lag, available, required = min_origins, "Skipping lag");
                schedule.skipped.push(SkippedLag {
                    lag,
                    available,
                    required: min_origins,
                });
                continue;
            }

            let stride = available.div_ceil(max_origins.max(1));
            let pairs = candidates.into_iter().step_by(stride).collect();
            schedule.groups.push(LagGroup {
                lag,
                pairs,
                available,
            });
        }
        schedule
    }

    pub fn groups(&self) -> &[LagGroup] {
        &self.groups
    }

    pub fn skipped(&self) -> &[SkippedLag] {
        &self.skipped
    }

    /// Replays the pairs sampled for `lag`, if the lag was kept.
    pub fn pairs_for(&self, lag: u64) -> Option<&[FramePair]> {
        self.groups
            .iter()
            .find(|group| group.lag == lag)
            .map(|group| group.pairs.as_slice())
    }

    pub fn total_pairs(&self) -> usize {
        self.groups.iter().map(|group| group.pairs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(frames: u64, spacing: u64) -> Vec<u64> {
        (0..frames).map(|i| i * spacing).collect()
    }

    #[test]
    fn uniform_spacing_reduces_to_index_offsets() {
        let schedule = LagSchedule::build(&uniform(10, 100), &[200], 1, 100);
        let pairs = schedule.pairs_for(200).unwrap();
        assert_eq!(pairs.len(), 8);
        assert!(pairs.iter().all(|p| p.target == p.origin + 2));
    }

    #[test]
    fn irregular_timesteps_match_exact_lags() {
        let timesteps = [0, 1, 2, 5, 10, 11, 12, 15, 20];
        let schedule = LagSchedule::build(&timesteps, &[10], 1, 100);
        let pairs = schedule.pairs_for(10).unwrap();
        assert_eq!(
            pairs,
            &[
                FramePair {
                    origin: 0,
                    target: 4
                },
                FramePair {
                    origin: 1,
                    target: 5
                },
                FramePair {
                    origin: 2,
                    target: 6
                },
                FramePair {
                    origin: 3,
                    target: 7
                },
                FramePair {
                    origin: 4,
                    target: 8
                },
            ]
        );
    }

    #[test]
    fn origins_are_strided_to_the_maximum() {
        let schedule = LagSchedule::build(&uniform(101, 1), &[1], 1, 10);
        let group = &schedule.groups()[0];
        assert_eq!(group.available, 100);
        assert_eq!(group.pairs.len(), 10);
        assert_eq!(group.pairs[1].origin, 10);
    }

    #[test]
    fn lag_beyond_span_is_skipped_not_failed() {
        let schedule = LagSchedule::build(&uniform(10, 100), &[100, 5000], 1, 100);
        assert!(schedule.pairs_for(5000).is_none());
        assert_eq!(
            schedule.skipped(),
            &[SkippedLag {
                lag: 5000,
                available: 0,
                required: 1
            }]
        );
        assert_eq!(schedule.groups().len(), 1);
    }

    #[test]
    fn lags_with_too_few_origins_are_skipped() {
        let schedule = LagSchedule::build(&uniform(5, 1), &[4], 2, 10);
        assert!(schedule.is_empty());
        assert_eq!(schedule.skipped()[0].available, 1);
    }

    #[test]
    fn schedule_is_deterministic() {
        let timesteps = uniform(50, 3);
        let lags = [9, 3, 30, 3];
        let first = LagSchedule::build(&timesteps, &lags, 1, 7);
        let second = LagSchedule::build(&timesteps, &lags, 1, 7);
        assert_eq!(first, second);
        let kept: Vec<u64> = first.groups().iter().map(|g| g.lag).collect();
        assert_eq!(kept, vec![3, 9, 30]);
        assert_eq!(first.total_pairs(), 21);
    }
}
