use std::collections::BTreeMap;

/// Iterator over linear-per-decade timesteps.
///
/// Offsets from `start` grow by a step size that begins at one and is multiplied by ten
/// every time the offset reaches `(num_linear + 1) * step`, giving `num_linear` evenly
/// spaced values in each decade. The first value at or beyond `total_steps` is clamped to
/// `total_steps` and ends the sequence.
#[derive(Debug, Clone)]
pub struct Steps {
    total_steps: i64,
    num_linear: i64,
    start: i64,
    offset: i64,
    step: i64,
    done: bool,
}

impl Iterator for Steps {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.done {
            return None;
        }
        self.offset = self.offset.saturating_add(self.step);
        let value = self.start.saturating_add(self.offset);
        if value >= self.total_steps {
            self.done = true;
            return Some(self.total_steps);
        }
        if self.offset >= self.num_linear.saturating_add(1).saturating_mul(self.step) {
            self.step = self.step.saturating_mul(10);
        }
        Some(value)
    }
}

/// Timesteps after `start` at which to sample, up to and including `total_steps`.
///
/// Nothing is produced when `start` is already at or past `total_steps`.
pub fn generate_steps(total_steps: i64, num_linear: u64, start: i64) -> Steps {
    Steps {
        total_steps,
        num_linear: i64::try_from(num_linear).unwrap_or(i64::MAX),
        start,
        offset: 0,
        step: 1,
        done: start >= total_steps,
    }
}

/// Sorted output timesteps for a set of staggered origins.
///
/// Origins start every `gen_steps` timesteps; each one contributes its own timestep and
/// its [`generate_steps`] sequence. Every timestep carries the indices of the origins
/// that need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSeries {
    entries: Vec<(u64, Vec<usize>)>,
}

impl StepSeries {
    pub fn new(total_steps: u64, num_linear: u64, gen_steps: u64, max_gen: usize) -> Self {
        let total = i64::try_from(total_steps).unwrap_or(i64::MAX);
        let spacing = gen_steps.max(1);
        let mut merged: BTreeMap<u64, Vec<usize>> = BTreeMap::new();

        let origins = (0..max_gen)
            .map_while(|index| {
                let origin = (index as u64).checked_mul(spacing)?;
                (origin < total_steps).then_some((index, origin))
            })
            .collect::<Vec<_>>();

        for (index, origin) in origins {
            merged.entry(origin).or_default().push(index);
            let start = i64::try_from(origin).unwrap_or(i64::MAX);
            for value in generate_steps(total, num_linear, start) {
                if let Ok(timestep) = u64::try_from(value) {
                    merged.entry(timestep).or_default().push(index);
                }
            }
        }

        Self {
            entries: merged.into_iter().collect(),
        }
    }

    pub fn timesteps(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|(timestep, _)| *timestep)
    }

    pub fn entries(&self) -> &[(u64, Vec<usize>)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
