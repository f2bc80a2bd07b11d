/// Events emitted while a dynamics analysis runs.
#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    /// A countable task begins; `total_steps` is the number of (origin, target) pairs.
    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    /// Every pair of a lag has been folded into its accumulator.
    LagComplete { lag: u64, origins: usize },
    /// A lag was dropped because too few origins fit within the trajectory.
    LagSkipped { lag: u64, available: usize },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Starts a named phase; [`Progress::PhaseFinish`] is reported when the guard drops,
    /// including on early returns through `?`.
    pub fn phase(&self, name: &'static str) -> PhaseGuard<'_, 'a> {
        self.report(Progress::PhaseStart { name });
        PhaseGuard { reporter: self }
    }

    /// Reports a task of `total_steps` increments nested in the current phase.
    pub fn task(&self, total_steps: u64) -> TaskGuard<'_, 'a> {
        self.report(Progress::TaskStart { total_steps });
        TaskGuard { reporter: self }
    }
}

#[must_use = "the phase finishes as soon as the guard is dropped"]
pub struct PhaseGuard<'r, 'a> {
    reporter: &'r ProgressReporter<'a>,
}

impl Drop for PhaseGuard<'_, '_> {
    fn drop(&mut self) {
        self.reporter.report(Progress::PhaseFinish);
    }
}

#[must_use = "the task finishes as soon as the guard is dropped"]
pub struct TaskGuard<'r, 'a> {
    reporter: &'r ProgressReporter<'a>,
}

impl TaskGuard<'_, '_> {
    #[inline]
    pub fn increment(&self) {
        self.reporter.report(Progress::TaskIncrement);
    }
}

impl Drop for TaskGuard<'_, '_> {
    fn drop(&mut self) {
        self.reporter.report(Progress::TaskFinish);
    }
}
