use crate::core::models::snapshot::Snapshot;
use crate::core::models::trajectory::{Trajectory, TrajectoryError};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::trace;

/// Bounded store of decoded snapshots with first-in-first-out eviction.
#[derive(Debug)]
pub struct FrameCache {
    capacity: usize,
    frames: HashMap<usize, Arc<Snapshot>>,
    order: VecDeque<usize>,
    hits: u64,
    misses: u64,
}

impl FrameCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            frames: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.frames.contains_key(&index)
    }

    /// `(hits, misses)` since construction.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn get_or_load<T: Trajectory + ?Sized>(
        &mut self,
        index: usize,
        trajectory: &mut T,
    ) -> Result<Arc<Snapshot>, TrajectoryError> {
        if let Some(frame) = self.frames.get(&index) {
            self.hits += 1;
            return Ok(Arc::clone(frame));
        }
        self.misses += 1;

        let frame = Arc::new(trajectory.frame_at(index)?);
        while self.frames.len() >= self.capacity {
            let Some(evicted) = self.order.pop_front() else {
                break;
            };
            self.frames.remove(&evicted);
            trace!(frame = evicted, "Evicted frame from cache");
        }
        self.frames.insert(index, Arc::clone(&frame));
        self.order.push_back(index);
        Ok(frame)
    }
}
