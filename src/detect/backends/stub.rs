use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use rand::RngCore;

use crate::detect::backend::OccupancyEstimator;
use crate::detect::clock::Clock;
use crate::frame::Frame;

/// Stub estimator for tests and demos. Replays a script of counts, then repeats
/// a fixed fallback count.
pub struct StubEstimator {
    script: Mutex<VecDeque<u32>>,
    fallback: u32,
    max: u32,
}

impl StubEstimator {
    pub const NAME: &'static str = "stub";

    pub fn new(fallback: u32) -> Self {
        Self::scripted(Vec::new(), fallback)
    }

    pub fn scripted(counts: impl IntoIterator<Item = u32>, fallback: u32) -> Self {
        let script: VecDeque<u32> = counts.into_iter().collect();
        let max = script.iter().copied().max().unwrap_or(0).max(fallback);
        Self {
            script: Mutex::new(script),
            fallback,
            max,
        }
    }

    /// Counts not yet replayed.
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for StubEstimator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl OccupancyEstimator for StubEstimator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn max_count(&self) -> u32 {
        self.max
    }

    fn estimate(&self, frame: &Frame, _clock: &dyn Clock, _rng: &mut dyn RngCore) -> u32 {
        if !frame.is_drawable() {
            return 0;
        }
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback)
    }
}
