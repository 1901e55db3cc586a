use rand::{Rng, RngCore};

use crate::detect::backend::OccupancyEstimator;
use crate::detect::clock::Clock;
use crate::frame::{Frame, Rect};

pub const GRID_COLUMNS: u32 = 2;
pub const GRID_ROWS: u32 = 2;

/// Tunables for `RegionHeuristic`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeuristicParams {
    /// Lowest per-region luma threshold.
    pub base_threshold: f64,
    /// How far the threshold drifts above `base_threshold`.
    pub drift_amplitude: f64,
    /// Divisor applied to `t + offset` (ms) inside the sine.
    pub drift_period_ms: f64,
    /// A region only counts when a uniform draw exceeds this value.
    pub gate: f64,
    /// Whole-frame luma above which at least one occupant is reported.
    pub frame_floor: f64,
}

impl Default for HeuristicParams {
    fn default() -> Self {
        Self {
            base_threshold: 0.3,
            drift_amplitude: 0.1,
            drift_period_ms: 5000.0,
            gate: 0.3,
            frame_floor: 0.3,
        }
    }
}

impl HeuristicParams {
    /// Activity threshold for a region at `now_ms`, `0.3 + 0.1*|sin((t + offset)/5000)|` by default.
    pub fn region_threshold(&self, now_ms: u64, offset: u64) -> f64 {
        let phase = (now_ms as f64 + offset as f64) / self.drift_period_ms;
        self.base_threshold + self.drift_amplitude * phase.sin().abs()
    }
}

/// Brightness-based occupancy heuristic over a fixed 2x2 grid.
///
/// Each region whose mean luma beats its drifting threshold, and whose random
/// gate opens, counts as one occupant. When nothing counts but the frame as a
/// whole is still bright, the result is forced to 1.
#[derive(Clone, Debug, Default)]
pub struct RegionHeuristic {
    params: HeuristicParams,
}

impl RegionHeuristic {
    pub const NAME: &'static str = "region-heuristic";

    pub fn new(params: HeuristicParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &HeuristicParams {
        &self.params
    }

    /// Grid cells in row-major order.
    pub fn regions(width: u32, height: u32) -> Vec<Rect> {
        let mut cells = Vec::with_capacity((GRID_COLUMNS * GRID_ROWS) as usize);
        for row in 0..GRID_ROWS {
            for col in 0..GRID_COLUMNS {
                cells.push(Rect::new(
                    col * width / GRID_COLUMNS,
                    row * height / GRID_ROWS,
                    (col + 1) * width / GRID_COLUMNS,
                    (row + 1) * height / GRID_ROWS,
                ));
            }
        }
        cells
    }

    fn region_offset(cell: &Rect) -> u64 {
        cell.x0 as u64 + cell.y0 as u64
    }
}

impl OccupancyEstimator for RegionHeuristic {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn max_count(&self) -> u32 {
        GRID_COLUMNS * GRID_ROWS
    }

    fn estimate(&self, frame: &Frame, clock: &dyn Clock, rng: &mut dyn RngCore) -> u32 {
        if !frame.is_drawable() {
            return 0;
        }

        let now_ms = clock.now_ms();
        let mut count = 0;
        for cell in Self::regions(frame.width, frame.height) {
            let threshold = self
                .params
                .region_threshold(now_ms, Self::region_offset(&cell));
            // Draw for every region so RNG consumption does not depend on the frame.
            let draw: f64 = rng.gen();
            if frame.mean_luma(cell) > threshold && draw > self.params.gate {
                count += 1;
            }
        }

        if count == 0 && frame.mean_luma(frame.bounds()) > self.params.frame_floor {
            count = 1;
        }
        count
    }
}
