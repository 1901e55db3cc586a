use rand::RngCore;

use super::clock::Clock;
use crate::frame::Frame;

/// Occupancy estimator trait.
///
/// Implementations turn one frame into an approximate head count. The count is
/// advisory: the scheduling, classification and alerting around it do not depend
/// on how it was produced, so a trained model can replace the heuristic without
/// touching the rest of the engine.
///
/// Estimators MUST NOT fail on a bad frame. An undrawable frame estimates to 0.
/// Time and randomness come in through `clock` and `rng` so tests can pin both.
pub trait OccupancyEstimator: Send + Sync {
    /// Estimator identifier, used for lookup from configuration.
    fn name(&self) -> &'static str;

    /// Upper bound on any count this estimator returns.
    fn max_count(&self) -> u32;

    /// Estimate the number of occupants in `frame`.
    fn estimate(&self, frame: &Frame, clock: &dyn Clock, rng: &mut dyn RngCore) -> u32;
}
