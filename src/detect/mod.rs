mod backend;
mod backends;
mod classify;
mod clock;
mod registry;
mod result;

pub use backend::OccupancyEstimator;
pub use backends::{HeuristicParams, RegionHeuristic, StubEstimator, GRID_COLUMNS, GRID_ROWS};
pub use classify::{StatusClassifier, DEFAULT_CRITICAL_AT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use registry::EstimatorRegistry;
pub use result::{DetectionResult, SafetyStatus};
