pub mod region;
pub mod stub;

pub use region::{HeuristicParams, RegionHeuristic, GRID_COLUMNS, GRID_ROWS};
pub use stub::StubEstimator;
