use super::result::SafetyStatus;

/// Counts at or above this value are Critical.
pub const DEFAULT_CRITICAL_AT: u32 = 4;

/// Maps an occupancy count onto a safety band.
///
/// Two bands are reachable: `count < critical_at` is Safe, anything else is
/// Critical. There is no Caution boundary; see DESIGN.md.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusClassifier {
    critical_at: u32,
}

impl StatusClassifier {
    pub fn new(critical_at: u32) -> Self {
        Self { critical_at }
    }

    pub fn critical_at(&self) -> u32 {
        self.critical_at
    }

    pub fn classify(&self, count: u32) -> SafetyStatus {
        if count >= self.critical_at {
            SafetyStatus::Critical
        } else {
            SafetyStatus::Safe
        }
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CRITICAL_AT)
    }
}
