use serde::{Deserialize, Serialize};

/// Discrete safety band derived from an occupancy count.
///
/// `Caution` is part of the wire vocabulary (remote backends may report it as
/// `yellow`) but `StatusClassifier` never produces it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyStatus {
    #[default]
    #[serde(alias = "green")]
    Safe,
    #[serde(alias = "yellow")]
    Caution,
    #[serde(alias = "red")]
    Critical,
}

impl SafetyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyStatus::Safe => "safe",
            SafetyStatus::Caution => "caution",
            SafetyStatus::Critical => "critical",
        }
    }
}

impl std::fmt::Display for SafetyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one sample. Built once, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct DetectionResult {
    /// Estimated occupants in the sampled frame.
    pub count: u32,
    pub status: SafetyStatus,
    /// Encoded still (JPEG) of the sampled frame, for audit/display only.
    pub snapshot: Option<Vec<u8>>,
}

impl DetectionResult {
    pub fn new(count: u32, status: SafetyStatus, snapshot: Option<Vec<u8>>) -> Self {
        Self {
            count,
            status,
            snapshot,
        }
    }
}

impl std::fmt::Debug for DetectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionResult")
            .field("count", &self.count)
            .field("status", &self.status)
            .field("snapshot_bytes", &self.snapshot.as_ref().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accepts_colour_aliases() {
        let parsed: Vec<SafetyStatus> =
            serde_json::from_str(r#"["green", "yellow", "red", "safe", "critical"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                SafetyStatus::Safe,
                SafetyStatus::Caution,
                SafetyStatus::Critical,
                SafetyStatus::Safe,
                SafetyStatus::Critical,
            ]
        );
        assert_eq!(
            serde_json::to_string(&SafetyStatus::Critical).unwrap(),
            "\"critical\""
        );
    }
}
