//! Alert dispatch.
//!
//! `AlertDispatcher` inspects every classified sample and pushes a Critical
//! notification to each configured sink. Sinks are collaborators (operator UI,
//! authority paging, MQTT); their failures are logged and never reach the
//! sampler.

mod mqtt;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::detect::{DetectionResult, SafetyStatus};

pub use mqtt::{MqttSettings, MqttSink};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Payload handed to notification sinks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    /// Session the notification is about, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Notification {
    pub fn critical_density(session_id: &str, count: u32) -> Self {
        Self {
            title: "Crowd density critical".to_string(),
            description: format!(
                "camera {} reports an estimated {} occupants",
                session_id, count
            ),
            severity: Severity::Critical,
            session_id: Some(session_id.to_string()),
        }
    }

    pub fn camera_unavailable(session_id: &str, reason: &str) -> Self {
        Self {
            title: "Camera unavailable".to_string(),
            description: format!("camera {} could not be started: {}", session_id, reason),
            severity: Severity::Warning,
            session_id: Some(session_id.to_string()),
        }
    }
}

/// Receives notifications. Implementations must be cheap or hand off internally;
/// they are called from sampler threads.
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the process log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&self, notification: &Notification) -> Result<()> {
        match notification.severity {
            Severity::Info => log::info!("{}: {}", notification.title, notification.description),
            Severity::Warning | Severity::Critical => {
                log::warn!("{}: {}", notification.title, notification.description)
            }
        }
        Ok(())
    }
}

/// When a Critical sample produces an alert.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPolicy {
    /// Alert on every Critical sample, including consecutive ones.
    #[default]
    EveryCritical,
    /// Alert only when a session moves into Critical from another status.
    OnTransition,
}

impl std::str::FromStr for AlertPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "every_critical" | "every-critical" | "every" => Ok(AlertPolicy::EveryCritical),
            "on_transition" | "on-transition" | "transition" | "edge" => {
                Ok(AlertPolicy::OnTransition)
            }
            other => Err(anyhow::anyhow!(
                "unknown alert policy '{}'; expected every_critical or on_transition",
                other
            )),
        }
    }
}

pub struct AlertDispatcher {
    policy: AlertPolicy,
    sinks: Vec<Arc<dyn NotificationSink>>,
    last_status: Mutex<HashMap<String, SafetyStatus>>,
}

impl AlertDispatcher {
    pub fn new(policy: AlertPolicy) -> Self {
        Self {
            policy,
            sinks: Vec::new(),
            last_status: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy
    }

    /// Inspect one classified sample for `session_id`.
    pub fn on_result(&self, session_id: &str, result: &DetectionResult) {
        let previous = self
            .last_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_string(), result.status);

        if result.status != SafetyStatus::Critical {
            return;
        }
        if self.policy == AlertPolicy::OnTransition && previous == Some(SafetyStatus::Critical) {
            log::debug!("{}: still critical, alert suppressed", session_id);
            return;
        }
        self.broadcast(&Notification::critical_density(session_id, result.count));
    }

    /// One-shot report for a session whose frame source could not be acquired.
    pub fn report_acquisition_failure(&self, session_id: &str, error: &anyhow::Error) {
        self.broadcast(&Notification::camera_unavailable(
            session_id,
            &format!("{:#}", error),
        ));
    }

    /// Drop edge-trigger memory for a session that has been stopped.
    pub fn forget(&self, session_id: &str) {
        self.last_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }

    fn broadcast(&self, notification: &Notification) {
        for sink in &self.sinks {
            if let Err(e) = sink.notify(notification) {
                log::warn!("notification sink '{}' failed: {:#}", sink.name(), e);
            }
        }
    }
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new(AlertPolicy::default())
    }
}
