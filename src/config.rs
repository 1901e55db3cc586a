use anyhow::{anyhow, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::alert::{AlertPolicy, MqttSettings};
use crate::detect::{RegionHeuristic, DEFAULT_CRITICAL_AT};
use crate::remote::{RemoteDescriptor, DEFAULT_BACKEND_TIMEOUT, DEFAULT_BACKEND_URL};
use crate::sampler::DEFAULT_SAMPLE_PERIOD;

const DEFAULT_LOCAL_WIDTH: u32 = 640;
const DEFAULT_LOCAL_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct CrowdWatchConfigFile {
    backend: Option<BackendConfigFile>,
    sampling: Option<SamplingConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    estimator: Option<EstimatorConfigFile>,
    alerts: Option<AlertsConfigFile>,
    history: Option<HistoryConfigFile>,
    cameras: Option<CamerasConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct BackendConfigFile {
    base_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    period_ms: Option<u64>,
    snapshots: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    critical_at: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct EstimatorConfigFile {
    name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertsConfigFile {
    policy: Option<AlertPolicy>,
    mqtt: Option<MqttSettings>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryConfigFile {
    db_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CamerasConfigFile {
    #[serde(default)]
    local: Vec<LocalCameraConfigFile>,
    #[serde(default)]
    remote: Vec<RemoteCameraConfig>,
}

#[derive(Debug, Deserialize)]
struct LocalCameraConfigFile {
    id: String,
    source: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// A network camera to start through the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteCameraConfig {
    pub id: String,
    #[serde(flatten)]
    pub descriptor: RemoteDescriptor,
}

/// A device camera sampled in-process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCameraConfig {
    pub id: String,
    /// `stub://...` or `http(s)://...` snapshot URL.
    pub source: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct CrowdWatchConfig {
    pub backend_url: String,
    pub backend_timeout: Duration,
    pub sample_period: Duration,
    pub snapshots: bool,
    pub critical_at: u32,
    pub estimator: String,
    pub alert_policy: AlertPolicy,
    pub mqtt: Option<MqttSettings>,
    pub history_db_path: Option<String>,
    pub local_cameras: Vec<LocalCameraConfig>,
    pub remote_cameras: Vec<RemoteCameraConfig>,
}

impl CrowdWatchConfig {
    /// Load from `CROWD_WATCH_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("CROWD_WATCH_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load from an explicit file (JSON, or TOML for `.toml`), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => CrowdWatchConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CrowdWatchConfigFile) -> Self {
        let backend = file.backend.unwrap_or_default();
        let sampling = file.sampling.unwrap_or_default();
        let alerts = file.alerts.unwrap_or_default();
        let cameras = file.cameras.unwrap_or_default();

        let local_cameras = cameras
            .local
            .into_iter()
            .map(|camera| LocalCameraConfig {
                id: camera.id,
                source: camera.source,
                width: camera.width.unwrap_or(DEFAULT_LOCAL_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_LOCAL_HEIGHT),
            })
            .collect();

        Self {
            backend_url: backend
                .base_url
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            backend_timeout: backend
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_BACKEND_TIMEOUT),
            sample_period: sampling
                .period_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SAMPLE_PERIOD),
            snapshots: sampling.snapshots.unwrap_or(true),
            critical_at: file
                .classifier
                .and_then(|classifier| classifier.critical_at)
                .unwrap_or(DEFAULT_CRITICAL_AT),
            estimator: file
                .estimator
                .and_then(|estimator| estimator.name)
                .unwrap_or_else(|| RegionHeuristic::NAME.to_string()),
            alert_policy: alerts.policy.unwrap_or_default(),
            mqtt: alerts.mqtt,
            history_db_path: file.history.and_then(|history| history.db_path),
            local_cameras,
            remote_cameras: cameras.remote,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CROWD_WATCH_BACKEND_URL") {
            if !url.trim().is_empty() {
                self.backend_url = url;
            }
        }
        if let Ok(period) = std::env::var("CROWD_WATCH_PERIOD_MS") {
            let ms: u64 = period
                .trim()
                .parse()
                .map_err(|_| anyhow!("CROWD_WATCH_PERIOD_MS must be an integer number of ms"))?;
            self.sample_period = Duration::from_millis(ms);
        }
        if let Ok(critical_at) = std::env::var("CROWD_WATCH_CRITICAL_AT") {
            self.critical_at = critical_at
                .trim()
                .parse()
                .map_err(|_| anyhow!("CROWD_WATCH_CRITICAL_AT must be a positive integer"))?;
        }
        if let Ok(policy) = std::env::var("CROWD_WATCH_ALERT_POLICY") {
            if !policy.trim().is_empty() {
                self.alert_policy = policy.parse()?;
            }
        }
        if let Ok(path) = std::env::var("CROWD_WATCH_HISTORY_DB") {
            if !path.trim().is_empty() {
                self.history_db_path = Some(path);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sample_period.is_zero() {
            return Err(anyhow!("sampling period must be greater than zero"));
        }
        if self.backend_timeout.is_zero() {
            return Err(anyhow!("backend timeout must be greater than zero"));
        }
        if self.critical_at == 0 {
            return Err(anyhow!("critical_at must be greater than zero"));
        }
        let mut seen = HashSet::new();
        let ids = self
            .local_cameras
            .iter()
            .map(|camera| camera.id.as_str())
            .chain(self.remote_cameras.iter().map(|camera| camera.id.as_str()));
        for id in ids {
            validate_session_id(id)?;
            if !seen.insert(id) {
                return Err(anyhow!("camera id '{}' is configured more than once", id));
            }
        }
        Ok(())
    }
}

/// Session ids are local identifiers used in URLs, topics and logs.
pub fn validate_session_id(id: &str) -> Result<()> {
    static SESSION_ID_RE: OnceLock<Regex> = OnceLock::new();
    let re = SESSION_ID_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").unwrap_or_else(|e| panic!("session id regex: {e}"))
    });
    if !re.is_match(id) {
        return Err(anyhow!(
            "camera id '{}' must match ^[A-Za-z0-9_.-]{{1,64}}$",
            id
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<CrowdWatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_allowlisted() {
        assert!(validate_session_id("cam-1").is_ok());
        assert!(validate_session_id("north_gate.2").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("cam 1").is_err());
        assert!(validate_session_id("cam/1").is_err());
        assert!(validate_session_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn defaults_without_a_file() {
        let cfg = CrowdWatchConfig::from_file(CrowdWatchConfigFile::default());
        assert_eq!(cfg.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(cfg.sample_period, Duration::from_millis(1500));
        assert_eq!(cfg.critical_at, 4);
        assert_eq!(cfg.estimator, "region-heuristic");
        assert_eq!(cfg.alert_policy, AlertPolicy::EveryCritical);
        assert!(cfg.snapshots);
        assert!(cfg.local_cameras.is_empty());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut cfg = CrowdWatchConfig::from_file(CrowdWatchConfigFile::default());
        let camera = LocalCameraConfig {
            id: "gate".to_string(),
            source: "stub://gate".to_string(),
            width: 64,
            height: 48,
        };
        cfg.local_cameras = vec![camera.clone(), camera];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn zero_backend_timeout_is_rejected() {
        let file: CrowdWatchConfigFile =
            serde_json::from_str(r#"{"backend": {"timeout_ms": 0}}"#).unwrap();
        let cfg = CrowdWatchConfig::from_file(file);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("backend timeout"));
    }

    #[test]
    fn duplicate_ids_are_rejected_across_kinds() {
        let mut cfg = CrowdWatchConfig::from_file(CrowdWatchConfigFile::default());
        cfg.local_cameras = vec![LocalCameraConfig {
            id: "gate".to_string(),
            source: "stub://gate".to_string(),
            width: 64,
            height: 48,
        }];
        cfg.remote_cameras = vec![RemoteCameraConfig {
            id: "gate".to_string(),
            descriptor: RemoteDescriptor {
                username: String::new(),
                password: String::new(),
                address: "10.0.0.3".to_string(),
                port: 554,
                stream_path: String::new(),
            },
        }];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
