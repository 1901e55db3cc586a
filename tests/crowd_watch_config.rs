use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use crowd_watch::config::CrowdWatchConfig;
use crowd_watch::AlertPolicy;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CROWD_WATCH_CONFIG",
        "CROWD_WATCH_BACKEND_URL",
        "CROWD_WATCH_PERIOD_MS",
        "CROWD_WATCH_CRITICAL_AT",
        "CROWD_WATCH_ALERT_POLICY",
        "CROWD_WATCH_HISTORY_DB",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "backend": { "base_url": "http://10.0.0.2:5000/api/camera", "timeout_ms": 2500 },
            "sampling": { "period_ms": 1000, "snapshots": false },
            "classifier": { "critical_at": 6 },
            "alerts": {
                "policy": "on_transition",
                "mqtt": { "host": "broker.local" }
            },
            "cameras": {
                "local": [ { "id": "lobby", "source": "stub://lobby", "width": 320, "height": 240 } ],
                "remote": [
                    { "id": "gate", "username": "op", "password": "pw",
                      "address": "192.168.1.20", "port": 554, "stream_path": "/live" }
                ]
            }
        }"#,
    );

    std::env::set_var("CROWD_WATCH_CONFIG", file.path());
    std::env::set_var("CROWD_WATCH_PERIOD_MS", "750");
    std::env::set_var("CROWD_WATCH_HISTORY_DB", "samples.db");

    let cfg = CrowdWatchConfig::load().expect("load config");
    assert_eq!(cfg.backend_url, "http://10.0.0.2:5000/api/camera");
    assert_eq!(cfg.backend_timeout, Duration::from_millis(2500));
    assert_eq!(cfg.sample_period, Duration::from_millis(750));
    assert!(!cfg.snapshots);
    assert_eq!(cfg.critical_at, 6);
    assert_eq!(cfg.alert_policy, AlertPolicy::OnTransition);
    assert_eq!(cfg.history_db_path.as_deref(), Some("samples.db"));

    let mqtt = cfg.mqtt.expect("mqtt settings");
    assert_eq!(mqtt.host, "broker.local");
    assert_eq!(mqtt.port, 1883);

    assert_eq!(cfg.local_cameras.len(), 1);
    assert_eq!(cfg.local_cameras[0].width, 320);
    assert_eq!(cfg.remote_cameras.len(), 1);
    assert_eq!(cfg.remote_cameras[0].id, "gate");
    assert_eq!(cfg.remote_cameras[0].descriptor.port, 554);
    assert_eq!(cfg.remote_cameras[0].descriptor.stream_path, "/live");

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
[sampling]
period_ms = 2000

[estimator]
name = "stub"

[[cameras.local]]
id = "hall"
source = "stub://hall"
"#,
    );

    let cfg = CrowdWatchConfig::load_from(Some(file.path())).expect("load toml");
    assert_eq!(cfg.sample_period, Duration::from_millis(2000));
    assert_eq!(cfg.estimator, "stub");
    assert_eq!(cfg.local_cameras[0].id, "hall");
    assert_eq!(cfg.local_cameras[0].width, 640);
    assert_eq!(cfg.alert_policy, AlertPolicy::EveryCritical);
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CROWD_WATCH_PERIOD_MS", "0");
    assert!(CrowdWatchConfig::load_from(None).is_err());
    clear_env();

    std::env::set_var("CROWD_WATCH_CRITICAL_AT", "many");
    assert!(CrowdWatchConfig::load_from(None).is_err());
    clear_env();

    std::env::set_var("CROWD_WATCH_ALERT_POLICY", "sometimes");
    assert!(CrowdWatchConfig::load_from(None).is_err());
    clear_env();

    let file = write_config(
        ".json",
        r#"{ "cameras": { "local": [ { "id": "bad id", "source": "stub://x" } ] } }"#,
    );
    let err = CrowdWatchConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("bad id"));

    let file = write_config(
        ".json",
        r#"{ "cameras": {
            "local": [ { "id": "gate", "source": "stub://gate" } ],
            "remote": [ { "id": "gate", "address": "10.0.0.3", "port": 554 } ]
        } }"#,
    );
    let err = CrowdWatchConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("more than once"));
}
