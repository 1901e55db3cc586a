//! MQTT notification sink.
//!
//! Publishes each notification as JSON to `<topic_prefix>/alerts` (and
//! `<topic_prefix>/<session>/alert` when the notification names a session) at
//! QoS 1. The connection is driven by a background thread, as rumqttc's
//! synchronous client requires.

use anyhow::{anyhow, Result};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, Connection, Event, MqttOptions};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{Notification, NotificationSink};

const DEFAULT_PORT: u16 = 1883;
const DEFAULT_TOPIC_PREFIX: &str = "crowd_watch";
const DEFAULT_CLIENT_ID: &str = "crowd-watchd";
const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MqttSettings {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

impl MqttSettings {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            topic_prefix: default_topic_prefix(),
            client_id: default_client_id(),
            username: None,
            password: None,
        }
    }

    pub fn alerts_topic(&self) -> String {
        format!("{}/alerts", self.topic_prefix.trim_end_matches('/'))
    }

    pub fn session_topic(&self, session_id: &str) -> String {
        format!(
            "{}/{}/alert",
            self.topic_prefix.trim_end_matches('/'),
            sanitize_topic_segment(session_id)
        )
    }
}

pub struct MqttSink {
    settings: MqttSettings,
    client: Client,
    stopping: Arc<AtomicBool>,
    connection_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MqttSink {
    pub fn connect(settings: MqttSettings) -> Result<Self> {
        if settings.host.trim().is_empty() {
            return Err(anyhow!("mqtt host must not be empty"));
        }
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if let Some(user) = settings.username.as_deref() {
            options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
        }

        let (client, connection) = Client::new(options, 10);
        let stopping = Arc::new(AtomicBool::new(false));
        let handle = spawn_connection_driver(connection, stopping.clone())?;
        log::info!(
            "mqtt alerts -> {}:{} ({})",
            settings.host,
            settings.port,
            settings.alerts_topic()
        );
        Ok(Self {
            settings,
            client,
            stopping,
            connection_handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue a publish without blocking; fails when the request queue is full
    /// (broker unreachable for a while).
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(|e| anyhow!("mqtt publish to {} failed: {}", topic, e))
    }
}

impl NotificationSink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn notify(&self, notification: &Notification) -> Result<()> {
        let payload = serde_json::to_vec(notification)?;
        self.publish(&self.settings.alerts_topic(), &payload)?;
        if let Some(session_id) = notification.session_id.as_deref() {
            self.publish(&self.settings.session_topic(session_id), &payload)?;
        }
        Ok(())
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.client.try_disconnect();
        let handle = self
            .connection_handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

/// Drive the event loop for the sink's lifetime. rumqttc reconnects on the next
/// poll after an error, so errors are logged and polling continues until the
/// sink is dropped.
fn spawn_connection_driver(
    mut connection: Connection,
    stopping: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("mqtt-alerts".to_string())
        .spawn(move || {
            let mut connected = false;
            for event in connection.iter() {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
                match event {
                    Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {
                        if !connected {
                            log::info!("MQTT connection established");
                            connected = true;
                        }
                    }
                    Err(e) => {
                        if connected {
                            log::warn!("MQTT connection lost: {}; reconnecting", e);
                        } else {
                            log::debug!("MQTT connection error: {}", e);
                        }
                        connected = false;
                        std::thread::sleep(RECONNECT_BACKOFF);
                    }
                }
            }
        })?;
    Ok(handle)
}

fn sanitize_topic_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '+' | '#' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
