//! Remote camera backend client.
//!
//! Remote sessions are run by a network service; this engine only controls them.
//! All operations live under one base URL:
//!
//! - `POST {base}/start`        `{id, username, password, address, port, streamPath}`
//! - `POST {base}/stop`         `{id}`
//! - `GET  {base}/status/{id}`  `{success, count, status, running}`
//! - `GET  {base}/frame/{id}`   `{success, image (base64), count, status}`
//! - `{base}/stream/{id}`       continuous video, address only
//!
//! No timeout is imposed by the protocol; `HttpCameraBackend` applies the one
//! it was built with.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::detect::SafetyStatus;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000/api/camera";
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection details for a network camera.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteDescriptor {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub stream_path: String,
}

impl std::fmt::Debug for RemoteDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDescriptor")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("stream_path", &self.stream_path)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub id: String,
    pub username: String,
    pub password: String,
    pub address: String,
    pub port: u16,
    pub stream_path: String,
}

impl StartRequest {
    pub fn new(id: &str, descriptor: &RemoteDescriptor) -> Self {
        Self {
            id: id.to_string(),
            username: descriptor.username.clone(),
            password: descriptor.password.clone(),
            address: descriptor.address.clone(),
            port: descriptor.port,
            stream_path: descriptor.stream_path.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StopRequest {
    pub id: String,
}

/// Reply to start/stop.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CommandReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct StatusReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub status: SafetyStatus,
    #[serde(default)]
    pub running: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct FrameReply {
    #[serde(default)]
    pub success: bool,
    /// Base64 image, optionally as a `data:` URL.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub status: SafetyStatus,
}

impl FrameReply {
    pub fn decode_image(&self) -> Result<Vec<u8>> {
        let encoded = self
            .image
            .as_deref()
            .ok_or_else(|| anyhow!("frame reply carries no image"))?;
        decode_base64_image(encoded)
    }
}

/// Decode a base64 image, accepting a `data:<mime>;base64,` prefix.
pub fn decode_base64_image(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    STANDARD
        .decode(payload.trim())
        .context("decode base64 frame image")
}

/// Control-plane client for remote camera sessions.
pub trait CameraBackend: Send + Sync {
    fn start(&self, request: &StartRequest) -> Result<CommandReply>;

    fn stop(&self, id: &str) -> Result<CommandReply>;

    fn status(&self, id: &str) -> Result<StatusReply>;

    fn frame(&self, id: &str) -> Result<FrameReply>;

    /// Address for continuously consuming a session's video. Pure; no network call.
    fn stream_address(&self, id: &str) -> String;
}

/// `CameraBackend` over HTTP/JSON.
pub struct HttpCameraBackend {
    base: Url,
    agent: ureq::Agent,
}

impl HttpCameraBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("parse camera backend url '{}'", base_url))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!(
                "camera backend url '{}' must be an http(s) base url",
                base_url
            ));
        }
        Ok(Self {
            base,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, url: Url, body: &B) -> Result<T> {
        let payload = serde_json::to_string(body)?;
        let response = self
            .agent
            .post(url.as_str())
            .set("Content-Type", "application/json")
            .send_string(&payload);
        read_json(response, &url)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.agent.get(url.as_str()).call();
        read_json(response, &url)
    }
}

/// Parse a JSON body, including from non-2xx responses that carry one.
fn read_json<T: DeserializeOwned>(
    response: std::result::Result<ureq::Response, ureq::Error>,
    url: &Url,
) -> Result<T> {
    let response = match response {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            log::debug!("{} answered HTTP {}", url, code);
            response
        }
        Err(e) => return Err(anyhow!("request to {} failed: {}", url, e)),
    };
    let body = response
        .into_string()
        .with_context(|| format!("read response from {}", url))?;
    serde_json::from_str(&body).with_context(|| format!("invalid JSON from {}", url))
}

impl CameraBackend for HttpCameraBackend {
    fn start(&self, request: &StartRequest) -> Result<CommandReply> {
        self.post_json(self.endpoint(&["start"]), request)
    }

    fn stop(&self, id: &str) -> Result<CommandReply> {
        self.post_json(
            self.endpoint(&["stop"]),
            &StopRequest { id: id.to_string() },
        )
    }

    fn status(&self, id: &str) -> Result<StatusReply> {
        self.get_json(self.endpoint(&["status", id]))
    }

    fn frame(&self, id: &str) -> Result<FrameReply> {
        self.get_json(self.endpoint(&["frame", id]))
    }

    fn stream_address(&self, id: &str) -> String {
        self.endpoint(&["stream", id]).to_string()
    }
}
