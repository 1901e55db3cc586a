//! HTTP snapshot source.
//!
//! Polls a camera endpoint that returns one JPEG per GET (ESP32-CAM `/capture`,
//! most IP cameras' `snapshot.jpg`). Decoding happens in memory.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;

use url::Url;

use super::FrameSource;
use crate::frame::Frame;

const MAX_JPEG_BYTES: u64 = 5 * 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpSnapshotSource {
    url: Url,
    agent: ureq::Agent,
    acquired: bool,
    frames_captured: u64,
}

impl HttpSnapshotSource {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).context("parse snapshot url")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported snapshot scheme '{}'; expected http(s)",
                url.scheme()
            ));
        }
        Ok(Self {
            url,
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            acquired: false,
            frames_captured: 0,
        })
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    fn fetch_jpeg(&self) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(self.url.as_str())
            .call()
            .with_context(|| format!("fetch jpeg snapshot from {}", self.url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES)
            .read_to_end(&mut bytes)
            .context("read jpeg snapshot")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty jpeg snapshot"));
        }
        Ok(bytes)
    }
}

impl FrameSource for HttpSnapshotSource {
    fn describe(&self) -> String {
        self.url.to_string()
    }

    /// Acquisition is a probe request: the camera must answer with a decodable image.
    fn acquire(&mut self) -> Result<()> {
        let probe = self.fetch_jpeg().context("snapshot camera unavailable")?;
        Frame::decode(&probe).context("snapshot camera returned an undecodable image")?;
        self.acquired = true;
        log::info!("HttpSnapshotSource: acquired {}", self.url);
        Ok(())
    }

    fn release(&mut self) {
        self.acquired = false;
    }

    fn is_ready(&self) -> bool {
        self.acquired
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if !self.acquired {
            return Err(anyhow!("{} read before acquire", self.url));
        }
        let jpeg = self.fetch_jpeg()?;
        let frame = Frame::decode(&jpeg)?;
        self.frames_captured += 1;
        Ok(frame)
    }
}
