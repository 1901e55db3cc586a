//! Frame sources for local camera sessions.
//!
//! A `FrameSource` is a live video handle owned by exactly one sampler:
//! - `acquire` opens the device / requests access (may fail, e.g. permission denied)
//! - `is_ready` reports whether a decodable, positive-area frame is available
//! - `read_frame` returns the current frame as RGB pixels
//! - `release` gives the handle back; it must be safe to call more than once
//!
//! Available sources:
//! - `stub://<name>`: synthetic frames (tests, demos)
//! - `http(s)://...`: single-JPEG snapshot endpoint polled per read

mod http;
mod synthetic;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use http::HttpSnapshotSource;
pub use synthetic::{SyntheticConfig, SyntheticScene, SyntheticSource};

/// A live video handle supplying decoded frames on demand.
pub trait FrameSource: Send {
    /// Human-readable source description for logs.
    fn describe(&self) -> String;

    /// Acquire the underlying device or stream.
    fn acquire(&mut self) -> Result<()>;

    /// Release the handle. Idempotent.
    fn release(&mut self);

    /// True when a frame with positive area can be read right now.
    fn is_ready(&self) -> bool;

    /// Read the current frame.
    fn read_frame(&mut self) -> Result<Frame>;
}

/// Open a frame source by URL scheme.
pub fn open_source(url: &str, width: u32, height: u32) -> Result<Box<dyn FrameSource>> {
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            url: url.to_string(),
            width,
            height,
            ..SyntheticConfig::default()
        })));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Box::new(HttpSnapshotSource::new(url)?));
    }
    Err(anyhow!(
        "unsupported frame source '{}'; expected stub:// or http(s)://",
        url
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_source_selects_by_scheme() -> Result<()> {
        let stub = open_source("stub://gate", 32, 24)?;
        assert!(stub.describe().contains("stub://gate"));

        let http = open_source("http://127.0.0.1:81/capture", 32, 24)?;
        assert!(http.describe().contains("127.0.0.1"));

        assert!(open_source("rtsp://camera/stream", 32, 24).is_err());
        Ok(())
    }
}
