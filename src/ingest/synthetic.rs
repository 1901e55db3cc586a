use anyhow::{anyhow, Result};

use super::FrameSource;
use crate::frame::Frame;

/// What a synthetic source paints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyntheticScene {
    /// Moving diagonal gradient; mean luma hovers around 0.5.
    Gradient,
    /// Uniform colour.
    Solid([u8; 3]),
}

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub scene: SyntheticScene,
    /// Number of readiness polls that report "not ready" after acquisition.
    pub warmup_polls: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 64,
            height: 48,
            scene: SyntheticScene::Gradient,
            warmup_polls: 0,
        }
    }
}

/// Synthetic `stub://` source.
pub struct SyntheticSource {
    config: SyntheticConfig,
    acquired: bool,
    warmup_left: std::cell::Cell<u32>,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let warmup = config.warmup_polls;
        Self {
            config,
            acquired: false,
            warmup_left: std::cell::Cell::new(warmup),
            frame_count: 0,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn paint(&self) -> Frame {
        let SyntheticConfig { width, height, .. } = self.config;
        match self.config.scene {
            SyntheticScene::Solid(rgb) => Frame::solid(width, height, rgb),
            SyntheticScene::Gradient => {
                let mut pixels = vec![0u8; width as usize * height as usize * 3];
                for (i, pixel) in pixels.iter_mut().enumerate() {
                    *pixel = ((i as u64 / 3 + self.frame_count) % 256) as u8;
                }
                Frame::from_rgb(pixels, width, height)
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("{} (synthetic)", self.config.url)
    }

    fn acquire(&mut self) -> Result<()> {
        self.acquired = true;
        self.warmup_left.set(self.config.warmup_polls);
        log::info!("SyntheticSource: acquired {}", self.config.url);
        Ok(())
    }

    fn release(&mut self) {
        if self.acquired {
            log::info!("SyntheticSource: released {}", self.config.url);
        }
        self.acquired = false;
    }

    fn is_ready(&self) -> bool {
        if !self.acquired || self.config.width == 0 || self.config.height == 0 {
            return false;
        }
        let left = self.warmup_left.get();
        if left > 0 {
            self.warmup_left.set(left - 1);
            return false;
        }
        true
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if !self.acquired {
            return Err(anyhow!("{} read before acquire", self.config.url));
        }
        self.frame_count += 1;
        Ok(self.paint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_requires_acquire() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig::default());
        assert!(!source.is_ready());
        assert!(source.read_frame().is_err());

        source.acquire()?;
        assert!(source.is_ready());
        let frame = source.read_frame()?;
        assert_eq!((frame.width, frame.height), (64, 48));
        assert!(frame.is_drawable());

        source.release();
        source.release();
        assert!(!source.is_ready());
        Ok(())
    }

    #[test]
    fn warmup_polls_delay_readiness() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            warmup_polls: 2,
            ..SyntheticConfig::default()
        });
        source.acquire()?;
        assert!(!source.is_ready());
        assert!(!source.is_ready());
        assert!(source.is_ready());
        Ok(())
    }

    #[test]
    fn zero_sized_source_is_never_ready() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 0,
            ..SyntheticConfig::default()
        });
        source.acquire()?;
        assert!(!source.is_ready());
        Ok(())
    }
}
