//! Decoded video frames.
//!
//! - `Frame`: packed RGB8 pixels plus dimensions, as handed over by a `FrameSource`.
//! - Luma helpers used by occupancy estimators.
//! - JPEG encode/decode for snapshots.
//!
//! A frame is "drawable" when it has a positive area and enough bytes to cover it.
//! Estimators must treat an undrawable frame as empty rather than failing.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, GenericImageView};

/// Default JPEG quality for snapshots.
pub const SNAPSHOT_JPEG_QUALITY: u8 = 70;

const BYTES_PER_PIXEL: usize = 3;

/// Perceptual luma of one RGB pixel, normalized to [0, 1].
pub fn luma(r: u8, g: u8, b: u8) -> f64 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) / 255.0
}

/// Axis-aligned pixel rectangle, `x1`/`y1` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn area(&self) -> u64 {
        self.x1.saturating_sub(self.x0) as u64 * self.y1.saturating_sub(self.y0) as u64
    }
}

/// One decoded frame in packed RGB8 layout.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Solid-colour frame, mostly useful for synthetic sources and tests.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::from_rgb(data, width, height)
    }

    /// Decode a JPEG (or any format `image` was built with) into RGB8.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode frame image")?;
        let (width, height) = image.dimensions();
        let rgb = image.into_rgb8();
        Ok(Self::from_rgb(rgb.into_raw(), width, height))
    }

    pub fn rgb(&self) -> &[u8] {
        &self.data
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// True when the frame has a positive area backed by enough pixel bytes.
    pub fn is_drawable(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() >= self.expected_len()
    }

    /// Mean luma over `rect`, clamped to the frame. Empty or undrawable areas read as 0.
    pub fn mean_luma(&self, rect: Rect) -> f64 {
        if !self.is_drawable() {
            return 0.0;
        }
        let clamped = Rect::new(
            rect.x0.min(self.width),
            rect.y0.min(self.height),
            rect.x1.min(self.width),
            rect.y1.min(self.height),
        );
        let area = clamped.area();
        if area == 0 {
            return 0.0;
        }

        let stride = self.width as usize * BYTES_PER_PIXEL;
        let mut sum = 0.0;
        for y in clamped.y0..clamped.y1 {
            let row = y as usize * stride;
            let start = row + clamped.x0 as usize * BYTES_PER_PIXEL;
            let end = row + clamped.x1 as usize * BYTES_PER_PIXEL;
            for px in self.data[start..end].chunks_exact(BYTES_PER_PIXEL) {
                sum += luma(px[0], px[1], px[2]);
            }
        }
        sum / area as f64
    }

    /// Encode the frame as JPEG for audit/display snapshots.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        if !self.is_drawable() {
            return Err(anyhow!(
                "cannot encode undrawable frame ({}x{}, {} bytes)",
                self.width,
                self.height,
                self.data.len()
            ));
        }
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode(
                &self.data[..self.expected_len()],
                self.width,
                self.height,
                ExtendedColorType::Rgb8,
            )
            .context("encode jpeg snapshot")?;
        Ok(out)
    }

    fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

impl std::fmt::Debug for Frame {
    // Pixel bytes are deliberately left out of debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luma_is_normalized() {
        assert_eq!(luma(0, 0, 0), 0.0);
        assert!((luma(255, 255, 255) - 1.0).abs() < 1e-9);
        assert!((luma(255, 0, 0) - 0.299).abs() < 1e-9);
    }

    #[test]
    fn empty_frames_are_not_drawable() {
        assert!(!Frame::from_rgb(vec![], 0, 0).is_drawable());
        assert!(!Frame::from_rgb(vec![0; 5], 2, 1).is_drawable());
        assert!(Frame::solid(2, 1, [10, 10, 10]).is_drawable());
    }

    #[test]
    fn mean_luma_covers_only_the_requested_rect() {
        // Left half black, right half white.
        let mut data = Vec::new();
        for _y in 0..2 {
            data.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
            data.extend_from_slice(&[255, 255, 255, 255, 255, 255]);
        }
        let frame = Frame::from_rgb(data, 4, 2);

        assert_eq!(frame.mean_luma(Rect::new(0, 0, 2, 2)), 0.0);
        assert!((frame.mean_luma(Rect::new(2, 0, 4, 2)) - 1.0).abs() < 1e-9);
        assert!((frame.mean_luma(frame.bounds()) - 0.5).abs() < 1e-9);
        assert_eq!(frame.mean_luma(Rect::new(1, 1, 1, 2)), 0.0);
    }

    #[test]
    fn snapshot_round_trips_through_jpeg() -> Result<()> {
        let frame = Frame::solid(16, 8, [200, 200, 200]);
        let jpeg = frame.encode_jpeg(SNAPSHOT_JPEG_QUALITY)?;
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = Frame::decode(&jpeg)?;
        assert_eq!((decoded.width, decoded.height), (16, 8));
        Ok(())
    }

    #[test]
    fn undrawable_frame_refuses_to_encode() {
        assert!(Frame::from_rgb(vec![], 0, 0).encode_jpeg(80).is_err());
    }
}
