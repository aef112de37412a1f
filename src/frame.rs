//! Captured frame container.
//!
//! Frames carry RGB24 pixels plus dimensions and a per-stream sequence
//! number. A frame is owned by the capture loop for exactly one iteration:
//! detectors borrow it, and it is dropped before the next read.

use anyhow::{anyhow, Result};
use std::time::Instant;

/// Bytes per RGB24 pixel.
pub const RGB_CHANNELS: u32 = 3;

pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// 1-based position of this frame within its stream.
    pub sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Wrap RGB24 pixels. The buffer length must match the dimensions.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    /// Black frame of the given size.
    pub fn blank(width: u32, height: u32, sequence: u64) -> Result<Self> {
        Self::new(vec![0u8; rgb_len(width, height)?], width, height, sequence)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn channels(&self) -> u32 {
        RGB_CHANNELS
    }

    /// Milliseconds since capture, for latency logging.
    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }
}

impl std::fmt::Debug for Frame {
    // Pixel content is never printed.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish()
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}
