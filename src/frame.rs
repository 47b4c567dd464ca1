//! Camera frames.
//!
//! Capture itself is an external collaborator. This module defines the frame
//! hand-off type and a synthetic `stub://` source used for headless runs and
//! tests. Frames are ephemeral: the monitor hands them to the detector and
//! drops them.

use anyhow::{bail, Result};

use crate::geometry::FrameSize;

/// One captured frame, already resized to the monitor's frame size.
pub struct Frame {
    /// Monotonic frame counter assigned by the source.
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(index: u64, size: FrameSize, pixels: Vec<u8>) -> Self {
        Self {
            index,
            width: size.width,
            height: size.height,
            pixels,
        }
    }

    /// Black RGB frame.
    pub fn blank(index: u64, size: FrameSize) -> Self {
        let len = size.width as usize * size.height as usize * 3;
        Self::new(index, size, vec![0u8; len])
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// Packed RGB bytes, row major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Anything that yields frames. A read error is transient: callers report it
/// and try again on the next tick.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame>;

    /// Human-readable source description for status lines.
    fn describe(&self) -> String;
}

/// Camera selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    /// Source URL; only `stub://` is built in.
    pub source: String,
    /// Device index, reported in status text.
    pub index: u32,
    pub frame: FrameSize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: "stub://depot".to_string(),
            index: 0,
            frame: FrameSize::new(960, 540),
        }
    }
}

/// Opens the configured source.
pub fn open_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    if config.source.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config.clone())));
    }
    bail!(
        "no capture backend for camera source '{}' (only stub:// is built in)",
        config.source
    )
}

/// Synthetic source for `stub://` URLs: flat frames of the configured size.
pub struct SyntheticSource {
    config: CameraConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: CameraConfig) -> Self {
        log::info!(
            "camera {}: using synthetic source {}",
            config.index,
            config.source
        );
        Self {
            config,
            frame_count: 0,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Frame> {
        let frame = Frame::blank(self.frame_count, self.config.frame);
        self.frame_count += 1;
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("camera {} ({})", self.config.index, self.config.source)
    }
}
