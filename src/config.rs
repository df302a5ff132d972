//! Configuration types for duetrec
//!
//! The engine itself only ever sees resolved numeric parameters; this module
//! is where a control surface resolves user settings into them.

use crate::error::{Error, Result};
use crate::types::Resolution;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Resolved video encoding parameters handed to the transcoder
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VideoParams {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Target bitrate in bits per second
    pub bitrate_bps: u32,
    /// Target frame rate (frames per second, integral)
    pub frame_rate: u32,
    /// Encode at the capture source's own size instead of width/height
    pub use_source_size: bool,
}

impl Default for VideoParams {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            bitrate_bps: 18_000_000,
            frame_rate: 60,
            use_source_size: true,
        }
    }
}

impl VideoParams {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Audio engine parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioParams {
    /// Graph sample rate in Hz
    pub sample_rate: u32,
    /// Channel count of the mixed output
    pub channels: u32,
    /// Audio bitrate in bits per second
    pub bitrate_bps: u32,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            bitrate_bps: 192_000,
        }
    }
}

/// Bounded retry for transient audio underrun.
///
/// The 5 x 10ms default matches the reference behavior; it is a compatibility
/// value, not a correctness requirement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts before yielding a null sample
    pub attempts: u32,
    /// Delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay_ms: 10,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Top-level recording configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingConfig {
    #[serde(default)]
    pub video: VideoParams,
    #[serde(default)]
    pub audio: AudioParams,
    #[serde(default)]
    pub underrun_retry: RetryPolicy,
}

impl RecordingConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.video.width = width;
        self.video.height = height;
        self.video.use_source_size = false;
        self
    }

    pub fn with_bitrate_bps(mut self, bitrate: u32) -> Self {
        self.video.bitrate_bps = bitrate;
        self
    }

    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.video.frame_rate = fps;
        self
    }

    pub fn with_underrun_retry(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.underrun_retry = RetryPolicy { attempts, delay_ms };
        self
    }

    /// Validate resolved parameters before a session starts
    pub fn validate(&self) -> Result<()> {
        if !self.video.use_source_size && (self.video.width == 0 || self.video.height == 0) {
            return Err(Error::Config("video resolution must be non-zero".into()));
        }
        if self.video.frame_rate == 0 {
            return Err(Error::Config("frame rate must be non-zero".into()));
        }
        if self.audio.sample_rate == 0 || self.audio.channels == 0 {
            return Err(Error::Config("audio format must be non-zero".into()));
        }
        Ok(())
    }
}
