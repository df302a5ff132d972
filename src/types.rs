//! Common types used throughout duetrec

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Bytes per pixel of the fixed capture pixel format (B8G8R8A8).
pub const BYTES_PER_PIXEL: usize = 4;

/// Capture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    // Common resolutions
    pub const HD_720P: Self = Self::new(1280, 720);
    pub const FHD_1080P: Self = Self::new(1920, 1080);
    pub const QHD_1440P: Self = Self::new(2560, 1440);

    /// Total pixels
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Byte size of a tightly packed BGRA surface at this resolution
    pub fn byte_size(&self) -> usize {
        self.pixels() as usize * BYTES_PER_PIXEL
    }

    /// Component-wise minimum, used to clamp copy regions
    pub fn clamped_to(&self, other: Resolution) -> Resolution {
        Resolution::new(self.width.min(other.width), self.height.min(other.height))
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::FHD_1080P
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An owned GPU surface: a stable BGRA pixel buffer detached from any capture
/// pool, safe to hold across pool recycling.
#[derive(Debug, Clone)]
pub struct Surface {
    /// Raw BGRA pixel data, `stride * height` bytes
    pub data: Vec<u8>,
    /// Surface dimensions
    pub size: Resolution,
    /// Row stride in bytes
    pub stride: u32,
}

impl Surface {
    /// Allocate a surface cleared to opaque black
    pub fn blank(size: Resolution) -> Self {
        let stride = size.width as usize * BYTES_PER_PIXEL;
        let mut data = vec![0u8; stride * size.height as usize];
        // Alpha channel opaque
        for px in data.chunks_exact_mut(BYTES_PER_PIXEL) {
            px[3] = 0xFF;
        }
        Self {
            data,
            size,
            stride: stride as u32,
        }
    }

    /// Size in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// An owned surface tagged with its capture timestamp.
///
/// Produced by the frame waiter; ownership transfers to the caller of
/// `wait_for_new_frame` and the surface is released when this value drops.
#[derive(Debug)]
pub struct SurfaceWithInfo {
    pub surface: Surface,
    /// Monotonic system-relative capture time
    pub system_relative_time: Duration,
}

/// Stream identity used by the transcoder's pull requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
        }
    }
}

/// Payload of a media sample
#[derive(Debug)]
pub enum SampleData {
    /// Uncompressed video surface
    Surface(Surface),
    /// PCM audio bytes
    Buffer(Vec<u8>),
}

impl SampleData {
    pub fn size_bytes(&self) -> usize {
        match self {
            SampleData::Surface(s) => s.size_bytes(),
            SampleData::Buffer(b) => b.len(),
        }
    }
}

/// A timestamped sample handed to the transcoder in answer to one pull
#[derive(Debug)]
pub struct MediaSample {
    pub data: SampleData,
    /// Timestamp relative to the session timeline origin
    pub timestamp: Duration,
    /// Sample duration, zero when the transcoder infers it
    pub duration: Duration,
    /// Key-frame flag (trivially true for audio)
    pub key_frame: bool,
}

/// Statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// Video frames pumped
    pub video_samples: u64,
    /// Audio samples pumped
    pub audio_samples: u64,
    /// Audio pulls answered with a null sample after retry exhaustion
    pub audio_underruns: u64,
    /// Total sample bytes handed to the transcoder
    pub bytes_pumped: u64,
}

/// Monotonic system-relative time from a process-wide high-resolution epoch.
///
/// All capture-side timestamps (video frame times, audio frame stamps) come
/// from this one counter so they are directly comparable.
pub fn system_relative_time() -> Duration {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_surface_is_opaque_black() {
        let s = Surface::blank(Resolution::new(4, 2));
        assert_eq!(s.size_bytes(), 4 * 2 * BYTES_PER_PIXEL);
        for px in s.data.chunks_exact(BYTES_PER_PIXEL) {
            assert_eq!(px, &[0, 0, 0, 0xFF]);
        }
    }

    #[test]
    fn test_clamped_resolution() {
        let content = Resolution::new(2000, 900);
        let surface = Resolution::new(1920, 1080);
        assert_eq!(content.clamped_to(surface), Resolution::new(1920, 900));
    }

    #[test]
    fn test_system_relative_time_is_monotonic() {
        let a = system_relative_time();
        let b = system_relative_time();
        assert!(b >= a);
    }
}
