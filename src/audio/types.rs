//! Audio types

use crate::error::{Error, Result};
use std::time::Duration;

/// Bytes per PCM sample (32-bit float, the graph's native format)
pub const BYTES_PER_SAMPLE: usize = 4;

/// Opaque PCM buffer reached only through a lock-copy-unlock accessor.
///
/// Native audio buffers sit behind a raw-pointer FFI boundary; this wrapper
/// keeps that boundary inside one helper and never exposes the storage
/// directly. A buffer released by its producer mid-frame reads as unreadable.
#[derive(Debug)]
pub struct AudioBuffer {
    bytes: Option<Vec<u8>>,
}

impl AudioBuffer {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes: Some(bytes) }
    }

    /// A buffer whose backing storage is gone; every access fails
    pub fn unreadable() -> Self {
        Self { bytes: None }
    }

    /// Lock the buffer for read, run `f` over the bytes, unlock.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        match &self.bytes {
            Some(bytes) => Ok(f(bytes)),
            None => Err(Error::AudioBuffer("backing storage released".into())),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.as_ref().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One PCM frame produced by the audio graph.
///
/// `relative_time` is the graph transport position; `system_relative_time`
/// is stamped by the capture engine from the shared high-resolution counter.
/// Consumed exactly once by the pump, which converts it to a byte buffer and
/// releases the frame.
#[derive(Debug)]
pub struct AudioFrame {
    pub buffer: AudioBuffer,
    /// Graph transport time of the first sample
    pub relative_time: Option<Duration>,
    /// Engine-stamped monotonic time
    pub system_relative_time: Option<Duration>,
    /// Frame duration; zero or absent means "no data this quantum"
    pub duration: Option<Duration>,
}

impl AudioFrame {
    /// Wrap raw PCM bytes, deriving the duration from the format
    pub fn from_pcm(bytes: Vec<u8>, sample_rate: u32, channels: u32) -> Self {
        let samples = bytes.len() / (channels as usize * BYTES_PER_SAMPLE);
        let duration = Duration::from_nanos(samples as u64 * 1_000_000_000 / sample_rate as u64);
        Self {
            buffer: AudioBuffer::from_bytes(bytes),
            relative_time: None,
            system_relative_time: None,
            duration: Some(duration),
        }
    }

    /// An empty frame signalling "no data this quantum"
    pub fn empty() -> Self {
        Self {
            buffer: AudioBuffer::from_bytes(Vec::new()),
            relative_time: None,
            system_relative_time: None,
            duration: Some(Duration::ZERO),
        }
    }

    /// True when the frame carries playable data
    pub fn has_data(&self) -> bool {
        self.duration.unwrap_or_default() > Duration::ZERO
    }
}
