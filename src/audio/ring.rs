//! Loopback ring buffer
//!
//! An unbounded, append-only byte stream with monotonically advancing read
//! and write cursors. The loopback driver thread appends; the audio graph's
//! quantum callback drains. One mutex guards both, held only across a cursor
//! region update, never across a blocking wait.

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct RingInner {
    data: Vec<u8>,
    read_pos: usize,
}

/// Shared PCM byte stream between the loopback producer and the quantum
/// consumer. Invariant: read cursor <= write cursor at all times.
#[derive(Debug, Default)]
pub struct LoopingAudioRing {
    inner: Mutex<RingInner>,
}

impl LoopingAudioRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append captured bytes at the write cursor (end of stream)
    pub fn append(&self, bytes: &[u8]) {
        let mut inner = self.inner.lock();
        inner.data.extend_from_slice(bytes);
    }

    /// Unread bytes between the cursors
    pub fn available(&self) -> usize {
        let inner = self.inner.lock();
        inner.data.len() - inner.read_pos
    }

    /// Read exactly `count` bytes at the read cursor, advancing it.
    ///
    /// Reading past the write cursor is not an error but a "not enough data
    /// yet" condition: the cursor does not move and `None` is returned.
    pub fn read_exact(&self, count: usize) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        if inner.data.len() - inner.read_pos < count {
            return None;
        }
        let start = inner.read_pos;
        let bytes = inner.data[start..start + count].to_vec();
        inner.read_pos += count;
        Some(bytes)
    }

    /// Current read cursor
    pub fn read_position(&self) -> usize {
        self.inner.lock().read_pos
    }

    /// Current write cursor (total bytes ever appended)
    pub fn write_position(&self) -> usize {
        self.inner.lock().data.len()
    }
}
