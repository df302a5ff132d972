//! Shared timeline origin
//!
//! Video and audio start on different physical clocks; the coordinator
//! captures one zero-point at stream start and re-bases every outward
//! timestamp against it so both streams carry comparable relative times.

use crate::error::{Error, Result};
use std::time::Duration;

/// Establish-once origin for one recording session
#[derive(Debug, Default)]
pub struct TimelineCoordinator {
    origin: Option<Duration>,
}

impl TimelineCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the origin from the first video frame's timestamp plus the first
    /// audio frame's relative time, when an audio engine is active.
    ///
    /// The origin is set at most once per session; a second call is an error.
    pub fn establish(
        &mut self,
        video_origin: Duration,
        audio_origin: Option<Duration>,
    ) -> Result<Duration> {
        if self.origin.is_some() {
            return Err(Error::TimelineAlreadyEstablished);
        }
        let origin = video_origin + audio_origin.unwrap_or_default();
        self.origin = Some(origin);
        tracing::debug!(?origin, "timeline origin established");
        Ok(origin)
    }

    pub fn is_established(&self) -> bool {
        self.origin.is_some()
    }

    pub fn origin(&self) -> Option<Duration> {
        self.origin
    }

    /// Re-base a raw timestamp onto the session timeline.
    ///
    /// Saturates at zero: a raw stamp taken just before the origin (the first
    /// audio quantum can predate the first video frame) maps to t=0 rather
    /// than wrapping.
    pub fn rebase(&self, raw: Duration) -> Duration {
        raw.saturating_sub(self.origin.unwrap_or_default())
    }
}
