//! Screen capture module
//!
//! The OS capture session and its depth-1 frame pool are external
//! collaborators behind [`CaptureSession`]; this module owns the blocking
//! frame waiter that turns their push signals into pull semantics.

mod waiter;

pub use waiter::{CloseSignal, FrameWaiter};

use crate::error::Result;
use crate::types::{Resolution, Surface};

use crossbeam_channel::Sender;
use std::time::Duration;

/// A frame served by the capture pool.
///
/// The pool retains only the single most recent frame; the surface here is
/// pool-owned storage and must be copied into an owned texture before the
/// next frame overwrites it.
#[derive(Debug)]
pub struct PoolFrame {
    pub surface: Surface,
    /// Size of the valid content, which may differ from the surface size
    /// after a mid-session resize of the capture target
    pub content_size: Resolution,
    /// Monotonic system-relative capture time
    pub system_relative_time: Duration,
}

/// Trait for capture session providers.
///
/// `start` hands the session two signal senders: one fired per frame arrival,
/// one fired once when the capture source closes. Dropping the session is the
/// scoped release that unsubscribes both.
pub trait CaptureSession: Send {
    /// Initial capture dimensions of the target
    fn size(&self) -> Resolution;

    /// Begin capture, delivering signals on the given senders
    fn start(&mut self, frame_signal: Sender<()>, closed_signal: Sender<()>) -> Result<()>;

    /// Take the most recent pooled frame, if one is buffered
    fn try_get_next_frame(&mut self) -> Option<PoolFrame>;
}
