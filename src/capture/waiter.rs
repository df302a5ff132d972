//! Blocking frame waiter over a capture session
//!
//! Dual wait on "frame arrived" vs "session closed"; whichever fires first is
//! served. A closed signal is the designed termination path, not an error.

use super::{CaptureSession, PoolFrame};
use crate::error::Result;
use crate::gpu::GpuDevice;
use crate::types::{Resolution, Surface, SurfaceWithInfo};

use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;

/// Cloneable handle that injects the closed signal from another thread.
///
/// There is no mid-wait cancellation token; this is the only way to unblock a
/// pending `wait_for_new_frame` besides a real frame or source closure.
#[derive(Clone)]
pub struct CloseSignal {
    tx: Sender<()>,
}

impl CloseSignal {
    pub fn close(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Wraps a capture session and blocks until the next frame or closure.
///
/// Each arriving frame is copied into a fresh owned texture the size of the
/// initial capture dimensions, so the pool buffer can be recycled immediately
/// and mid-session resolution changes are absorbed rather than propagated.
pub struct FrameWaiter {
    device: Arc<dyn GpuDevice>,
    session: Option<Box<dyn CaptureSession>>,
    frame_rx: Receiver<()>,
    closed_rx: Receiver<()>,
    closed_tx: Sender<()>,
    canvas: Option<Surface>,
    released: bool,
}

impl FrameWaiter {
    /// Build the waiter, allocate the blank canvas and start the session.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        mut session: Box<dyn CaptureSession>,
        size: Resolution,
    ) -> Result<Self> {
        device.set_multithread_protected(true);

        let canvas = {
            let _guard = device.lock_multithread();
            device.create_blank_texture(size)?
        };

        // Depth-1 pool: one buffered frame signal is enough
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<()>(1);
        let (closed_tx, closed_rx) = crossbeam_channel::bounded::<()>(1);
        session.start(frame_tx, closed_tx.clone())?;

        Ok(Self {
            device,
            session: Some(session),
            frame_rx,
            closed_rx,
            closed_tx,
            canvas: Some(canvas),
            released: false,
        })
    }

    /// Handle for injecting the closed signal during teardown
    pub fn close_signal(&self) -> CloseSignal {
        CloseSignal {
            tx: self.closed_tx.clone(),
        }
    }

    /// Block until the next frame or the closed signal.
    ///
    /// Returns `Ok(None)` exactly once when the session closes, after which
    /// the waiter is fully released and keeps returning `Ok(None)`.
    /// Device-lost and copy failures propagate as hard faults; the caller
    /// must tear down the whole encode.
    pub fn wait_for_new_frame(&mut self) -> Result<Option<SurfaceWithInfo>> {
        if self.released {
            return Ok(None);
        }

        loop {
            // Closed wins when both signals are pending
            if self.closed_rx.try_recv().is_ok() {
                self.cleanup();
                return Ok(None);
            }

            let frame_signaled = crossbeam_channel::select! {
                recv(self.closed_rx) -> _ => false,
                recv(self.frame_rx) -> msg => msg.is_ok(),
            };
            if !frame_signaled {
                // Closed signal, or every sender dropped
                self.cleanup();
                return Ok(None);
            }

            let frame = match self.session.as_mut().and_then(|s| s.try_get_next_frame()) {
                Some(frame) => frame,
                // Signal raced a pool recycle; wait for the next one
                None => continue,
            };

            return self.copy_out(frame).map(Some);
        }
    }

    /// Copy the pooled frame's content region onto a duplicate of the blank
    /// canvas, clamped so a resized source never reads out of bounds.
    fn copy_out(&mut self, frame: PoolFrame) -> Result<SurfaceWithInfo> {
        let canvas = self
            .canvas
            .as_ref()
            .expect("canvas alive while not released");

        let region = frame
            .content_size
            .clamped_to(frame.surface.size)
            .clamped_to(canvas.size);

        let _guard = self.device.lock_multithread();
        let mut copy = self.device.duplicate_texture(canvas)?;
        self.device.copy_region(&mut copy, &frame.surface, region)?;

        Ok(SurfaceWithInfo {
            surface: copy,
            system_relative_time: frame.system_relative_time,
        })
    }

    /// Release the session (unsubscribing its signals), the canvas and any
    /// device handles. Idempotent.
    fn cleanup(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // Dropping the session is the scoped unsubscribe of both signals
        self.session = None;
        self.canvas = None;
        tracing::debug!("frame waiter released");
    }

    /// Inject the closed signal and release. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        let _ = self.closed_tx.try_send(());
        self.cleanup();
    }
}

impl Drop for FrameWaiter {
    fn drop(&mut self) {
        self.dispose();
    }
}
