//! duetrec — synchronized screen + audio recording engine
//!
//! Capture-side plumbing for a pull-based recorder: a blocking frame waiter
//! over a depth-1 capture pool, a mixed-graph audio engine (system loopback,
//! microphone, silence keep-alive) and a sample pump that answers the
//! transcoder's alternating video/audio pulls on one shared timeline.
//!
//! The OS capture session, audio graph and loopback device are external
//! collaborators behind traits; the crate ships synthetic in-process
//! implementations for demos and tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use duetrec::gpu::SoftwareDevice;
//! use duetrec::synthetic::{SyntheticCaptureSession, SyntheticGraphProvider, SyntheticLoopback};
//! use duetrec::{FileSink, RecordingConfig, RecordingSession, Resolution};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> duetrec::Result<()> {
//!     let device = Arc::new(SoftwareDevice::new());
//!     let loopback = SyntheticLoopback::constant(0.2, 3840, Duration::from_millis(1));
//!     let mut session =
//!         RecordingSession::new(device, RecordingConfig::default(), Box::new(loopback))?;
//!
//!     let capture = SyntheticCaptureSession::new(Resolution::FHD_1080P, 300, 60);
//!     let mut sink = FileSink::create("out.drec")?;
//!     let stats = session
//!         .record(Box::new(capture), &SyntheticGraphProvider::new(), &mut sink)
//!         .await?;
//!     println!("pumped {} video samples", stats.video_samples);
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod gpu;
pub mod pump;
pub mod synthetic;
pub mod timeline;
pub mod transcode;
pub mod types;

// Re-exports for convenience
pub use audio::{AudioCaptureEngine, EngineState};
pub use capture::{CaptureSession, CloseSignal, FrameWaiter};
pub use config::{AudioParams, RecordingConfig, RetryPolicy, VideoParams};
pub use error::{Error, Result};
pub use pump::{MicControl, RecordingSession, SamplePump};
pub use timeline::TimelineCoordinator;
pub use transcode::{Container, EncodingProfile, FileSink, MediaSink, SampleSource};
pub use types::{MediaSample, Resolution, SampleData, Stats, StreamKind, Surface, SurfaceWithInfo};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
