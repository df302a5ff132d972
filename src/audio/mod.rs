//! Audio capture module
//!
//! Provides:
//! - The mixed-graph capture engine (loopback + microphone + silence)
//! - The loopback ring buffer shared between producer and quantum callback
//! - Provider contracts for the external audio graph and loopback device

mod engine;
pub mod graph;
mod ring;
mod types;

pub use engine::{AudioCaptureEngine, EngineState};
pub use graph::{AudioGraph, AudioGraphProvider, LoopbackCapture, NodeCreationStatus, NodeId};
pub use ring::LoopingAudioRing;
pub use types::{AudioBuffer, AudioFrame, BYTES_PER_SAMPLE};
