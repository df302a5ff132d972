//! Audio capture engine
//!
//! Owns the audio graph topology: loopback capture feeding a ring buffer
//! drained by a frame-input generator, a silent looping input keeping the
//! transport alive, a device (microphone) input, all merged at one sub-mix
//! and tapped by one frame-output node. Push start/stop/mute on the outside,
//! pull `get_audio_frame` for the sample pump.

use super::graph::{
    AudioGraph, AudioGraphProvider, GraphSettings, LoopbackCapture, NodeId, QuantumGenerator,
};
use super::ring::LoopingAudioRing;
use super::types::{AudioFrame, BYTES_PER_SAMPLE};
use crate::config::AudioParams;
use crate::error::{Error, Result};
use crate::types::system_relative_time;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Engine lifecycle; Disposed is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Started,
    Stopped,
    Disposed,
}

impl EngineState {
    pub fn name(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initializing => "initializing",
            EngineState::Ready => "ready",
            EngineState::Started => "started",
            EngineState::Stopped => "stopped",
            EngineState::Disposed => "disposed",
        }
    }
}

pub struct AudioCaptureEngine {
    params: AudioParams,
    state: EngineState,
    ring: Arc<LoopingAudioRing>,
    loopback: Option<Box<dyn LoopbackCapture>>,
    graph: Option<Box<dyn AudioGraph>>,
    silence_input: Option<NodeId>,
    frame_input: Option<NodeId>,
    device_input: Option<NodeId>,
    submix: Option<NodeId>,
    frame_output: Option<NodeId>,
    quantum_frames: Arc<AtomicU64>,
    started_at: Option<Instant>,
}

impl AudioCaptureEngine {
    pub fn new(params: AudioParams, loopback: Box<dyn LoopbackCapture>) -> Self {
        Self {
            params,
            state: EngineState::Uninitialized,
            ring: Arc::new(LoopingAudioRing::new()),
            loopback: Some(loopback),
            graph: None,
            silence_input: None,
            frame_input: None,
            device_input: None,
            submix: None,
            frame_output: None,
            quantum_frames: Arc::new(AtomicU64::new(0)),
            started_at: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Build the graph topology.
    ///
    /// Graph, frame-output, frame-input and silence-input failures are setup
    /// faults reported to the caller; a microphone failure degrades
    /// gracefully and the session continues with loopback plus silence.
    pub async fn initialize(&mut self, provider: &dyn AudioGraphProvider) -> Result<()> {
        if self.state != EngineState::Uninitialized {
            return Err(Error::InvalidState {
                expected: "uninitialized",
                actual: self.state.name(),
            });
        }
        self.state = EngineState::Initializing;

        let settings = GraphSettings {
            sample_rate: self.params.sample_rate,
            channels: self.params.channels,
        };
        let mut graph = provider
            .create_graph(settings)
            .await
            .map_err(Error::GraphCreation)?;

        let frame_output = graph.add_frame_output().map_err(Error::NodeCreation)?;

        let device_input = match graph.add_device_input().await {
            Ok(id) => Some(id),
            Err(status) => {
                tracing::warn!(?status, "microphone unavailable, continuing without it");
                None
            }
        };

        let frame_input = graph
            .add_frame_input(self.ring_drain_generator())
            .map_err(Error::NodeCreation)?;

        // Always-silent source so the transport never starves the pull side
        let silence_input = graph
            .add_frame_input(silence_generator(
                self.params.sample_rate,
                self.params.channels,
            ))
            .map_err(Error::NodeCreation)?;

        let submix = graph.add_submix().map_err(Error::NodeCreation)?;
        if let Some(mic) = device_input {
            graph.connect(mic, submix)?;
        }
        graph.connect(frame_input, submix)?;
        graph.connect(silence_input, submix)?;
        graph.connect(submix, frame_output)?;

        self.graph = Some(graph);
        self.frame_output = Some(frame_output);
        self.device_input = device_input;
        self.frame_input = Some(frame_input);
        self.silence_input = Some(silence_input);
        self.submix = Some(submix);
        self.state = EngineState::Ready;
        tracing::info!(
            sample_rate = self.params.sample_rate,
            channels = self.params.channels,
            microphone = device_input.is_some(),
            "audio graph initialized"
        );
        Ok(())
    }

    /// Quantum generator draining the loopback ring buffer.
    ///
    /// For N required samples, compute the byte count for the graph format;
    /// emit nothing while the ring holds fewer unread bytes.
    fn ring_drain_generator(&self) -> QuantumGenerator {
        let ring = self.ring.clone();
        let sample_rate = self.params.sample_rate;
        let channels = self.params.channels;
        let counter = self.quantum_frames.clone();
        Box::new(move |required_samples| {
            if required_samples == 0 {
                return None;
            }
            let byte_count = required_samples * channels as usize * BYTES_PER_SAMPLE;
            let bytes = ring.read_exact(byte_count)?;
            counter.fetch_add(1, Ordering::Relaxed);
            Some(AudioFrame::from_pcm(bytes, sample_rate, channels))
        })
    }

    /// Begin the graph transport and the loopback producer
    pub fn start(&mut self) -> Result<()> {
        if self.state != EngineState::Ready {
            return Err(Error::InvalidState {
                expected: "ready",
                actual: self.state.name(),
            });
        }

        let graph = self.graph.as_mut().expect("graph present in ready state");
        graph.start()?;

        let ring = self.ring.clone();
        if let Some(loopback) = self.loopback.as_mut() {
            loopback.start(Box::new(move |bytes| ring.append(bytes)))?;
        }

        self.started_at = Some(Instant::now());
        self.state = EngineState::Started;
        tracing::info!("audio capture started");
        Ok(())
    }

    /// Stop the transport and the producer, logging throughput diagnostics
    pub fn stop(&mut self) -> Result<()> {
        if self.state != EngineState::Started {
            return Ok(());
        }

        let frames = self.quantum_frames.load(Ordering::Relaxed);
        let elapsed = self
            .started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or_default();
        tracing::info!(
            frames,
            elapsed_s = format!("{elapsed:.1}"),
            frames_per_s = format!("{:.1}", frames as f64 / elapsed.max(f64::EPSILON)),
            read_pos = self.ring.read_position(),
            write_pos = self.ring.write_position(),
            "audio capture stopped"
        );

        if let Some(loopback) = self.loopback.as_mut() {
            if let Err(e) = loopback.stop() {
                tracing::warn!("loopback stop failed: {e}");
            }
        }
        if let Some(graph) = self.graph.as_mut() {
            graph.stop()?;
        }
        self.state = EngineState::Stopped;
        Ok(())
    }

    /// Zero the device-input gain; no-op unless started
    pub fn mute_device_input(&mut self) {
        self.set_device_gain(0.0);
    }

    /// Restore the device-input gain; no-op unless started
    pub fn unmute_device_input(&mut self) {
        self.set_device_gain(1.0);
    }

    fn set_device_gain(&mut self, gain: f64) {
        if self.state != EngineState::Started {
            return;
        }
        if let (Some(graph), Some(mic)) = (self.graph.as_mut(), self.device_input) {
            if let Err(e) = graph.set_gain(mic, gain) {
                tracing::warn!("device input gain change failed: {e}");
            }
        }
    }

    /// Current device-input gain, for diagnostics and level meters
    pub fn device_input_gain(&self) -> Option<f64> {
        let graph = self.graph.as_ref()?;
        graph.gain(self.device_input?)
    }

    /// Pull the latest frame from the frame-output tap, stamped with the
    /// shared monotonic counter. Returns `None` on any internal fault.
    pub fn get_audio_frame(&mut self) -> Option<AudioFrame> {
        let output = self.frame_output?;
        let mut frame = self.graph.as_mut()?.read_output(output)?;
        frame.system_relative_time = Some(system_relative_time());
        Some(frame)
    }

    /// Lock the frame's buffer, copy the bytes out, unlock.
    /// Returns `None` on fault instead of surfacing it to the pump.
    pub fn convert_frame_to_buffer(&self, frame: &AudioFrame) -> Option<Vec<u8>> {
        match frame.buffer.with_bytes(|b| b.to_vec()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("audio frame conversion failed: {e}");
                None
            }
        }
    }

    /// Quanta produced so far by the ring-drain generator
    pub fn quantum_frames(&self) -> u64 {
        self.quantum_frames.load(Ordering::Relaxed)
    }

    /// Stop if needed, then release every owned resource in a fixed order.
    /// Terminal and idempotent; safe after partial initialization failure.
    pub fn dispose(&mut self) {
        if self.state == EngineState::Disposed {
            return;
        }
        if self.state == EngineState::Started {
            let _ = self.stop();
        }

        if let Some(graph) = self.graph.as_mut() {
            for node in [
                self.silence_input.take(),
                self.frame_input.take(),
                self.device_input.take(),
                self.submix.take(),
                self.frame_output.take(),
            ]
            .into_iter()
            .flatten()
            {
                graph.release_node(node);
            }
        }
        self.graph = None;
        self.ring = Arc::new(LoopingAudioRing::new());
        self.loopback = None;
        self.state = EngineState::Disposed;
        tracing::debug!("audio capture engine disposed");
    }
}

impl Drop for AudioCaptureEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Generator for the always-silent looping source: one quantum of zeroed
/// samples every callback, so the sub-mix always has input.
fn silence_generator(sample_rate: u32, channels: u32) -> QuantumGenerator {
    Box::new(move |required_samples| {
        if required_samples == 0 {
            return None;
        }
        let bytes = vec![0u8; required_samples * channels as usize * BYTES_PER_SAMPLE];
        Some(AudioFrame::from_pcm(bytes, sample_rate, channels))
    })
}
