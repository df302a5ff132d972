//! Synthetic capture and audio collaborators
//!
//! In-process stand-ins for the OS capture session, the loopback device and
//! the audio graph, used by the CLI demo and the test suite. The capture
//! session is paced in its pull path so a fixed frame count is served
//! deterministically; the graph is a miniature mixer honoring node gains.

use crate::audio::graph::{
    AudioGraph, AudioGraphProvider, GraphSettings, LoopbackCapture, LoopbackDataFn,
    NodeCreationStatus, NodeId, QuantumGenerator,
};
use crate::audio::{AudioFrame, BYTES_PER_SAMPLE};
use crate::capture::{CaptureSession, PoolFrame};
use crate::error::{Error, Result};
use crate::types::{system_relative_time, Resolution, Surface, BYTES_PER_PIXEL};

use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Frame source serving a fixed number of generated frames, then closing.
///
/// Frames carry a per-frame grayscale shade so output files visibly change
/// over time. Pacing happens inside `try_get_next_frame`, which keeps the
/// served count exact regardless of consumer speed.
pub struct SyntheticCaptureSession {
    size: Resolution,
    frames_left: u32,
    frame_interval: Duration,
    tick: u32,
    frame_tx: Option<Sender<()>>,
    closed_tx: Option<Sender<()>>,
}

impl SyntheticCaptureSession {
    pub fn new(size: Resolution, frames: u32, fps: u32) -> Self {
        Self {
            size,
            frames_left: frames,
            frame_interval: Duration::from_secs(1) / fps.max(1),
            tick: 0,
            frame_tx: None,
            closed_tx: None,
        }
    }
}

impl CaptureSession for SyntheticCaptureSession {
    fn size(&self) -> Resolution {
        self.size
    }

    fn start(&mut self, frame_signal: Sender<()>, closed_signal: Sender<()>) -> Result<()> {
        if self.frames_left > 0 {
            let _ = frame_signal.try_send(());
        } else {
            let _ = closed_signal.try_send(());
        }
        self.frame_tx = Some(frame_signal);
        self.closed_tx = Some(closed_signal);
        Ok(())
    }

    fn try_get_next_frame(&mut self) -> Option<PoolFrame> {
        if self.frames_left == 0 {
            return None;
        }
        std::thread::sleep(self.frame_interval);
        self.frames_left -= 1;
        self.tick += 1;
        // Queue the next signal, or close once the last frame is served
        if self.frames_left > 0 {
            if let Some(tx) = &self.frame_tx {
                let _ = tx.try_send(());
            }
        } else if let Some(tx) = &self.closed_tx {
            let _ = tx.try_send(());
        }

        let mut surface = Surface::blank(self.size);
        let shade = (self.tick % 0xFF) as u8;
        for px in surface.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            px[0] = shade;
            px[1] = shade;
            px[2] = shade;
        }
        Some(PoolFrame {
            surface,
            content_size: self.size,
            system_relative_time: system_relative_time(),
        })
    }
}

/// Loopback device producing a constant f32 tone on its own thread
pub struct SyntheticLoopback {
    value: f32,
    bytes_per_tick: usize,
    interval: Duration,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SyntheticLoopback {
    /// Deliver `bytes_per_tick` bytes of the constant sample `value` every
    /// `interval` until stopped
    pub fn constant(value: f32, bytes_per_tick: usize, interval: Duration) -> Self {
        Self {
            value,
            bytes_per_tick,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// A device that starts and stops cleanly but never produces data
    pub fn idle() -> Self {
        Self::constant(0.0, 0, Duration::from_millis(1))
    }
}

impl LoopbackCapture for SyntheticLoopback {
    fn start(&mut self, mut on_data: LoopbackDataFn) -> Result<()> {
        if self.bytes_per_tick == 0 {
            return Ok(());
        }

        let samples = self.bytes_per_tick / BYTES_PER_SAMPLE;
        let mut chunk = Vec::with_capacity(samples * BYTES_PER_SAMPLE);
        for _ in 0..samples {
            chunk.extend_from_slice(&self.value.to_le_bytes());
        }

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let interval = self.interval;
        self.handle = Some(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                on_data(&chunk);
                std::thread::sleep(interval);
            }
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Drop for SyntheticLoopback {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

enum NodeKind {
    DeviceInput,
    FrameInput(QuantumGenerator),
    FrameOutput,
    Submix,
}

/// Miniature audio graph: fixed 10ms quantum, additive f32 mixing of every
/// frame-input generator plus a constant microphone level, scaled by node
/// gains. Transport time advances one quantum per output read.
pub struct SyntheticAudioGraph {
    settings: GraphSettings,
    mic_level: Option<f32>,
    nodes: HashMap<NodeId, NodeKind>,
    gains: HashMap<NodeId, f64>,
    next_id: u32,
    running: bool,
    transport: Duration,
}

impl SyntheticAudioGraph {
    fn new(settings: GraphSettings, mic_level: Option<f32>) -> Self {
        Self {
            settings,
            mic_level,
            nodes: HashMap::new(),
            gains: HashMap::new(),
            next_id: 0,
            running: false,
            transport: Duration::ZERO,
        }
    }

    fn insert(&mut self, kind: NodeKind) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(id, kind);
        self.gains.insert(id, 1.0);
        id
    }

    fn quantum_samples(&self) -> usize {
        (self.settings.sample_rate / 100) as usize
    }
}

#[async_trait::async_trait]
impl AudioGraph for SyntheticAudioGraph {
    fn sample_rate(&self) -> u32 {
        self.settings.sample_rate
    }

    fn channels(&self) -> u32 {
        self.settings.channels
    }

    async fn add_device_input(&mut self) -> std::result::Result<NodeId, NodeCreationStatus> {
        if self.mic_level.is_none() {
            return Err(NodeCreationStatus::DeviceNotAvailable);
        }
        Ok(self.insert(NodeKind::DeviceInput))
    }

    fn add_frame_input(
        &mut self,
        generator: QuantumGenerator,
    ) -> std::result::Result<NodeId, NodeCreationStatus> {
        Ok(self.insert(NodeKind::FrameInput(generator)))
    }

    fn add_frame_output(&mut self) -> std::result::Result<NodeId, NodeCreationStatus> {
        Ok(self.insert(NodeKind::FrameOutput))
    }

    fn add_submix(&mut self) -> std::result::Result<NodeId, NodeCreationStatus> {
        Ok(self.insert(NodeKind::Submix))
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if !self.nodes.contains_key(&from) || !self.nodes.contains_key(&to) {
            return Err(Error::Internal(format!(
                "connect on unknown node {from:?} -> {to:?}"
            )));
        }
        Ok(())
    }

    fn set_gain(&mut self, node: NodeId, gain: f64) -> Result<()> {
        if !self.nodes.contains_key(&node) {
            return Err(Error::Internal(format!("gain on unknown node {node:?}")));
        }
        self.gains.insert(node, gain);
        Ok(())
    }

    fn gain(&self, node: NodeId) -> Option<f64> {
        self.gains.get(&node).copied()
    }

    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn read_output(&mut self, node: NodeId) -> Option<AudioFrame> {
        if !self.running || !matches!(self.nodes.get(&node), Some(NodeKind::FrameOutput)) {
            return None;
        }

        let quantum = self.quantum_samples();
        let total = quantum * self.settings.channels as usize;
        let mut mix = vec![0f32; total];

        for (id, kind) in self.nodes.iter_mut() {
            let gain = self.gains.get(id).copied().unwrap_or(1.0) as f32;
            match kind {
                NodeKind::DeviceInput => {
                    if let Some(level) = self.mic_level {
                        for sample in mix.iter_mut() {
                            *sample += level * gain;
                        }
                    }
                }
                NodeKind::FrameInput(generator) => {
                    let Some(frame) = generator(quantum) else {
                        continue;
                    };
                    let _ = frame.buffer.with_bytes(|bytes| {
                        for (i, chunk) in bytes.chunks_exact(BYTES_PER_SAMPLE).enumerate() {
                            if i >= total {
                                break;
                            }
                            let v =
                                f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                            mix[i] += v * gain;
                        }
                    });
                }
                NodeKind::FrameOutput | NodeKind::Submix => {}
            }
        }

        let mut bytes = Vec::with_capacity(total * BYTES_PER_SAMPLE);
        for sample in &mix {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        let mut frame =
            AudioFrame::from_pcm(bytes, self.settings.sample_rate, self.settings.channels);
        frame.relative_time = Some(self.transport);
        self.transport += frame.duration.unwrap_or_default();
        Some(frame)
    }

    fn release_node(&mut self, node: NodeId) {
        self.nodes.remove(&node);
        self.gains.remove(&node);
    }
}

/// Provider building [`SyntheticAudioGraph`] instances
#[derive(Debug, Clone)]
pub struct SyntheticGraphProvider {
    mic_available: bool,
    mic_level: f32,
}

impl SyntheticGraphProvider {
    pub fn new() -> Self {
        Self {
            mic_available: true,
            mic_level: 0.2,
        }
    }

    /// Simulate a machine with no usable microphone
    pub fn without_microphone(mut self) -> Self {
        self.mic_available = false;
        self
    }

    /// Constant sample level the simulated microphone contributes
    pub fn with_mic_level(mut self, level: f32) -> Self {
        self.mic_level = level;
        self
    }
}

impl Default for SyntheticGraphProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AudioGraphProvider for SyntheticGraphProvider {
    async fn create_graph(
        &self,
        settings: GraphSettings,
    ) -> std::result::Result<Box<dyn AudioGraph>, NodeCreationStatus> {
        Ok(Box::new(SyntheticAudioGraph::new(
            settings,
            self.mic_available.then_some(self.mic_level),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn test_graph(mic_level: Option<f32>) -> SyntheticAudioGraph {
        SyntheticAudioGraph::new(
            GraphSettings {
                sample_rate: 48_000,
                channels: 2,
            },
            mic_level,
        )
    }

    fn constant_generator(value: f32, sample_rate: u32, channels: u32) -> QuantumGenerator {
        Box::new(move |required| {
            let mut bytes = Vec::new();
            for _ in 0..required * channels as usize {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            Some(AudioFrame::from_pcm(bytes, sample_rate, channels))
        })
    }

    fn first_sample(frame: &AudioFrame) -> f32 {
        frame
            .buffer
            .with_bytes(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap()
    }

    #[test]
    fn test_capture_session_serves_exact_frame_count() {
        let size = Resolution::new(4, 4);
        let mut session = SyntheticCaptureSession::new(size, 3, 1000);
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(1);
        let (closed_tx, closed_rx) = crossbeam_channel::bounded(1);
        session.start(frame_tx, closed_tx).unwrap();

        let mut served = 0;
        let mut last = Duration::ZERO;
        while let Some(frame) = session.try_get_next_frame() {
            assert!(frame.system_relative_time >= last);
            last = frame.system_relative_time;
            served += 1;
        }
        assert_eq!(served, 3);
        assert!(frame_rx.try_recv().is_ok());
        assert!(closed_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_graph_mixes_mic_and_frame_input_with_gain() {
        let mut graph = test_graph(Some(0.25));
        let mic = graph.add_device_input().await.unwrap();
        let input = graph
            .add_frame_input(constant_generator(0.5, 48_000, 2))
            .unwrap();
        let submix = graph.add_submix().unwrap();
        let output = graph.add_frame_output().unwrap();
        graph.connect(mic, submix).unwrap();
        graph.connect(input, submix).unwrap();
        graph.connect(submix, output).unwrap();

        graph.start().unwrap();
        let frame = graph.read_output(output).expect("frame");
        assert!((first_sample(&frame) - 0.75).abs() < 1e-6);

        graph.set_gain(mic, 0.0).unwrap();
        let frame = graph.read_output(output).expect("frame");
        assert!((first_sample(&frame) - 0.5).abs() < 1e-6);

        graph.set_gain(mic, 1.0).unwrap();
        let frame = graph.read_output(output).expect("frame");
        assert!((first_sample(&frame) - 0.75).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unavailable_microphone_reports_status() {
        let mut graph = test_graph(None);
        let err = graph.add_device_input().await.unwrap_err();
        assert_eq!(err, NodeCreationStatus::DeviceNotAvailable);
    }

    #[test]
    fn test_transport_advances_per_quantum() {
        let mut graph = test_graph(None);
        let output = graph.add_frame_output().unwrap();
        graph.start().unwrap();

        let first = graph.read_output(output).expect("frame");
        let second = graph.read_output(output).expect("frame");
        assert_eq!(first.relative_time, Some(Duration::ZERO));
        assert_eq!(second.relative_time, Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_stopped_graph_reads_none() {
        let mut graph = test_graph(None);
        let output = graph.add_frame_output().unwrap();
        assert!(graph.read_output(output).is_none());
        graph.start().unwrap();
        assert!(graph.read_output(output).is_some());
        graph.stop().unwrap();
        assert!(graph.read_output(output).is_none());
    }

    #[test]
    fn test_released_node_stops_contributing() {
        let mut graph = test_graph(None);
        let input = graph
            .add_frame_input(constant_generator(0.5, 48_000, 2))
            .unwrap();
        let output = graph.add_frame_output().unwrap();
        graph.start().unwrap();

        let frame = graph.read_output(output).expect("frame");
        assert!((first_sample(&frame) - 0.5).abs() < 1e-6);

        graph.release_node(input);
        let frame = graph.read_output(output).expect("frame");
        assert_eq!(first_sample(&frame), 0.0);
    }

    #[test]
    fn test_loopback_delivers_constant_chunks() {
        let mut loopback = SyntheticLoopback::constant(0.5, 64, Duration::from_millis(1));
        let collected: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = collected.clone();
        loopback
            .start(Box::new(move |bytes| sink.lock().extend_from_slice(bytes)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));
        loopback.stop().unwrap();

        let bytes = collected.lock();
        assert!(!bytes.is_empty());
        assert_eq!(bytes.len() % 64, 0);
        for chunk in bytes.chunks_exact(BYTES_PER_SAMPLE) {
            let v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            assert_eq!(v, 0.5);
        }
    }

    #[test]
    fn test_idle_loopback_produces_nothing() {
        let mut loopback = SyntheticLoopback::idle();
        let count = Arc::new(Mutex::new(0u32));
        let sink = count.clone();
        loopback
            .start(Box::new(move |_| *sink.lock() += 1))
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        loopback.stop().unwrap();
        assert_eq!(*count.lock(), 0);
    }
}
