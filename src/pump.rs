//! Sample pump and recording session
//!
//! The pump answers the transcoder's alternating pull requests for the next
//! video or audio sample. Transient audio underrun is retried with a bound;
//! anything unrecoverable becomes a null sample plus one full, ordered
//! teardown, so the transcoder finalizes the output with whatever exists.

use crate::audio::{AudioCaptureEngine, AudioGraphProvider, EngineState, LoopbackCapture};
use crate::capture::{CaptureSession, FrameWaiter};
use crate::config::{RecordingConfig, RetryPolicy};
use crate::error::{Error, Result};
use crate::gpu::GpuDevice;
use crate::timeline::TimelineCoordinator;
use crate::transcode::{run_transcode, EncodingProfile, MediaSink, SampleSource};
use crate::types::{MediaSample, SampleData, Stats, StreamKind, SurfaceWithInfo};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Audio engine slot shared between the pump and the mute control handle
pub type SharedAudioEngine = Arc<Mutex<Option<AudioCaptureEngine>>>;

/// Pull-request orchestrator implementing the transcoder contract
pub struct SamplePump {
    waiter: Option<FrameWaiter>,
    audio: Option<SharedAudioEngine>,
    timeline: TimelineCoordinator,
    retry: RetryPolicy,
    stats: Stats,
    /// Origin frame held back from `starting` and emitted as the first
    /// video sample, so no captured frame is lost to origin establishment
    pending_video: Option<SurfaceWithInfo>,
    closed: bool,
}

impl SamplePump {
    pub fn new(
        waiter: FrameWaiter,
        audio: Option<SharedAudioEngine>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            waiter: Some(waiter),
            audio,
            timeline: TimelineCoordinator::new(),
            retry,
            stats: Stats::default(),
            pending_video: None,
            closed: false,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Block for the first video frame (and one audio frame when an engine
    /// is active) to establish the shared timeline origin.
    fn establish_origin(&mut self) -> Result<Duration> {
        let waiter = self.waiter.as_mut().ok_or(Error::CaptureClosed)?;
        let frame = waiter.wait_for_new_frame()?.ok_or(Error::CaptureClosed)?;
        let video_origin = frame.system_relative_time;
        self.pending_video = Some(frame);

        let audio_origin = self.audio.as_ref().and_then(|shared| {
            let mut slot = shared.lock();
            slot.as_mut()
                .and_then(|engine| engine.get_audio_frame())
                .and_then(|frame| frame.relative_time)
        });

        self.timeline.establish(video_origin, audio_origin)
    }

    fn next_video_sample(&mut self) -> Option<MediaSample> {
        let frame = match self.pending_video.take() {
            Some(frame) => frame,
            None => {
                let waiter = self.waiter.as_mut()?;
                match waiter.wait_for_new_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        // User stop and source closure land here alike
                        tracing::debug!("video stream ended");
                        self.teardown();
                        return None;
                    }
                    Err(e) => {
                        tracing::error!("video sample fault: {e}");
                        self.teardown();
                        return None;
                    }
                }
            }
        };

        let timestamp = self.timeline.rebase(frame.system_relative_time);
        self.stats.video_samples += 1;
        self.stats.bytes_pumped += frame.surface.size_bytes() as u64;
        tracing::trace!(?timestamp, "video sample");
        Some(MediaSample {
            data: SampleData::Surface(frame.surface),
            timestamp,
            duration: Duration::ZERO,
            key_frame: false,
        })
    }

    fn next_audio_sample(&mut self) -> Option<MediaSample> {
        let shared = self.audio.as_ref()?.clone();

        // Underrun is common right after start, before the ring has data;
        // retry within the bound, then yield a null sample for this pull
        // only. This must not be conflated with end-of-stream.
        let mut attempts = 0;
        let frame = loop {
            let frame = shared.lock().as_mut().and_then(|e| e.get_audio_frame());
            match frame {
                Some(frame) if frame.has_data() => break frame,
                _ => {
                    if attempts >= self.retry.attempts {
                        self.stats.audio_underruns += 1;
                        tracing::warn!(attempts, "no audio frame, yielding null sample");
                        return None;
                    }
                    attempts += 1;
                    std::thread::sleep(self.retry.delay());
                }
            }
        };

        let buffer = shared
            .lock()
            .as_ref()
            .and_then(|e| e.convert_frame_to_buffer(&frame));
        let Some(bytes) = buffer else {
            tracing::warn!("no audio buffer, yielding null sample");
            return None;
        };

        let timestamp = frame.relative_time.unwrap_or_default();
        let duration = frame.duration.unwrap_or_default();
        self.stats.audio_samples += 1;
        self.stats.bytes_pumped += bytes.len() as u64;
        tracing::trace!(?timestamp, ?duration, "audio sample");
        Some(MediaSample {
            data: SampleData::Buffer(bytes),
            timestamp,
            duration,
            key_frame: true,
        })
    }

    /// Release the frame waiter, then stop and dispose the audio engine.
    /// Idempotent; the same path serves deliberate stop and fatal faults.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending_video = None;
        if let Some(mut waiter) = self.waiter.take() {
            waiter.dispose();
        }
        if let Some(shared) = self.audio.take() {
            if let Some(engine) = shared.lock().as_mut() {
                let _ = engine.stop();
                engine.dispose();
            }
        }
        tracing::info!("pipeline torn down");
    }
}

impl SampleSource for SamplePump {
    fn starting(&mut self) -> Option<Duration> {
        match self.establish_origin() {
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::error!("origin establishment failed: {e}");
                self.teardown();
                None
            }
        }
    }

    fn sample_requested(&mut self, stream: StreamKind) -> Option<MediaSample> {
        if self.closed {
            self.teardown();
            return None;
        }
        match stream {
            StreamKind::Video => self.next_video_sample(),
            StreamKind::Audio => self.next_audio_sample(),
        }
    }
}

impl Drop for SamplePump {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Cloneable handle muting/unmuting the microphone mid-session
#[derive(Clone)]
pub struct MicControl {
    engine: SharedAudioEngine,
}

impl MicControl {
    pub fn set_muted(&self, muted: bool) {
        if let Some(engine) = self.engine.lock().as_mut() {
            if muted {
                engine.mute_device_input();
            } else {
                engine.unmute_device_input();
            }
        }
    }

    /// Current device-input gain, if the engine and microphone are alive
    pub fn device_input_gain(&self) -> Option<f64> {
        self.engine.lock().as_ref()?.device_input_gain()
    }
}

/// One recording session: owns the device, the audio engine and the resolved
/// configuration; builds the waiter and pump and drives the transcode.
pub struct RecordingSession {
    device: Arc<dyn GpuDevice>,
    config: RecordingConfig,
    audio: SharedAudioEngine,
    recording: bool,
    closed: bool,
}

impl RecordingSession {
    pub fn new(
        device: Arc<dyn GpuDevice>,
        config: RecordingConfig,
        loopback: Box<dyn LoopbackCapture>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = AudioCaptureEngine::new(config.audio, loopback);
        Ok(Self {
            device,
            config,
            audio: Arc::new(Mutex::new(Some(engine))),
            recording: false,
            closed: false,
        })
    }

    /// Handle usable from another thread while `record` runs
    pub fn mic_control(&self) -> MicControl {
        MicControl {
            engine: self.audio.clone(),
        }
    }

    /// Audio engine state, for diagnostics and tests
    pub fn audio_state(&self) -> Option<EngineState> {
        self.audio.lock().as_ref().map(|e| e.state())
    }

    /// Capture, synchronize and pump both streams into the sink until the
    /// capture source closes or a fatal fault ends the session.
    pub async fn record(
        &mut self,
        capture: Box<dyn CaptureSession>,
        graph_provider: &dyn AudioGraphProvider,
        sink: &mut dyn MediaSink,
    ) -> Result<Stats> {
        if self.recording {
            return Err(Error::AlreadyRecording);
        }
        if self.closed {
            return Err(Error::InvalidState {
                expected: "idle",
                actual: "disposed",
            });
        }
        self.recording = true;

        let source_size = capture.size();
        let profile = EncodingProfile::mpeg4(
            self.config.video,
            Some(self.config.audio),
            source_size,
        );

        // Initialize outside the shared lock; mute requests during this
        // window see an empty slot and no-op
        let mut engine = self.audio.lock().take().ok_or(Error::InvalidState {
            expected: "audio engine",
            actual: "disposed",
        })?;
        if engine.state() == EngineState::Uninitialized {
            if let Err(e) = engine.initialize(graph_provider).await {
                *self.audio.lock() = Some(engine);
                return Err(e);
            }
        }

        let waiter = FrameWaiter::new(self.device.clone(), capture, source_size)?;

        if let Err(e) = engine.start() {
            *self.audio.lock() = Some(engine);
            return Err(e);
        }
        *self.audio.lock() = Some(engine);

        let mut pump = SamplePump::new(
            waiter,
            Some(self.audio.clone()),
            self.config.underrun_retry,
        );

        tracing::info!(
            width = profile.video.width,
            height = profile.video.height,
            bitrate = profile.video.bitrate_bps,
            fps = profile.video.frame_rate,
            "recording started"
        );

        let result = tokio::task::block_in_place(|| run_transcode(&mut pump, sink, &profile));

        let stats = pump.stats().clone();
        pump.teardown();
        result?;

        tracing::info!(
            video_samples = stats.video_samples,
            audio_samples = stats.audio_samples,
            underruns = stats.audio_underruns,
            "recording finished"
        );
        Ok(stats)
    }

    /// Stop and release the audio engine; terminal and idempotent.
    /// The waiter, if one is live, is released by the pump's teardown.
    pub fn dispose(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(engine) = self.audio.lock().as_mut() {
            let _ = engine.stop();
            engine.dispose();
        }
        self.recording = false;
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::graph::{
        AudioGraph, GraphSettings, NodeCreationStatus, NodeId, QuantumGenerator,
    };
    use crate::audio::AudioFrame;
    use crate::config::AudioParams;
    use crate::gpu::SoftwareDevice;
    use crate::synthetic::{SyntheticCaptureSession, SyntheticGraphProvider, SyntheticLoopback};
    use crate::types::Resolution;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    /// Sink that records what the driver wrote
    #[derive(Default)]
    struct TapSink {
        began: bool,
        samples: Vec<(StreamKind, Duration)>,
        finalized: bool,
    }

    impl MediaSink for TapSink {
        fn begin(&mut self, _profile: &EncodingProfile, _start: Duration) -> Result<()> {
            self.began = true;
            Ok(())
        }

        fn write_sample(&mut self, stream: StreamKind, sample: &MediaSample) -> Result<()> {
            self.samples.push((stream, sample.timestamp));
            Ok(())
        }

        fn finalize(&mut self) -> Result<()> {
            self.finalized = true;
            Ok(())
        }
    }

    /// Graph whose frame-output tap never produces data
    struct StarvedGraph {
        reads: Arc<AtomicU32>,
        next_id: u32,
    }

    #[async_trait::async_trait]
    impl AudioGraph for StarvedGraph {
        fn sample_rate(&self) -> u32 {
            48_000
        }
        fn channels(&self) -> u32 {
            2
        }
        async fn add_device_input(&mut self) -> std::result::Result<NodeId, NodeCreationStatus> {
            self.next_id += 1;
            Ok(NodeId(self.next_id))
        }
        fn add_frame_input(
            &mut self,
            _generator: QuantumGenerator,
        ) -> std::result::Result<NodeId, NodeCreationStatus> {
            self.next_id += 1;
            Ok(NodeId(self.next_id))
        }
        fn add_frame_output(&mut self) -> std::result::Result<NodeId, NodeCreationStatus> {
            self.next_id += 1;
            Ok(NodeId(self.next_id))
        }
        fn add_submix(&mut self) -> std::result::Result<NodeId, NodeCreationStatus> {
            self.next_id += 1;
            Ok(NodeId(self.next_id))
        }
        fn connect(&mut self, _from: NodeId, _to: NodeId) -> Result<()> {
            Ok(())
        }
        fn set_gain(&mut self, _node: NodeId, _gain: f64) -> Result<()> {
            Ok(())
        }
        fn gain(&self, _node: NodeId) -> Option<f64> {
            Some(1.0)
        }
        fn start(&mut self) -> Result<()> {
            Ok(())
        }
        fn stop(&mut self) -> Result<()> {
            Ok(())
        }
        fn read_output(&mut self, _node: NodeId) -> Option<AudioFrame> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            None
        }
        fn release_node(&mut self, _node: NodeId) {}
    }

    struct StarvedProvider {
        reads: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl crate::audio::AudioGraphProvider for StarvedProvider {
        async fn create_graph(
            &self,
            _settings: GraphSettings,
        ) -> std::result::Result<Box<dyn AudioGraph>, NodeCreationStatus> {
            Ok(Box::new(StarvedGraph {
                reads: self.reads.clone(),
                next_id: 0,
            }))
        }
    }

    fn shared_engine(engine: AudioCaptureEngine) -> SharedAudioEngine {
        Arc::new(Mutex::new(Some(engine)))
    }

    fn quiet_loopback() -> Box<SyntheticLoopback> {
        Box::new(SyntheticLoopback::constant(
            0.5,
            3840,
            Duration::from_millis(1),
        ))
    }

    fn video_pump(frames: u32, device: Arc<SoftwareDevice>) -> SamplePump {
        let size = Resolution::new(8, 8);
        let session = SyntheticCaptureSession::new(size, frames, 500);
        let waiter = FrameWaiter::new(device, Box::new(session), size).unwrap();
        SamplePump::new(waiter, None, RetryPolicy::default())
    }

    #[test]
    fn test_video_only_pump_orders_and_ends() {
        let mut pump = video_pump(3, Arc::new(SoftwareDevice::new()));
        let origin = pump.starting().expect("origin");
        assert!(pump.timeline.is_established());
        assert_eq!(pump.timeline.origin(), Some(origin));

        let mut last = Duration::ZERO;
        for _ in 0..3 {
            let sample = pump.sample_requested(StreamKind::Video).expect("sample");
            assert!(sample.timestamp >= last);
            last = sample.timestamp;
        }
        // Source closed: null sample, then the pump is torn down
        assert!(pump.sample_requested(StreamKind::Video).is_none());
        assert!(pump.is_closed());
        assert_eq!(pump.stats().video_samples, 3);
    }

    #[test]
    fn test_device_loss_mid_session_tears_down() {
        let device = Arc::new(SoftwareDevice::new());
        let mut pump = video_pump(10, device.clone());
        pump.starting().expect("origin");
        pump.sample_requested(StreamKind::Video).expect("sample");

        device.mark_lost();
        assert!(pump.sample_requested(StreamKind::Video).is_none());
        assert!(pump.is_closed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_underrun_bounded_retry_without_teardown() {
        let reads = Arc::new(AtomicU32::new(0));
        let mut engine =
            AudioCaptureEngine::new(AudioParams::default(), Box::new(SyntheticLoopback::idle()));
        engine
            .initialize(&StarvedProvider {
                reads: reads.clone(),
            })
            .await
            .unwrap();
        engine.start().unwrap();

        let device = Arc::new(SoftwareDevice::new());
        let size = Resolution::new(4, 4);
        let waiter = FrameWaiter::new(
            device,
            Box::new(SyntheticCaptureSession::new(size, 5, 500)),
            size,
        )
        .unwrap();
        let shared = shared_engine(engine);
        let mut pump = SamplePump::new(waiter, Some(shared.clone()), RetryPolicy::default());

        let begun = Instant::now();
        assert!(pump.sample_requested(StreamKind::Audio).is_none());
        let elapsed = begun.elapsed();

        // One initial attempt plus exactly five retries, >= 10ms apart
        assert_eq!(reads.load(Ordering::SeqCst), 6);
        assert!(elapsed >= Duration::from_millis(50));

        // A null audio sample is not termination
        assert!(!pump.is_closed());
        assert_eq!(
            shared.lock().as_ref().unwrap().state(),
            EngineState::Started
        );
        assert_eq!(pump.stats().audio_underruns, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_end_to_end_three_frames_then_teardown() {
        let device = Arc::new(SoftwareDevice::new());
        let mut session = RecordingSession::new(
            device,
            RecordingConfig::default().with_underrun_retry(5, 1),
            quiet_loopback(),
        )
        .unwrap();

        let size = Resolution::new(16, 16);
        let capture = SyntheticCaptureSession::new(size, 3, 200);
        let mut sink = TapSink::default();

        let stats = session
            .record(
                Box::new(capture),
                &SyntheticGraphProvider::new(),
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(stats.video_samples, 3);
        assert!(sink.began);
        assert!(sink.finalized);

        let video_stamps: Vec<_> = sink
            .samples
            .iter()
            .filter(|(s, _)| *s == StreamKind::Video)
            .map(|(_, ts)| *ts)
            .collect();
        assert_eq!(video_stamps.len(), 3);
        assert!(video_stamps.windows(2).all(|w| w[0] <= w[1]));

        // Teardown observed before record returned
        assert_eq!(session.audio_state(), Some(EngineState::Disposed));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mute_control_mid_session() {
        let device = Arc::new(SoftwareDevice::new());
        let mut session = RecordingSession::new(
            device,
            RecordingConfig::default().with_underrun_retry(2, 1),
            quiet_loopback(),
        )
        .unwrap();
        let mic = session.mic_control();

        // Before recording the slot holds an uninitialized engine: no-op
        mic.set_muted(true);
        assert_eq!(mic.device_input_gain(), None);

        let size = Resolution::new(8, 8);
        let capture = SyntheticCaptureSession::new(size, 40, 400);
        let mut sink = TapSink::default();

        let muter = {
            let mic = mic.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                mic.set_muted(true);
                let muted_gain = mic.device_input_gain();
                std::thread::sleep(Duration::from_millis(20));
                mic.set_muted(false);
                let unmuted_gain = mic.device_input_gain();
                (muted_gain, unmuted_gain)
            })
        };

        session
            .record(
                Box::new(capture),
                &SyntheticGraphProvider::new().with_mic_level(0.25),
                &mut sink,
            )
            .await
            .unwrap();

        let (muted_gain, unmuted_gain) = muter.join().unwrap();
        assert_eq!(muted_gain, Some(0.0));
        assert_eq!(unmuted_gain, Some(1.0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_record_rejected() {
        let device = Arc::new(SoftwareDevice::new());
        let mut session = RecordingSession::new(
            device,
            RecordingConfig::default().with_underrun_retry(2, 1),
            quiet_loopback(),
        )
        .unwrap();

        let size = Resolution::new(8, 8);
        let mut sink = TapSink::default();
        session
            .record(
                Box::new(SyntheticCaptureSession::new(size, 1, 200)),
                &SyntheticGraphProvider::new(),
                &mut sink,
            )
            .await
            .unwrap();

        let err = session
            .record(
                Box::new(SyntheticCaptureSession::new(size, 1, 200)),
                &SyntheticGraphProvider::new(),
                &mut sink,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRecording));
    }
}
