//! Transcoder-facing contracts
//!
//! The hardware transcoder/muxer is an external collaborator that drives the
//! engine by pull. This module carries the contract the engine implements
//! ([`SampleSource`]), the encoding profile handed to the transcoder, and a
//! reference pull driver plus chunked file sink used by the CLI and tests.

use crate::config::{AudioParams, VideoParams};
use crate::error::{Error, Result};
use crate::types::{MediaSample, Resolution, SampleData, StreamKind};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Contract the engine implements for the transcoder's callbacks.
///
/// On `starting` the source supplies the real start timestamp; on each
/// `sample_requested` for a stream it supplies a sample or `None`. A `None`
/// video sample is end-of-stream; a `None` audio sample means "no data this
/// pull" and must not be conflated with termination.
pub trait SampleSource: Send {
    fn starting(&mut self) -> Option<Duration>;

    fn sample_requested(&mut self, stream: StreamKind) -> Option<MediaSample>;
}

/// Container format of the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Container {
    #[default]
    Mpeg4,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mpeg4 => "mp4",
        }
    }
}

/// Profile describing both tracks of the output file
#[derive(Debug, Clone)]
pub struct EncodingProfile {
    pub container: Container,
    pub video: VideoParams,
    pub audio: Option<AudioParams>,
}

impl EncodingProfile {
    /// MPEG-4 profile from resolved parameters; `source_size` substitutes for
    /// the configured resolution when `use_source_size` is set.
    pub fn mpeg4(video: VideoParams, audio: Option<AudioParams>, source_size: Resolution) -> Self {
        let mut video = video;
        if video.use_source_size {
            video.width = source_size.width;
            video.height = source_size.height;
        }
        Self {
            container: Container::Mpeg4,
            video,
            audio,
        }
    }
}

/// Output sink the transcoder writes finished samples into.
///
/// The engine receives this already opened; what lies behind it (file,
/// stream, null) is not its concern.
pub trait MediaSink: Send {
    /// Write the header given the profile and the real start timestamp
    fn begin(&mut self, profile: &EncodingProfile, start: Duration) -> Result<()>;

    fn write_sample(&mut self, stream: StreamKind, sample: &MediaSample) -> Result<()>;

    /// Finalize the output with whatever was produced so far
    fn finalize(&mut self) -> Result<()>;
}

const FILE_SINK_MAGIC: &[u8; 4] = b"DREC";

/// Chunked debug sink: a length-prefixed sample stream with a small header.
/// Stands in for the hardware muxer when recording to a plain file.
pub struct FileSink {
    writer: BufWriter<File>,
    samples: u64,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            samples: 0,
        })
    }

    pub fn samples_written(&self) -> u64 {
        self.samples
    }
}

impl MediaSink for FileSink {
    fn begin(&mut self, profile: &EncodingProfile, start: Duration) -> Result<()> {
        self.writer.write_all(FILE_SINK_MAGIC)?;
        self.writer.write_all(&profile.video.width.to_le_bytes())?;
        self.writer.write_all(&profile.video.height.to_le_bytes())?;
        self.writer
            .write_all(&profile.video.bitrate_bps.to_le_bytes())?;
        self.writer
            .write_all(&profile.video.frame_rate.to_le_bytes())?;
        let (rate, channels) = profile
            .audio
            .map(|a| (a.sample_rate, a.channels))
            .unwrap_or((0, 0));
        self.writer.write_all(&rate.to_le_bytes())?;
        self.writer.write_all(&channels.to_le_bytes())?;
        self.writer
            .write_all(&(start.as_micros() as u64).to_le_bytes())?;
        Ok(())
    }

    fn write_sample(&mut self, stream: StreamKind, sample: &MediaSample) -> Result<()> {
        let tag: u8 = match stream {
            StreamKind::Video => 0,
            StreamKind::Audio => 1,
        };
        self.writer.write_all(&[tag, sample.key_frame as u8])?;
        self.writer
            .write_all(&(sample.timestamp.as_micros() as u64).to_le_bytes())?;
        self.writer
            .write_all(&(sample.duration.as_micros() as u64).to_le_bytes())?;
        let bytes: &[u8] = match &sample.data {
            SampleData::Surface(s) => &s.data,
            SampleData::Buffer(b) => b,
        };
        self.writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
        self.writer.write_all(bytes)?;
        self.samples += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.writer.flush()?;
        tracing::info!(samples = self.samples, "file sink finalized");
        Ok(())
    }
}

/// Reference pull driver: alternates video and audio requests the way the
/// hardware transcoder interleaves them, until the video stream signals
/// end-of-stream, then finalizes the sink with whatever was produced.
pub fn run_transcode(
    source: &mut dyn SampleSource,
    sink: &mut dyn MediaSink,
    profile: &EncodingProfile,
) -> Result<()> {
    let start = source
        .starting()
        .ok_or_else(|| Error::Transcode("source failed to supply a start time".into()))?;
    sink.begin(profile, start)?;

    loop {
        match source.sample_requested(StreamKind::Video) {
            Some(sample) => sink.write_sample(StreamKind::Video, &sample)?,
            // End-of-stream: finalize with what we have
            None => break,
        }

        if profile.audio.is_some() {
            // A null audio sample is "no data this tick", not termination
            if let Some(sample) = source.sample_requested(StreamKind::Audio) {
                sink.write_sample(StreamKind::Audio, &sample)?;
            }
        }
    }

    sink.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordingConfig;
    use crate::types::Surface;

    /// Source yielding a fixed number of video samples and audio every
    /// other pull.
    struct CannedSource {
        video_left: u32,
        audio_tick: bool,
        clock_ms: u64,
    }

    impl SampleSource for CannedSource {
        fn starting(&mut self) -> Option<Duration> {
            Some(Duration::from_millis(7))
        }

        fn sample_requested(&mut self, stream: StreamKind) -> Option<MediaSample> {
            match stream {
                StreamKind::Video => {
                    if self.video_left == 0 {
                        return None;
                    }
                    self.video_left -= 1;
                    self.clock_ms += 16;
                    Some(MediaSample {
                        data: SampleData::Surface(Surface::blank(Resolution::new(2, 2))),
                        timestamp: Duration::from_millis(self.clock_ms),
                        duration: Duration::ZERO,
                        key_frame: false,
                    })
                }
                StreamKind::Audio => {
                    self.audio_tick = !self.audio_tick;
                    self.audio_tick.then(|| MediaSample {
                        data: SampleData::Buffer(vec![0u8; 64]),
                        timestamp: Duration::from_millis(self.clock_ms),
                        duration: Duration::from_millis(10),
                        key_frame: true,
                    })
                }
            }
        }
    }

    #[test]
    fn test_driver_writes_until_video_eos() {
        let cfg = RecordingConfig::default();
        let profile = EncodingProfile::mpeg4(
            cfg.video,
            Some(cfg.audio),
            Resolution::new(2, 2),
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.drec");
        let mut sink = FileSink::create(&path).unwrap();
        let mut source = CannedSource {
            video_left: 4,
            audio_tick: false,
            clock_ms: 0,
        };

        run_transcode(&mut source, &mut sink, &profile).unwrap();
        // 4 video + audio on every other of the 4 interleaved pulls
        assert_eq!(sink.samples_written(), 4 + 2);

        let written = std::fs::read(&path).unwrap();
        assert_eq!(&written[..4], FILE_SINK_MAGIC);
    }

    #[test]
    fn test_source_size_substitution() {
        let mut video = VideoParams::default();
        video.use_source_size = true;
        let profile = EncodingProfile::mpeg4(video, None, Resolution::new(640, 480));
        assert_eq!(profile.video.width, 640);
        assert_eq!(profile.video.height, 480);
    }

    #[test]
    fn test_failed_start_aborts_before_header() {
        struct DeadSource;
        impl SampleSource for DeadSource {
            fn starting(&mut self) -> Option<Duration> {
                None
            }
            fn sample_requested(&mut self, _: StreamKind) -> Option<MediaSample> {
                None
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead.drec");
        let mut sink = FileSink::create(&path).unwrap();
        let profile =
            EncodingProfile::mpeg4(VideoParams::default(), None, Resolution::default());
        let err = run_transcode(&mut DeadSource, &mut sink, &profile).unwrap_err();
        assert!(matches!(err, Error::Transcode(_)));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}
