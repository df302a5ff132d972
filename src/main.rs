//! duetrec CLI
//!
//! Command-line interface for exercising the recording engine against the
//! synthetic capture and audio sources.

use clap::{Parser, Subcommand};
use duetrec::gpu::SoftwareDevice;
use duetrec::synthetic::{SyntheticCaptureSession, SyntheticGraphProvider, SyntheticLoopback};
use duetrec::{FileSink, RecordingConfig, RecordingSession, Resolution};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "duetrec")]
#[command(about = "Synchronized screen + audio sample pump")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show engine defaults and the output file format
    Info,

    /// Record the synthetic demo source into a chunked sample file
    Record {
        /// Output file path
        #[arg(short, long, default_value = "out.drec")]
        output: PathBuf,

        /// Configuration file (TOML); flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Resolution (e.g. 1920x1080); defaults to the source size
        #[arg(short, long)]
        resolution: Option<String>,

        /// Video bitrate in kbps
        #[arg(short, long)]
        bitrate: Option<u32>,

        /// Framerate
        #[arg(short, long, default_value = "60")]
        fps: u32,

        /// Recording length in seconds
        #[arg(short, long, default_value = "5")]
        duration: u32,

        /// Simulated loopback level (0.0 - 1.0)
        #[arg(long, default_value = "0.2")]
        tone: f32,

        /// Run without the simulated microphone
        #[arg(long)]
        no_mic: bool,

        /// Mute the microphone after this many seconds
        #[arg(long)]
        mute_after: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("duetrec=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info => cmd_info(),
        Commands::Record {
            output,
            config,
            resolution,
            bitrate,
            fps,
            duration,
            tone,
            no_mic,
            mute_after,
        } => {
            cmd_record(
                output, config, resolution, bitrate, fps, duration, tone, no_mic, mute_after,
            )
            .await
        }
    }
}

fn cmd_info() -> anyhow::Result<()> {
    let config = RecordingConfig::default();

    println!("duetrec {}", duetrec::VERSION);
    println!("===================\n");

    println!("Defaults:");
    println!(
        "  Video: {} @ {}fps, {} kbps (source size: {})",
        config.video.resolution(),
        config.video.frame_rate,
        config.video.bitrate_bps / 1000,
        if config.video.use_source_size { "yes" } else { "no" }
    );
    println!(
        "  Audio: {} Hz, {} channels, {} kbps",
        config.audio.sample_rate,
        config.audio.channels,
        config.audio.bitrate_bps / 1000
    );
    println!(
        "  Underrun retry: {} attempts x {}ms",
        config.underrun_retry.attempts, config.underrun_retry.delay_ms
    );

    println!("\nOutput format:");
    println!("  Chunked sample stream (DREC), one length-prefixed record per");
    println!("  pumped sample: uncompressed BGRA video, f32 PCM audio.");

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_record(
    output: PathBuf,
    config: Option<PathBuf>,
    resolution: Option<String>,
    bitrate: Option<u32>,
    fps: u32,
    duration: u32,
    tone: f32,
    no_mic: bool,
    mute_after: Option<u32>,
) -> anyhow::Result<()> {
    let mut cfg = match config {
        Some(path) => RecordingConfig::load(path)?,
        None => RecordingConfig::default(),
    };

    if let Some(res) = resolution {
        let parts: Vec<&str> = res.split('x').collect();
        if parts.len() == 2 {
            if let (Ok(w), Ok(h)) = (parts[0].parse(), parts[1].parse()) {
                cfg = cfg.with_resolution(w, h);
            }
        }
    }
    if let Some(kbps) = bitrate {
        cfg = cfg.with_bitrate_bps(kbps * 1000);
    }
    cfg = cfg.with_frame_rate(fps);

    let source_size = if cfg.video.use_source_size {
        Resolution::default()
    } else {
        cfg.video.resolution()
    };
    let frames = fps * duration;

    println!("Configuration:");
    println!("  Output: {}", output.display());
    println!("  Resolution: {}", source_size);
    println!("  FPS: {}", fps);
    println!("  Duration: {}s ({} frames)", duration, frames);
    println!("  Microphone: {}", if no_mic { "off" } else { "on" });
    println!();

    let device = Arc::new(SoftwareDevice::new());
    let loopback = SyntheticLoopback::constant(tone, 3840, Duration::from_millis(1));
    let mut session = RecordingSession::new(device, cfg, Box::new(loopback))?;

    let mut provider = SyntheticGraphProvider::new();
    if no_mic {
        provider = provider.without_microphone();
    }

    if let Some(secs) = mute_after {
        let mic = session.mic_control();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs as u64));
            mic.set_muted(true);
        });
    }

    let capture = SyntheticCaptureSession::new(source_size, frames, fps);
    let mut sink = FileSink::create(&output)?;

    println!("Recording...");
    let stats = session
        .record(Box::new(capture), &provider, &mut sink)
        .await?;

    println!("\nStatistics:");
    println!("  Video samples: {}", stats.video_samples);
    println!("  Audio samples: {}", stats.audio_samples);
    println!("  Audio underruns: {}", stats.audio_underruns);
    println!("  Bytes pumped: {}", stats.bytes_pumped);
    println!("  Samples written: {}", sink.samples_written());

    Ok(())
}
