//! Replay command - push an encoded file through the passthrough

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::Args;
use passthru_core::{
    config::ConfigFile,
    encode::PassthroughEncoderFactory,
    host::{CodecSettings, SdpVideoFormat, VideoEncoderFactory},
    output::{record_from_channel, ChannelSink, FileRecorder},
    Codec, EncodedFrame, EncodedSource, LoopbackPipeline, PipelineStats, Resolution,
    SourceRegistry,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::{annexb, ivf};

/// Arguments for the replay command
#[derive(Args)]
pub struct ReplayArgs {
    /// Annex-B H.264 stream or IVF file (VP8/VP9/AV1)
    file: PathBuf,

    /// Pace frames at this rate (0 = as fast as possible)
    #[arg(short, long, default_value = "30")]
    fps: u32,

    /// Declared width for Annex-B input (default: config)
    #[arg(long)]
    width: Option<u32>,

    /// Declared height for Annex-B input (default: config)
    #[arg(long)]
    height: Option<u32>,

    /// Record emitted frames to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

/// Frame read from the input file
struct InputFrame {
    data: Bytes,
    rtp_timestamp: u32,
    is_keyframe: bool,
    has_parameter_sets: bool,
}

/// Input file after demuxing
struct Input {
    container: &'static str,
    codec: Codec,
    resolution: Resolution,
    frames: Vec<InputFrame>,
    dropped: usize,
}

/// Replay summary
#[derive(Debug, Serialize)]
struct ReplaySummary {
    file: PathBuf,
    container: &'static str,
    codec: Codec,
    width: u32,
    height: u32,
    frames_read: usize,
    frames_dropped: usize,
    frames_pushed: u64,
    keyframe_requests: u64,
    elapsed_seconds: f64,
    frames_recorded: Option<u64>,
    stats: PipelineStats,
}

fn read_input(data: &[u8], fallback: Resolution) -> Result<Input> {
    if ivf::is_ivf(data) {
        let (header, frames) = ivf::parse(data)?;
        let frames = frames
            .iter()
            .map(|frame| InputFrame {
                data: Bytes::copy_from_slice(frame.data),
                rtp_timestamp: header.to_rtp(frame.timestamp),
                is_keyframe: ivf::is_keyframe(header.codec, frame.data),
                has_parameter_sets: false,
            })
            .collect();
        return Ok(Input {
            container: "ivf",
            codec: header.codec,
            resolution: Resolution::new(u32::from(header.width), u32::from(header.height)),
            frames,
            dropped: 0,
        });
    }

    let (frames, dropped) = annexb::assemble_stream(data);
    if frames.is_empty() {
        bail!("No decodable H.264 access units found (is this an Annex-B stream?)");
    }

    Ok(Input {
        container: "annexb",
        codec: Codec::H264,
        resolution: fallback,
        frames: frames
            .into_iter()
            .map(|frame| InputFrame {
                data: Bytes::from(frame.data),
                rtp_timestamp: 0,
                is_keyframe: frame.is_keyframe,
                has_parameter_sets: frame.has_parameter_sets,
            })
            .collect(),
        dropped,
    })
}

/// Replay an encoded file through a loopback pipeline
pub async fn replay(args: ReplayArgs) -> Result<()> {
    let file_config = ConfigFile::load_or_default();
    let mut source_config = file_config.source_config()?;
    let encoder_config = file_config.encoder_config()?;

    let data = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let fallback = Resolution::new(
        args.width.unwrap_or(source_config.resolution.width),
        args.height.unwrap_or(source_config.resolution.height),
    );
    let input = read_input(&data, fallback)?;

    info!(
        "Replaying {} {} frame(s) from {} ({})",
        input.frames.len(),
        input.codec,
        args.file.display(),
        input.container
    );

    source_config = source_config
        .with_codec(input.codec)
        .with_resolution(input.resolution.width, input.resolution.height);

    let registry = Arc::new(SourceRegistry::new());
    let source = EncodedSource::new(&registry, &source_config);

    let keyframe_requests = Arc::new(AtomicU64::new(0));
    let requests = keyframe_requests.clone();
    source.set_keyframe_request_observer(Arc::new(move || {
        requests.fetch_add(1, Ordering::Relaxed);
    }));

    // Sized so a recorder never lags behind an unpaced replay
    let sink = Arc::new(ChannelSink::with_capacity(input.frames.len().max(64)));
    let recorder = match &args.output {
        Some(path) => {
            let recorder = FileRecorder::new(
                path,
                input.codec,
                input.resolution.width,
                input.resolution.height,
            )?;
            Some(tokio::spawn(record_from_channel(recorder, sink.subscribe())))
        }
        None => None,
    };

    let format = SdpVideoFormat::for_codec(input.codec, encoder_config.packetization_mode);
    let encoder = PassthroughEncoderFactory::new(&source)
        .with_config(encoder_config)
        .create(&format)
        .context("Passthrough factory refused its own codec")?;

    let settings =
        CodecSettings::new(input.codec, input.resolution).with_max_framerate(args.fps.max(1));
    let pipeline = LoopbackPipeline::new(encoder, &settings, sink.clone())?;
    pipeline.attach(source.raw_source());

    let frame_duration_us = if args.fps > 0 {
        1_000_000 / i64::from(args.fps)
    } else {
        33_333
    };
    let mut ticker = (args.fps > 0)
        .then(|| tokio::time::interval(Duration::from_micros(frame_duration_us as u64)));

    let start = Instant::now();
    let mut frames_pushed = 0u64;

    for (index, input_frame) in input.frames.iter().enumerate() {
        if let Some(ticker) = ticker.as_mut() {
            ticker.tick().await;
        }

        let frame = EncodedFrame::new(
            input_frame.data.clone(),
            input.resolution.width,
            input.resolution.height,
        )?
        .with_capture_time_us((index as i64 + 1) * frame_duration_us)
        .with_rtp_timestamp(input_frame.rtp_timestamp)
        .with_keyframe(input_frame.is_keyframe)
        .with_parameter_sets(input_frame.has_parameter_sets);

        if source.capture_frame(frame) {
            frames_pushed += 1;
        } else {
            warn!("Frame {} was not accepted", index);
        }
    }

    let elapsed = start.elapsed();
    let stats = pipeline.stats();

    // Closing the channel lets the recorder finalize
    drop(pipeline);
    drop(sink);
    drop(source);

    let frames_recorded = match recorder {
        Some(handle) => Some(handle.await.context("Recorder task panicked")??),
        None => None,
    };

    let summary = ReplaySummary {
        file: args.file.clone(),
        container: input.container,
        codec: input.codec,
        width: input.resolution.width,
        height: input.resolution.height,
        frames_read: input.frames.len(),
        frames_dropped: input.dropped,
        frames_pushed,
        keyframe_requests: keyframe_requests.load(Ordering::Relaxed),
        elapsed_seconds: elapsed.as_secs_f64(),
        frames_recorded,
        stats,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if summary.stats.frames_emitted != summary.frames_pushed {
        bail!(
            "Pushed {} frame(s) but only {} were emitted",
            summary.frames_pushed,
            summary.stats.frames_emitted
        );
    }

    Ok(())
}

fn print_summary(summary: &ReplaySummary) {
    println!("Passthru - Replay\n");
    println!("  File:        {}", summary.file.display());
    println!(
        "  Stream:      {} {} ({}x{})",
        summary.container, summary.codec, summary.width, summary.height
    );
    println!("  Frames read: {}", summary.frames_read);
    if summary.frames_dropped > 0 {
        println!(
            "  Dropped:     {} (before first keyframe)",
            summary.frames_dropped
        );
    }
    println!("  Pushed:      {}", summary.frames_pushed);
    println!("  Pipeline:    {}", summary.stats);
    println!("  KF requests: {}", summary.keyframe_requests);
    if let Some(recorded) = summary.frames_recorded {
        println!("  Recorded:    {} frame(s)", recorded);
    }
    println!("  Elapsed:     {:.2}s", summary.elapsed_seconds);
}
