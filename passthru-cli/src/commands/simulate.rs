//! Simulate command - synthetic simulcast run with FIFO verification

use anyhow::{bail, Context, Result};
use clap::Args;
use passthru_core::{
    config::ConfigFile,
    host::{CodecSettings, SdpVideoFormat, VideoEncoderFactory},
    output::CollectingSink,
    Codec, LoopbackPipeline, PipelineStats, Resolution, SimulcastSource, SourceRegistry,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Arguments for the simulate command
#[derive(Args)]
pub struct SimulateArgs {
    /// Codec to tag frames with (default: config)
    #[arg(short, long)]
    codec: Option<String>,

    /// Number of simulcast layers
    #[arg(short, long, default_value = "3", value_parser = clap::value_parser!(u8).range(1..=4))]
    layers: u8,

    /// Frames to push per layer
    #[arg(short = 'n', long, default_value = "300")]
    frames: u32,

    /// Keyframe interval in frames
    #[arg(short, long, default_value = "60")]
    gop: u32,

    /// Have the pipeline request a keyframe every N frames (0 = never)
    #[arg(short, long, default_value = "45")]
    keyframe_interval: u32,

    /// Pace frames at this rate (0 = as fast as possible)
    #[arg(short, long, default_value = "0")]
    fps: u32,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

/// Result for one layer
#[derive(Debug, Serialize)]
struct LayerReport {
    layer: usize,
    width: u32,
    height: u32,
    frames_pushed: u64,
    keyframes_pushed: u64,
    keyframe_requests: u64,
    fifo_ok: bool,
    layer_index_ok: bool,
    stats: PipelineStats,
}

/// Simulation summary
#[derive(Debug, Serialize)]
struct SimulateSummary {
    codec: Codec,
    layers: Vec<LayerReport>,
    elapsed_seconds: f64,
}

/// Synthetic payload: layer, frame index, key flag, then filler
fn synthetic_payload(layer: usize, index: u32, is_keyframe: bool, resolution: Resolution) -> Vec<u8> {
    let filler = (resolution.width * resolution.height / 1024).clamp(8, 4096) as usize;
    let mut payload = Vec::with_capacity(6 + filler);
    payload.push(layer as u8);
    payload.extend_from_slice(&index.to_be_bytes());
    payload.push(u8::from(is_keyframe));
    payload.resize(6 + filler, (index % 251) as u8);
    payload
}

fn payload_index(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.get(1..5)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Run a synthetic simulcast session
pub async fn simulate(args: SimulateArgs) -> Result<()> {
    let file_config = ConfigFile::load_or_default();
    let mut source_config = file_config.source_config()?;
    let encoder_config = file_config.encoder_config()?;

    if let Some(codec) = &args.codec {
        let codec: Codec = codec
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid codec '{}'. Valid options: vp8, vp9, av1, h264, h265", codec))?;
        source_config = source_config.with_codec(codec);
    }
    let codec = source_config.codec;
    let layer_count = usize::from(args.layers);

    let registry = Arc::new(SourceRegistry::new());
    let group = SimulcastSource::from_top(&registry, &source_config, layer_count)?;
    let streams = group.simulcast_streams();

    // Producer-side keyframe flags, one per layer
    let pending: Arc<Vec<AtomicBool>> =
        Arc::new((0..layer_count).map(|_| AtomicBool::new(false)).collect());
    let requests: Arc<Vec<AtomicU64>> =
        Arc::new((0..layer_count).map(|_| AtomicU64::new(0)).collect());
    {
        let pending = pending.clone();
        let requests = requests.clone();
        group.set_keyframe_request_observer(Arc::new(move |layer: usize| {
            pending[layer].store(true, Ordering::SeqCst);
            requests[layer].fetch_add(1, Ordering::Relaxed);
        }));
    }

    let format = SdpVideoFormat::for_codec(codec, encoder_config.packetization_mode);
    let mut sinks = Vec::with_capacity(layer_count);
    let mut pipelines = Vec::with_capacity(layer_count);
    for (layer, source) in group.layers().iter().enumerate() {
        let encoder = group
            .encoder_factory(layer)
            .context("Missing layer factory")?
            .with_config(encoder_config.clone())
            .create(&format)
            .context("Layer factory refused its codec")?;

        let settings = CodecSettings::new(codec, source.resolution())
            .with_simulcast_streams(streams.clone());
        let sink = Arc::new(CollectingSink::new());
        let pipeline = LoopbackPipeline::new(encoder, &settings, sink.clone())?;
        pipeline.attach(source.raw_source());

        sinks.push(sink);
        pipelines.push(pipeline);
    }

    info!(
        "Simulating {} frame(s) over {} {} layer(s)",
        args.frames, layer_count, codec
    );

    let frame_duration_us = if args.fps > 0 {
        1_000_000 / i64::from(args.fps)
    } else {
        33_333
    };
    let mut ticker = (args.fps > 0)
        .then(|| tokio::time::interval(Duration::from_micros(frame_duration_us as u64)));

    let start = Instant::now();
    let mut pushed = vec![0u64; layer_count];
    let mut keyframes = vec![0u64; layer_count];

    for index in 0..args.frames {
        if let Some(ticker) = ticker.as_mut() {
            ticker.tick().await;
        }

        if args.keyframe_interval > 0 && index > 0 && index % args.keyframe_interval == 0 {
            let layer = (index / args.keyframe_interval) as usize % layer_count;
            debug!("Pipeline requesting keyframe on layer {}", layer);
            pipelines[layer].request_keyframe_from_pipeline();
        }

        let capture_time_us = (i64::from(index) + 1) * frame_duration_us;
        for (layer, source) in group.layers().iter().enumerate() {
            let gop_key = args.gop > 0 && index % args.gop == 0;
            let is_keyframe = pending[layer].swap(false, Ordering::SeqCst) || gop_key;
            let resolution = source.resolution();
            let payload = synthetic_payload(layer, index, is_keyframe, resolution);

            if group.capture_encoded_frame(
                layer,
                &payload,
                capture_time_us,
                0,
                resolution.width,
                resolution.height,
                is_keyframe,
                is_keyframe,
            ) {
                pushed[layer] += 1;
                if is_keyframe {
                    keyframes[layer] += 1;
                }
            }
        }
    }

    let elapsed = start.elapsed();

    let mut reports = Vec::with_capacity(layer_count);
    for (layer, (sink, pipeline)) in sinks.iter().zip(&pipelines).enumerate() {
        let images = sink.images();
        let indices: Vec<Option<u32>> = images.iter().map(|image| payload_index(&image.data)).collect();
        let fifo_ok = images.len() as u64 == pushed[layer]
            && indices
                .iter()
                .enumerate()
                .all(|(i, index)| *index == Some(i as u32));
        let layer_index_ok = images
            .iter()
            .all(|image| image.simulcast_index == Some(layer as u32));
        let resolution = group
            .layer(layer)
            .map(|source| source.resolution())
            .unwrap_or_default();

        reports.push(LayerReport {
            layer,
            width: resolution.width,
            height: resolution.height,
            frames_pushed: pushed[layer],
            keyframes_pushed: keyframes[layer],
            keyframe_requests: requests[layer].load(Ordering::Relaxed),
            fifo_ok,
            layer_index_ok,
            stats: pipeline.stats(),
        });
    }

    let summary = SimulateSummary {
        codec,
        layers: reports,
        elapsed_seconds: elapsed.as_secs_f64(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if let Some(bad) = summary
        .layers
        .iter()
        .find(|report| !report.fifo_ok || !report.layer_index_ok)
    {
        bail!("Layer {} failed verification", bad.layer);
    }

    Ok(())
}

fn print_summary(summary: &SimulateSummary) {
    println!("Passthru - Simulcast Simulation\n");
    println!("  Codec:   {}", summary.codec);
    println!("  Elapsed: {:.2}s\n", summary.elapsed_seconds);

    for report in &summary.layers {
        let status = if report.fifo_ok && report.layer_index_ok {
            "[OK]"
        } else {
            "[!!]"
        };
        println!(
            "  {} Layer {} ({}x{}): pushed {} ({} key), {} keyframe request(s)",
            status,
            report.layer,
            report.width,
            report.height,
            report.frames_pushed,
            report.keyframes_pushed,
            report.keyframe_requests
        );
        println!("       {}", report.stats);
    }
}
