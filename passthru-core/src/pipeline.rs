//! In-process loopback pipeline
//!
//! A minimal stand-in for the host media pipeline: it captures from one or
//! more raw-frame sources, assigns 90 kHz RTP timestamps, turns keyframe
//! requests into key frame types and pulls the encoder once per raw frame,
//! exactly as the host would.
//!
//! The encoder is pulled on whatever thread pushed the raw frame, with the
//! encoder lock held. Keyframe observers reached from that pull must not push
//! frames synchronously.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, SinkError};
use crate::frame::RawFrame;
use crate::host::{
    CodecSettings, CodecSpecificInfo, EncodeOutcome, EncodedImage, EncodedImageSink, EncoderInfo,
    RateHint, RawFrameSink, RawFrameSource, SinkId, VideoEncoder,
};
use crate::types::FrameType;

/// RTP video clock rate
pub const RTP_CLOCK_RATE: i128 = 90_000;

/// 90 kHz RTP timestamp for a capture time in microseconds (wraps)
pub fn rtp_from_micros(timestamp_us: i64) -> u32 {
    (i128::from(timestamp_us) * RTP_CLOCK_RATE / 1_000_000) as u32
}

/// Pipeline statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Raw frames delivered to the encoder
    pub pulls: u64,
    /// Images accepted by the downstream sink
    pub frames_emitted: u64,
    /// Emitted images tagged key
    pub keyframes_emitted: u64,
    /// Pulls that produced nothing
    pub empty_pulls: u64,
    /// Pulls that failed
    pub errors: u64,
    /// Payload bytes emitted
    pub bytes_emitted: u64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} pulls, {} frames emitted ({} key), {} empty, {} errors, {} bytes",
            self.pulls,
            self.frames_emitted,
            self.keyframes_emitted,
            self.empty_pulls,
            self.errors,
            self.bytes_emitted
        )
    }
}

#[derive(Default)]
struct StatsCounters {
    pulls: AtomicU64,
    frames_emitted: AtomicU64,
    keyframes_emitted: AtomicU64,
    empty_pulls: AtomicU64,
    errors: AtomicU64,
    bytes_emitted: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            pulls: self.pulls.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            keyframes_emitted: self.keyframes_emitted.load(Ordering::Relaxed),
            empty_pulls: self.empty_pulls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            bytes_emitted: self.bytes_emitted.load(Ordering::Relaxed),
        }
    }
}

/// Counts what the downstream sink accepts
struct CountingSink {
    downstream: Arc<dyn EncodedImageSink>,
    stats: Arc<StatsCounters>,
}

impl EncodedImageSink for CountingSink {
    fn on_encoded_image(
        &self,
        image: &EncodedImage,
        info: &CodecSpecificInfo,
    ) -> std::result::Result<(), SinkError> {
        self.downstream.on_encoded_image(image, info)?;
        self.stats.frames_emitted.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_emitted
            .fetch_add(image.data.len() as u64, Ordering::Relaxed);
        if image.is_keyframe() {
            self.stats.keyframes_emitted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

struct PipelineCore {
    encoder: Mutex<Box<dyn VideoEncoder>>,
    keyframe_pending: AtomicBool,
    stats: Arc<StatsCounters>,
}

impl RawFrameSink for PipelineCore {
    fn on_frame(&self, frame: &RawFrame) {
        let mut frame = frame.clone();
        frame.rtp_timestamp = rtp_from_micros(frame.timestamp_us);

        let frame_types = if self.keyframe_pending.swap(false, Ordering::SeqCst) {
            [FrameType::Key]
        } else {
            [FrameType::Delta]
        };

        self.stats.pulls.fetch_add(1, Ordering::Relaxed);
        let outcome = self.encoder.lock().pull(&frame, &frame_types);

        match outcome {
            Ok(EncodeOutcome::Emitted) => {
                trace!("Pulled frame rtp {}", frame.rtp_timestamp);
            }
            Ok(EncodeOutcome::NoOutput) => {
                self.stats.empty_pulls.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                if e.requires_reinit() {
                    warn!("Encoder needs reinitialization: {}", e);
                } else {
                    warn!("Pull failed: {}", e);
                }
            }
        }
    }
}

/// Host pipeline stand-in driving one encoder
pub struct LoopbackPipeline {
    core: Arc<PipelineCore>,
    /// Sources this pipeline captures from
    attachments: Mutex<Vec<(Arc<dyn RawFrameSource>, SinkId)>>,
}

impl LoopbackPipeline {
    /// Initialize `encoder` with `settings` and route its output to `sink`
    pub fn new(
        mut encoder: Box<dyn VideoEncoder>,
        settings: &CodecSettings,
        sink: Arc<dyn EncodedImageSink>,
    ) -> Result<Self> {
        let stats = Arc::new(StatsCounters::default());

        encoder.init(settings)?;
        encoder.register_output_sink(Arc::new(CountingSink {
            downstream: sink,
            stats: stats.clone(),
        }))?;

        info!(
            "Loopback pipeline ready: {} ({})",
            settings.resolution(),
            encoder.describe_capabilities().implementation_name
        );

        Ok(Self {
            core: Arc::new(PipelineCore {
                encoder: Mutex::new(encoder),
                keyframe_pending: AtomicBool::new(false),
                stats,
            }),
            attachments: Mutex::new(Vec::new()),
        })
    }

    /// Start capturing from a raw-frame source
    pub fn attach(&self, source: Arc<dyn RawFrameSource>) -> SinkId {
        let id = source.add_sink(self.core.clone());
        self.attachments.lock().push((source, id));
        debug!("Pipeline attached to source ({:?})", id);
        id
    }

    /// Stop capturing from every source
    pub fn detach_all(&self) {
        let attachments = std::mem::take(&mut *self.attachments.lock());
        for (source, id) in attachments {
            source.remove_sink(id);
        }
    }

    /// Ask for a keyframe on the next pull
    pub fn request_keyframe_from_pipeline(&self) {
        self.core.keyframe_pending.store(true, Ordering::SeqCst);
    }

    pub fn set_rate_hint(&self, hint: RateHint) {
        self.core.encoder.lock().set_rate_hint(hint);
    }

    pub fn encoder_info(&self) -> EncoderInfo {
        self.core.encoder.lock().describe_capabilities()
    }

    pub fn stats(&self) -> PipelineStats {
        self.core.stats.snapshot()
    }
}

impl Drop for LoopbackPipeline {
    fn drop(&mut self) {
        self.detach_all();
        if let Err(e) = self.core.encoder.lock().release() {
            warn!("Encoder release failed: {}", e);
        }
        debug!("Loopback pipeline stopped: {}", self.stats());
    }
}
