//! Mock infrastructure for testing
//!
//! Recording sinks, a counting keyframe observer, a fake real encoder and
//! helpers for wiring a source to a passthrough encoder.

#![allow(dead_code)]

use parking_lot::Mutex;
use passthru_core::error::{Result, SinkError};
use passthru_core::frame::{I420Buffer, RawFrame};
use passthru_core::host::{
    CodecSettings, CodecSpecificInfo, EncodeOutcome, EncodedImage, EncodedImageSink, EncoderInfo,
    RateHint, RawFrameSink, VideoEncoder,
};
use passthru_core::output::CollectingSink;
use passthru_core::source::KeyframeRequestObserver;
use passthru_core::types::{FrameType, PixelFormat};
use passthru_core::{
    Codec, EncodedSource, EncoderConfig, PassthroughEncoder, SourceConfig, SourceRegistry,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Records every raw frame a pump delivers
#[derive(Default)]
pub struct RecordingRawSink {
    frames: Mutex<Vec<RawFrame>>,
}

impl RecordingRawSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frames(&self) -> Vec<RawFrame> {
        self.frames.lock().clone()
    }
}

impl RawFrameSink for RecordingRawSink {
    fn on_frame(&self, frame: &RawFrame) {
        self.frames.lock().push(frame.clone());
    }
}

/// Sink that rejects everything
pub struct FailingSink;

impl EncodedImageSink for FailingSink {
    fn on_encoded_image(
        &self,
        _image: &EncodedImage,
        _info: &CodecSpecificInfo,
    ) -> std::result::Result<(), SinkError> {
        Err(SinkError::Closed)
    }
}

/// Counts keyframe requests
#[derive(Default)]
pub struct CountingObserver {
    count: AtomicUsize,
}

impl CountingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl KeyframeRequestObserver for CountingObserver {
    fn on_keyframe_request(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// What a [`FakeEncoder`] saw
#[derive(Default)]
pub struct FakeEncoderLog {
    pub inits: AtomicUsize,
    pub sinks: AtomicUsize,
    pub pulls: AtomicUsize,
    pub releases: AtomicUsize,
    pub last_rate: Mutex<Option<RateHint>>,
}

/// Stand-in for a real pixel encoder
pub struct FakeEncoder {
    pub log: Arc<FakeEncoderLog>,
}

impl VideoEncoder for FakeEncoder {
    fn init(&mut self, _settings: &CodecSettings) -> Result<()> {
        self.log.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn register_output_sink(&mut self, _sink: Arc<dyn EncodedImageSink>) -> Result<()> {
        self.log.sinks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.log.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pull(&mut self, _frame: &RawFrame, _frame_types: &[FrameType]) -> Result<EncodeOutcome> {
        self.log.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(EncodeOutcome::Emitted)
    }

    fn set_rate_hint(&mut self, hint: RateHint) {
        *self.log.last_rate.lock() = Some(hint);
    }

    fn describe_capabilities(&self) -> EncoderInfo {
        EncoderInfo {
            implementation_name: "FakeEncoder".to_string(),
            is_hardware_accelerated: true,
            supports_native_handle: false,
            supports_simulcast: false,
            has_trusted_rate_controller: false,
            scaling_enabled: true,
            preferred_pixel_formats: vec![PixelFormat::Nv12],
        }
    }
}

/// A placeholder-sized raw frame with no routing id
pub fn raw_frame(timestamp_us: i64) -> RawFrame {
    RawFrame::new(Arc::new(I420Buffer::black(2, 2)), timestamp_us)
}

/// Registry plus one H.264 640x480 source
pub fn h264_source() -> (Arc<SourceRegistry>, EncodedSource) {
    let registry = Arc::new(SourceRegistry::new());
    let source = EncodedSource::new(&registry, &SourceConfig::new(Codec::H264, 640, 480));
    (registry, source)
}

/// Bound passthrough encoder, initialized with a collecting sink
pub fn bound_encoder(source: &EncodedSource) -> (PassthroughEncoder, Arc<CollectingSink>) {
    let mut encoder =
        PassthroughEncoder::bound(source.provider(), source.codec(), EncoderConfig::default());
    let sink = Arc::new(CollectingSink::new());
    encoder
        .init(&CodecSettings::new(source.codec(), source.resolution()))
        .expect("init");
    encoder
        .register_output_sink(sink.clone())
        .expect("register sink");
    (encoder, sink)
}
