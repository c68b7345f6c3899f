//! Integration tests for the lazily decided encoder

mod mocks;

use mocks::{h264_source, raw_frame, FakeEncoder, FakeEncoderLog, RecordingRawSink};
use passthru_core::encode::{EncoderCreator, LazyEncoderFactory, LazyMode};
use passthru_core::error::PassthruError;
use passthru_core::host::{
    CodecSettings, EncodeOutcome, RateHint, RawFrameSource, SdpVideoFormat, VideoEncoder,
    VideoEncoderFactory,
};
use passthru_core::output::CollectingSink;
use passthru_core::types::{FrameType, PacketizationMode};
use passthru_core::{Codec, LazyEncoder, Resolution, SourceRegistry};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn fake_creator(log: Arc<FakeEncoderLog>) -> EncoderCreator {
    Arc::new(move |_format: &SdpVideoFormat| {
        Some(Box::new(FakeEncoder { log: log.clone() }) as Box<dyn VideoEncoder>)
    })
}

fn no_fallback() -> EncoderCreator {
    Arc::new(|_format: &SdpVideoFormat| -> Option<Box<dyn VideoEncoder>> { None })
}

fn h264_format() -> SdpVideoFormat {
    SdpVideoFormat::for_codec(Codec::H264, PacketizationMode::NonInterleaved)
}

fn ready(encoder: &mut LazyEncoder) -> Arc<CollectingSink> {
    let sink = Arc::new(CollectingSink::new());
    encoder
        .init(&CodecSettings::new(Codec::H264, Resolution::new(640, 480)))
        .unwrap();
    encoder.register_output_sink(sink.clone()).unwrap();
    sink
}

#[test]
fn test_registered_source_selects_passthrough() {
    let (registry, source) = h264_source();
    let raw = RecordingRawSink::new();
    source.raw_source().add_sink(raw.clone());

    let log = Arc::new(FakeEncoderLog::default());
    let mut encoder =
        LazyEncoder::new(h264_format(), registry.clone(), fake_creator(log.clone())).unwrap();
    let sink = ready(&mut encoder);
    assert_eq!(encoder.mode(), LazyMode::Undecided);

    source.capture_encoded_frame(&[0x65, 0x88], 1_000, 0, 640, 480, true, true);
    let frames = raw.frames();

    assert_eq!(
        encoder.pull(&frames[0], &[FrameType::Delta]).unwrap(),
        EncodeOutcome::Emitted
    );
    assert_eq!(encoder.mode(), LazyMode::Passthrough);
    assert_eq!(sink.images()[0].data.as_ref(), &[0x65, 0x88]);
    assert_eq!(log.inits.load(Ordering::SeqCst), 0);
    assert_eq!(
        encoder.describe_capabilities().implementation_name,
        "PassthroughEncoder"
    );
}

#[test]
fn test_unregistered_frame_selects_fallback() {
    let registry = Arc::new(SourceRegistry::new());
    let log = Arc::new(FakeEncoderLog::default());
    let mut encoder =
        LazyEncoder::new(h264_format(), registry, fake_creator(log.clone())).unwrap();
    ready(&mut encoder);
    encoder.set_rate_hint(RateHint::new(1_500_000, 30.0));

    assert_eq!(
        encoder.pull(&raw_frame(1), &[FrameType::Key]).unwrap(),
        EncodeOutcome::Emitted
    );
    assert_eq!(encoder.mode(), LazyMode::Fallback);

    // init, sink and rate were replayed into the real encoder
    assert_eq!(log.inits.load(Ordering::SeqCst), 1);
    assert_eq!(log.sinks.load(Ordering::SeqCst), 1);
    assert_eq!(log.pulls.load(Ordering::SeqCst), 1);
    assert_eq!(
        log.last_rate.lock().map(|rate| rate.bitrate_bps),
        Some(1_500_000)
    );

    // Later pulls go straight to the chosen encoder
    encoder.pull(&raw_frame(2), &[]).unwrap();
    assert_eq!(log.pulls.load(Ordering::SeqCst), 2);
    assert_eq!(encoder.describe_capabilities().implementation_name, "FakeEncoder");
}

#[test]
fn test_missing_fallback_is_unavailable() {
    let registry = Arc::new(SourceRegistry::new());
    let mut encoder = LazyEncoder::new(h264_format(), registry, no_fallback()).unwrap();
    ready(&mut encoder);

    let err = encoder.pull(&raw_frame(1), &[]).unwrap_err();
    assert!(matches!(err, PassthruError::EncoderUnavailable(_)));
}

#[test]
fn test_pull_before_init_fails() {
    let registry = Arc::new(SourceRegistry::new());
    let log = Arc::new(FakeEncoderLog::default());
    let mut encoder = LazyEncoder::new(h264_format(), registry, fake_creator(log.clone())).unwrap();

    let err = encoder.pull(&raw_frame(1), &[]).unwrap_err();
    assert!(matches!(err, PassthruError::Uninitialized(_)));
    assert_eq!(encoder.mode(), LazyMode::Undecided);
    assert_eq!(log.pulls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_release_resets_decision() {
    let registry = Arc::new(SourceRegistry::new());
    let log = Arc::new(FakeEncoderLog::default());
    let mut encoder =
        LazyEncoder::new(h264_format(), registry, fake_creator(log.clone())).unwrap();
    ready(&mut encoder);
    encoder.pull(&raw_frame(1), &[]).unwrap();

    encoder.release().unwrap();
    assert_eq!(encoder.mode(), LazyMode::Undecided);
    assert_eq!(log.releases.load(Ordering::SeqCst), 1);
    assert!(matches!(
        encoder.pull(&raw_frame(2), &[]),
        Err(PassthruError::Uninitialized(_))
    ));
}

#[test]
fn test_unknown_format_is_rejected() {
    let registry = Arc::new(SourceRegistry::new());
    let result = LazyEncoder::new(SdpVideoFormat::new("opus"), registry, no_fallback());
    assert!(matches!(result, Err(PassthruError::UnknownCodec(_))));
}

#[test]
fn test_factory_serves_listed_formats() {
    let registry = Arc::new(SourceRegistry::new());
    let formats = vec![
        h264_format(),
        SdpVideoFormat::for_codec(Codec::Vp8, PacketizationMode::NonInterleaved),
    ];
    let factory = LazyEncoderFactory::new(formats, registry, no_fallback());

    assert_eq!(factory.supported_formats().len(), 2);
    assert!(factory.create(&SdpVideoFormat::new("vp8")).is_some());
    assert!(factory.create(&h264_format()).is_some());
    assert!(factory.create(&SdpVideoFormat::new("AV1")).is_none());
}
