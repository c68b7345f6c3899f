//! Passthrough encoder
//!
//! Impersonates a video encoder: when the host pulls it with a placeholder
//! raw frame, it dequeues the next pre-encoded frame from its source and
//! hands that payload to the output sink untouched.

use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::config::EncoderConfig;
use crate::error::{PassthruError, Result};
use crate::frame::{EncodedFrame, RawFrame};
use crate::host::{
    CodecSettings, CodecSpecificInfo, EncodeOutcome, EncodedImage, EncodedImageSink, EncoderInfo,
    RateHint, VideoEncoder,
};
use crate::registry::SourceRegistry;
use crate::source::FrameProvider;
use crate::types::{Codec, FrameType, PixelFormat};

/// Where the encoder finds its frames
enum Binding {
    /// One fixed source
    Bound(Arc<dyn FrameProvider>),
    /// Looked up per pull by the raw frame's routing id
    Routed(Arc<SourceRegistry>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    Unconfigured,
    Configured,
    Releasing,
}

/// Encoder that emits pre-encoded frames instead of encoding pixels
pub struct PassthroughEncoder {
    binding: Binding,
    /// Codec this encoder was created for
    codec: Codec,
    config: EncoderConfig,
    state: EncoderState,
    settings: Option<CodecSettings>,
    sink: Option<Arc<dyn EncodedImageSink>>,
    /// Layer fixed by the factory; overrides the one derived in `init`
    fixed_layer: Option<u32>,
    simulcast_index: Option<u32>,
    /// False while the pipeline has paused the stream with a zero bitrate
    sending: bool,
    frames_emitted: u64,
}

impl PassthroughEncoder {
    /// Encoder pulling from one fixed source
    pub fn bound(provider: Arc<dyn FrameProvider>, codec: Codec, config: EncoderConfig) -> Self {
        Self::with_binding(Binding::Bound(provider), codec, config)
    }

    /// Encoder resolving its source through the registry on every pull
    pub fn routed(registry: Arc<SourceRegistry>, codec: Codec, config: EncoderConfig) -> Self {
        Self::with_binding(Binding::Routed(registry), codec, config)
    }

    fn with_binding(binding: Binding, codec: Codec, config: EncoderConfig) -> Self {
        Self {
            binding,
            codec,
            config,
            state: EncoderState::Unconfigured,
            settings: None,
            sink: None,
            fixed_layer: None,
            simulcast_index: None,
            sending: true,
            frames_emitted: 0,
        }
    }

    /// Pin the simulcast layer this encoder reports
    pub fn with_simulcast_index(mut self, index: u32) -> Self {
        self.fixed_layer = Some(index);
        self.simulcast_index = Some(index);
        self
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn simulcast_index(&self) -> Option<u32> {
        self.simulcast_index
    }

    pub fn is_configured(&self) -> bool {
        self.state == EncoderState::Configured
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    fn resolve(&self, frame: &RawFrame) -> Option<Arc<dyn FrameProvider>> {
        match &self.binding {
            Binding::Bound(provider) => Some(provider.clone()),
            Binding::Routed(registry) => {
                let id = frame.source_id?;
                registry
                    .find(id)
                    .map(|core| core as Arc<dyn FrameProvider>)
            }
        }
    }

    fn build_image(&self, frame: EncodedFrame, raw: &RawFrame) -> (EncodedImage, CodecSpecificInfo) {
        let rtp_timestamp = if frame.rtp_timestamp() != 0 {
            frame.rtp_timestamp()
        } else {
            raw.rtp_timestamp
        };
        let is_keyframe = frame.is_keyframe();
        let is_h264 = self.codec == Codec::H264;

        let info = CodecSpecificInfo {
            codec: self.codec,
            packetization_mode: is_h264.then_some(self.config.packetization_mode),
            temporal_index: None,
            idr_frame: is_h264 && is_keyframe,
        };

        let image = EncodedImage {
            encoded_width: frame.width(),
            encoded_height: frame.height(),
            has_parameter_sets: frame.has_parameter_sets(),
            frame_type: FrameType::from_keyframe(is_keyframe),
            data: frame.into_payload(),
            rtp_timestamp,
            capture_time_ms: raw.render_time_ms(),
            ntp_time_ms: raw.ntp_time_ms,
            rotation: raw.rotation,
            color_space: raw.color_space,
            simulcast_index: self.simulcast_index,
        };

        (image, info)
    }
}

impl VideoEncoder for PassthroughEncoder {
    fn init(&mut self, settings: &CodecSettings) -> Result<()> {
        if settings.width == 0 || settings.height == 0 {
            return Err(PassthruError::invalid(format!(
                "codec settings have zero dimension {}",
                settings.resolution()
            )));
        }
        if settings.codec != self.codec {
            return Err(PassthruError::invalid(format!(
                "encoder is {} but settings ask for {}",
                self.codec, settings.codec
            )));
        }

        self.simulcast_index = self.fixed_layer.or_else(|| settings.matching_stream_index());
        self.settings = Some(settings.clone());
        self.sending = true;
        self.state = EncoderState::Configured;

        info!(
            "Passthrough encoder initialized: {} {} @ {}fps, layer {:?}",
            self.codec,
            settings.resolution(),
            settings.max_framerate,
            self.simulcast_index
        );
        Ok(())
    }

    fn register_output_sink(&mut self, sink: Arc<dyn EncodedImageSink>) -> Result<()> {
        self.sink = Some(sink);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.state == EncoderState::Unconfigured && self.sink.is_none() {
            return Ok(());
        }

        self.state = EncoderState::Releasing;
        self.sink = None;
        self.settings = None;
        self.sending = false;
        self.state = EncoderState::Unconfigured;

        info!(
            "Passthrough encoder released after {} frame(s)",
            self.frames_emitted
        );
        Ok(())
    }

    fn pull(&mut self, frame: &RawFrame, frame_types: &[FrameType]) -> Result<EncodeOutcome> {
        if self.state != EncoderState::Configured {
            return Err(PassthruError::uninitialized("init() has not been called"));
        }
        let Some(sink) = self.sink.clone() else {
            return Err(PassthruError::uninitialized("no output sink registered"));
        };

        let Some(provider) = self.resolve(frame) else {
            warn!(
                "No encoded source for raw frame {:?}, skipping pull",
                frame.source_id
            );
            return Ok(EncodeOutcome::NoOutput);
        };

        if frame_types.iter().any(FrameType::is_key) {
            debug!("Pipeline requested a keyframe");
            provider.request_keyframe();
        }

        if !self.sending {
            trace!("Stream paused, leaving queued frame in place");
            return Ok(EncodeOutcome::NoOutput);
        }

        let Some(encoded) = provider.take_next_frame() else {
            debug!("Pull with empty queue");
            return Ok(EncodeOutcome::NoOutput);
        };

        let (image, info) = self.build_image(encoded, frame);

        trace!(
            "Emitting {} bytes, {:?}, rtp {}, layer {:?}",
            image.data.len(),
            image.frame_type,
            image.rtp_timestamp,
            image.simulcast_index
        );

        if let Err(e) = sink.on_encoded_image(&image, &info) {
            warn!("Output sink rejected frame: {}", e);
            return Err(e.into());
        }

        self.frames_emitted += 1;
        Ok(EncodeOutcome::Emitted)
    }

    fn set_rate_hint(&mut self, hint: RateHint) {
        let sending = !hint.is_paused();
        if sending != self.sending {
            debug!(
                "Passthrough encoder {} (bitrate {} bps)",
                if sending { "resumed" } else { "paused" },
                hint.bitrate_bps
            );
        }
        self.sending = sending;
    }

    fn describe_capabilities(&self) -> EncoderInfo {
        EncoderInfo {
            implementation_name: self.config.implementation_name.clone(),
            is_hardware_accelerated: false,
            supports_native_handle: false,
            supports_simulcast: true,
            has_trusted_rate_controller: true,
            scaling_enabled: false,
            preferred_pixel_formats: vec![PixelFormat::I420],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::frame::I420Buffer;
    use crate::host::SimulcastStream;
    use crate::output::CollectingSink;
    use crate::source::EncodedSource;
    use crate::types::Resolution;

    fn raw(ts: i64) -> RawFrame {
        RawFrame::new(Arc::new(I420Buffer::black(2, 2)), ts)
    }

    #[test]
    fn test_pull_before_init_fails() {
        let registry = Arc::new(SourceRegistry::new());
        let mut encoder = PassthroughEncoder::routed(registry, Codec::H264, EncoderConfig::default());
        let err = encoder.pull(&raw(1), &[FrameType::Delta]).unwrap_err();
        assert!(matches!(err, PassthruError::Uninitialized(_)));
    }

    #[test]
    fn test_init_rejects_zero_size() {
        let registry = Arc::new(SourceRegistry::new());
        let mut encoder = PassthroughEncoder::routed(registry, Codec::Vp8, EncoderConfig::default());
        let settings = CodecSettings::new(Codec::Vp8, Resolution::new(0, 480));
        assert!(matches!(
            encoder.init(&settings),
            Err(PassthruError::InvalidParameter(_))
        ));
        assert!(!encoder.is_configured());
    }

    #[test]
    fn test_layer_derived_from_settings() {
        let registry = Arc::new(SourceRegistry::new());
        let mut encoder = PassthroughEncoder::routed(registry, Codec::H264, EncoderConfig::default());
        let settings = CodecSettings::new(Codec::H264, Resolution::new(1280, 720))
            .with_simulcast_streams(vec![
                SimulcastStream { width: 640, height: 360, active: true },
                SimulcastStream { width: 1280, height: 720, active: true },
            ]);
        encoder.init(&settings).unwrap();
        assert_eq!(encoder.simulcast_index(), Some(1));
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = Arc::new(SourceRegistry::new());
        let source = EncodedSource::new(&registry, &SourceConfig::default());
        let mut encoder =
            PassthroughEncoder::bound(source.provider(), Codec::H264, EncoderConfig::default());
        encoder
            .init(&CodecSettings::new(Codec::H264, source.resolution()))
            .unwrap();
        encoder
            .register_output_sink(Arc::new(CollectingSink::new()))
            .unwrap();

        encoder.release().unwrap();
        encoder.release().unwrap();
        assert!(!encoder.is_configured());
        assert!(encoder.pull(&raw(1), &[]).is_err());
    }

    #[test]
    fn test_h264_codec_info() {
        let registry = Arc::new(SourceRegistry::new());
        let source = EncodedSource::new(&registry, &SourceConfig::default());
        let sink = Arc::new(CollectingSink::new());
        let mut encoder =
            PassthroughEncoder::bound(source.provider(), Codec::H264, EncoderConfig::default());
        encoder
            .init(&CodecSettings::new(Codec::H264, source.resolution()))
            .unwrap();
        encoder.register_output_sink(sink.clone()).unwrap();

        source.capture_encoded_frame(&[0, 0, 0, 1, 0x65], 10, 0, 1280, 720, true, true);
        let outcome = encoder.pull(&raw(10), &[FrameType::Delta]).unwrap();
        assert_eq!(outcome, EncodeOutcome::Emitted);

        let (image, info) = sink.take().remove(0);
        assert!(image.has_parameter_sets);
        assert_eq!(info.packetization_mode, Some(crate::types::PacketizationMode::NonInterleaved));
        assert_eq!(info.temporal_index, None);
        assert!(info.idr_frame);
    }

    #[test]
    fn test_capabilities() {
        let registry = Arc::new(SourceRegistry::new());
        let encoder = PassthroughEncoder::routed(
            registry,
            Codec::Av1,
            EncoderConfig::default().with_implementation_name("Custom"),
        );
        let info = encoder.describe_capabilities();
        assert_eq!(info.implementation_name, "Custom");
        assert!(info.supports_simulcast);
        assert!(info.has_trusted_rate_controller);
        assert!(!info.scaling_enabled);
        assert!(!info.is_hardware_accelerated);
        assert_eq!(info.preferred_pixel_formats, vec![PixelFormat::I420]);
    }
}
