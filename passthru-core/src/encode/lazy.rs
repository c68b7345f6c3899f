//! Lazily decided encoder
//!
//! Hosts that create encoders before any frame arrives cannot know whether a
//! track is fed by an encoded source or by an ordinary camera. `LazyEncoder`
//! caches `init`, the output sink and the last rate hint, and on the first
//! pull picks passthrough (the raw frame carries a registered routing id) or a
//! real encoder from the fallback creator. Everything cached is replayed into
//! the chosen encoder.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::EncoderConfig;
use crate::error::{PassthruError, Result};
use crate::frame::RawFrame;
use crate::host::{
    CodecSettings, EncodeOutcome, EncodedImageSink, EncoderInfo, RateHint, SdpVideoFormat,
    VideoEncoder, VideoEncoderFactory,
};
use crate::registry::SourceRegistry;
use crate::types::{Codec, FrameType, PixelFormat};

use super::PassthroughEncoder;

/// Builds the real encoder used when a track is not passthrough
pub type EncoderCreator =
    Arc<dyn Fn(&SdpVideoFormat) -> Option<Box<dyn VideoEncoder>> + Send + Sync>;

/// Which encoder a [`LazyEncoder`] settled on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyMode {
    Undecided,
    Passthrough,
    Fallback,
}

/// Encoder that picks passthrough or a real encoder on the first pull
pub struct LazyEncoder {
    format: SdpVideoFormat,
    codec: Codec,
    registry: Arc<SourceRegistry>,
    fallback: EncoderCreator,
    config: EncoderConfig,
    settings: Option<CodecSettings>,
    sink: Option<Arc<dyn EncodedImageSink>>,
    rate: Option<RateHint>,
    inner: Option<Box<dyn VideoEncoder>>,
    mode: LazyMode,
}

impl LazyEncoder {
    pub fn new(
        format: SdpVideoFormat,
        registry: Arc<SourceRegistry>,
        fallback: EncoderCreator,
    ) -> Result<Self> {
        let codec = format
            .codec()
            .ok_or_else(|| PassthruError::UnknownCodec(format.name.clone()))?;
        Ok(Self {
            format,
            codec,
            registry,
            fallback,
            config: EncoderConfig::default(),
            settings: None,
            sink: None,
            rate: None,
            inner: None,
            mode: LazyMode::Undecided,
        })
    }

    pub fn with_config(mut self, config: EncoderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn mode(&self) -> LazyMode {
        self.mode
    }

    fn decide(&mut self, frame: &RawFrame) -> Result<Box<dyn VideoEncoder>> {
        let passthrough = frame
            .source_id
            .is_some_and(|id| self.registry.contains(id));

        let mut encoder: Box<dyn VideoEncoder> = if passthrough {
            self.mode = LazyMode::Passthrough;
            Box::new(PassthroughEncoder::routed(
                self.registry.clone(),
                self.codec,
                self.config.clone(),
            ))
        } else {
            self.mode = LazyMode::Fallback;
            (self.fallback)(&self.format).ok_or_else(|| {
                PassthruError::EncoderUnavailable(format!(
                    "no fallback encoder for {}",
                    self.format.name
                ))
            })?
        };

        info!("Lazy encoder for {} chose {:?}", self.format.name, self.mode);

        if let Some(settings) = &self.settings {
            encoder.init(settings)?;
        }
        if let Some(sink) = &self.sink {
            encoder.register_output_sink(sink.clone())?;
        }
        if let Some(rate) = self.rate {
            encoder.set_rate_hint(rate);
        }
        Ok(encoder)
    }
}

impl VideoEncoder for LazyEncoder {
    fn init(&mut self, settings: &CodecSettings) -> Result<()> {
        self.settings = Some(settings.clone());
        match self.inner.as_mut() {
            Some(inner) => inner.init(settings),
            None => Ok(()),
        }
    }

    fn register_output_sink(&mut self, sink: Arc<dyn EncodedImageSink>) -> Result<()> {
        self.sink = Some(sink.clone());
        match self.inner.as_mut() {
            Some(inner) => inner.register_output_sink(sink),
            None => Ok(()),
        }
    }

    fn release(&mut self) -> Result<()> {
        self.settings = None;
        self.sink = None;
        self.mode = LazyMode::Undecided;
        match self.inner.take() {
            Some(mut inner) => inner.release(),
            None => Ok(()),
        }
    }

    fn pull(&mut self, frame: &RawFrame, frame_types: &[FrameType]) -> Result<EncodeOutcome> {
        if self.settings.is_none() || self.sink.is_none() {
            return Err(PassthruError::uninitialized(
                "lazy encoder needs init() and an output sink before the first pull",
            ));
        }

        if self.inner.is_none() {
            let encoder = self.decide(frame)?;
            self.inner = Some(encoder);
        }

        match self.inner.as_mut() {
            Some(inner) => inner.pull(frame, frame_types),
            None => Err(PassthruError::uninitialized("no encoder selected")),
        }
    }

    fn set_rate_hint(&mut self, hint: RateHint) {
        self.rate = Some(hint);
        if let Some(inner) = self.inner.as_mut() {
            inner.set_rate_hint(hint);
        }
    }

    fn describe_capabilities(&self) -> EncoderInfo {
        match &self.inner {
            Some(inner) => inner.describe_capabilities(),
            None => EncoderInfo {
                implementation_name: "LazyEncoder".to_string(),
                is_hardware_accelerated: false,
                supports_native_handle: false,
                supports_simulcast: true,
                has_trusted_rate_controller: false,
                scaling_enabled: false,
                preferred_pixel_formats: vec![PixelFormat::I420],
            },
        }
    }
}

/// Factory producing [`LazyEncoder`]s for a fixed list of formats
pub struct LazyEncoderFactory {
    formats: Vec<SdpVideoFormat>,
    registry: Arc<SourceRegistry>,
    fallback: EncoderCreator,
    config: EncoderConfig,
}

impl LazyEncoderFactory {
    pub fn new(
        formats: Vec<SdpVideoFormat>,
        registry: Arc<SourceRegistry>,
        fallback: EncoderCreator,
    ) -> Self {
        Self {
            formats,
            registry,
            fallback,
            config: EncoderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EncoderConfig) -> Self {
        self.config = config;
        self
    }
}

impl VideoEncoderFactory for LazyEncoderFactory {
    fn supported_formats(&self) -> Vec<SdpVideoFormat> {
        self.formats.clone()
    }

    fn create(&self, format: &SdpVideoFormat) -> Option<Box<dyn VideoEncoder>> {
        if !self
            .formats
            .iter()
            .any(|f| f.name.eq_ignore_ascii_case(&format.name))
        {
            debug!("Lazy factory does not serve {}", format.name);
            return None;
        }

        let encoder = LazyEncoder::new(format.clone(), self.registry.clone(), self.fallback.clone())
            .ok()?
            .with_config(self.config.clone());
        Some(Box::new(encoder))
    }
}
