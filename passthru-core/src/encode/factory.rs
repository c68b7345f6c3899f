//! Encoder factory for passthrough encoders

use std::sync::Arc;
use tracing::debug;

use crate::config::EncoderConfig;
use crate::host::{SdpVideoFormat, VideoEncoder, VideoEncoderFactory};
use crate::registry::SourceRegistry;
use crate::source::{EncodedSource, FrameProvider};
use crate::types::Codec;

use super::PassthroughEncoder;

enum FactoryBinding {
    Source {
        provider: Arc<dyn FrameProvider>,
        codec: Codec,
    },
    Routed(Arc<SourceRegistry>),
}

/// Creates passthrough encoders for one source, or for whatever source a
/// raw frame is routed from
///
/// A source-bound factory is what a simulcast adapter wants as its inner
/// factory: one per layer, each encoder pinned to that layer's source.
pub struct PassthroughEncoderFactory {
    binding: FactoryBinding,
    config: EncoderConfig,
    simulcast_index: Option<u32>,
}

impl PassthroughEncoderFactory {
    /// Factory bound to a single source
    pub fn new(source: &EncodedSource) -> Self {
        Self {
            binding: FactoryBinding::Source {
                provider: source.provider(),
                codec: source.codec(),
            },
            config: EncoderConfig::default(),
            simulcast_index: None,
        }
    }

    /// Factory whose encoders look up their source per pull
    pub fn routed(registry: Arc<SourceRegistry>) -> Self {
        Self {
            binding: FactoryBinding::Routed(registry),
            config: EncoderConfig::default(),
            simulcast_index: None,
        }
    }

    pub fn with_config(mut self, config: EncoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Stamp this layer index on every encoder created
    pub fn with_simulcast_index(mut self, index: u32) -> Self {
        self.simulcast_index = Some(index);
        self
    }

    /// Whether this factory can serve the given SDP codec name
    pub fn has_source_for_codec(&self, name: &str) -> bool {
        match &self.binding {
            FactoryBinding::Source { codec, .. } => codec.sdp_name().eq_ignore_ascii_case(name),
            FactoryBinding::Routed(registry) => registry.has_source_for_codec(name),
        }
    }
}

impl VideoEncoderFactory for PassthroughEncoderFactory {
    fn supported_formats(&self) -> Vec<SdpVideoFormat> {
        let codecs = match &self.binding {
            FactoryBinding::Source { codec, .. } => vec![*codec],
            FactoryBinding::Routed(registry) => registry.codecs(),
        };
        codecs
            .into_iter()
            .map(|codec| SdpVideoFormat::for_codec(codec, self.config.packetization_mode))
            .collect()
    }

    fn create(&self, format: &SdpVideoFormat) -> Option<Box<dyn VideoEncoder>> {
        if !self.has_source_for_codec(&format.name) {
            debug!("No passthrough source for format {}", format.name);
            return None;
        }
        let codec = format.codec()?;

        let encoder = match &self.binding {
            FactoryBinding::Source { provider, .. } => {
                PassthroughEncoder::bound(provider.clone(), codec, self.config.clone())
            }
            FactoryBinding::Routed(registry) => {
                PassthroughEncoder::routed(registry.clone(), codec, self.config.clone())
            }
        };

        let encoder = match self.simulcast_index {
            Some(index) => encoder.with_simulcast_index(index),
            None => encoder,
        };

        debug!("Created passthrough encoder for {}", format.name);
        Some(Box::new(encoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;

    #[test]
    fn test_bound_factory_formats() {
        let registry = Arc::new(SourceRegistry::new());
        let source = EncodedSource::new(&registry, &SourceConfig::new(Codec::Vp9, 640, 360));
        let factory = PassthroughEncoderFactory::new(&source);

        let formats = factory.supported_formats();
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].name, "VP9");

        assert!(factory.create(&SdpVideoFormat::new("vp9")).is_some());
        assert!(factory.create(&SdpVideoFormat::new("H264")).is_none());
    }

    #[test]
    fn test_routed_factory_tracks_registry() {
        let registry = Arc::new(SourceRegistry::new());
        let factory = PassthroughEncoderFactory::routed(registry.clone());
        assert!(factory.supported_formats().is_empty());
        assert!(!factory.has_source_for_codec("H264"));

        let source = EncodedSource::new(&registry, &SourceConfig::new(Codec::H264, 640, 360));
        let formats = factory.supported_formats();
        assert_eq!(formats.len(), 1);
        assert_eq!(
            formats[0].parameters.get("packetization-mode").map(String::as_str),
            Some("1")
        );
        assert!(factory.create(&formats[0]).is_some());

        drop(source);
        assert!(factory.supported_formats().is_empty());
    }
}
