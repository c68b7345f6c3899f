//! Simulcast layer groups
//!
//! One [`EncodedSource`] per layer so every layer has its own FIFO, routing id
//! and placeholder pump. The host's simulcast adapter gets one
//! [`PassthroughEncoderFactory`] per layer; encoders built by it stamp that
//! layer's index on what they emit.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::encode::PassthroughEncoderFactory;
use crate::error::{PassthruError, Result};
use crate::frame::EncodedFrame;
use crate::host::SimulcastStream;
use crate::registry::SourceRegistry;
use crate::source::EncodedSource;
use crate::types::{Codec, Resolution};

/// Told which layer the pipeline wants a keyframe on
pub trait LayerKeyframeObserver: Send + Sync {
    fn on_layer_keyframe_request(&self, layer: usize);
}

impl<F> LayerKeyframeObserver for F
where
    F: Fn(usize) + Send + Sync,
{
    fn on_layer_keyframe_request(&self, layer: usize) {
        self(layer)
    }
}

/// A group of encoded sources, lowest resolution first
pub struct SimulcastSource {
    codec: Codec,
    layers: Vec<EncodedSource>,
}

impl SimulcastSource {
    /// One layer per resolution, in the order given
    pub fn new(
        registry: &Arc<SourceRegistry>,
        base: &SourceConfig,
        resolutions: &[Resolution],
    ) -> Result<Self> {
        if resolutions.is_empty() {
            return Err(PassthruError::invalid("simulcast needs at least one layer"));
        }

        let layers: Vec<EncodedSource> = resolutions
            .iter()
            .map(|res| {
                let config = base.clone().with_resolution(res.width, res.height);
                EncodedSource::new(registry, &config)
            })
            .collect();

        debug!(
            "Created {} simulcast group with {} layer(s)",
            base.codec,
            layers.len()
        );

        Ok(Self {
            codec: base.codec,
            layers,
        })
    }

    /// `layer_count` layers halving down from the base resolution
    pub fn from_top(
        registry: &Arc<SourceRegistry>,
        base: &SourceConfig,
        layer_count: usize,
    ) -> Result<Self> {
        let resolutions: Vec<Resolution> = (0..layer_count)
            .rev()
            .map(|step| base.resolution.scaled_down(1 << step.min(16)))
            .collect();
        Self::new(registry, base, &resolutions)
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, index: usize) -> Option<&EncodedSource> {
        self.layers.get(index)
    }

    pub fn layers(&self) -> &[EncodedSource] {
        &self.layers
    }

    /// Push one encoded frame into a layer
    ///
    /// Returns false for an unknown layer or an empty payload.
    #[allow(clippy::too_many_arguments)]
    pub fn capture_encoded_frame(
        &self,
        layer: usize,
        data: &[u8],
        capture_time_us: i64,
        rtp_timestamp: u32,
        width: u32,
        height: u32,
        is_keyframe: bool,
        has_parameter_sets: bool,
    ) -> bool {
        match self.layers.get(layer) {
            Some(source) => source.capture_encoded_frame(
                data,
                capture_time_us,
                rtp_timestamp,
                width,
                height,
                is_keyframe,
                has_parameter_sets,
            ),
            None => {
                warn!("No simulcast layer {} (have {})", layer, self.layers.len());
                false
            }
        }
    }

    pub fn capture_frame(&self, layer: usize, frame: EncodedFrame) -> bool {
        match self.layers.get(layer) {
            Some(source) => source.capture_frame(frame),
            None => {
                warn!("No simulcast layer {} (have {})", layer, self.layers.len());
                false
            }
        }
    }

    /// Encoder factory for one layer
    pub fn encoder_factory(&self, layer: usize) -> Option<PassthroughEncoderFactory> {
        self.layers
            .get(layer)
            .map(|source| PassthroughEncoderFactory::new(source).with_simulcast_index(layer as u32))
    }

    /// One encoder factory per layer, in layer order
    pub fn encoder_factories(&self) -> Vec<PassthroughEncoderFactory> {
        (0..self.layers.len())
            .filter_map(|layer| self.encoder_factory(layer))
            .collect()
    }

    /// Route keyframe requests from every layer to one observer
    pub fn set_keyframe_request_observer(&self, observer: Arc<dyn LayerKeyframeObserver>) {
        for (layer, source) in self.layers.iter().enumerate() {
            let observer = observer.clone();
            source.set_keyframe_request_observer(Arc::new(move || {
                observer.on_layer_keyframe_request(layer)
            }));
        }
    }

    /// Simulcast stream list for codec settings
    pub fn simulcast_streams(&self) -> Vec<SimulcastStream> {
        self.layers
            .iter()
            .map(|source| {
                let res = source.resolution();
                SimulcastStream {
                    width: res.width,
                    height: res.height,
                    active: true,
                }
            })
            .collect()
    }
}
