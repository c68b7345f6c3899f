//! Broadcast channel output

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::SinkError;
use crate::host::{CodecSpecificInfo, EncodedImage, EncodedImageSink};

use super::DEFAULT_CHANNEL_CAPACITY;

/// One image as published on the channel
#[derive(Debug, Clone)]
pub struct EmittedImage {
    pub image: EncodedImage,
    pub info: CodecSpecificInfo,
}

/// Publishes emitted images to every subscriber
///
/// Sending never fails the encoder: with no subscribers the image is simply
/// dropped, and slow subscribers see `Lagged`.
pub struct ChannelSink {
    tx: broadcast::Sender<Arc<EmittedImage>>,
}

impl ChannelSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to emitted images
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EmittedImage>> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodedImageSink for ChannelSink {
    fn on_encoded_image(
        &self,
        image: &EncodedImage,
        info: &CodecSpecificInfo,
    ) -> Result<(), SinkError> {
        let emitted = Arc::new(EmittedImage {
            image: image.clone(),
            info: *info,
        });
        // Ignore send errors (no receivers)
        let receivers = self.tx.send(emitted).unwrap_or(0);
        trace!("Published image to {} receiver(s)", receivers);
        Ok(())
    }
}
