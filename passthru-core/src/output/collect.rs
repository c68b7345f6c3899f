//! In-memory output

use parking_lot::Mutex;

use crate::error::SinkError;
use crate::host::{CodecSpecificInfo, EncodedImage, EncodedImageSink};

/// Keeps every emitted image in order
#[derive(Default)]
pub struct CollectingSink {
    images: Mutex<Vec<(EncodedImage, CodecSpecificInfo)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.lock().is_empty()
    }

    /// Copy of the collected images
    pub fn images(&self) -> Vec<EncodedImage> {
        self.images.lock().iter().map(|(image, _)| image.clone()).collect()
    }

    /// Drain everything collected so far
    pub fn take(&self) -> Vec<(EncodedImage, CodecSpecificInfo)> {
        std::mem::take(&mut *self.images.lock())
    }
}

impl EncodedImageSink for CollectingSink {
    fn on_encoded_image(
        &self,
        image: &EncodedImage,
        info: &CodecSpecificInfo,
    ) -> Result<(), SinkError> {
        self.images.lock().push((image.clone(), *info));
        Ok(())
    }
}
