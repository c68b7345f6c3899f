//! Frame records
//!
//! [`EncodedFrame`] is the compressed payload supplied by the application.
//! [`RawFrame`] is what the host pipeline sees: a placeholder image whose only
//! job is to trigger one encoder pull.

use bytes::Bytes;
use std::sync::Arc;

use crate::error::{PassthruError, Result};
use crate::types::{ColorSpace, Resolution, RoutingId, VideoRotation};

/// One pre-encoded video frame plus its metadata
///
/// Owned by a source queue until an encoder moves it out. The payload is never
/// empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    payload: Bytes,
    capture_time_us: i64,
    rtp_timestamp: u32,
    width: u32,
    height: u32,
    is_keyframe: bool,
    has_parameter_sets: bool,
}

impl EncodedFrame {
    /// Create a delta frame with the given payload and declared dimensions
    pub fn new(payload: impl Into<Bytes>, width: u32, height: u32) -> Result<Self> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(PassthruError::EmptyPayload);
        }
        Ok(Self {
            payload,
            capture_time_us: 0,
            rtp_timestamp: 0,
            width,
            height,
            is_keyframe: false,
            has_parameter_sets: false,
        })
    }

    /// Set the capture time in microseconds (0 = use wall clock)
    pub fn with_capture_time_us(mut self, capture_time_us: i64) -> Self {
        self.capture_time_us = capture_time_us;
        self
    }

    /// Set the RTP timestamp (0 = inherit from the pipeline)
    pub fn with_rtp_timestamp(mut self, rtp_timestamp: u32) -> Self {
        self.rtp_timestamp = rtp_timestamp;
        self
    }

    /// Mark the frame as a keyframe (IDR for H.264)
    pub fn with_keyframe(mut self, is_keyframe: bool) -> Self {
        self.is_keyframe = is_keyframe;
        self
    }

    /// Mark that SPS/PPS (or the codec's equivalent) are inlined
    pub fn with_parameter_sets(mut self, has_parameter_sets: bool) -> Self {
        self.has_parameter_sets = has_parameter_sets;
        self
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn capture_time_us(&self) -> i64 {
        self.capture_time_us
    }

    pub fn rtp_timestamp(&self) -> u32 {
        self.rtp_timestamp
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn is_keyframe(&self) -> bool {
        self.is_keyframe
    }

    pub fn has_parameter_sets(&self) -> bool {
        self.has_parameter_sets
    }
}

/// Planar I420 pixel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I420Buffer {
    width: u32,
    height: u32,
    data: Bytes,
}

impl I420Buffer {
    /// Create a black buffer (Y = 0, U = V = 128)
    pub fn black(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let luma = (width * height) as usize;
        let chroma = (width.div_ceil(2) * height.div_ceil(2)) as usize;

        let mut data = vec![0u8; luma + 2 * chroma];
        data[luma..].fill(128);

        Self {
            width,
            height,
            data: Bytes::from(data),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// All three planes, tightly packed
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A raw frame as delivered to the encoder by the host pipeline
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Pixel buffer (a placeholder for encoded sources)
    pub buffer: Arc<I420Buffer>,
    /// Capture timestamp in microseconds
    pub timestamp_us: i64,
    /// RTP timestamp assigned by the pipeline (90 kHz)
    pub rtp_timestamp: u32,
    /// NTP time in milliseconds (0 if unknown)
    pub ntp_time_ms: i64,
    pub rotation: VideoRotation,
    pub color_space: Option<ColorSpace>,
    /// Routing id of the encoded source that emitted this frame
    pub source_id: Option<RoutingId>,
}

impl RawFrame {
    /// Create a raw frame with no routing id and no pipeline timestamps
    pub fn new(buffer: Arc<I420Buffer>, timestamp_us: i64) -> Self {
        Self {
            buffer,
            timestamp_us,
            rtp_timestamp: 0,
            ntp_time_ms: 0,
            rotation: VideoRotation::Deg0,
            color_space: None,
            source_id: None,
        }
    }

    pub fn with_source_id(mut self, id: RoutingId) -> Self {
        self.source_id = Some(id);
        self
    }

    pub fn with_rtp_timestamp(mut self, rtp_timestamp: u32) -> Self {
        self.rtp_timestamp = rtp_timestamp;
        self
    }

    /// Render time in milliseconds, derived from the capture timestamp
    pub fn render_time_ms(&self) -> i64 {
        self.timestamp_us / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_rejected() {
        let err = EncodedFrame::new(Vec::<u8>::new(), 640, 480).unwrap_err();
        assert!(matches!(err, PassthruError::EmptyPayload));
    }

    #[test]
    fn test_builder_sets_metadata() {
        let frame = EncodedFrame::new(vec![0x65, 0x88], 1920, 1080)
            .unwrap()
            .with_capture_time_us(33_000)
            .with_rtp_timestamp(2970)
            .with_keyframe(true)
            .with_parameter_sets(true);

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.capture_time_us(), 33_000);
        assert_eq!(frame.rtp_timestamp(), 2970);
        assert_eq!(frame.resolution(), Resolution::new(1920, 1080));
        assert!(frame.is_keyframe());
        assert!(frame.has_parameter_sets());
    }

    #[test]
    fn test_black_buffer_layout() {
        let buffer = I420Buffer::black(2, 2);
        assert_eq!(buffer.data(), &[0, 0, 0, 0, 128, 128]);

        // Odd sizes round chroma up
        let odd = I420Buffer::black(3, 3);
        assert_eq!(odd.data().len(), 9 + 2 * 4);
    }

    #[test]
    fn test_render_time() {
        let frame = RawFrame::new(Arc::new(I420Buffer::black(2, 2)), 1_234_567);
        assert_eq!(frame.render_time_ms(), 1234);
        assert!(frame.source_id.is_none());
    }
}
