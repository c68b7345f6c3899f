//! Contracts shared with the host media pipeline
//!
//! The host owns capture sources, codec negotiation and the encode thread.
//! passthru plugs into it from both ends: the pump implements
//! [`RawFrameSource`] so the host captures from it, and the passthrough
//! encoder implements [`VideoEncoder`] so the host pulls from it.
//!
//! Every call here is synchronous. `pull` and the sink callbacks run on the
//! host's encode thread and must not block for long.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, SinkError};
use crate::frame::{I420Buffer, RawFrame};
use crate::types::{
    Codec, ColorSpace, FrameType, PacketizationMode, PixelFormat, Resolution, SourceState,
    VideoRotation,
};

/// Identifies a sink registered on a [`RawFrameSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(pub(crate) u64);

/// Receives raw frames from a capture source
pub trait RawFrameSink: Send + Sync {
    fn on_frame(&self, frame: &RawFrame);
}

/// A raw frame capture source as seen by the host pipeline
pub trait RawFrameSource: Send + Sync {
    fn is_screencast(&self) -> bool;

    /// `None` lets the pipeline decide
    fn needs_denoising(&self) -> Option<bool>;

    fn state(&self) -> SourceState;

    fn remote(&self) -> bool;

    /// Deliver one raw frame to every registered sink
    fn push_raw_frame(&self, buffer: Arc<I420Buffer>, timestamp_us: i64);

    fn add_sink(&self, sink: Arc<dyn RawFrameSink>) -> SinkId;

    /// Returns false if the sink was not registered
    fn remove_sink(&self, id: SinkId) -> bool;
}

/// One compressed frame handed back to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: Bytes,
    pub encoded_width: u32,
    pub encoded_height: u32,
    pub rtp_timestamp: u32,
    pub capture_time_ms: i64,
    pub ntp_time_ms: i64,
    pub rotation: VideoRotation,
    pub color_space: Option<ColorSpace>,
    pub frame_type: FrameType,
    pub simulcast_index: Option<u32>,
    /// Parameter sets are inlined in `data`
    pub has_parameter_sets: bool,
}

impl EncodedImage {
    pub fn is_keyframe(&self) -> bool {
        self.frame_type.is_key()
    }
}

/// Codec-specific metadata accompanying an [`EncodedImage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecSpecificInfo {
    pub codec: Codec,
    /// Only set for H.264
    pub packetization_mode: Option<PacketizationMode>,
    /// Temporal layer index; passthrough never produces temporal layers
    pub temporal_index: Option<u8>,
    pub idr_frame: bool,
}

/// Receives encoded images from an encoder
pub trait EncodedImageSink: Send + Sync {
    fn on_encoded_image(
        &self,
        image: &EncodedImage,
        info: &CodecSpecificInfo,
    ) -> std::result::Result<(), SinkError>;
}

/// One simulcast stream in the negotiated codec settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulcastStream {
    pub width: u32,
    pub height: u32,
    pub active: bool,
}

/// Codec settings handed to [`VideoEncoder::init`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecSettings {
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
    pub max_framerate: u32,
    pub start_bitrate_bps: u32,
    pub simulcast_streams: Vec<SimulcastStream>,
}

impl CodecSettings {
    /// Single-stream settings for a codec and resolution
    pub fn new(codec: Codec, resolution: Resolution) -> Self {
        Self {
            codec,
            width: resolution.width,
            height: resolution.height,
            max_framerate: 30,
            start_bitrate_bps: 1_000_000,
            simulcast_streams: Vec::new(),
        }
    }

    pub fn with_max_framerate(mut self, fps: u32) -> Self {
        self.max_framerate = fps;
        self
    }

    pub fn with_simulcast_streams(mut self, streams: Vec<SimulcastStream>) -> Self {
        self.simulcast_streams = streams;
        self
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Index of the simulcast stream whose dimensions match the configured ones
    pub fn matching_stream_index(&self) -> Option<u32> {
        self.simulcast_streams
            .iter()
            .position(|s| s.width == self.width && s.height == self.height)
            .map(|i| i as u32)
    }
}

/// Rate allocation pushed by the pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateHint {
    pub bitrate_bps: u32,
    pub framerate: f64,
}

impl RateHint {
    pub fn new(bitrate_bps: u32, framerate: f64) -> Self {
        Self {
            bitrate_bps,
            framerate,
        }
    }

    /// A zero target bitrate means "stop sending"
    pub fn is_paused(&self) -> bool {
        self.bitrate_bps == 0
    }
}

/// Capabilities an encoder reports to the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInfo {
    pub implementation_name: String,
    pub is_hardware_accelerated: bool,
    pub supports_native_handle: bool,
    pub supports_simulcast: bool,
    /// The pipeline should not drop frames to enforce its own rate control
    pub has_trusted_rate_controller: bool,
    /// The pipeline may downscale input to react to CPU or bandwidth pressure
    pub scaling_enabled: bool,
    pub preferred_pixel_formats: Vec<PixelFormat>,
}

/// Result of a successful pull
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeOutcome {
    /// An image was delivered to the output sink
    Emitted,
    /// Nothing was produced this pull (empty queue, paused or unbound source)
    NoOutput,
}

/// The host pipeline's encoder role
pub trait VideoEncoder: Send {
    fn init(&mut self, settings: &CodecSettings) -> Result<()>;

    fn register_output_sink(&mut self, sink: Arc<dyn EncodedImageSink>) -> Result<()>;

    /// Safe to call repeatedly
    fn release(&mut self) -> Result<()>;

    /// Called once per raw frame the pipeline accepts
    fn pull(&mut self, frame: &RawFrame, frame_types: &[FrameType]) -> Result<EncodeOutcome>;

    fn set_rate_hint(&mut self, hint: RateHint);

    fn describe_capabilities(&self) -> EncoderInfo;
}

/// SDP video format: codec name plus fmtp parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SdpVideoFormat {
    pub name: String,
    pub parameters: BTreeMap<String, String>,
}

impl SdpVideoFormat {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Default format for a codec
    pub fn for_codec(codec: Codec, packetization: PacketizationMode) -> Self {
        let mut format = Self::new(codec.sdp_name());
        if codec == Codec::H264 {
            format = format
                .with_parameter("level-asymmetry-allowed", "1")
                .with_parameter("packetization-mode", packetization.fmtp_value())
                .with_parameter("profile-level-id", "42e01f");
        }
        format
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn codec(&self) -> Option<Codec> {
        Codec::from_sdp_name(&self.name)
    }
}

/// Creates encoders for negotiated formats
pub trait VideoEncoderFactory: Send + Sync {
    fn supported_formats(&self) -> Vec<SdpVideoFormat>;

    /// `None` if this factory cannot serve the format
    fn create(&self, format: &SdpVideoFormat) -> Option<Box<dyn VideoEncoder>>;
}
