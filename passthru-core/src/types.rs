//! Core types for passthru
//!
//! Identifiers, codec tags and the small value types shared by sources,
//! encoders and the host pipeline contracts.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::PassthruError;

/// Global counter for routing ids
static ROUTING_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Routing key that ties placeholder raw frames back to their encoded source
///
/// Ids are allocated from a process-wide monotonically increasing counter and
/// are never reused, so a stale id can only ever miss in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoutingId(u64);

impl RoutingId {
    /// Allocate a new unique routing id
    pub fn next() -> Self {
        Self(ROUTING_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw id value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RoutingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RoutingId({})", self.0)
    }
}

/// Video codec carried by an encoded source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Vp8,
    Vp9,
    Av1,
    /// H.264 / AVC
    #[default]
    H264,
    /// H.265 / HEVC
    H265,
}

impl Codec {
    /// All codecs the passthrough encoder can carry
    pub const ALL: [Codec; 5] = [Codec::Vp8, Codec::Vp9, Codec::Av1, Codec::H264, Codec::H265];

    /// Codec name as negotiated in SDP
    pub fn sdp_name(&self) -> &'static str {
        match self {
            Self::Vp8 => "VP8",
            Self::Vp9 => "VP9",
            Self::Av1 => "AV1",
            Self::H264 => "H264",
            Self::H265 => "H265",
        }
    }

    /// Look up a codec by its SDP name (case-insensitive)
    pub fn from_sdp_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|codec| codec.sdp_name().eq_ignore_ascii_case(name))
    }

    /// IVF container fourcc, for codecs IVF can carry
    pub fn ivf_fourcc(&self) -> Option<[u8; 4]> {
        match self {
            Self::Vp8 => Some(*b"VP80"),
            Self::Vp9 => Some(*b"VP90"),
            Self::Av1 => Some(*b"AV01"),
            Self::H264 | Self::H265 => None,
        }
    }

    /// Look up a codec by IVF fourcc
    pub fn from_ivf_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|codec| codec.ivf_fourcc().as_ref() == Some(fourcc))
    }

    /// Get the codec name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Vp8 => "VP8",
            Self::Vp9 => "VP9",
            Self::Av1 => "AV1",
            Self::H264 => "H.264",
            Self::H265 => "HEVC",
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for Codec {
    type Err = PassthruError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vp8" => Ok(Self::Vp8),
            "vp9" => Ok(Self::Vp9),
            "av1" => Ok(Self::Av1),
            "h264" | "avc" | "264" => Ok(Self::H264),
            "h265" | "hevc" | "265" => Ok(Self::H265),
            _ => Err(PassthruError::UnknownCodec(s.to_string())),
        }
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are non-zero
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Scale both dimensions down by `factor`, never below 1
    pub fn scaled_down(&self, factor: u32) -> Self {
        let factor = factor.max(1);
        Self {
            width: (self.width / factor).max(1),
            height: (self.height / factor).max(1),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Frame type requested by the pipeline or reported on an encoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Key,
    Delta,
}

impl FrameType {
    pub fn from_keyframe(is_keyframe: bool) -> Self {
        if is_keyframe { Self::Key } else { Self::Delta }
    }

    pub fn is_key(&self) -> bool {
        matches!(self, Self::Key)
    }
}

/// Frame rotation carried through for pipeline bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VideoRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

/// Colour space metadata attached to a raw frame
///
/// Values follow the ITU-T H.273 code points; the passthrough path copies them
/// verbatim and never interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorSpace {
    pub primaries: u8,
    pub transfer: u8,
    pub matrix: u8,
    pub full_range: bool,
}

impl ColorSpace {
    /// BT.709 limited range
    pub fn bt709() -> Self {
        Self {
            primaries: 1,
            transfer: 1,
            matrix: 1,
            full_range: false,
        }
    }
}

/// Capture state reported by a raw frame source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceState {
    Live,
    Ended,
    Muted,
}

/// Raw pixel layout an encoder prefers as input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    I420,
    Nv12,
}

/// H.264 RTP packetization mode (RFC 6184)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PacketizationMode {
    /// Mode 0: one NAL unit per packet
    SingleNalUnit,
    /// Mode 1: FU-A / STAP-A allowed
    #[default]
    NonInterleaved,
}

impl PacketizationMode {
    /// Value of the `packetization-mode` fmtp parameter
    pub fn fmtp_value(&self) -> &'static str {
        match self {
            Self::SingleNalUnit => "0",
            Self::NonInterleaved => "1",
        }
    }
}

impl std::str::FromStr for PacketizationMode {
    type Err = PassthruError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "0" | "single-nal-unit" | "single" => Ok(Self::SingleNalUnit),
            "1" | "non-interleaved" => Ok(Self::NonInterleaved),
            _ => Err(PassthruError::config(format!(
                "Unknown packetization mode: {}",
                s
            ))),
        }
    }
}
