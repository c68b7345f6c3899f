//! IVF reader for VP8, VP9 and AV1

use anyhow::{bail, Context, Result};
use passthru_core::Codec;

pub const IVF_SIGNATURE: &[u8; 4] = b"DKIF";
const FRAME_HEADER_LEN: usize = 12;

/// IVF file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfHeader {
    pub codec: Codec,
    pub width: u16,
    pub height: u16,
    /// Timebase denominator
    pub timebase_rate: u32,
    /// Timebase numerator
    pub timebase_scale: u32,
    pub frame_count: u32,
}

impl IvfHeader {
    /// Convert a frame timestamp to the 90 kHz RTP clock
    pub fn to_rtp(&self, timestamp: u64) -> u32 {
        if self.timebase_rate == 0 {
            return 0;
        }
        let ticks = u128::from(timestamp) * u128::from(self.timebase_scale) * 90_000
            / u128::from(self.timebase_rate);
        ticks as u32
    }
}

/// One IVF frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvfFrame<'a> {
    pub data: &'a [u8],
    pub timestamp: u64,
}

pub fn is_ivf(data: &[u8]) -> bool {
    data.starts_with(IVF_SIGNATURE)
}

fn u16_at(data: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([data[pos], data[pos + 1]])
}

fn u32_at(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// Parse a whole IVF file
pub fn parse(data: &[u8]) -> Result<(IvfHeader, Vec<IvfFrame<'_>>)> {
    if !is_ivf(data) {
        bail!("Missing DKIF signature");
    }
    if data.len() < 32 {
        bail!("IVF header truncated ({} bytes)", data.len());
    }

    let header_len = usize::from(u16_at(data, 6));
    let fourcc: [u8; 4] = [data[8], data[9], data[10], data[11]];
    let codec = Codec::from_ivf_fourcc(&fourcc).with_context(|| {
        format!(
            "Unsupported IVF fourcc {:?}",
            String::from_utf8_lossy(&fourcc)
        )
    })?;

    let header = IvfHeader {
        codec,
        width: u16_at(data, 12),
        height: u16_at(data, 14),
        timebase_rate: u32_at(data, 16),
        timebase_scale: u32_at(data, 20),
        frame_count: u32_at(data, 24),
    };

    let mut frames = Vec::new();
    let mut pos = header_len.max(32);
    while pos + FRAME_HEADER_LEN <= data.len() {
        let size = u32_at(data, pos) as usize;
        let timestamp = u64::from(u32_at(data, pos + 4)) | (u64::from(u32_at(data, pos + 8)) << 32);
        let start = pos + FRAME_HEADER_LEN;
        let end = start + size;
        if end > data.len() {
            tracing::warn!("IVF frame at offset {} truncated, stopping", pos);
            break;
        }
        if size > 0 {
            frames.push(IvfFrame {
                data: &data[start..end],
                timestamp,
            });
        }
        pos = end;
    }

    Ok((header, frames))
}

/// Whether a frame is a keyframe, from its uncompressed header
pub fn is_keyframe(codec: Codec, data: &[u8]) -> bool {
    match codec {
        Codec::Vp8 => data.first().is_some_and(|b| b & 0x01 == 0),
        Codec::Vp9 => vp9_is_keyframe(data),
        Codec::Av1 => av1_has_sequence_header(data),
        Codec::H264 | Codec::H265 => false,
    }
}

fn vp9_is_keyframe(data: &[u8]) -> bool {
    let mut bits = BitReader::new(data);
    // frame_marker
    if bits.read(2) != Some(0b10) {
        return false;
    }
    let profile_low = bits.read(1).unwrap_or(0);
    let profile_high = bits.read(1).unwrap_or(0);
    if (profile_high << 1) | profile_low == 3 {
        bits.read(1);
    }
    // show_existing_frame
    if bits.read(1) != Some(0) {
        return false;
    }
    bits.read(1) == Some(0)
}

/// AV1 temporal units starting a new coded video sequence carry a sequence header
fn av1_has_sequence_header(data: &[u8]) -> bool {
    const OBU_SEQUENCE_HEADER: u8 = 1;

    let mut pos = 0;
    while pos < data.len() {
        let header = data[pos];
        let obu_type = (header >> 3) & 0x0f;
        let has_extension = header & 0x04 != 0;
        let has_size = header & 0x02 != 0;

        if obu_type == OBU_SEQUENCE_HEADER {
            return true;
        }

        pos += 1 + usize::from(has_extension);
        if !has_size {
            return false;
        }
        let Some((size, len)) = read_leb128(&data[pos.min(data.len())..]) else {
            return false;
        };
        pos += len + size;
    }
    false
}

fn read_leb128(data: &[u8]) -> Option<(usize, usize)> {
    let mut value: u64 = 0;
    for (i, byte) in data.iter().take(8).enumerate() {
        value |= u64::from(byte & 0x7f) << (i * 7);
        if byte & 0x80 == 0 {
            return Some((usize::try_from(value).ok()?, i + 1));
        }
    }
    None
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read(&mut self, count: usize) -> Option<u8> {
        let mut value = 0u8;
        for _ in 0..count {
            let byte = *self.data.get(self.pos / 8)?;
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | bit;
            self.pos += 1;
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ivf(fourcc: &[u8; 4], frames: &[(&[u8], u64)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"DKIF");
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&32u16.to_le_bytes());
        data.extend_from_slice(fourcc);
        data.extend_from_slice(&640u16.to_le_bytes());
        data.extend_from_slice(&480u16.to_le_bytes());
        data.extend_from_slice(&30u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&(frames.len() as u32).to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        for (payload, ts) in frames {
            data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            data.extend_from_slice(&ts.to_le_bytes());
            data.extend_from_slice(payload);
        }
        data
    }

    #[test]
    fn test_parse_vp8() {
        let data = ivf(b"VP80", &[(&[0x10, 0x02], 0), (&[0x11], 1)]);
        let (header, frames) = parse(&data).unwrap();
        assert_eq!(header.codec, Codec::Vp8);
        assert_eq!(header.width, 640);
        assert_eq!(frames.len(), 2);
        assert!(is_keyframe(Codec::Vp8, frames[0].data));
        assert!(!is_keyframe(Codec::Vp8, frames[1].data));
        assert_eq!(header.to_rtp(frames[1].timestamp), 3000);
    }

    #[test]
    fn test_unknown_fourcc_rejected() {
        let data = ivf(b"XVID", &[]);
        assert!(parse(&data).is_err());
        assert!(parse(b"RIFF").is_err());
    }

    #[test]
    fn test_vp9_keyframe_bits() {
        // marker 10, profile 0, show_existing 0, frame_type 0
        assert!(vp9_is_keyframe(&[0b1000_0000]));
        // frame_type 1
        assert!(!vp9_is_keyframe(&[0b1000_0100]));
        // show_existing_frame
        assert!(!vp9_is_keyframe(&[0b1000_1000]));
    }

    #[test]
    fn test_av1_sequence_header() {
        // temporal delimiter (type 2, size 0) then sequence header (type 1)
        let key = [0x12, 0x00, 0x0a, 0x01, 0x00];
        assert!(av1_has_sequence_header(&key));
        // temporal delimiter then frame OBU (type 6)
        let delta = [0x12, 0x00, 0x32, 0x01, 0x00];
        assert!(!av1_has_sequence_header(&delta));
    }
}
