//! H.264 Annex-B reader
//!
//! Splits a byte stream into NAL units, groups them into access units and
//! makes every keyframe self-contained by prepending the latest SPS/PPS when
//! the access unit lacks them. Access units before the first decodable
//! keyframe are dropped.

use tracing::{debug, warn};

pub const NAL_SLICE: u8 = 1;
pub const NAL_IDR: u8 = 5;
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;

/// One NAL unit, start code included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit<'a> {
    /// Start code plus NAL bytes
    pub data: &'a [u8],
    /// Start code length (3 or 4)
    pub start_code_len: usize,
}

impl<'a> NalUnit<'a> {
    /// NAL bytes without the start code
    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.start_code_len..]
    }

    pub fn nal_type(&self) -> u8 {
        self.payload().first().map(|b| b & 0x1f).unwrap_or(0)
    }

    pub fn is_vcl(&self) -> bool {
        matches!(self.nal_type(), NAL_SLICE | NAL_IDR)
    }

    /// first_mb_in_slice == 0, i.e. the first slice of a picture
    fn starts_picture(&self) -> bool {
        self.payload().get(1).is_some_and(|b| b & 0x80 != 0)
    }
}

/// Position and length of the start code at or after `from`
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                return Some((i, 3));
            }
            if data[i + 2] == 0 && data.get(i + 3) == Some(&1) {
                return Some((i, 4));
            }
        }
        i += 1;
    }
    None
}

/// Split an Annex-B stream into NAL units
///
/// Bytes before the first start code are ignored.
pub fn split_nal_units(data: &[u8]) -> Vec<NalUnit<'_>> {
    let mut units = Vec::new();
    let Some((mut start, mut sc_len)) = find_start_code(data, 0) else {
        return units;
    };

    loop {
        let next = find_start_code(data, start + sc_len);
        let end = next.map(|(pos, _)| pos).unwrap_or(data.len());
        if end > start + sc_len {
            units.push(NalUnit {
                data: &data[start..end],
                start_code_len: sc_len,
            });
        }
        match next {
            Some((pos, len)) => {
                start = pos;
                sc_len = len;
            }
            None => break,
        }
    }

    units
}

/// Group NAL units into access units
pub fn group_access_units<'a>(units: &[NalUnit<'a>]) -> Vec<Vec<NalUnit<'a>>> {
    let mut access_units = Vec::new();
    let mut current: Vec<NalUnit<'a>> = Vec::new();
    let mut has_vcl = false;

    for unit in units {
        let starts_new = match unit.nal_type() {
            NAL_AUD | NAL_SPS | NAL_PPS | NAL_SEI => has_vcl,
            NAL_SLICE | NAL_IDR => has_vcl && unit.starts_picture(),
            _ => false,
        };

        if starts_new {
            access_units.push(std::mem::take(&mut current));
            has_vcl = false;
        }

        has_vcl |= unit.is_vcl();
        current.push(*unit);
    }

    if !current.is_empty() {
        access_units.push(current);
    }
    access_units
}

/// One self-contained frame ready to push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFrame {
    pub data: Vec<u8>,
    pub is_keyframe: bool,
    pub has_parameter_sets: bool,
}

/// Turns access units into pushable frames
#[derive(Debug, Default)]
pub struct FrameAssembler {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    seen_keyframe: bool,
    dropped: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Access units dropped while waiting for a decodable keyframe
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Assemble one access unit, or `None` if it must be dropped
    pub fn push(&mut self, access_unit: &[NalUnit<'_>]) -> Option<AssembledFrame> {
        let mut has_sps = false;
        let mut has_pps = false;
        let mut is_keyframe = false;

        for unit in access_unit {
            match unit.nal_type() {
                NAL_SPS => {
                    has_sps = true;
                    self.sps = Some(unit.data.to_vec());
                }
                NAL_PPS => {
                    has_pps = true;
                    self.pps = Some(unit.data.to_vec());
                }
                NAL_IDR => is_keyframe = true,
                _ => {}
            }
        }

        if !access_unit.iter().any(NalUnit::is_vcl) {
            debug!("Skipping access unit without slices");
            return None;
        }

        let mut data = Vec::new();
        if is_keyframe {
            if !has_sps {
                if let Some(sps) = &self.sps {
                    data.extend_from_slice(sps);
                    has_sps = true;
                }
            }
            if !has_pps {
                if let Some(pps) = &self.pps {
                    data.extend_from_slice(pps);
                    has_pps = true;
                }
            }
        }
        let has_parameter_sets = has_sps && has_pps;

        if !self.seen_keyframe {
            if !(is_keyframe && has_parameter_sets) {
                self.dropped += 1;
                return None;
            }
            self.seen_keyframe = true;
            if self.dropped > 0 {
                warn!(
                    "Dropped {} access unit(s) before the first keyframe",
                    self.dropped
                );
            }
        }

        for unit in access_unit {
            data.extend_from_slice(unit.data);
        }

        Some(AssembledFrame {
            data,
            is_keyframe,
            has_parameter_sets,
        })
    }
}

/// Read a whole Annex-B stream into frames
pub fn assemble_stream(data: &[u8]) -> (Vec<AssembledFrame>, usize) {
    let units = split_nal_units(data);
    let mut assembler = FrameAssembler::new();
    let frames = group_access_units(&units)
        .iter()
        .filter_map(|au| assembler.push(au))
        .collect();
    (frames, assembler.dropped())
}
