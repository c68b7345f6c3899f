//! Configuration types for passthru
//!
//! Runtime settings for encoded sources, the placeholder pump and the
//! passthrough encoder. File-backed defaults live in [`ConfigFile`].

mod file;

pub use file::{sample_config, ConfigFile};

use serde::{Deserialize, Serialize};

use crate::types::{Codec, PacketizationMode, Resolution};

/// Placeholder frame settings for the raw-frame pump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpConfig {
    /// Placeholder image width (never encoded)
    pub placeholder_width: u32,
    /// Placeholder image height (never encoded)
    pub placeholder_height: u32,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            placeholder_width: 2,
            placeholder_height: 2,
        }
    }
}

/// Settings for one encoded source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Codec of the injected bitstream
    pub codec: Codec,
    /// Declared stream resolution
    pub resolution: Resolution,
    /// Placeholder pump settings
    pub pump: PumpConfig,
    /// Log a warning when the queue grows past this depth (0 = never)
    pub queue_warn_depth: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            codec: Codec::H264,
            resolution: Resolution::new(1280, 720),
            pump: PumpConfig::default(),
            queue_warn_depth: 60,
        }
    }
}

impl SourceConfig {
    /// Create a config for a codec and resolution with default pump settings
    pub fn new(codec: Codec, width: u32, height: u32) -> Self {
        Self {
            codec,
            resolution: Resolution::new(width, height),
            ..Default::default()
        }
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Resolution::new(width, height);
        self
    }

    pub fn with_pump(mut self, pump: PumpConfig) -> Self {
        self.pump = pump;
        self
    }

    pub fn with_queue_warn_depth(mut self, depth: usize) -> Self {
        self.queue_warn_depth = depth;
        self
    }

    /// Validate and return warnings
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.resolution.is_valid() {
            warnings.push(format!(
                "Declared resolution {} has a zero dimension; encoded images will report it as-is",
                self.resolution
            ));
        }

        if self.pump.placeholder_width > 16 || self.pump.placeholder_height > 16 {
            warnings.push(format!(
                "Placeholder {}x{} is larger than needed; it is never encoded",
                self.pump.placeholder_width, self.pump.placeholder_height
            ));
        }

        if self.queue_warn_depth == 0 {
            warnings.push("Queue depth warnings are disabled".to_string());
        }

        warnings
    }
}

/// Settings for the passthrough encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Name reported in encoder capabilities
    pub implementation_name: String,
    /// H.264 packetization mode advertised to the packetizer
    pub packetization_mode: PacketizationMode,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            implementation_name: "PassthroughEncoder".to_string(),
            packetization_mode: PacketizationMode::NonInterleaved,
        }
    }
}

impl EncoderConfig {
    pub fn with_implementation_name(mut self, name: impl Into<String>) -> Self {
        self.implementation_name = name.into();
        self
    }

    pub fn with_packetization_mode(mut self, mode: PacketizationMode) -> Self {
        self.packetization_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_source_config() {
        let config = SourceConfig::default();
        assert_eq!(config.codec, Codec::H264);
        assert_eq!(config.pump, PumpConfig::default());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_warnings() {
        let config = SourceConfig::new(Codec::Vp8, 0, 480)
            .with_pump(PumpConfig {
                placeholder_width: 64,
                placeholder_height: 64,
            })
            .with_queue_warn_depth(0);
        assert_eq!(config.validate().len(), 3);
    }
}
