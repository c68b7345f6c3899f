//! Configuration file loading
//!
//! Loads user configuration from `~/.config/passthru/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{EncoderConfig, PumpConfig, SourceConfig};
use crate::error::{PassthruError, Result};
use crate::types::{Codec, PacketizationMode, Resolution};

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Default source settings
    #[serde(default)]
    pub source: SourceSettings,

    /// Placeholder pump settings
    #[serde(default)]
    pub pump: PumpSettings,

    /// Queue monitoring
    #[serde(default)]
    pub queue: QueueSettings,

    /// Passthrough encoder settings
    #[serde(default)]
    pub encoder: EncoderSettings,
}

/// Default encoded source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Codec of injected frames (vp8, vp9, av1, h264, h265)
    #[serde(default = "default_codec")]
    pub codec: String,

    /// Declared width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Declared height in pixels
    #[serde(default = "default_height")]
    pub height: u32,
}

/// Placeholder frame settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpSettings {
    #[serde(default = "default_placeholder")]
    pub placeholder_width: u32,

    #[serde(default = "default_placeholder")]
    pub placeholder_height: u32,
}

/// Queue monitoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Warn when a source queue grows past this many frames (0 = off)
    #[serde(default = "default_warn_depth")]
    pub warn_depth: usize,
}

/// Passthrough encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Implementation name reported to the pipeline
    #[serde(default = "default_implementation_name")]
    pub implementation_name: String,

    /// H.264 packetization mode: non-interleaved or single-nal-unit
    #[serde(default = "default_packetization_mode")]
    pub packetization_mode: String,
}

fn default_codec() -> String {
    "h264".to_string()
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_placeholder() -> u32 {
    2
}

fn default_warn_depth() -> usize {
    60
}

fn default_implementation_name() -> String {
    "PassthroughEncoder".to_string()
}

fn default_packetization_mode() -> String {
    "non-interleaved".to_string()
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for PumpSettings {
    fn default() -> Self {
        Self {
            placeholder_width: default_placeholder(),
            placeholder_height: default_placeholder(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            warn_depth: default_warn_depth(),
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            implementation_name: default_implementation_name(),
            packetization_mode: default_packetization_mode(),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("passthru").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("passthru")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/passthru/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| PassthruError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PassthruError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)?;

        std::fs::write(&path, content)
            .map_err(|e| PassthruError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Build the runtime source config
    pub fn source_config(&self) -> Result<SourceConfig> {
        let codec: Codec = self
            .source
            .codec
            .parse()
            .map_err(|_| PassthruError::config(format!("Unknown codec: {}", self.source.codec)))?;

        Ok(SourceConfig {
            codec,
            resolution: Resolution::new(self.source.width, self.source.height),
            pump: PumpConfig {
                placeholder_width: self.pump.placeholder_width,
                placeholder_height: self.pump.placeholder_height,
            },
            queue_warn_depth: self.queue.warn_depth,
        })
    }

    /// Build the runtime encoder config
    pub fn encoder_config(&self) -> Result<EncoderConfig> {
        let mode: PacketizationMode = self.encoder.packetization_mode.parse()?;
        Ok(EncoderConfig {
            implementation_name: self.encoder.implementation_name.clone(),
            packetization_mode: mode,
        })
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# passthru configuration

[source]
# Codec of the injected bitstream: vp8, vp9, av1, h264, h265
codec = "h264"

# Declared stream resolution (reported on every encoded image)
width = 1280
height = 720

[pump]
# Placeholder raw frame pushed once per encoded frame. It is never encoded,
# so keep it tiny.
placeholder_width = 2
placeholder_height = 2

[queue]
# Warn when a source queue grows past this many frames. The queue is never
# capped; a growing queue means the pipeline stopped pulling. 0 disables.
warn_depth = 60

[encoder]
# Implementation name reported to the pipeline
implementation_name = "PassthroughEncoder"

# H.264 packetization mode: "non-interleaved" or "single-nal-unit"
packetization_mode = "non-interleaved"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();
        assert_eq!(config.source.codec, "h264");
        assert_eq!(config.pump.placeholder_width, 2);
        assert_eq!(config.queue.warn_depth, 60);
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = sample_config();
        let config: ConfigFile = toml::from_str(&sample).unwrap();
        let source = config.source_config().unwrap();
        assert_eq!(source, SourceConfig::default());
        assert_eq!(config.encoder_config().unwrap(), EncoderConfig::default());
    }

    #[test]
    fn test_unknown_codec_is_config_error() {
        let config: ConfigFile = toml::from_str("[source]\ncodec = \"theora\"\n").unwrap();
        let err = config.source_config().unwrap_err();
        assert!(matches!(err, PassthruError::Config(_)));
    }
}
