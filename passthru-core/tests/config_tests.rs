//! Integration tests for configuration loading

use passthru_core::config::{sample_config, ConfigFile};
use passthru_core::error::PassthruError;
use passthru_core::types::PacketizationMode;
use passthru_core::Codec;
use tempfile::tempdir;

#[test]
fn test_save_and_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = ConfigFile::default();
    config.source.codec = "vp9".to_string();
    config.source.width = 1920;
    config.source.height = 1080;
    config.queue.warn_depth = 120;
    config.encoder.packetization_mode = "single-nal-unit".to_string();
    config.save_to(path.clone()).unwrap();

    let loaded = ConfigFile::load_from(path).unwrap();
    let source = loaded.source_config().unwrap();
    assert_eq!(source.codec, Codec::Vp9);
    assert_eq!((source.resolution.width, source.resolution.height), (1920, 1080));
    assert_eq!(source.queue_warn_depth, 120);

    let encoder = loaded.encoder_config().unwrap();
    assert_eq!(encoder.packetization_mode, PacketizationMode::SingleNalUnit);
    assert_eq!(encoder.implementation_name, "PassthroughEncoder");
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let config = ConfigFile::load_from(dir.path().join("absent.toml")).unwrap();

    let source = config.source_config().unwrap();
    assert_eq!(source.codec, Codec::H264);
    assert_eq!((source.resolution.width, source.resolution.height), (1280, 720));
    assert_eq!(
        (source.pump.placeholder_width, source.pump.placeholder_height),
        (2, 2)
    );
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[source]\ncodec = \"av1\"\n").unwrap();

    let source = ConfigFile::load_from(path).unwrap().source_config().unwrap();
    assert_eq!(source.codec, Codec::Av1);
    assert_eq!(source.resolution.width, 1280);
    assert_eq!(source.queue_warn_depth, 60);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[source\ncodec = ").unwrap();

    let err = ConfigFile::load_from(path).unwrap_err();
    assert!(matches!(err, PassthruError::Config(_)));
    assert!(err.user_hint().is_some());
}

#[test]
fn test_unknown_codec_is_config_error() {
    let mut config = ConfigFile::default();
    config.source.codec = "theora".to_string();
    assert!(matches!(
        config.source_config(),
        Err(PassthruError::Config(_))
    ));
}

#[test]
fn test_sample_config_parses() {
    let config: ConfigFile = toml::from_str(&sample_config()).unwrap();
    assert!(config.source_config().unwrap().validate().is_empty());
    assert!(config.encoder_config().is_ok());
}
