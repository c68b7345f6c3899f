//! Info command - show codecs and passthrough encoder capabilities

use anyhow::Result;
use passthru_core::{
    config::ConfigFile,
    host::{SdpVideoFormat, VideoEncoder},
    Codec, PassthroughEncoder, SourceRegistry,
};
use std::sync::Arc;

/// Show supported codecs and encoder capabilities
pub async fn info() -> Result<()> {
    println!("Passthru - Encoded Frame Passthrough\n");

    let config_path = ConfigFile::default_path();
    let file_config = ConfigFile::load_or_default();
    let encoder_config = file_config.encoder_config()?;

    println!("Configuration:");
    println!(
        "  File:    {} ({})",
        config_path.display(),
        if config_path.exists() { "found" } else { "defaults" }
    );

    println!();

    // Capabilities are the same for every codec
    let encoder = PassthroughEncoder::routed(
        Arc::new(SourceRegistry::new()),
        Codec::H264,
        encoder_config.clone(),
    );
    let caps = encoder.describe_capabilities();

    println!("Passthrough Encoder:");
    println!("  Name:              {}", caps.implementation_name);
    println!("  Hardware:          {}", yes_no(caps.is_hardware_accelerated));
    println!("  Simulcast:         {}", yes_no(caps.supports_simulcast));
    println!("  Trusted rate ctl:  {}", yes_no(caps.has_trusted_rate_controller));
    println!("  Scaling:           {}", yes_no(caps.scaling_enabled));
    println!("  Pixel formats:     {:?}", caps.preferred_pixel_formats);

    println!();

    println!("Supported Codecs:");
    for codec in Codec::ALL {
        let format = SdpVideoFormat::for_codec(codec, encoder_config.packetization_mode);
        let params: Vec<String> = format
            .parameters
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let replay = match codec.ivf_fourcc() {
            Some(_) => "replay: ivf",
            None if codec == Codec::H264 => "replay: annex-b",
            None => "replay: -",
        };

        if params.is_empty() {
            println!("  {:<6} {:<5} ({})", codec.display_name(), format.name, replay);
        } else {
            println!(
                "  {:<6} {:<5} ({}) {}",
                codec.display_name(),
                format.name,
                replay,
                params.join(";")
            );
        }
    }

    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
