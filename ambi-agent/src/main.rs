//! ambi-agent - ambient broadcast agent
//!
//! Streams a playlist directory into a real-time room and crossfades out
//! while the live broadcaster is present.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use ambi_agent::audio::decoder::resolve_decoder;
use ambi_agent::config::{AgentConfig, Args};
use ambi_agent::service;
use ambi_common::config::TomlConfig;
use ambi_common::logging::{default_filter, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file = TomlConfig::load(args.config.as_deref())
        .context("Failed to load bootstrap configuration")?;
    let config = AgentConfig::resolve(&args, &file).context("Invalid configuration")?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_tracing(&default_filter(
        &["ambi_agent", "ambi_common"],
        &config.log_level,
    ));

    info!(
        "Starting ambi-agent v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Configuration problems end the process before any network activity
    if let Err(e) = config.validate() {
        error!("{}", e);
        return Err(e).context("Invalid configuration");
    }
    let decoder_path = resolve_decoder(&config.decoder).context("Decode tool unavailable")?;
    info!("Using decoder {}", decoder_path.display());

    service::run(config, decoder_path)
        .await
        .context("Agent stopped with an unrecoverable error")?;

    info!("Shutdown complete");
    Ok(())
}
