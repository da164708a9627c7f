#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;
use relay::config_file::{ConfigSource, SEARCH_DIRS};

/// Outbound SMS relay with delivery confirmation over MQTT
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(version)]
struct Cli {
    /// Configuration file; searched for in ./ and /etc/relay/ when omitted
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let source = ConfigSource::resolve(cli.config, &SEARCH_DIRS)?;
    let relay = source.load()?;

    if cli.check {
        println!("{} is valid", source.path().display());
        return Ok(());
    }

    relay.run().await
}
