// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use iotgate::plugins::builtin_factories;
use iotgate::{Config, Gateway};

/// MQTT gateway for small hardware-control devices.
///
/// Loads the configuration, starts the configured devices and routes
/// messages between them until interrupted with Ctrl-C.
#[derive(Debug, Parser)]
#[command(name = "iotgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MQTT gateway for small hardware-control devices", long_about = None)]
struct Cli {
    /// Configuration file.
    #[arg(default_value = "iotgate.toml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info")]
    verbose: tracing::Level,

    /// Print the resolved configuration and exit.
    #[arg(short = 'c', long)]
    configuration: bool,
}

#[tokio::main]
async fn main() -> iotgate::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbose)
        .with_target(false)
        .init();

    let config = Config::from_file(&cli.config)?;
    if cli.configuration {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    tracing::info!(
        config = %cli.config.display(),
        version = env!("CARGO_PKG_VERSION"),
        "Starting iotgate"
    );
    let gateway = Gateway::new(config, &builtin_factories())?;
    gateway.run_until_shutdown().await;
    Ok(())
}
