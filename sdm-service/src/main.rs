// SPDX-License-Identifier: GPL-3.0-only

//! SD Maid storage forensics host
//!
//! Wires the shell, area discovery, clutter database, CSI pipeline and
//! expendables filters together from a settings file and exposes them as
//! one-shot commands.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

mod commands;
mod logging;
mod registry;
mod settings;

use commands::Command;
use registry::CoreRegistry;
use settings::{SettingsStore, default_settings_path};

#[derive(Debug, Parser)]
#[command(name = "sdm-service", version, about = "Storage forensics for Android devices")]
struct Cli {
    /// Settings file (defaults to $SDM_CONFIG or the XDG config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let store = SettingsStore::load(cli.config.unwrap_or_else(default_settings_path))?;
    logging::init(&store.snapshot().logging);

    tracing::info!("Starting SD Maid service v{}", env!("CARGO_PKG_VERSION"));

    if let Command::Settings { action } = &cli.command {
        return commands::run_settings(&store, action, cli.json).await;
    }

    let scope = CancellationToken::new();
    let core = CoreRegistry::build(store.subscribe(), scope.clone())?;

    let result = tokio::select! {
        result = async {
            core.start().await?;
            commands::run(&core, cli.command, cli.json).await
        } => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted");
            Ok(())
        }
    };

    // Ends the shared shells and the settings forwarders
    scope.cancel();
    result
}
