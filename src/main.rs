// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use livecam::backends::camera::{CameraBackendType, CameraPosition};
use livecam::config::Config;
use std::path::PathBuf;
use std::time::Duration;

mod cli;

#[derive(Parser)]
#[command(name = "livecam")]
#[command(about = "Live camera frames rendered through a GPU shader pipeline")]
#[command(version = livecam::constants::app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    /// Configuration file (default: <config dir>/livecam/config.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List {
        /// Capture backend to enumerate
        #[arg(short, long)]
        source: Option<CameraBackendType>,
    },

    /// Run the capture and render pipeline offscreen
    Run {
        /// Capture backend
        #[arg(short, long)]
        source: Option<CameraBackendType>,

        /// Camera to start with
        #[arg(short, long)]
        position: Option<CameraPosition>,

        /// Disable horizontal mirroring
        #[arg(long)]
        no_mirror: bool,

        /// Stop after this many seconds
        #[arg(short, long, value_parser = cli::parse_seconds)]
        duration: Option<Duration>,

        /// Toggle front/back camera every this many seconds
        #[arg(long, value_parser = cli::parse_seconds)]
        switch_every: Option<Duration>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=livecam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    match cli.command {
        Some(Commands::List { source }) => cli::list_cameras(source.unwrap_or(config.backend)),
        Some(Commands::Run {
            source,
            position,
            no_mirror,
            duration,
            switch_every,
        }) => run(
            config,
            cli::RunOptions {
                source,
                position,
                no_mirror,
                duration,
                switch_every,
            },
        ),
        None => run(config, cli::RunOptions::default()),
    }
}

fn run(config: Config, options: cli::RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(cli::run(config, options))
}
