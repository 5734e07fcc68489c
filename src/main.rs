// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "overlaycam")]
#[command(about = "Composite live overlays onto a webcam and publish them as a virtual camera")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Config file (default: ~/.config/overlaycam/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline (default)
    Run {
        /// Frame source: "camera", "test" or "image:PATH"
        #[arg(short, long, default_value = "camera")]
        source: String,

        /// Frame sink: "pipewire", "v4l2:/dev/videoN" or "null"
        #[arg(short = 'o', long, default_value = "pipewire")]
        sink: String,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Do not listen for hotkeys on the terminal
        #[arg(long)]
        no_hotkeys: bool,

        /// Do not reload the config file when it changes
        #[arg(long)]
        no_watch: bool,
    },

    /// Validate the config file and build its plugin chain
    Check {
        /// Print the effective configuration as JSON
        #[arg(long)]
        print: bool,
    },

    /// List the available plugin kinds and their options
    Plugins,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=overlaycam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.or_else(overlaycam::config::default_path);

    match cli.command {
        Some(Commands::Run {
            source,
            sink,
            duration,
            no_hotkeys,
            no_watch,
        }) => cli::run(cli::RunOptions {
            config_path,
            source,
            sink,
            duration,
            hotkeys: !no_hotkeys,
            watch: !no_watch,
        }),
        Some(Commands::Check { print }) => cli::check(config_path, print),
        Some(Commands::Plugins) => cli::list_plugins(),
        None => cli::run(cli::RunOptions {
            config_path,
            source: "camera".into(),
            sink: "pipewire".into(),
            duration: None,
            hotkeys: true,
            watch: true,
        }),
    }
}
