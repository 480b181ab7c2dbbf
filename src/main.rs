// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use rawcapture::storage::StorageMode;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "rawcapture")]
#[command(about = "Capture RAW sensor frames as DNG files")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Capture one RAW photo and exit
    Capture {
        /// Camera id to use (from 'rawcapture list')
        #[arg(short, long)]
        camera: Option<String>,

        /// Output directory (default: ~/Pictures/RawCapture)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sensor width of the virtual camera
        #[arg(long, requires = "height")]
        width: Option<u32>,

        /// Sensor height of the virtual camera
        #[arg(long, requires = "width")]
        height: Option<u32>,

        /// Where to store the DNG: auto, catalog or direct
        #[arg(short, long)]
        storage: Option<StorageMode>,
    },

    /// Interactive preview: Enter captures, q or Ctrl-C quits
    Run {
        /// Camera id to use (from 'rawcapture list')
        #[arg(short, long)]
        camera: Option<String>,

        /// Output directory (default: ~/Pictures/RawCapture)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where to store the DNG: auto, catalog or direct
        #[arg(short, long)]
        storage: Option<StorageMode>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=rawcapture=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => cli::list_cameras(),
        Commands::Capture {
            camera,
            output,
            width,
            height,
            storage,
        } => {
            let options = cli::CaptureOptions {
                camera,
                output,
                sensor_size: width.zip(height),
                storage,
            };
            cli::capture_photo(options)
        }
        Commands::Run {
            camera,
            output,
            storage,
        } => {
            let options = cli::CaptureOptions {
                camera,
                output,
                sensor_size: None,
                storage,
            };
            cli::run_interactive(options)
        }
    }
}
