//! nether-anim - Nethercore animation compression tool
//!
//! # Commands
//!
//! - `nether-anim compress` - Compress raw animations (JSON) into `.nanim` containers
//! - `nether-anim info` - Show the layout of a `.nanim` container
//! - `nether-anim sample` - Sample bone transforms from a `.nanim` container
//!
//! # Usage
//!
//! ```bash
//! # Pick the best codec per animation, several files in parallel
//! nether-anim compress walk.json run.json -o out/
//!
//! # Force a strategy and tolerance from a config file
//! nether-anim compress walk.json --config anim.toml --strategy per-track
//!
//! # Inspect the result
//! nether-anim info out/walk.nanim
//! nether-anim sample out/walk.nanim --time 0.5
//! ```
//!
//! # Config (anim.toml)
//!
//! ```toml
//! [compression]
//! alternative_compression_threshold = 0.5
//! try_linear_key_removal_compression = false
//!
//! [strategy]
//! kind = "per_track"
//! resampled_framerate = 15.0
//! ```

mod compress;
mod config;
mod info;
mod input;
mod sample;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// File extension of compressed animation containers
pub const COMPRESSED_EXT: &str = "nanim";

#[derive(Parser)]
#[command(name = "nether-anim")]
#[command(about = "Nethercore animation compression tool")]
#[command(version)]
struct Cli {
    /// Verbose output (per-candidate details)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress raw animations into .nanim containers
    Compress(compress::CompressArgs),

    /// Show the layout of a .nanim container
    Info(info::InfoArgs),

    /// Sample bone transforms from a .nanim container
    Sample(sample::SampleArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Compress(args) => compress::execute(args),
        Commands::Info(args) => info::execute(args),
        Commands::Sample(args) => sample::execute(args),
    }
}
