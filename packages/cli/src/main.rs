#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Builds the web map's `GeoJSON` layers from the parcel and project
//! sources.
//!
//! ```text
//! parcel_map [--config layers.toml] build
//! parcel_map [--config layers.toml] inspect [--source parcels|custom]
//! ```
//!
//! Running with no subcommand builds every layer.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use parcel_map_layers::{config, inspect, pipeline};

#[derive(Parser)]
#[command(name = "parcel_map", about = "Parcel and project map layer builder")]
struct Cli {
    /// Settings file (defaults to `layers.toml` in the working directory
    /// when present)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, reconcile, and write every configured layer
    Build,
    /// Print the CRS, columns, and first feature of a parcel source
    Inspect {
        /// Which parcel source to inspect
        #[arg(long, value_enum, default_value_t = Source::Parcels)]
        source: Source,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Source {
    /// The citywide parcel dataset
    Parcels,
    /// The hand-drawn custom parcels
    Custom,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();
    let cli = Cli::parse();

    let settings = config::load_or_default(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Build) {
        Commands::Build => {
            pipeline::run(&settings)?;
        }
        Commands::Inspect { source } => {
            let path = match source {
                Source::Parcels => settings.sources.parcels.clone(),
                Source::Custom => settings
                    .sources
                    .custom_parcels
                    .clone()
                    .ok_or("no custom parcel source is configured")?,
            };
            let summary = inspect::inspect_source(&path)?;
            print!("{summary}");
        }
    }

    Ok(())
}
