//! Command-line argument parsing.
//!
//! Mirrors the original `cli.cpp`'s mutually-exclusive subcommand set, but expressed as a
//! `clap` derive `enum Command` rather than a pile of `excludes()`-chained boolean flags.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_LEDGER_PATH;

#[derive(Debug, Parser)]
#[command(name = "plotfs", about = "A virtual, read-only filesystem of proof-of-space plots")]
pub struct Cli {
    /// Path to the geometry ledger file.
    #[arg(short = 'c', long = "config", global = true, default_value = DEFAULT_LEDGER_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Creates a new, empty ledger at the configured path.
    Init {
        /// Overwrite an existing, non-empty ledger.
        #[arg(long)]
        force: bool,
    },
    /// Registers a raw block device (or regular file) as a PlotFS device.
    AddDevice {
        path: PathBuf,
        /// Reformat the device even if it already carries a foreign PlotFS signature.
        #[arg(long)]
        force: bool,
    },
    /// Unregisters a device by its hex id.
    RemoveDevice { hex_id: String },
    /// Copies a source plot file into the device pool and registers it.
    AddPlot {
        path: PathBuf,
        /// Delete the source plot file after a successful copy.
        #[arg(long)]
        remove_source: bool,
    },
    /// Unregisters and frees a plot's shards by its hex id.
    RemovePlot { hex_id: String },
    /// Lists every registered plot: `hex_id  total_size  num_shards`.
    ListPlots,
    /// Lists every registered device: `hex_id  free_bytes/size_bytes  pct%  path`.
    ListDevices,
}
