//! `plotfs` CLI entry point.
//!
//! Installs the global `tracing` subscriber once, here, and nowhere else in the crate; library
//! code only emits events. Every subcommand maps 1:1 onto a `Ledger` call, prints a single-line
//! diagnostic on failure, and exits non-zero.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use plotfs::config::PlotFsConfig;
use plotfs::{device, plotfile, vfs, writer, Ledger, Result};

use cli::{Cli, Command};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = PlotFsConfig::from_path(&cli.config).build();
    let ledger = Ledger::new(config.clone());

    match run(&cli.command, &config, &ledger) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("plotfs: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: &Command, config: &PlotFsConfig, ledger: &Ledger) -> Result<()> {
    match command {
        Command::Init { force } => ledger.init(*force),

        Command::AddDevice { path, force } => {
            let header = ledger.add_device(path, *force)?;
            println!("registered device {}", device::hex_id(&header.id));
            Ok(())
        }

        Command::RemoveDevice { hex_id } => {
            let id = parse_hex_id(hex_id)?;
            ledger.remove_device(id)
        }

        Command::AddPlot { path, remove_source } => {
            let plot_file = plotfile::PlotFile::open(path)?;
            writer::add_plot(config, ledger, path, &plot_file)?;
            if *remove_source {
                let _ = std::fs::remove_file(path);
            }
            Ok(())
        }

        Command::RemovePlot { hex_id } => {
            let id = parse_hex_id(hex_id)?;
            ledger.remove_plot(id)
        }

        Command::ListPlots => {
            let geometry = ledger.load()?;
            for plot in &geometry.plots {
                println!(
                    "{}  {}  {}",
                    device::hex_id(&plot.id),
                    plot.size(),
                    plot.shards.len()
                );
            }
            Ok(())
        }

        Command::ListDevices => {
            let geometry = ledger.load()?;
            for dev in &geometry.devices {
                let stats = vfs::statfs(&plotfs::geometry::Geometry {
                    devices: vec![dev.clone()],
                    plots: geometry
                        .plots
                        .iter()
                        .filter(|p| p.shards.iter().any(|s| s.device_id == dev.id))
                        .cloned()
                        .collect(),
                });
                let size = dev.end - dev.begin;
                let pct = if size == 0 {
                    0
                } else {
                    100 * (size - stats.free_bytes) / size
                };
                println!(
                    "{}  {}/{}  {}%  {}",
                    device::hex_id(&dev.id),
                    stats.free_bytes,
                    size,
                    pct,
                    dev.path
                );
            }
            Ok(())
        }
    }
}

fn parse_hex_id(hex: &str) -> Result<[u8; 32]> {
    device::id_from_hex(hex).ok_or_else(|| plotfs::Error::NotFound {
        kind: "device or plot",
        hex_id: hex.to_string(),
    })
}
