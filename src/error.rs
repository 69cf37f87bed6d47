//! Crate-wide error type.
//!
//! One variant per failure kind a caller might need to branch on: ledger I/O versus
//! corruption, device I/O versus an unformatted or conflicting device, and so on. The CLI and
//! the virtual filesystem binding each map these onto their own exit codes / errno values.

use std::io;
use std::path::PathBuf;

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("ledger I/O error at {}: {}", path.display(), source))]
    LedgerIo { path: PathBuf, source: io::Error },

    #[snafu(display("ledger at {} is corrupt: {}", path.display(), reason))]
    LedgerCorrupt { path: PathBuf, reason: String },

    #[snafu(display("device I/O error on {}: {}", path.display(), source))]
    DeviceIo { path: PathBuf, source: io::Error },

    #[snafu(display("{} is not a formatted PlotFS device", path.display()))]
    DeviceUnformatted { path: PathBuf },

    #[snafu(display("device conflict for {}: {}", path.display(), reason))]
    DeviceConflict { path: PathBuf, reason: String },

    #[snafu(display("plot I/O error on {}: {}", path.display(), source))]
    PlotIo { path: PathBuf, source: io::Error },

    #[snafu(display("{} is not a valid plot file: {}", path.display(), reason))]
    PlotInvalid { path: PathBuf, reason: String },

    #[snafu(display("a plot with id {} is already registered", hex_id))]
    PlotDuplicate { hex_id: String },

    #[snafu(display(
        "not enough free space to place a {}-byte plot across the registered devices",
        needed
    ))]
    NotEnoughSpace { needed: u64 },

    #[snafu(display("no {} with id {} is registered", kind, hex_id))]
    NotFound { kind: &'static str, hex_id: String },

    #[snafu(display("{}", reason))]
    Unsupported { reason: String },
}
