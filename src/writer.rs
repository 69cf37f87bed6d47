//! Plot writer (Component H), phase 3 of the two-phase `add_plot` protocol.
//!
//! By the time [`copy_plot_to_shards`] runs, the ledger manager has already reserved shards for
//! the plot and released the ledger lock (`ledger::Ledger::reserve_plot`), so this runs without
//! holding any lock: it streams the source plot file into its reserved shards, one at a time,
//! writing each shard's recovery-point header first. The caller is responsible for calling
//! `ledger::Ledger::commit_plot` afterwards to clear the `Reserved` flag.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use snafu::ResultExt;
use tracing::info;

use crate::block::BlockFile;
use crate::config::PlotFsConfig;
use crate::error::{self, Result};
use crate::geometry::Shard;
use crate::ledger::Ledger;
use crate::recovery::{self, RecoveryPoint};

/// Streams `source` into `shards`, in order, writing a recovery-point header at the start of
/// each shard first. `device_path` resolves a shard's `device_id` to its on-disk path.
pub fn copy_plot_to_shards<F>(
    config: &PlotFsConfig,
    source: &Path,
    shards: &[Shard],
    mut device_path: F,
) -> Result<()>
where
    F: FnMut([u8; 32]) -> Result<String>,
{
    let mut input = File::open(source).context(error::PlotIoSnafu { path: source.to_path_buf() })?;
    let total_size = input
        .metadata()
        .context(error::PlotIoSnafu { path: source.to_path_buf() })?
        .len();

    info!(shard_count = shards.len(), "starting plot copy");

    let mut offset_in: u64 = 0;
    for (i, shard) in shards.iter().enumerate() {
        let dev_path = device_path(shard.device_id)?;
        let device = BlockFile::open_writable(&dev_path).context(error::DeviceIoSnafu { path: dev_path.clone().into() })?;

        let next = shards.get(i + 1);
        let recovery_point = RecoveryPoint {
            shard_size: shard.end - shard.begin - recovery::HEADER_LEN as u64,
            next_device_id: next.map(|s| s.device_id),
        };
        device
            .write_at(shard.begin, &recovery_point.encode())
            .context(error::DeviceIoSnafu { path: dev_path.clone().into() })?;

        let mut remaining = shard.end - shard.begin - recovery::HEADER_LEN as u64;
        let mut device_offset = shard.begin + recovery::HEADER_LEN as u64;

        input
            .seek(SeekFrom::Start(offset_in))
            .context(error::PlotIoSnafu { path: source.to_path_buf() })?;

        while remaining > 0 {
            let chunk = remaining.min(config.copy_chunk_size);
            let mut buf = vec![0u8; chunk as usize];
            input
                .read_exact(&mut buf)
                .context(error::PlotIoSnafu { path: source.to_path_buf() })?;
            device
                .write_at(device_offset, &buf)
                .context(error::DeviceIoSnafu { path: dev_path.clone().into() })?;

            device_offset += chunk;
            offset_in += chunk;
            remaining -= chunk;

            info!(
                pct = 100 * offset_in / total_size.max(1),
                device = %dev_path,
                "copying plot"
            );
        }
        device.sync_all().context(error::DeviceIoSnafu { path: dev_path.into() })?;
    }

    info!("finished plot copy");
    Ok(())
}

/// Runs the full `add_plot` protocol: reserve, release, copy, commit.
pub fn add_plot(config: &PlotFsConfig, ledger: &Ledger, plot_path: &Path, plot_file: &crate::plotfile::PlotFile) -> Result<()> {
    let shards = ledger.reserve_plot(plot_file)?;

    let copy_result = copy_plot_to_shards(config, plot_path, &shards, |device_id| {
        ledger.device_path(device_id)
    });

    match copy_result {
        Ok(()) => ledger.commit_plot(plot_file.id()),
        Err(e) => {
            // A plot left `Reserved` after a failed copy is tombstoned by dropping it from the
            // ledger outright, rather than left for an operator to puzzle over.
            let _ = ledger.remove_plot(plot_file.id());
            Err(e)
        }
    }
}
