//! Virtual read path (Component I).
//!
//! Translates plot filenames and read offsets into device reads. This module does not depend
//! on any particular userspace-filesystem binding (FUSE or otherwise) — it is the library-level
//! surface an external binding calls into, mirroring the shape of `original_source/mount.cpp`'s
//! callbacks without any of its FUSE-specific plumbing.

use crate::block::BlockFile;
use crate::device;
use crate::error::{Error, Result};
use crate::geometry::{Geometry, Plot, PLOT_FLAG_RESERVED};
use crate::recovery;

/// A plot's shard list resolved to absolute device paths and plot-byte ranges, ready to serve
/// reads without touching the geometry again.
#[derive(Debug, Clone)]
pub struct ResolvedPlot {
    shards: Vec<ResolvedShard>,
}

#[derive(Debug, Clone)]
struct ResolvedShard {
    device_path: String,
    /// Offset of the first plot byte (i.e. past the recovery-point header).
    data_begin: u64,
    len: u64,
}

impl ResolvedPlot {
    pub fn size(&self) -> u64 {
        self.shards.iter().map(|s| s.len).sum()
    }

    /// Reads up to `buf.len()` bytes starting at `offset`, returning the number of bytes
    /// actually read (short only at end of plot, matching a regular file's `read`).
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut offset = offset;
        let mut written = 0;

        for shard in &self.shards {
            if written == buf.len() {
                break;
            }
            if offset >= shard.len {
                offset -= shard.len;
                continue;
            }

            let device = BlockFile::open_readable(&shard.device_path).map_err(|source| Error::DeviceIo {
                path: shard.device_path.clone().into(),
                source,
            })?;

            let want = (shard.len - offset).min((buf.len() - written) as u64) as usize;
            let n = device
                .read_at(shard.data_begin + offset, &mut buf[written..written + want])
                .map_err(|source| Error::DeviceIo {
                    path: shard.device_path.clone().into(),
                    source,
                })?;
            written += n;
            offset = 0;
            if n < want {
                break;
            }
        }

        Ok(written)
    }
}

/// Resolves `plot`'s shards against `geometry`'s device table.
pub fn resolve_plot(geometry: &Geometry, plot: &Plot) -> Result<ResolvedPlot> {
    let mut shards = Vec::with_capacity(plot.shards.len());
    for shard in &plot.shards {
        let device_path = geometry
            .devices
            .iter()
            .find(|d| d.id == shard.device_id)
            .map(|d| d.path.clone())
            .ok_or(Error::NotFound {
                kind: "device",
                hex_id: device::hex_id(&shard.device_id),
            })?;
        shards.push(ResolvedShard {
            device_path,
            data_begin: shard.begin + recovery::HEADER_LEN as u64,
            len: shard.end - shard.begin - recovery::HEADER_LEN as u64,
        });
    }
    Ok(ResolvedPlot { shards })
}

/// The filename a plot is presented under: `plot-k{K}-{hex32(id)}.plot`, or `.tmp` while
/// `Reserved` is set.
pub fn plot_filename(plot: &Plot) -> String {
    let suffix = if plot.flags & PLOT_FLAG_RESERVED != 0 {
        "tmp"
    } else {
        "plot"
    };
    format!("plot-k{}-{}.{}", plot.k, device::hex_id(&plot.id), suffix)
}

/// Parses a plot filename (with or without a leading `/`) back into a plot id, ignoring `k` and
/// suffix: both are derived, not authoritative, so a lookup only needs the id.
pub fn path_to_plot_id(path: &str) -> Option<[u8; 32]> {
    let name = path.trim_start_matches('/');
    let name = name.strip_prefix("plot-k")?;
    let (_, rest) = name.split_once('-')?;
    let hex = rest.strip_suffix(".plot").or_else(|| rest.strip_suffix(".tmp"))?;
    crate::device::id_from_hex(hex)
}

/// Aggregate statfs-style figures across the whole device pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct Statfs {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub plot_count: u64,
}

pub fn statfs(geometry: &Geometry) -> Statfs {
    let total_bytes: u64 = geometry.devices.iter().map(|d| d.end - d.begin).sum();
    let used_bytes: u64 = geometry
        .plots
        .iter()
        .flat_map(|p| p.shards.iter())
        .map(|s| s.end - s.begin)
        .sum();
    Statfs {
        total_bytes,
        free_bytes: total_bytes.saturating_sub(used_bytes),
        plot_count: geometry.plots.len() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Device, Shard};

    fn sample_plot(reserved: bool) -> Plot {
        Plot {
            id: [0xAA; 32],
            k: 32,
            flags: if reserved { PLOT_FLAG_RESERVED } else { 0 },
            shards: vec![Shard {
                device_id: [1u8; 32],
                begin: 1024,
                end: 1024 + recovery::HEADER_LEN as u64 + 100,
            }],
        }
    }

    #[test]
    fn filename_round_trips_through_path_parsing() {
        let plot = sample_plot(false);
        let name = plot_filename(&plot);
        assert!(name.ends_with(".plot"));
        let parsed = path_to_plot_id(&format!("/{name}")).unwrap();
        assert_eq!(parsed, plot.id);
    }

    #[test]
    fn reserved_plot_uses_tmp_suffix() {
        let plot = sample_plot(true);
        assert!(plot_filename(&plot).ends_with(".tmp"));
    }

    #[test]
    fn rejects_malformed_path() {
        assert!(path_to_plot_id("/not-a-plot").is_none());
    }

    #[test]
    fn resolve_plot_computes_data_only_size() {
        let geometry = Geometry {
            devices: vec![Device {
                id: [1u8; 32],
                path: "/dev/fake".to_string(),
                begin: 1024,
                end: 1024 + 1024 * 1024,
            }],
            plots: vec![sample_plot(false)],
        };
        let resolved = resolve_plot(&geometry, &geometry.plots[0]).unwrap();
        assert_eq!(resolved.size(), 100);
    }

    #[test]
    fn statfs_subtracts_shard_bytes_including_header() {
        let geometry = Geometry {
            devices: vec![Device {
                id: [1u8; 32],
                path: "/dev/fake".to_string(),
                begin: 1024,
                end: 1024 + 1_000_000,
            }],
            plots: vec![sample_plot(false)],
        };
        let stats = statfs(&geometry);
        assert_eq!(stats.total_bytes, 1_000_000);
        assert_eq!(stats.plot_count, 1);
        assert_eq!(stats.free_bytes, 1_000_000 - (recovery::HEADER_LEN as u64 + 100));
    }
}
