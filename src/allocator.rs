//! Allocator (Component F).
//!
//! Derives the free-extent list implied by the current geometry (every device's full range,
//! minus the ranges already claimed by existing shards), sorts it to favor filling the emptiest
//! device with the longest runs first, and greedily reserves extents for a new plot.

use std::cell::Cell;
use std::rc::Rc;

use tracing::warn;

use crate::geometry::{Device, Geometry};
use crate::recovery;

#[derive(Clone)]
struct FreeExtent {
    device_id: [u8; 32],
    begin: u64,
    end: u64,
    device_free: Rc<Cell<u64>>,
}

impl FreeExtent {
    fn len(&self) -> u64 {
        self.end - self.begin
    }
}

/// A reserved extent on one device, ready to become a [`crate::geometry::Shard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub device_id: [u8; 32],
    pub begin: u64,
    pub end: u64,
}

/// Computes the ordered reservation list for a new plot of `plot_size` bytes.
///
/// Returns `None` if the registered devices, once their existing shards are subtracted,
/// cannot hold `plot_size` bytes of plot data (each reservation also carries a
/// `recovery::HEADER_LEN`-byte header, which is not plot-addressable).
pub fn allocate(geometry: &Geometry, plot_size: u64) -> Option<Vec<Reservation>> {
    let mut free = derive_free_extents(geometry);
    free.sort_by(|a, b| {
        b.device_free
            .get()
            .cmp(&a.device_free.get())
            .then_with(|| b.len().cmp(&a.len()))
    });

    let header_len = recovery::HEADER_LEN as u64;
    let mut reservations = Vec::new();
    let mut needed = plot_size;

    for extent in &free {
        if needed == 0 {
            break;
        }
        let reserved_len = (needed + header_len).min(extent.len());
        if reserved_len <= header_len {
            continue;
        }
        reservations.push(Reservation {
            device_id: extent.device_id,
            begin: extent.begin,
            end: extent.begin + reserved_len,
        });
        needed -= reserved_len - header_len;
    }

    if needed > 0 {
        return None;
    }

    Some(reservations)
}

/// Builds one free extent per registered device, then subtracts every existing shard from the
/// extent it falls within, leaving up to two leftover sub-extents per shard.
fn derive_free_extents(geometry: &Geometry) -> Vec<FreeExtent> {
    let mut free: Vec<FreeExtent> = geometry
        .devices
        .iter()
        .map(|d: &Device| FreeExtent {
            device_id: d.id,
            begin: d.begin,
            end: d.end,
            device_free: Rc::new(Cell::new(d.end - d.begin)),
        })
        .collect();

    for plot in &geometry.plots {
        for shard in &plot.shards {
            let Some(pos) = free.iter().position(|extent| {
                extent.device_id == shard.device_id
                    && shard.begin < extent.end
                    && shard.end > extent.begin
            }) else {
                warn!(
                    device_id = %crate::device::hex_id(&shard.device_id),
                    "shard references a free extent that no longer exists; device may have been removed"
                );
                continue;
            };
            let freeblock = free.remove(pos);
            freeblock
                .device_free
                .set(freeblock.device_free.get() - (shard.end - shard.begin));

            if shard.end < freeblock.end {
                free.push(FreeExtent {
                    device_id: freeblock.device_id,
                    begin: shard.end,
                    end: freeblock.end,
                    device_free: Rc::clone(&freeblock.device_free),
                });
            }
            if shard.begin > freeblock.begin {
                free.push(FreeExtent {
                    device_id: freeblock.device_id,
                    begin: freeblock.begin,
                    end: shard.begin,
                    device_free: Rc::clone(&freeblock.device_free),
                });
            }
        }
    }

    free
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Plot, Shard};

    fn device(id: u8, begin: u64, end: u64) -> Device {
        Device {
            id: [id; 32],
            path: format!("/dev/fake{id}"),
            begin,
            end,
        }
    }

    #[test]
    fn single_empty_device_fits_whole_plot() {
        let geometry = Geometry {
            devices: vec![device(1, 1024, 1024 + 10 * 1024 * 1024)],
            plots: vec![],
        };
        let reservations = allocate(&geometry, 1024 * 1024).unwrap();
        assert_eq!(reservations.len(), 1);
        let r = reservations[0];
        assert_eq!(r.end - r.begin, 1024 * 1024 + recovery::HEADER_LEN as u64);
    }

    #[test]
    fn splits_across_two_devices_when_neither_alone_suffices() {
        let geometry = Geometry {
            devices: vec![device(1, 1024, 1024 + 6 * 1024 * 1024), device(2, 1024, 1024 + 6 * 1024 * 1024)],
            plots: vec![],
        };
        let reservations = allocate(&geometry, 10 * 1024 * 1024).unwrap();
        assert_eq!(reservations.len(), 2);
        let total: u64 = reservations
            .iter()
            .map(|r| r.end - r.begin - recovery::HEADER_LEN as u64)
            .sum();
        assert_eq!(total, 10 * 1024 * 1024);
    }

    #[test]
    fn fails_when_total_free_space_insufficient() {
        let geometry = Geometry {
            devices: vec![device(1, 1024, 1024 + 1024 * 1024), device(2, 1024, 1024 + 1024 * 1024)],
            plots: vec![],
        };
        assert!(allocate(&geometry, 4 * 1024 * 1024).is_none());
    }

    #[test]
    fn avoids_existing_shard_and_uses_leftover_extents() {
        let device_id = [1u8; 32];
        let geometry = Geometry {
            devices: vec![device(1, 1024, 1024 + 10 * 1024 * 1024)],
            plots: vec![Plot {
                id: [9u8; 32],
                k: 32,
                flags: 0,
                shards: vec![Shard {
                    device_id,
                    begin: 1024,
                    end: 1024 + 5 * 1024 * 1024,
                }],
            }],
        };
        let reservations = allocate(&geometry, 1024 * 1024).unwrap();
        assert_eq!(reservations.len(), 1);
        assert!(reservations[0].begin >= 1024 + 5 * 1024 * 1024);
    }

    #[test]
    fn reserving_entire_remaining_device_exactly_is_allowed() {
        let geometry = Geometry {
            devices: vec![device(1, 1024, 1024 + 1024 * 1024 + recovery::HEADER_LEN as u64)],
            plots: vec![],
        };
        let reservations = allocate(&geometry, 1024 * 1024).unwrap();
        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].end, 1024 + 1024 * 1024 + recovery::HEADER_LEN as u64);
    }
}
