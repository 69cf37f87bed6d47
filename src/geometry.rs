//! Geometry serializer (Component D).
//!
//! The ledger is a single structured binary buffer describing every registered device and
//! plot. It is encoded and decoded whole: every mutation rewrites the entire buffer rather than
//! patching it in place, so, unlike an in-place-mutated ledger state backed by a writable mmap,
//! this only needs the read side of that pattern: verify the buffer structurally before
//! dereferencing it, via `bytecheck`'s `CheckBytes`, and reject anything that doesn't check out.

use bytecheck::CheckBytes;
use rkyv::ser::serializers::AllocSerializer;
use rkyv::ser::Serializer;
use rkyv::{check_archived_root, Archive, Deserialize, Serialize};

pub const PLOT_FLAG_RESERVED: u32 = 1;

#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[archive_attr(derive(CheckBytes, Debug))]
pub struct Device {
    pub id: [u8; 32],
    pub path: String,
    pub begin: u64,
    pub end: u64,
}

#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[archive_attr(derive(CheckBytes, Debug))]
pub struct Shard {
    pub device_id: [u8; 32],
    pub begin: u64,
    pub end: u64,
}

#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[archive_attr(derive(CheckBytes, Debug))]
pub struct Plot {
    pub id: [u8; 32],
    pub k: u8,
    pub flags: u32,
    pub shards: Vec<Shard>,
}

impl Plot {
    pub fn is_reserved(&self) -> bool {
        self.flags & PLOT_FLAG_RESERVED != 0
    }

    pub fn size(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.end - s.begin - crate::recovery::HEADER_LEN as u64)
            .sum()
    }
}

/// The ledger's sole top-level record: every registered device and every plot, devices first.
///
/// Do not reorder or remove fields of `Device`/`Plot`/`Shard`/`Geometry` without considering
/// every already-written ledger unreadable; these are raw archived layouts, not a versioned
/// wire format.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[archive_attr(derive(CheckBytes, Debug))]
pub struct Geometry {
    pub devices: Vec<Device>,
    pub plots: Vec<Plot>,
}

/// Serializes `geometry` into a fresh, tightly-sized buffer.
pub fn encode(geometry: &Geometry) -> Vec<u8> {
    let mut serializer = AllocSerializer::<4096>::default();
    serializer
        .serialize_value(geometry)
        .expect("in-memory serialization of Geometry cannot fail");
    serializer.into_serializer().into_inner().to_vec()
}

/// Verifies `buf` structurally and, if valid, deserializes it into an owned [`Geometry`].
///
/// The verification step rejects truncated buffers, out-of-range internal offsets, and any
/// other corruption before a single field is dereferenced.
pub fn decode(buf: &[u8]) -> Result<Geometry, String> {
    let archived = check_archived_root::<Geometry>(buf).map_err(|e| e.to_string())?;
    Ok(archived
        .deserialize(&mut rkyv::Infallible)
        .expect("Geometry contains no fallible shared pointers"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_geometry() -> Geometry {
        Geometry {
            devices: vec![Device {
                id: [1u8; 32],
                path: "/dev/sda".to_string(),
                begin: 1024,
                end: 1024 * 1024 * 1024,
            }],
            plots: vec![Plot {
                id: [2u8; 32],
                k: 32,
                flags: 0,
                shards: vec![Shard {
                    device_id: [1u8; 32],
                    begin: 1024,
                    end: 2048,
                }],
            }],
        }
    }

    #[test]
    fn round_trips() {
        let geometry = sample_geometry();
        let buf = encode(&geometry);
        let decoded = decode(&buf).unwrap();
        assert_eq!(decoded, geometry);
    }

    #[test]
    fn empty_geometry_round_trips() {
        let geometry = Geometry::default();
        let buf = encode(&geometry);
        let decoded = decode(&buf).unwrap();
        assert_eq!(decoded, geometry);
    }

    #[test]
    fn rejects_truncated_buffer() {
        let geometry = sample_geometry();
        let mut buf = encode(&geometry);
        buf.truncate(buf.len() / 2);
        assert!(decode(&buf).is_err());
    }

    #[test]
    fn rejects_garbage() {
        let buf = vec![0xFFu8; 64];
        assert!(decode(&buf).is_err());
    }
}
