//! Recovery-point codec (Component E).
//!
//! The 64-byte header written at the start of every shard: enough to identify the shard as a
//! PlotFS recovery point, record how many plot bytes follow it, and name the device that holds
//! the next shard of the same plot. The original implementation this format is carried from also
//! computes a `next_device_offset` for the header but drops it before it reaches disk, so the
//! on-disk header only ever carries `next_device_id`; this codec matches that byte-exact shape
//! rather than inventing a wider one.

pub const HEADER_LEN: usize = 64;
const MAGIC: &[u8; 22] = b"PlotFS Recovery Point\0";
const VERSION: u8 = 64;

const SHARD_SIZE_OFFSET: usize = 24;
const NEXT_DEVICE_ID_OFFSET: usize = 32;
const NEXT_DEVICE_ID_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPoint {
    pub shard_size: u64,
    pub next_device_id: Option<[u8; 32]>,
}

impl RecoveryPoint {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..MAGIC.len()].copy_from_slice(MAGIC);
        buf[23] = VERSION;
        buf[SHARD_SIZE_OFFSET..SHARD_SIZE_OFFSET + 8].copy_from_slice(&self.shard_size.to_be_bytes());
        if let Some(id) = self.next_device_id {
            buf[NEXT_DEVICE_ID_OFFSET..NEXT_DEVICE_ID_OFFSET + NEXT_DEVICE_ID_LEN].copy_from_slice(&id);
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN || &buf[..MAGIC.len()] != MAGIC || buf[23] != VERSION {
            return None;
        }
        let shard_size = u64::from_be_bytes(
            buf[SHARD_SIZE_OFFSET..SHARD_SIZE_OFFSET + 8]
                .try_into()
                .unwrap(),
        );
        let mut next_device_id = [0u8; NEXT_DEVICE_ID_LEN];
        next_device_id
            .copy_from_slice(&buf[NEXT_DEVICE_ID_OFFSET..NEXT_DEVICE_ID_OFFSET + NEXT_DEVICE_ID_LEN]);
        let next_device_id = if next_device_id == [0u8; NEXT_DEVICE_ID_LEN] {
            None
        } else {
            Some(next_device_id)
        };

        Some(Self {
            shard_size,
            next_device_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_next_shard() {
        let rp = RecoveryPoint {
            shard_size: 1 << 30,
            next_device_id: Some([7u8; 32]),
        };
        let decoded = RecoveryPoint::decode(&rp.encode()).unwrap();
        assert_eq!(decoded, rp);
    }

    #[test]
    fn round_trips_as_last_shard() {
        let rp = RecoveryPoint {
            shard_size: 512,
            next_device_id: None,
        };
        let decoded = RecoveryPoint::decode(&rp.encode()).unwrap();
        assert_eq!(decoded.next_device_id, None);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = [0u8; HEADER_LEN];
        assert!(RecoveryPoint::decode(&buf).is_none());
    }
}
