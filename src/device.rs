//! Device codec (Component B).
//!
//! Reads and writes the 1024-byte header that marks a raw block device (or a regular file
//! standing in for one in tests) as a registered PlotFS device, and formats new devices.

use std::path::{Path, PathBuf};

use rand::RngCore;
use snafu::ResultExt;

use crate::block::BlockFile;
use crate::error::{self, Error, Result};

pub const HEADER_LEN: usize = 1024;
const ID_OFFSET: usize = 256;
const ID_LEN: usize = 32;
const BEGIN_OFFSET: usize = ID_OFFSET + ID_LEN;
const END_OFFSET: usize = BEGIN_OFFSET + 8;

/// The byte-exact constant that marks the start of a formatted device. Treated as an opaque
/// compatibility marker, not an authorship statement: changing it invalidates every device
/// formatted with the previous value.
pub const SIGNATURE: &[u8] = b"PlotFS\nby: Matthew Szatmary <matt@szatmary.org> (@m3u8)\nDonate Chia to: xch1hsyyclxn2v59ysd4n8nk577sduw64sg90nr8z26c3h8emq7magdqqzq9n5\n";

pub type DeviceId = [u8; 32];

/// A registered device's identity and usable byte range, as read from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHeader {
    pub id: DeviceId,
    pub begin: u64,
    pub end: u64,
}

impl DeviceHeader {
    fn encode(&self, true_len: u64) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
        buf[ID_OFFSET..ID_OFFSET + ID_LEN].copy_from_slice(&self.id);
        buf[BEGIN_OFFSET..BEGIN_OFFSET + 8].copy_from_slice(&self.begin.to_be_bytes());
        buf[END_OFFSET..END_OFFSET + 8].copy_from_slice(&true_len.to_be_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < END_OFFSET + 8 || &buf[..SIGNATURE.len()] != SIGNATURE {
            return None;
        }
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&buf[ID_OFFSET..ID_OFFSET + ID_LEN]);
        let begin = u64::from_be_bytes(buf[BEGIN_OFFSET..BEGIN_OFFSET + 8].try_into().unwrap());
        let end = u64::from_be_bytes(buf[END_OFFSET..END_OFFSET + 8].try_into().unwrap());
        if begin > end {
            return None;
        }
        Some(Self { id, begin, end })
    }
}

/// Formats `path` as a new PlotFS device: wipes the first 1024 bytes, writes the signature and
/// a fresh random id, and records `begin = 1024` and `end = <true device size>`.
///
/// Fails if the target cannot be opened for read-write or is reported as zero-length.
pub fn format<P: AsRef<Path>>(path: P) -> Result<DeviceHeader> {
    let path = path.as_ref().to_path_buf();
    let block = BlockFile::open_writable(&path).context(error::DeviceIoSnafu { path: path.clone() })?;
    let true_len = block
        .true_len()
        .context(error::DeviceIoSnafu { path: path.clone() })?;
    if true_len == 0 {
        return Err(Error::DeviceConflict {
            path,
            reason: "device is empty, cannot format".to_string(),
        });
    }

    let mut id = [0u8; ID_LEN];
    rand::thread_rng().fill_bytes(&mut id);

    let header = DeviceHeader {
        id,
        begin: HEADER_LEN as u64,
        end: true_len,
    };
    let buf = header.encode(true_len);
    block
        .write_at(0, &buf)
        .context(error::DeviceIoSnafu { path: path.clone() })?;
    block.sync_all().context(error::DeviceIoSnafu { path })?;

    Ok(header)
}

/// Opens `path` and parses its device header, verifying the signature and the `begin <= end`
/// invariant. Returns `DeviceUnformatted` if the signature is absent or malformed rather than a
/// generic I/O error, so callers can distinguish "not a device" from "can't read the device".
pub fn open<P: AsRef<Path>>(path: P) -> Result<DeviceHeader> {
    let path = path.as_ref().to_path_buf();
    let block = BlockFile::open_readable(&path).context(error::DeviceIoSnafu { path: path.clone() })?;
    let mut buf = [0u8; 512];
    let n = block
        .read_at(0, &mut buf)
        .context(error::DeviceIoSnafu { path: path.clone() })?;
    if n != buf.len() {
        return Err(Error::DeviceUnformatted { path });
    }
    DeviceHeader::decode(&buf).ok_or(Error::DeviceUnformatted { path })
}

pub fn hex_id(id: &DeviceId) -> String {
    id.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn id_from_hex(hex: &str) -> Option<DeviceId> {
    if hex.len() != 64 {
        return None;
    }
    let mut id = [0u8; 32];
    for (i, chunk) in id.iter_mut().enumerate() {
        *chunk = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn make_device(size: u64) -> NamedTempFile {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file().set_len(size).unwrap();
        tmp
    }

    #[test]
    fn format_then_open_round_trips() {
        let tmp = make_device(16 * 1024 * 1024);
        let formatted = format(tmp.path()).unwrap();
        assert_eq!(formatted.begin, HEADER_LEN as u64);
        assert_eq!(formatted.end, 16 * 1024 * 1024);

        let reopened = open(tmp.path()).unwrap();
        assert_eq!(reopened, formatted);
    }

    #[test]
    fn open_rejects_unformatted_device() {
        let tmp = make_device(4096);
        assert!(matches!(
            open(tmp.path()),
            Err(Error::DeviceUnformatted { .. })
        ));
    }

    #[test]
    fn format_rejects_empty_device() {
        let tmp = NamedTempFile::new().unwrap();
        assert!(matches!(
            format(tmp.path()),
            Err(Error::DeviceConflict { .. })
        ));
    }

    #[test]
    fn hex_id_round_trips() {
        let id: DeviceId = [0xAB; 32];
        let hex = hex_id(&id);
        assert_eq!(id_from_hex(&hex).unwrap(), id);
    }
}
