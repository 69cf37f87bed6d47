//! Block I/O primitive (Component A).
//!
//! Wraps a single open path — a regular file or a raw block device — and exposes the subset
//! of operations the rest of the crate needs: true byte length (querying the kernel directly
//! when the target is a block device, since `stat` reports zero for those), positioned
//! read/write that loops through short reads/writes, and a durable sync.
//!
//! This is the synchronous counterpart to a `Filesystem`/`AsyncFile` pair: PlotFS's ledger
//! manager and plot writer are single-threaded, so there is no scheduler to hand I/O off to.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use nix::ioctl_read;

// BLKGETSIZE64, from <linux/fs.h>: returns the device size in bytes as a u64.
ioctl_read!(blk_get_size64, 0x12, 114, u64);

const FILE_MODE_OWNER_RW: u32 = 0o600;

/// An open handle to either a regular file or a raw block device.
#[derive(Debug)]
pub struct BlockFile {
    path: PathBuf,
    file: File,
    is_block_device: bool,
}

impl BlockFile {
    /// Opens `path` read-only.
    pub fn open_readable<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::open(path, false)
    }

    /// Opens `path` read-write, creating a regular file if it does not already exist. Block
    /// devices are never created by this call; they must already exist as device nodes.
    pub fn open_writable<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::open(path, true)
    }

    fn open<P: AsRef<Path>>(path: P, writable: bool) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.read(true);
        if writable {
            options.write(true).mode(FILE_MODE_OWNER_RW);
            if !path.exists() {
                options.create(true);
            }
        }
        let file = options.open(&path)?;
        let is_block_device = file.metadata()?.file_type().is_block_device();
        Ok(Self {
            path,
            file,
            is_block_device,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the true byte length of the underlying target.
    ///
    /// For a regular file this is `stat`'s reported size. For a block device, `stat` reports
    /// zero, so the kernel is queried directly via `BLKGETSIZE64`.
    pub fn true_len(&self) -> io::Result<u64> {
        if self.is_block_device {
            let mut size: u64 = 0;
            unsafe { blk_get_size64(self.file.as_raw_fd(), &mut size) }
                .map_err(|errno| io::Error::from_raw_os_error(errno as i32))?;
            Ok(size)
        } else {
            Ok(self.file.metadata()?.len())
        }
    }

    /// Reads exactly `buf.len()` bytes starting at `offset`, looping through any short reads.
    /// Returns the number of bytes actually read, which is less than `buf.len()` only at EOF.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;

        let mut total = 0;
        while total < buf.len() {
            match self.file.read_at(&mut buf[total..], offset + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Writes all of `buf` starting at `offset`, looping through any short writes.
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;

        let mut total = 0;
        while total < buf.len() {
            match self.file.write_at(&buf[total..], offset + total as u64) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "write returned zero bytes",
                    ))
                }
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Flushes all buffered writes and metadata to durable storage.
    pub fn sync_all(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    pub(crate) fn as_file(&self) -> &File {
        &self.file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn read_write_round_trip() {
        let tmp = NamedTempFile::new().unwrap();
        let bf = BlockFile::open_writable(tmp.path()).unwrap();
        bf.write_at(0, b"hello world").unwrap();
        bf.sync_all().unwrap();

        let mut buf = [0u8; 5];
        let n = bf.read_at(6, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn true_len_matches_regular_file_size() {
        let tmp = NamedTempFile::new().unwrap();
        let bf = BlockFile::open_writable(tmp.path()).unwrap();
        bf.write_at(0, &[0u8; 4096]).unwrap();
        assert_eq!(bf.true_len().unwrap(), 4096);
    }

    #[test]
    fn short_read_past_eof_returns_partial_count() {
        let tmp = NamedTempFile::new().unwrap();
        let bf = BlockFile::open_writable(tmp.path()).unwrap();
        bf.write_at(0, b"abc").unwrap();
        let mut buf = [0u8; 10];
        let n = bf.read_at(0, &mut buf).unwrap();
        assert_eq!(n, 3);
    }
}
