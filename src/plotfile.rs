//! Plot-file codec (Component C).
//!
//! A source plot file begins with a fixed 19-byte magic, a 32-byte plot id, and a one-byte `k`
//! parameter. This codec only reads that much; everything past it is treated as an opaque byte
//! stream to be copied verbatim, header included, into the plot's reserved shards.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::error::{self, Result};

pub const MAGIC: &[u8; 19] = b"Proof of Space Plot";
const ID_LEN: usize = 32;

pub struct PlotFile {
    path: PathBuf,
    id: [u8; ID_LEN],
    k: u8,
    size: u64,
}

impl PlotFile {
    /// Opens `path`, verifies the magic, and reads the plot id and `k`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).context(error::PlotIoSnafu { path: path.clone() })?;

        let mut header = [0u8; MAGIC.len() + ID_LEN + 1];
        file.read_exact(&mut header)
            .context(error::PlotIoSnafu { path: path.clone() })?;

        if &header[..MAGIC.len()] != MAGIC {
            return Err(error::Error::PlotInvalid {
                path,
                reason: "missing plot magic".to_string(),
            });
        }

        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&header[MAGIC.len()..MAGIC.len() + ID_LEN]);
        let k = header[MAGIC.len() + ID_LEN];

        let size = file
            .metadata()
            .context(error::PlotIoSnafu { path: path.clone() })?
            .len();
        if size == 0 {
            return Err(error::Error::PlotInvalid {
                path,
                reason: "plot file is empty".to_string(),
            });
        }

        Ok(Self { path, id, k, size })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> [u8; ID_LEN] {
        self.id
    }

    pub fn k(&self) -> u8 {
        self.k
    }

    /// Total on-disk size of the source plot file, header included.
    pub fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_plot(id: [u8; 32], k: u8, payload: &[u8]) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(MAGIC).unwrap();
        tmp.write_all(&id).unwrap();
        tmp.write_all(&[k]).unwrap();
        tmp.write_all(payload).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn opens_well_formed_plot() {
        let id = [0x11; 32];
        let tmp = write_plot(id, 32, b"plot bytes here");
        let plot = PlotFile::open(tmp.path()).unwrap();
        assert_eq!(plot.id(), id);
        assert_eq!(plot.k(), 32);
        assert_eq!(plot.size(), (MAGIC.len() + 32 + 1 + 16) as u64);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"not a plot at all....").unwrap();
        tmp.flush().unwrap();
        assert!(PlotFile::open(tmp.path()).is_err());
    }
}
