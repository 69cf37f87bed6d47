use std::path::{Path, PathBuf};

/// Default ledger path used when the CLI is not given `-c`/`--config`.
pub const DEFAULT_LEDGER_PATH: &str = "/var/local/plotfs/plotfs.bin";

/// Maximum size, per copy, of a single file-to-file transfer chunk during `add_plot`.
///
/// The source plot is copied into its reserved shards in chunks no larger than this so that
/// progress can be reported incrementally; it has no bearing on correctness.
pub const DEFAULT_COPY_CHUNK_SIZE: u64 = 1024 * 1024 * 1024;

/// Runtime configuration for a [`crate::ledger::Ledger`].
#[derive(Clone, Debug)]
pub struct PlotFsConfig {
    /// Path to the geometry ledger file.
    pub(crate) ledger_path: PathBuf,
    /// Maximum size of a single copy chunk during `add_plot`.
    pub(crate) copy_chunk_size: u64,
}

impl PlotFsConfig {
    /// Starts building a configuration rooted at `ledger_path`.
    pub fn from_path<P>(ledger_path: P) -> PlotFsConfigBuilder
    where
        P: AsRef<Path>,
    {
        PlotFsConfigBuilder {
            ledger_path: ledger_path.as_ref().to_path_buf(),
            copy_chunk_size: None,
        }
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }
}

/// Builder for [`PlotFsConfig`].
pub struct PlotFsConfigBuilder {
    ledger_path: PathBuf,
    copy_chunk_size: Option<u64>,
}

impl PlotFsConfigBuilder {
    /// Sets the maximum size of a single copy chunk used while streaming a plot into its
    /// reserved shards.
    ///
    /// Defaults to 1 GiB.
    #[allow(dead_code)]
    pub fn copy_chunk_size(mut self, amount: u64) -> Self {
        self.copy_chunk_size = Some(amount);
        self
    }

    /// Consumes this builder and constructs a [`PlotFsConfig`].
    pub fn build(self) -> PlotFsConfig {
        PlotFsConfig {
            ledger_path: self.ledger_path,
            copy_chunk_size: self.copy_chunk_size.unwrap_or(DEFAULT_COPY_CHUNK_SIZE),
        }
    }
}
