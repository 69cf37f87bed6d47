//! PlotFS: a virtual, read-only filesystem that aggregates raw block devices into a namespace
//! of proof-of-space plot files.
//!
//! This crate is the core library: the geometry ledger, device/plot/recovery-point codecs, the
//! allocator, the plot writer, and the virtual read-path translation used to serve plot reads.
//! It does not itself bind to any userspace-filesystem API (FUSE or otherwise); that binding is
//! expected to be a thin external consumer of [`vfs`].

pub mod allocator;
pub mod block;
pub mod config;
pub mod device;
pub mod error;
pub mod geometry;
pub mod ledger;
pub mod plotfile;
pub mod recovery;
pub mod vfs;
pub mod writer;

pub use config::PlotFsConfig;
pub use error::{Error, Result};
pub use ledger::Ledger;
