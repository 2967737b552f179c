//! Block device identification.
//!
//! The crate probes a block device or image file for the on-disk format
//! it carries: filesystem, RAID member, encrypted container, or a
//! partition table signature. Results are textual tags (`TYPE`, `LABEL`,
//! `UUID`, ...) collected on a [`Probe`] context.
//!
//! ```no_run
//! use std::path::Path;
//! use libblockprobe::{Probe, ProbeOutcome, TagName};
//!
//! fn main() -> Result<(), libblockprobe::BlockidError> {
//!     let mut probe = Probe::from_filename(Path::new("/dev/sda1"))?;
//!     if probe.do_safeprobe()? == ProbeOutcome::Found {
//!         if let Some(fstype) = probe.values().lookup_string(TagName::Type) {
//!             println!("{fstype}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod containers;
pub mod filesystems;
pub mod filter;
pub mod ioctl;
pub mod partitions;
pub mod probe;
pub mod util;
pub mod values;

#[cfg(test)]
mod tests;

pub use crate::{
    filter::{ChainFilter, FilterFlag, UsageFlags},
    probe::{
        BlockidIdinfo, BlockidMagic, Endianness, PROBES, Probe, ProbeFlags, ProbeOutcome,
        UsageType,
    },
    values::{LabelEncoding, ProbeValue, ProbeValues, TagFlags, TagName},
};

use std::io::{Error as IoError, ErrorKind as IoErrorKind};

use thiserror::Error;

use crate::{containers::ContError, filesystems::FsError, partitions::PtError};

#[derive(Debug, Error)]
pub enum BlockidError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("*NIX error: {0}")]
    NixError(#[from] rustix::io::Errno),
    #[error("Filesystem error: {0}")]
    FsError(#[from] FsError),
    #[error("Container error: {0}")]
    ContError(#[from] ContError),
    #[error("Partition table error: {0}")]
    PtError(#[from] PtError),
    #[error("{0} probes claim the device")]
    AmbivalentProbe(usize),
    #[error("No block device found")]
    BlockNotFound,
}

impl BlockidError {
    /// Whether the error chain carries an I/O failure that must abort the
    /// probe walk. `UnexpectedEof` and `NotFound` are ordinary "no match"
    /// conditions on small devices and never count.
    pub fn is_fatal_io(&self) -> bool {
        if matches!(self, BlockidError::NixError(_)) {
            return true;
        }

        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = source {
            if let Some(io) = err.downcast_ref::<IoError>()
                && !matches!(
                    io.kind(),
                    IoErrorKind::UnexpectedEof | IoErrorKind::NotFound
                )
            {
                return true;
            }
            source = err.source();
        }
        false
    }
}
