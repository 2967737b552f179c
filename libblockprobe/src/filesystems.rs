pub mod befs;
pub mod btrfs;
pub mod exfat;
pub mod ext;
pub mod f2fs;
pub mod iso9660;
pub mod linux_swap;
pub mod minix;
pub mod nilfs2;
pub mod ntfs;
pub mod reiserfs;
pub mod scoutfs;
pub mod squashfs;
pub mod udf;
pub mod vfat;
pub mod volume_id;
pub mod xfs;
pub mod zfs;

use thiserror::Error;

use crate::filesystems::{
    befs::BefsError, btrfs::BtrfsError, exfat::ExFatError, ext::ExtError, f2fs::F2fsError,
    iso9660::IsoError, linux_swap::SwapError, minix::MinixError, nilfs2::NilfsError,
    ntfs::NtfsError, reiserfs::ReiserError, scoutfs::ScoutFsError, squashfs::SquashError,
    udf::UdfError, vfat::FatError, xfs::XfsError, zfs::ZfsError,
};

#[derive(Debug, Error)]
pub enum FsError {
    #[error("BeFS filesystem error: {0}")]
    Befs(#[from] BefsError),
    #[error("BTRFS filesystem error: {0}")]
    Btrfs(#[from] BtrfsError),
    #[error("EXFAT filesystem error: {0}")]
    Exfat(#[from] ExFatError),
    #[error("EXT filesystem error: {0}")]
    Ext(#[from] ExtError),
    #[error("F2FS filesystem error: {0}")]
    F2fs(#[from] F2fsError),
    #[error("ISO9660 filesystem error: {0}")]
    Iso9660(#[from] IsoError),
    #[error("Linux Swap filesystem error: {0}")]
    LinuxSwap(#[from] SwapError),
    #[error("MINIX filesystem error: {0}")]
    Minix(#[from] MinixError),
    #[error("NILFS2 filesystem error: {0}")]
    Nilfs(#[from] NilfsError),
    #[error("NTFS filesystem error: {0}")]
    Ntfs(#[from] NtfsError),
    #[error("ReiserFS filesystem error: {0}")]
    Reiser(#[from] ReiserError),
    #[error("ScoutFS filesystem error: {0}")]
    ScoutFs(#[from] ScoutFsError),
    #[error("Squash filesystem error: {0}")]
    Squash(#[from] SquashError),
    #[error("UDF filesystem error: {0}")]
    Udf(#[from] UdfError),
    #[error("VFAT filesystem error: {0}")]
    Vfat(#[from] FatError),
    #[error("XFS filesystem error: {0}")]
    Xfs(#[from] XfsError),
    #[error("ZFS filesystem error: {0}")]
    Zfs(#[from] ZfsError),
}
