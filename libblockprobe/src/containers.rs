pub mod bitlocker;
pub mod fvault2;
pub mod luks;
pub mod lvm;
pub mod md_raid;
pub mod mpool;
pub mod stratis;

use thiserror::Error;

use crate::containers::{
    bitlocker::BitlockerError, fvault2::Fvault2Error, luks::LuksError, lvm::LvmError,
    md_raid::MdRaidError, mpool::MpoolError, stratis::StratisError,
};

#[derive(Debug, Error)]
pub enum ContError {
    #[error("BitLocker container error: {0}")]
    Bitlocker(#[from] BitlockerError),
    #[error("FileVault2 container error: {0}")]
    Fvault2(#[from] Fvault2Error),
    #[error("LUKS container error: {0}")]
    Luks(#[from] LuksError),
    #[error("LVM container error: {0}")]
    Lvm(#[from] LvmError),
    #[error("MD RAID container error: {0}")]
    MdRaid(#[from] MdRaidError),
    #[error("mpool container error: {0}")]
    Mpool(#[from] MpoolError),
    #[error("Stratis container error: {0}")]
    Stratis(#[from] StratisError),
}
