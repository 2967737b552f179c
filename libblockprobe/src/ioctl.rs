use std::{
    fs::File,
    io::Error as IoError,
    os::fd::AsFd,
};

use bitflags::bitflags;
use rustix::fs::fstat;
#[cfg(target_os = "linux")]
use rustix::{
    io,
    ioctl::{Getter, ioctl},
};

#[cfg(target_os = "linux")]
const BLKGETSIZE64: u32 = 0x80081272;
#[cfg(target_os = "linux")]
const BLKGETSIZE: u32 = 0x1260;
#[cfg(target_os = "linux")]
const BLKSSZGET: u32 = 0x1268;
#[cfg(target_os = "linux")]
const BLKGETZONESZ: u32 = 0x80047284;
#[cfg(target_os = "linux")]
const IOC_OPAL_GET_STATUS: u32 = 2148036844;

#[cfg(target_os = "linux")]
#[inline]
pub fn ioctl_blkgetsize64<Fd: AsFd>(fd: Fd) -> io::Result<u64> {
    unsafe {
        let ctl = Getter::<{ BLKGETSIZE64 }, u64>::new();
        ioctl(fd, ctl)
    }
}

#[cfg(target_os = "linux")]
#[inline]
pub fn ioctl_blkgetsize<Fd: AsFd>(fd: Fd) -> io::Result<usize> {
    unsafe {
        let ctl = Getter::<{ BLKGETSIZE }, usize>::new();
        ioctl(fd, ctl)
    }
}

#[cfg(target_os = "linux")]
#[inline]
pub fn ioctl_blksszget<Fd: AsFd>(fd: Fd) -> io::Result<u32> {
    unsafe {
        let ctl = Getter::<{ BLKSSZGET }, u32>::new();
        ioctl(fd, ctl)
    }
}

/// Zone size in 512-byte sectors, `0` for non-zoned devices.
#[cfg(target_os = "linux")]
#[inline]
pub fn ioctl_blkgetzonesz<Fd: AsFd>(fd: Fd) -> io::Result<u32> {
    unsafe {
        let ctl = Getter::<{ BLKGETZONESZ }, u32>::new();
        ioctl(fd, ctl)
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct OpalStatusFlags: u32 {
        const OPAL_FL_SUPPORTED         = 0x00000001;
        const OPAL_FL_LOCKING_SUPPORTED = 0x00000002;
        const OPAL_FL_LOCKING_ENABLED   = 0x00000004;
        const OPAL_FL_LOCKED            = 0x00000008;
        const OPAL_FL_MBR_ENABLED       = 0x00000010;
        const OPAL_FL_MBR_DONE          = 0x00000020;
        const OPAL_FL_SUM_SUPPORTED     = 0x00000040;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct OpalStatus {
    pub flags: OpalStatusFlags,
    pub reserved: u32,
}

#[cfg(target_os = "linux")]
#[inline]
pub fn ioctl_ioc_opal_get_status<Fd: AsFd>(fd: Fd) -> io::Result<OpalStatus> {
    unsafe {
        let ctl = Getter::<{ IOC_OPAL_GET_STATUS }, OpalStatus>::new();
        ioctl(fd, ctl)
    }
}

/// Logical sector size of a block device, falling back to 512 when the
/// ioctl is unavailable.
pub fn logical_sector_size<Fd: AsFd>(fd: Fd) -> u32 {
    #[cfg(target_os = "linux")]
    {
        match ioctl_blksszget(fd) {
            Ok(ssz) if ssz != 0 => return ssz,
            Ok(_) => (),
            Err(e) => log::debug!("BLKSSZGET failed: {e}"),
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = fd;
    512
}

/// Total byte length of a block device.
///
/// Tries the 64-bit size ioctl, then the sector-count ioctl, then the
/// stat size, and as a last resort bisects with single-byte reads.
pub fn device_size_bytes(file: &File) -> Result<u64, IoError> {
    #[cfg(target_os = "linux")]
    {
        match ioctl_blkgetsize64(file.as_fd()) {
            Ok(size) => return Ok(size),
            Err(e) => log::debug!("BLKGETSIZE64 failed: {e}"),
        }
        match ioctl_blkgetsize(file.as_fd()) {
            Ok(sectors) => return Ok(sectors as u64 * 512),
            Err(e) => log::debug!("BLKGETSIZE failed: {e}"),
        }
    }

    let stat = fstat(file.as_fd())?;
    if stat.st_size > 0 {
        return Ok(stat.st_size as u64);
    }

    return Ok(size_by_bisection(file));
}

fn read_one_at(file: &File, offset: u64) -> bool {
    let mut byte = [0u8; 1];
    matches!(rustix::io::pread(file, &mut byte, offset), Ok(1))
}

/// "Double until a read fails, then bisect." Only used when every size
/// query above came back empty.
fn size_by_bisection(file: &File) -> u64 {
    if !read_one_at(file, 0) {
        return 0;
    }

    let mut high: u64 = 512;
    while read_one_at(file, high) {
        match high.checked_mul(2) {
            Some(next) => high = next,
            None => return u64::MAX,
        }
    }

    let mut low = high / 2;
    while low + 1 < high {
        let mid = low + (high - low) / 2;
        if read_one_at(file, mid) {
            low = mid;
        } else {
            high = mid;
        }
    }
    high
}
