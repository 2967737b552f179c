use std::{
    fs::{read_link, read_to_string},
    io::{Error as IoError, ErrorKind},
    path::{Path, PathBuf},
};

use glob::glob;
use rustix::fs::{Dev, FileType, stat};
use widestring::utfstring::Utf16String;

use crate::{
    BlockidError, Probe,
    probe::{Endianness, ProbeOutcome},
    values::TagName,
};

/// Collect non-NUL UTF-16 code units from a raw byte run, dropping a
/// trailing odd byte.
fn utf16_units(bytes: &[u8], endian: Endianness) -> Vec<u16> {
    return bytes
        .chunks_exact(2)
        .map(|pair| match endian {
            Endianness::Little => u16::from_le_bytes([pair[0], pair[1]]),
            _ => u16::from_be_bytes([pair[0], pair[1]]),
        })
        .filter(|&unit| unit != 0)
        .collect();
}

pub fn decode_utf16_lossy_from(bytes: &[u8], endian: Endianness) -> Utf16String {
    return Utf16String::from_slice_lossy(&utf16_units(bytes, endian)).into();
}

pub fn decode_utf8_lossy_from(bytes: &[u8]) -> String {
    return String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string();
}

/// Latin-1 maps byte-for-byte onto the first 256 code points.
pub fn decode_latin1_lossy_from(bytes: &[u8]) -> String {
    return bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect();
}

pub fn is_power_2(num: u64) -> bool {
    return num != 0 && ((num & (num - 1)) == 0);
}

/// Convert a device number (`Dev`) to a device path.
///
/// # Platform-specific
/// - Linux: uses sysfs `/sys/dev/block/<major>:<minor>`
/// - macOS/FreeBSD: uses `devname` libc function
pub fn devno_to_path(dev: Dev) -> Option<PathBuf> {
    #[cfg(any(target_os = "macos", target_os = "freebsd"))]
    {
        use libc::{S_IFBLK, c_char, dev_t, mode_t};

        unsafe extern "C" {
            unsafe fn devname(dev: dev_t, type_: mode_t) -> *const c_char;
        }

        let ptr = unsafe { devname(dev, S_IFBLK) };
        if ptr.is_null() {
            return None;
        }
        let name = unsafe { std::ffi::CStr::from_ptr(ptr) }.to_string_lossy();

        return Some(PathBuf::from("/dev/").join(name.as_ref()));
    }

    #[cfg(target_os = "linux")]
    {
        use rustix::fs::{major, minor};

        let path = read_link(format!("/sys/dev/block/{}:{}", major(dev), minor(dev))).ok()?;
        let target = path.file_name()?.to_str()?;

        return Some(PathBuf::from("/dev/").join(target));
    }
}

/// Convert a device path to its device number (`Dev`).
///
/// Returns [`IoError`] if:
/// - the path does not exist,
/// - or the path does not point to a block device.
pub fn path_to_devno<P: AsRef<Path>>(path: P) -> Result<Dev, IoError> {
    let st = stat(path.as_ref())?;
    if !FileType::from_raw_mode(st.st_mode).is_block_device() {
        return Err(IoError::new(
            ErrorKind::InvalidInput,
            "path is not a block device",
        ));
    }
    return Ok(st.st_rdev);
}

#[cfg(target_os = "linux")]
const BLOCK_PATTERNS: &[&str] = &[
    "/dev/sd*",
    "/dev/hd*",
    "/dev/vd*",
    "/dev/nvme*n*",
    "/dev/loop*",
    "/dev/ram*",
    "/dev/md*",
    "/dev/mapper/*",
];

#[cfg(target_os = "freebsd")]
const BLOCK_PATTERNS: &[&str] = &[
    "/dev/ada*",
    "/dev/da*",
    "/dev/nvd*",
    "/dev/cd*",
    "/dev/acd*",
    "/dev/md*",
];

#[cfg(target_os = "macos")]
const BLOCK_PATTERNS: &[&str] = &["/dev/disk*"];

/// Enumerate candidate block device paths.
///
/// On Linux `/proc/partitions` is authoritative; glob patterns over
/// `/dev` are the fallback (and the only path on other systems).
pub fn all_block_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "linux")]
    if let Ok(partitions) = read_to_string("/proc/partitions") {
        let paths: Vec<PathBuf> = partitions
            .lines()
            .skip(2)
            .filter_map(|line| line.split_whitespace().nth(3))
            .map(|name| PathBuf::from("/dev/").join(name))
            .collect();
        if !paths.is_empty() {
            return paths;
        }
    }

    let mut paths = Vec::new();
    for pattern in BLOCK_PATTERNS {
        let Ok(entries) = glob(pattern) else { continue };
        for entry in entries.flatten() {
            paths.push(entry);
        }
    }
    paths
}

fn block_from_tag(name: TagName, value: &str, symlink_dir: &str) -> Result<PathBuf, BlockidError> {
    log::debug!("looking for {name}={value}");

    #[cfg(target_os = "linux")]
    {
        if let Ok(buf) = read_link(format!("{symlink_dir}/{value}"))
            && let Some(t) = buf.file_name()
        {
            return Ok(PathBuf::from("/dev/").join(t));
        };
    }
    #[cfg(not(target_os = "linux"))]
    let _ = symlink_dir;

    for path in all_block_paths() {
        let Ok(stat) = stat(&path) else { continue };
        if !FileType::from_raw_mode(stat.st_mode).is_block_device() {
            continue;
        }

        let Ok(mut probe) = Probe::from_filename(&path) else {
            continue;
        };
        match probe.do_safeprobe() {
            Ok(ProbeOutcome::Found) => (),
            _ => continue,
        }

        if probe.values().lookup_string(name).as_deref() == Some(value) {
            return Ok(path);
        }
    }
    return Err(BlockidError::BlockNotFound);
}

/// Find the block device carrying the given filesystem UUID.
pub fn block_from_uuid(uuid: &str) -> Result<PathBuf, BlockidError> {
    block_from_tag(TagName::Uuid, uuid, "/dev/disk/by-uuid")
}

/// Find the block device carrying the given filesystem label.
pub fn block_from_label(label: &str) -> Result<PathBuf, BlockidError> {
    block_from_tag(TagName::Label, label, "/dev/disk/by-label")
}
