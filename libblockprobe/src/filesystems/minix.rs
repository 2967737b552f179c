use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use crate::{
    BlockidError,
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
};

#[derive(Debug, Error)]
pub enum MinixError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Unknown superblock magic")]
    UnknownVersion,
    #[error("Superblock geometry fails sanity checks")]
    InvalidGeometry,
    #[error("Device carries an ext superblock")]
    ExtMagicPresent,
}

const MINIX_SB_OFFSET: u64 = 1024;
const MINIX_BLOCK_SIZE: u64 = 1024;

const MINIX_SUPER_MAGIC: u16 = 0x137F;
const MINIX_SUPER_MAGIC2: u16 = 0x138F;
const MINIX2_SUPER_MAGIC: u16 = 0x2468;
const MINIX2_SUPER_MAGIC2: u16 = 0x2478;
const MINIX3_SUPER_MAGIC: u16 = 0x4d5a;

const MINIX_VALID_FS: u16 = 0x0001;
const MINIX_ERROR_FS: u16 = 0x0002;

pub const MINIX_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "minix",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_minix(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[
        // version 1, LE then BE
        BlockidMagic {
            magic: b"\x7f\x13",
            len: 2,
            b_offset: 1024 + 0x10,
            zone: None,
        },
        BlockidMagic {
            magic: b"\x8f\x13",
            len: 2,
            b_offset: 1024 + 0x10,
            zone: None,
        },
        BlockidMagic {
            magic: b"\x13\x7f",
            len: 2,
            b_offset: 1024 + 0x10,
            zone: None,
        },
        BlockidMagic {
            magic: b"\x13\x8f",
            len: 2,
            b_offset: 1024 + 0x10,
            zone: None,
        },
        // version 2, LE then BE
        BlockidMagic {
            magic: b"\x68\x24",
            len: 2,
            b_offset: 1024 + 0x10,
            zone: None,
        },
        BlockidMagic {
            magic: b"\x78\x24",
            len: 2,
            b_offset: 1024 + 0x10,
            zone: None,
        },
        BlockidMagic {
            magic: b"\x24\x68",
            len: 2,
            b_offset: 1024 + 0x10,
            zone: None,
        },
        BlockidMagic {
            magic: b"\x24\x78",
            len: 2,
            b_offset: 1024 + 0x10,
            zone: None,
        },
        // version 3, LE then BE
        BlockidMagic {
            magic: b"\x5a\x4d",
            len: 2,
            b_offset: 1024 + 0x18,
            zone: None,
        },
        BlockidMagic {
            magic: b"\x4d\x5a",
            len: 2,
            b_offset: 1024 + 0x18,
            zone: None,
        },
    ]),
};

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct MinixSuperBlock {
    s_ninodes: u16,
    s_nzones: u16,
    s_imap_blocks: u16,
    s_zmap_blocks: u16,
    s_firstdatazone: u16,
    s_log_zone_size: u16,
    s_max_size: u32,
    s_magic: u16,
    s_state: u16,
    s_zones: u32,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct Minix3SuperBlock {
    s_ninodes: u32,
    s_pad0: u16,
    s_imap_blocks: u16,
    s_zmap_blocks: u16,
    s_firstdatazone: u16,
    s_log_zone_size: u16,
    s_pad1: u16,
    s_max_size: u32,
    s_zones: u32,
    s_magic: u16,
    s_pad2: u16,
    s_blocksize: u16,
    s_disk_version: u8,
}

fn swab16(swab: bool, num: u16) -> u16 {
    if swab {
        return num.swap_bytes();
    }
    return num;
}

fn swab32(swab: bool, num: u32) -> u32 {
    if swab {
        return num.swap_bytes();
    }
    return num;
}

/// Returns the on-disk version and whether the fields are stored in
/// the opposite byte order to the host.
fn minix_version(sb: &MinixSuperBlock, sb3: &Minix3SuperBlock) -> Option<(u32, bool)> {
    for other_endian in [false, true] {
        let magic = swab16(other_endian, sb.s_magic);
        let version = match magic {
            MINIX_SUPER_MAGIC | MINIX_SUPER_MAGIC2 => 1,
            MINIX2_SUPER_MAGIC | MINIX2_SUPER_MAGIC2 => 2,
            _ => {
                if swab16(other_endian, sb3.s_magic) == MINIX3_SUPER_MAGIC {
                    3
                } else {
                    continue;
                }
            }
        };
        return Some((version, other_endian));
    }
    return None;
}

pub fn probe_minix(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), MinixError> {
    let sb: MinixSuperBlock = probe.map_from_file(MINIX_SB_OFFSET)?;
    let sb3: Minix3SuperBlock = probe.map_from_file(MINIX_SB_OFFSET)?;

    let (version, swabme) =
        minix_version(&sb, &sb3).ok_or(MinixError::UnknownVersion)?;

    let (zones, ninodes, imaps, zmaps, firstz, zone_size) = match version {
        1 | 2 => {
            let state = swab16(swabme, sb.s_state);
            if (state & (MINIX_VALID_FS | MINIX_ERROR_FS)) != state {
                return Err(MinixError::InvalidGeometry);
            }

            let zones = if version == 2 {
                u64::from(swab32(swabme, sb.s_zones))
            } else {
                u64::from(swab16(swabme, sb.s_nzones))
            };
            (
                zones,
                u64::from(swab16(swabme, sb.s_ninodes)),
                u64::from(swab16(swabme, sb.s_imap_blocks)),
                u64::from(swab16(swabme, sb.s_zmap_blocks)),
                u64::from(swab16(swabme, sb.s_firstdatazone)),
                sb.s_log_zone_size,
            )
        }
        _ => (
            u64::from(swab32(swabme, sb3.s_zones)),
            u64::from(swab32(swabme, sb3.s_ninodes)),
            u64::from(swab16(swabme, sb3.s_imap_blocks)),
            u64::from(swab16(swabme, sb3.s_zmap_blocks)),
            u64::from(swab16(swabme, sb3.s_firstdatazone)),
            sb3.s_log_zone_size,
        ),
    };

    // sanity checks matching fsck.minix's read_superblock
    if zone_size != 0 || ninodes == 0 || ninodes == u64::from(u32::MAX) {
        return Err(MinixError::InvalidGeometry);
    }
    if imaps * MINIX_BLOCK_SIZE * 8 < ninodes + 1 {
        return Err(MinixError::InvalidGeometry);
    }
    if firstz > zones {
        return Err(MinixError::InvalidGeometry);
    }
    if zmaps * MINIX_BLOCK_SIZE * 8 < zones - firstz + 1 {
        return Err(MinixError::InvalidGeometry);
    }

    // parts of an ext3 fs can read as a plausible minix superblock
    let ext: [u8; 2] = probe.read_exact_at(0x400 + 0x38)?;
    if ext == [0x53, 0xEF] {
        return Err(MinixError::ExtMagicPresent);
    }

    probe.values_mut().set_version(&version.to_string());
    return Ok(());
}
