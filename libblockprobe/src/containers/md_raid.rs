use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U32, U64},
};

use crate::{
    BlockidError,
    containers::ContError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::{TagFlags, TagName},
};

#[derive(Debug, Error)]
pub enum MdRaidError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Device too small for an md superblock")]
    DeviceTooSmall,
    #[error("No md superblock at any known location")]
    NoSuperblock,
}

const MD_RESERVED_BYTES: u64 = 0x10000;
const MD_SB_MAGIC: u32 = 0xa92b_4efc;

pub const MD_RAID_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "linux_raid_member",
    usage: UsageType::Raid,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_md_raid(probe, magic)
            .map_err(ContError::from)
            .map_err(BlockidError::from)
    },
    // superblock locations depend on the device size
    magics: None,
};

/// Legacy 0.90 superblock; stored in the byte order of the creating
/// host.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
struct Mdp0SuperBlock {
    md_magic: u32,
    major_version: u32,
    minor_version: u32,
    patch_version: u32,
    gvalid_words: u32,
    set_uuid0: u32,
    ctime: u32,
    level: u32,
    size: u32,
    nr_disks: u32,
    raid_disks: u32,
    md_minor: u32,
    not_persistent: u32,
    set_uuid1: u32,
    set_uuid2: u32,
    set_uuid3: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct Mdp1SuperBlock {
    magic: U32<LittleEndian>,
    major_version: U32<LittleEndian>,
    feature_map: U32<LittleEndian>,
    pad0: U32<LittleEndian>,
    set_uuid: [u8; 16],
    set_name: [u8; 32],
    ctime: U64<LittleEndian>,
    level: U32<LittleEndian>,
    layout: U32<LittleEndian>,
    size: U64<LittleEndian>,
    chunksize: U32<LittleEndian>,
    raid_disks: U32<LittleEndian>,
    bitmap_offset: U32<LittleEndian>,
    new_level: U32<LittleEndian>,
    reshape_position: U64<LittleEndian>,
    delta_disks: U32<LittleEndian>,
    new_layout: U32<LittleEndian>,
    new_chunk: U32<LittleEndian>,
    pad1: [u8; 4],
    data_offset: U64<LittleEndian>,
    data_size: U64<LittleEndian>,
    super_offset: U64<LittleEndian>,
    recovery_offset: U64<LittleEndian>,
    dev_number: U32<LittleEndian>,
    cnt_corrected_read: U32<LittleEndian>,
    device_uuid: [u8; 16],
    devflags: u8,
    pad2: [u8; 7],
}

fn sbmagic(probe: &mut Probe, offset: u64) {
    let values = probe.values_mut();
    if values.flags().contains(TagFlags::MAGIC) {
        values.set_value(TagName::Sbmagic, &MD_SB_MAGIC.to_le_bytes());
        values.set_string(TagName::SbmagicOffset, &offset.to_string());
    }
}

/// 0.90 keeps the set uuid as four host-order words; render them
/// big-endian so the text form matches mdadm's.
fn probe_raid0(probe: &mut Probe, offset: u64) -> Result<bool, MdRaidError> {
    let sb: Mdp0SuperBlock = match probe.map_from_file(offset) {
        Ok(sb) => sb,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(MdRaidError::from(e)),
    };

    let (ma, mi, pa, words) = if u32::from_le(sb.md_magic) == MD_SB_MAGIC {
        (
            u32::from_le(sb.major_version),
            u32::from_le(sb.minor_version),
            u32::from_le(sb.patch_version),
            [
                u32::from_le(sb.set_uuid0),
                u32::from_le(sb.set_uuid1),
                u32::from_le(sb.set_uuid2),
                u32::from_le(sb.set_uuid3),
            ],
        )
    } else if u32::from_be(sb.md_magic) == MD_SB_MAGIC {
        (
            u32::from_be(sb.major_version),
            u32::from_be(sb.minor_version),
            u32::from_be(sb.patch_version),
            [
                u32::from_be(sb.set_uuid0),
                u32::from_be(sb.set_uuid1),
                u32::from_be(sb.set_uuid2),
                u32::from_be(sb.set_uuid3),
            ],
        )
    } else {
        return Ok(false);
    };

    let mut uuid = [0u8; 16];
    uuid[0..4].copy_from_slice(&words[0].to_be_bytes());
    // pre-0.90 sets only carry the first uuid word
    if mi >= 90 {
        uuid[4..8].copy_from_slice(&words[1].to_be_bytes());
        uuid[8..12].copy_from_slice(&words[2].to_be_bytes());
        uuid[12..16].copy_from_slice(&words[3].to_be_bytes());
    }

    let values = probe.values_mut();
    values.set_uuid(&uuid);
    values.set_version(&format!("{ma}.{mi}.{pa}"));
    sbmagic(probe, offset);

    return Ok(true);
}

fn probe_raid1(probe: &mut Probe, offset: u64) -> Result<bool, MdRaidError> {
    let sb: Mdp1SuperBlock = match probe.map_from_file(offset) {
        Ok(sb) => sb,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(MdRaidError::from(e)),
    };

    if sb.magic.get() != MD_SB_MAGIC {
        return Ok(false);
    }
    if sb.major_version.get() != 1 {
        return Ok(false);
    }
    // the superblock records its own sector; a mismatch means we are
    // looking at a copy inside a member filesystem
    if sb.super_offset.get() != offset >> 9 {
        return Ok(false);
    }

    let values = probe.values_mut();
    values.set_uuid(&sb.set_uuid);
    values.set_uuid_as(TagName::UuidSub, &sb.device_uuid);
    values.set_label(&sb.set_name);
    sbmagic(probe, offset);

    return Ok(true);
}

pub fn probe_md_raid(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), MdRaidError> {
    let size = probe.size();

    if size <= MD_RESERVED_BYTES {
        return Err(MdRaidError::DeviceTooSmall);
    }

    // 0.90 lives in the last size-aligned 64KiB window
    let sboff = (size & !(MD_RESERVED_BYTES - 1)) - MD_RESERVED_BYTES;
    if probe_raid0(probe, sboff)? {
        return Ok(());
    }

    // 1.0 at the end, 1.1 at the start, 1.2 at 4KiB
    let candidates = [(size - 0x2000, "1.0"), (0, "1.1"), (0x1000, "1.2")];
    for (offset, version) in candidates {
        if probe_raid1(probe, offset)? {
            probe.values_mut().set_version(version);
            return Ok(());
        }
    }

    return Err(MdRaidError::NoSuperblock);
}
