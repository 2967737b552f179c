use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32, U64},
};

use crate::{
    BlockidError,
    checksum::{crc32c, sha256, xxh64},
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::TagName,
};

#[derive(Debug, Error)]
pub enum BtrfsError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Unknown checksum type {0}")]
    UnknownCsumType(u16),
    #[error("Superblock checksum invalid")]
    ChecksumInvalid,
    #[error("Superblock sector size is zero")]
    ZeroSectorSize,
    #[error("No superblock in the log zones")]
    NoZonedSuperblock,
}

pub const BTRFS_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "btrfs",
    usage: UsageType::Filesystem,
    minsz: Some(1024 * 1024),
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_btrfs(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[
        BlockidMagic {
            magic: b"_BHRfS_M",
            len: 8,
            b_offset: 64 * 1024 + 0x40,
            zone: None,
        },
        /* zoned layout keeps superblocks in the first two log zones */
        BlockidMagic {
            magic: b"_BHRfS_M",
            len: 8,
            b_offset: 0x40,
            zone: Some(0),
        },
        BlockidMagic {
            magic: b"_BHRfS_M",
            len: 8,
            b_offset: 0x40,
            zone: Some(1),
        },
    ]),
};

const BTRFS_SUPER_INFO_SIZE: usize = 4096;
const BTRFS_CSUM_SIZE: usize = 32;

const BTRFS_CSUM_TYPE_CRC32: u16 = 0;
const BTRFS_CSUM_TYPE_XXHASH: u16 = 1;
const BTRFS_CSUM_TYPE_SHA256: u16 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct BtrfsDevItem {
    pub devid: U64<LittleEndian>,
    pub total_bytes: U64<LittleEndian>,
    pub bytes_used: U64<LittleEndian>,
    pub io_align: U32<LittleEndian>,
    pub io_width: U32<LittleEndian>,
    pub sector_size: U32<LittleEndian>,
    pub dev_type: U64<LittleEndian>,
    pub generation: U64<LittleEndian>,
    pub start_offset: U64<LittleEndian>,
    pub dev_group: U32<LittleEndian>,
    pub seek_speed: u8,
    pub bandwidth: u8,
    pub uuid: [u8; 16],
    pub fsid: [u8; 16],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct BtrfsSuperBlock {
    pub csum: [u8; 32],
    pub fsid: [u8; 16],
    pub bytenr: U64<LittleEndian>,
    pub flags: U64<LittleEndian>,
    pub magic: [u8; 8],
    pub generation: U64<LittleEndian>,
    pub root: U64<LittleEndian>,
    pub chunk_root: U64<LittleEndian>,
    pub log_root: U64<LittleEndian>,
    pub log_root_transid: U64<LittleEndian>,
    pub total_bytes: U64<LittleEndian>,
    pub bytes_used: U64<LittleEndian>,
    pub root_dir_objectid: U64<LittleEndian>,
    pub num_devices: U64<LittleEndian>,
    pub sectorsize: U32<LittleEndian>,
    pub nodesize: U32<LittleEndian>,
    pub leafsize: U32<LittleEndian>,
    pub stripesize: U32<LittleEndian>,
    pub sys_chunk_array_size: U32<LittleEndian>,
    pub chunk_root_generation: U64<LittleEndian>,
    pub compat_flags: U64<LittleEndian>,
    pub compat_ro_flags: U64<LittleEndian>,
    pub incompat_flags: U64<LittleEndian>,
    pub csum_type: U16<LittleEndian>,
    pub root_level: u8,
    pub chunk_root_level: u8,
    pub log_root_level: u8,
    pub dev_item: BtrfsDevItem,
    pub label: [u8; 256],
}

fn btrfs_verify_csum(sb: &BtrfsSuperBlock, raw: &[u8]) -> Result<(), BtrfsError> {
    let data = &raw[BTRFS_CSUM_SIZE..BTRFS_SUPER_INFO_SIZE];

    let ok = match sb.csum_type.get() {
        BTRFS_CSUM_TYPE_CRC32 => sb.csum[..4] == crc32c(data).to_le_bytes(),
        BTRFS_CSUM_TYPE_XXHASH => sb.csum[..8] == xxh64(data, 0).to_le_bytes(),
        BTRFS_CSUM_TYPE_SHA256 => sb.csum == sha256(data),
        other => return Err(BtrfsError::UnknownCsumType(other)),
    };

    if !ok {
        log::debug!("btrfs superblock checksum mismatch");
        return Err(BtrfsError::ChecksumInvalid);
    }
    return Ok(());
}

/// Zoned devices keep the superblock in two log zones; the live copy is
/// the valid one with the highest generation.
fn zoned_super(probe: &mut Probe) -> Result<BtrfsSuperBlock, BtrfsError> {
    let zone_size = probe.zsz();
    let mut best: Option<(u64, BtrfsSuperBlock)> = None;

    for zonenum in 0..2u64 {
        let offset = zonenum * zone_size;
        let raw = match probe.read_vec_at(offset, BTRFS_SUPER_INFO_SIZE) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => continue,
            Err(e) => return Err(BtrfsError::from(e)),
        };
        let Ok(sb) = BtrfsSuperBlock::read_from_bytes(&raw[..size_of::<BtrfsSuperBlock>()])
        else {
            continue;
        };

        if &sb.magic != b"_BHRfS_M" || btrfs_verify_csum(&sb, &raw).is_err() {
            continue;
        }

        match &best {
            Some((generation, _)) if *generation >= sb.generation.get() => (),
            _ => best = Some((sb.generation.get(), sb)),
        }
    }

    return best.map(|(_, sb)| sb).ok_or(BtrfsError::NoZonedSuperblock);
}

pub fn probe_btrfs(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), BtrfsError> {
    let sb = if probe.zsz() != 0 {
        zoned_super(probe)?
    } else {
        let raw = probe.read_vec_at(64 * 1024, BTRFS_SUPER_INFO_SIZE)?;
        let sb = BtrfsSuperBlock::read_from_bytes(&raw[..size_of::<BtrfsSuperBlock>()])
            .map_err(|_| IoError::from(std::io::ErrorKind::UnexpectedEof))?;
        btrfs_verify_csum(&sb, &raw)?;
        sb
    };

    let sectorsize = u64::from(sb.sectorsize.get());
    if sectorsize == 0 {
        return Err(BtrfsError::ZeroSectorSize);
    }

    let values = probe.values_mut();
    if sb.label[0] != 0 {
        values.set_label(&sb.label);
    }
    values.set_uuid(&sb.fsid);
    values.set_uuid_as(TagName::UuidSub, &sb.dev_item.uuid);
    values.set_block_size(sectorsize);
    values.set_fs_block_size(sectorsize);
    values.set_fs_size(sb.total_bytes.get());
    values.set_fs_last_block(sb.total_bytes.get() / sectorsize);

    return Ok(());
}
