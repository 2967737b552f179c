use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U32, U64},
};

use crate::{
    BlockidError,
    checksum::{crc32c, verify_csum},
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::TagName,
};

#[derive(Debug, Error)]
pub enum ScoutFsError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Super block checksum mismatch")]
    ChecksumInvalid,
    #[error("Super block belongs to the other device class")]
    WrongDeviceClass,
}

const SCOUTFS_SUPER_OFFSET: u64 = 1024 * 1024;
const SCOUTFS_SUPER_BLOCK_SIZE: usize = 4096;
const SCOUTFS_META_BLOCK_SIZE: u64 = 64 * 1024;
const SCOUTFS_DATA_BLOCK_SIZE: u64 = 4096;

const SCOUTFS_FLAG_IS_META_BDEV: u64 = 0x1;

// 0x103c428b little-endian, directly after the crc field
const SCOUTFS_SUPER_MAGICS: &[BlockidMagic] = &[BlockidMagic {
    magic: b"\x8b\x42\x3c\x10",
    len: 4,
    b_offset: SCOUTFS_SUPER_OFFSET + 4,
    zone: None,
}];

pub const SCOUTFS_META_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "scoutfs_meta",
    usage: UsageType::Filesystem,
    minsz: Some(2 * 1024 * 1024),
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_scoutfs(probe, magic, true)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(SCOUTFS_SUPER_MAGICS),
};

pub const SCOUTFS_DATA_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "scoutfs_data",
    usage: UsageType::Filesystem,
    minsz: Some(2 * 1024 * 1024),
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_scoutfs(probe, magic, false)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(SCOUTFS_SUPER_MAGICS),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct ScoutfsBlockHeader {
    crc: U32<LittleEndian>,
    magic: U32<LittleEndian>,
    fsid: U64<LittleEndian>,
    seq: U64<LittleEndian>,
    blkno: U64<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct ScoutfsSuperBlock {
    hdr: ScoutfsBlockHeader,
    id: U64<LittleEndian>,
    fmt_vers: U64<LittleEndian>,
    flags: U64<LittleEndian>,
    uuid: [u8; 16],
    next_ino: U64<LittleEndian>,
    total_meta_blocks: U64<LittleEndian>,
    total_data_blocks: U64<LittleEndian>,
}

/// Both device classes of a volume carry the same super block at 1MiB;
/// only the meta flag tells them apart.
fn probe_scoutfs(probe: &mut Probe, _mag: BlockidMagic, want_meta: bool) -> Result<(), ScoutFsError> {
    let block = probe.read_vec_at(SCOUTFS_SUPER_OFFSET, SCOUTFS_SUPER_BLOCK_SIZE)?;

    let Ok(sb) = ScoutfsSuperBlock::read_from_bytes(&block[..size_of::<ScoutfsSuperBlock>()])
    else {
        return Err(ScoutFsError::ChecksumInvalid);
    };

    // the crc covers everything in the 4KiB block after itself, stored
    // in the kernel's raw (uninverted) form
    let computed = !crc32c(&block[4..]);
    if !verify_csum("scoutfs super block", sb.hdr.crc.get(), computed) {
        return Err(ScoutFsError::ChecksumInvalid);
    }

    let is_meta = sb.flags.get() & SCOUTFS_FLAG_IS_META_BDEV != 0;
    if is_meta != want_meta {
        return Err(ScoutFsError::WrongDeviceClass);
    }

    let values = probe.values_mut();
    values.set_uuid(&sb.uuid);
    values.set_version(&sb.fmt_vers.get().to_string());
    values.set_string(TagName::Fsid, &format!("{:016x}", sb.hdr.fsid.get()));
    values.set_fs_block_size(if want_meta {
        SCOUTFS_META_BLOCK_SIZE
    } else {
        SCOUTFS_DATA_BLOCK_SIZE
    });
    values.set_wiper(0, 64 * 1024);

    return Ok(());
}
