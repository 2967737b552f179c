use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32, U64},
};

use crate::{
    BlockidError,
    checksum::{crc32_seeded, verify_csum},
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::LabelEncoding,
};

#[derive(Debug, Error)]
pub enum F2fsError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Superblock checksum offset out of range")]
    BadChecksumOffset,
    #[error("Superblock checksum invalid")]
    ChecksumInvalid,
}

const F2FS_SB_OFFSET: u64 = 1024;
const F2FS_CRC_SEED: u32 = 0xf2f5_2010;

pub const F2FS_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "f2fs",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_f2fs(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[BlockidMagic {
        magic: b"\x10\x20\xf5\xf2",
        len: 4,
        b_offset: F2FS_SB_OFFSET,
        zone: None,
    }]),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct F2fsSuperBlock {
    magic: U32<LittleEndian>,
    major_ver: U16<LittleEndian>,
    minor_ver: U16<LittleEndian>,
    log_sectorsize: U32<LittleEndian>,
    log_sectors_per_block: U32<LittleEndian>,
    log_blocksize: U32<LittleEndian>,
    log_blocks_per_seg: U32<LittleEndian>,
    segs_per_sec: U32<LittleEndian>,
    secs_per_zone: U32<LittleEndian>,
    checksum_offset: U32<LittleEndian>,
    block_count: U64<LittleEndian>,
    section_count: U32<LittleEndian>,
    segment_count: U32<LittleEndian>,
    segment_count_ckpt: U32<LittleEndian>,
    segment_count_sit: U32<LittleEndian>,
    segment_count_nat: U32<LittleEndian>,
    segment_count_ssa: U32<LittleEndian>,
    segment_count_main: U32<LittleEndian>,
    segment0_blkaddr: U32<LittleEndian>,
    cp_blkaddr: U32<LittleEndian>,
    sit_blkaddr: U32<LittleEndian>,
    nat_blkaddr: U32<LittleEndian>,
    ssa_blkaddr: U32<LittleEndian>,
    main_blkaddr: U32<LittleEndian>,
    root_ino: U32<LittleEndian>,
    node_ino: U32<LittleEndian>,
    meta_ino: U32<LittleEndian>,
    uuid: [u8; 16],
    /* UTF-16LE code units */
    volume_name: [u8; 1024],
}

/// A zero checksum offset means the superblock predates the checksum
/// field; the match stands without verification.
fn f2fs_validate_checksum(probe: &mut Probe, sb: &F2fsSuperBlock) -> Result<(), F2fsError> {
    let csum_off = u64::from(sb.checksum_offset.get());
    if csum_off == 0 {
        return Ok(());
    }
    if csum_off % 4 != 0 || csum_off + 4 > 4096 {
        return Err(F2fsError::BadChecksumOffset);
    }

    let stored: [u8; 4] = probe.read_exact_at(F2FS_SB_OFFSET + csum_off)?;
    let expected = u32::from_le_bytes(stored);

    let covered = probe.read_vec_at(F2FS_SB_OFFSET, csum_off as usize)?;
    let csum = crc32_seeded(F2FS_CRC_SEED, &covered);

    if !verify_csum("f2fs superblock", expected, csum) {
        return Err(F2fsError::ChecksumInvalid);
    }
    return Ok(());
}

pub fn probe_f2fs(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), F2fsError> {
    let sb: F2fsSuperBlock = probe.map_from_file(F2FS_SB_OFFSET)?;

    let vermaj = sb.major_ver.get();
    let vermin = sb.minor_ver.get();

    /* the 1.0 layout differs in ways the fields above cannot express */
    if vermaj == 1 && vermin == 0 {
        return Ok(());
    }

    f2fs_validate_checksum(probe, &sb)?;

    let values = probe.values_mut();
    if sb.volume_name[0] != 0 {
        values.set_utf8_label(&sb.volume_name, LabelEncoding::Utf16Le);
    }
    values.set_uuid(&sb.uuid);
    values.set_version(&format!("{vermaj}.{vermin}"));

    let log_blocksize = sb.log_blocksize.get();
    if log_blocksize < 32 {
        let blocksize = 1u64 << log_blocksize;
        values.set_fs_block_size(blocksize);
        values.set_block_size(blocksize);
        values.set_fs_size(sb.block_count.get() * blocksize);
    }

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superblock_fields_line_up() {
        assert_eq!(std::mem::offset_of!(F2fsSuperBlock, checksum_offset), 0x20);
        assert_eq!(std::mem::offset_of!(F2fsSuperBlock, uuid), 0x6c);
        assert_eq!(std::mem::offset_of!(F2fsSuperBlock, volume_name), 0x7c);
    }
}
