use std::{
    io::{Error as IoError, ErrorKind as IoErrorKind},
    mem::offset_of,
};

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
    values::{TagFlags, TagName},
};

#[derive(Debug, Error)]
pub enum NilfsError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("No valid NILFS2 superblock")]
    NoValidSuperblock,
}

const NILFS_SB_MAGIC: u16 = 0x3434;
const NILFS_SB_OFFSET: u64 = 1024;
const NILFS_SB_SIZE: usize = 1024;

/// The backup superblock has no fixed offset, so detection cannot go
/// through the magic table.
pub const NILFS2_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "nilfs2",
    usage: UsageType::Filesystem,
    /* 128 MiB by default, but mkfs.nilfs2 -b 1024 -B 16 goes this low */
    minsz: Some(1024 * 1024),
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_nilfs2(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: None,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct NilfsSuperBlock {
    rev_level: U32<LittleEndian>,
    minor_rev_level: U16<LittleEndian>,
    magic: U16<LittleEndian>,
    bytes: U16<LittleEndian>,
    flags: U16<LittleEndian>,
    crc_seed: U32<LittleEndian>,
    sum: U32<LittleEndian>,
    log_block_size: U32<LittleEndian>,
    nsegments: U64<LittleEndian>,
    dev_size: U64<LittleEndian>,
    first_data_block: U64<LittleEndian>,
    blocks_per_segment: U32<LittleEndian>,
    r_segments_percentage: U32<LittleEndian>,
    last_cno: U64<LittleEndian>,
    last_pseg: U64<LittleEndian>,
    last_seq: U64<LittleEndian>,
    free_blocks_count: U64<LittleEndian>,
    ctime: U64<LittleEndian>,
    mtime: U64<LittleEndian>,
    wtime: U64<LittleEndian>,
    mnt_count: U16<LittleEndian>,
    max_mnt_count: U16<LittleEndian>,
    state: U16<LittleEndian>,
    errors: U16<LittleEndian>,
    lastcheck: U64<LittleEndian>,
    checkinterval: U32<LittleEndian>,
    creator_os: U32<LittleEndian>,
    def_resuid: U16<LittleEndian>,
    def_resgid: U16<LittleEndian>,
    first_ino: U32<LittleEndian>,
    inode_size: U16<LittleEndian>,
    dat_entry_size: U16<LittleEndian>,
    checkpoint_size: U16<LittleEndian>,
    segment_usage_size: U16<LittleEndian>,
    uuid: [u8; 16],
    volume_name: [u8; 80],
}

const SUM_OFFSET: usize = 16;
const CRC_START: usize = SUM_OFFSET + 4;

/// The stored CRC covers `bytes` bytes of the superblock with the sum
/// field itself read as zeros, seeded from `crc_seed`.
fn nilfs_valid_sb(raw: &[u8]) -> Option<NilfsSuperBlock> {
    let sb = NilfsSuperBlock::read_from_bytes(&raw[..size_of::<NilfsSuperBlock>()]).ok()?;

    if sb.magic.get() != NILFS_SB_MAGIC {
        return None;
    }

    let bytes = usize::from(sb.bytes.get());
    if bytes < CRC_START || bytes > NILFS_SB_SIZE {
        return None;
    }

    let mut crc = crc32_seeded(sb.crc_seed.get(), &raw[..SUM_OFFSET]);
    crc = crc32_seeded(crc, &[0u8; 4]);
    crc = crc32_seeded(crc, &raw[CRC_START..bytes]);

    if !verify_csum("nilfs2 superblock", sb.sum.get(), crc) {
        return None;
    }
    return Some(sb);
}

fn read_sb_at(probe: &mut Probe, offset: u64) -> Result<Option<Vec<u8>>, NilfsError> {
    match probe.read_vec_at(offset, NILFS_SB_SIZE) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == IoErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(NilfsError::from(e)),
    }
}

fn backup_offset(size: u64) -> u64 {
    ((size / 512).saturating_sub(8)) * 512
}

pub fn probe_nilfs2(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), NilfsError> {
    let primary = read_sb_at(probe, NILFS_SB_OFFSET)?
        .as_deref()
        .and_then(nilfs_valid_sb);

    let backup_off = backup_offset(probe.size());
    let backup = read_sb_at(probe, backup_off)?
        .as_deref()
        .and_then(nilfs_valid_sb)
        /* a backup block must describe this very device */
        .filter(|sb| probe.offset() != 0 || sb.dev_size.get() == probe.size());

    let (sb, magic_off) = match (&primary, &backup) {
        (Some(p), Some(b)) if b.last_cno.get() > p.last_cno.get() => (b, backup_off),
        (Some(p), _) => (p, NILFS_SB_OFFSET),
        (None, Some(b)) => (b, backup_off),
        (None, None) => return Err(NilfsError::NoValidSuperblock),
    };

    let log_block_size = sb.log_block_size.get();
    let rev_level = sb.rev_level.get();

    let values = probe.values_mut();
    if sb.volume_name[0] != 0 {
        values.set_label(&sb.volume_name);
    }
    values.set_uuid(&sb.uuid);
    values.set_version(&rev_level.to_string());
    if values.flags().contains(TagFlags::MAGIC) {
        values.set_value(TagName::Sbmagic, &NILFS_SB_MAGIC.to_le_bytes());
        values.set_string(
            TagName::SbmagicOffset,
            &(magic_off + offset_of!(NilfsSuperBlock, magic) as u64).to_string(),
        );
    }
    if log_block_size < 32 {
        values.set_block_size(1024u64 << log_block_size);
    }

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superblock_fields_line_up() {
        assert_eq!(offset_of!(NilfsSuperBlock, magic), 6);
        assert_eq!(offset_of!(NilfsSuperBlock, sum), SUM_OFFSET);
        assert_eq!(offset_of!(NilfsSuperBlock, uuid), 152);
        assert_eq!(offset_of!(NilfsSuperBlock, volume_name), 168);
        assert_eq!(size_of::<NilfsSuperBlock>(), 248);
    }
}
