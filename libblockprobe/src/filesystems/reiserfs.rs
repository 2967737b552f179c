use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32},
};

use crate::{
    BlockidError,
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
};

#[derive(Debug, Error)]
pub enum ReiserError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Block size below 512 bytes")]
    InvalidBlockSize,
    #[error("Superblock lies inside the journal")]
    SuperblockInJournal,
}

pub const REISERFS_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "reiserfs",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_reiserfs(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[
        BlockidMagic {
            magic: b"ReIsErFs",
            len: 8,
            b_offset: 8 * 1024 + 0x34,
            zone: None,
        },
        BlockidMagic {
            magic: b"ReIsEr2Fs",
            len: 9,
            b_offset: 64 * 1024 + 0x34,
            zone: None,
        },
        BlockidMagic {
            magic: b"ReIsEr3Fs",
            len: 9,
            b_offset: 64 * 1024 + 0x34,
            zone: None,
        },
        BlockidMagic {
            magic: b"ReIsErFs",
            len: 8,
            b_offset: 64 * 1024 + 0x34,
            zone: None,
        },
        BlockidMagic {
            magic: b"ReIsErFs",
            len: 8,
            b_offset: 8 * 1024 + 20,
            zone: None,
        },
    ]),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct ReiserSuperBlock {
    rs_blocks_count: U32<LittleEndian>,
    rs_free_blocks: U32<LittleEndian>,
    rs_root_block: U32<LittleEndian>,
    rs_journal_block: U32<LittleEndian>,
    rs_journal_dev: U32<LittleEndian>,
    rs_orig_journal_size: U32<LittleEndian>,
    rs_dummy2: [U32<LittleEndian>; 5],
    rs_blocksize: U16<LittleEndian>,
    rs_oid_maxsize: U16<LittleEndian>,
    rs_oid_cursize: U16<LittleEndian>,
    rs_state: U16<LittleEndian>,
    rs_magic: [u8; 12],
    rs_hash_function_code: U32<LittleEndian>,
    rs_tree_height: U16<LittleEndian>,
    rs_bmap_nr: U16<LittleEndian>,
    rs_version: U16<LittleEndian>,
    rs_dummy4: [U16<LittleEndian>; 1],
    rs_inode_generation: U32<LittleEndian>,
    rs_flags: U32<LittleEndian>,
    rs_uuid: [u8; 16],
    rs_label: [u8; 16],
}

pub fn probe_reiserfs(probe: &mut Probe, mag: BlockidMagic) -> Result<(), ReiserError> {
    // the magic sits inside the superblock, whose base is 1KiB aligned
    let sb_offset = mag.b_offset & !1023;
    let rs: ReiserSuperBlock = probe.map_from_file(sb_offset)?;

    let blocksize = u64::from(rs.rs_blocksize.get());
    if blocksize < 512 {
        return Err(ReiserError::InvalidBlockSize);
    }

    // an old superblock left inside the relocated journal is stale
    let kboff = sb_offset >> 10;
    if kboff / (blocksize >> 9) > u64::from(rs.rs_journal_block.get()) / 2 {
        return Err(ReiserError::SuperblockInJournal);
    }

    // only 3.6 and JR layouts carry a label and uuid
    let variant = mag.magic.get(6).copied();
    if matches!(variant, Some(b'2') | Some(b'3')) {
        let values = probe.values_mut();
        if rs.rs_label[0] != 0 {
            values.set_label(&rs.rs_label);
        }
        values.set_uuid(&rs.rs_uuid);
    }

    let version = match variant {
        Some(b'3') => "JR",
        Some(b'2') => "3.6",
        _ => "3.5",
    };

    let values = probe.values_mut();
    values.set_version(version);
    values.set_fs_block_size(blocksize);
    values.set_block_size(blocksize);

    return Ok(());
}
