use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32, U64},
};

use crate::{
    BlockidError,
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
};

#[derive(Debug, Error)]
pub enum SquashError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Invalid SquashFS version")]
    InvalidSquashVersion,
}

pub const SQUASHFS_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "squashfs",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_squashfs(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[BlockidMagic {
        magic: b"hsqs",
        len: 4,
        b_offset: 0,
        zone: None,
    }]),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct SquashSuperBlock {
    pub magic: [u8; 4],
    pub inode_count: U32<LittleEndian>,
    pub mod_time: U32<LittleEndian>,
    pub block_size: U32<LittleEndian>,
    pub frag_count: U32<LittleEndian>,
    pub compressor: U16<LittleEndian>,
    pub block_log: U16<LittleEndian>,
    pub flags: U16<LittleEndian>,
    pub id_count: U16<LittleEndian>,
    pub version_major: U16<LittleEndian>,
    pub version_minor: U16<LittleEndian>,
    pub root_inode: U64<LittleEndian>,
    pub bytes_used: U64<LittleEndian>,
    pub id_table: U64<LittleEndian>,
    pub xattr_table: U64<LittleEndian>,
    pub inode_table: U64<LittleEndian>,
    pub dir_table: U64<LittleEndian>,
    pub frag_table: U64<LittleEndian>,
    pub export_table: U64<LittleEndian>,
}

pub fn probe_squashfs(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), SquashError> {
    let sb: SquashSuperBlock = probe.map_from_file(0)?;

    let vermaj = sb.version_major.get();
    let vermin = sb.version_minor.get();

    /* the little-endian magic appears with version 4 */
    if vermaj < 4 {
        return Err(SquashError::InvalidSquashVersion);
    }

    let values = probe.values_mut();
    values.set_version(&format!("{vermaj}.{vermin}"));
    values.set_fs_size(sb.bytes_used.get());
    values.set_fs_block_size(u64::from(sb.block_size.get()));
    values.set_block_size(u64::from(sb.block_size.get()));

    return Ok(());
}
