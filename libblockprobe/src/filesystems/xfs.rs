use std::{io::Error as IoError, mem::offset_of};

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, LittleEndian, U16, U32, U64},
};

use crate::{
    BlockidError,
    checksum::crc32c_exclude_offset,
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::{TagFlags, TagName},
};

#[derive(Debug, Error)]
pub enum XfsError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Invalid XFS header ranges")]
    InvalidHeaderRanges,
    #[error("Invalid XFS header version number")]
    InvalidHeaderVersion,
    #[error("Invalid XFS header features")]
    InvalidHeaderFeatures,
    #[error("Invalid header checksum")]
    HeaderChecksumInvalid,
    #[error("Regular XFS superblock found, not an external log")]
    NotExternalLog,
    #[error("No XFS log record header found")]
    LogRecordNotFound,
}

pub const XFS_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "xfs",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_xfs(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[BlockidMagic {
        magic: b"XFSB",
        len: 4,
        b_offset: 0,
        zone: None,
    }]),
};

pub const XFS_LOG_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "xfs_external_log",
    usage: UsageType::Other("log"),
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_xfs_log(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: None,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct XfsSuperBlock {
    magicnum: U32<BigEndian>,
    blocksize: U32<BigEndian>,
    dblocks: U64<BigEndian>,
    rblocks: U64<BigEndian>,
    rextents: U64<BigEndian>,
    uuid: [u8; 16],
    logstart: U64<BigEndian>,
    rootino: U64<BigEndian>,
    rbmino: U64<BigEndian>,
    rsumino: U64<BigEndian>,
    rextsize: U32<BigEndian>,
    agblocks: U32<BigEndian>,
    agcount: U32<BigEndian>,
    rbmblocks: U32<BigEndian>,
    logblocks: U32<BigEndian>,

    versionnum: U16<BigEndian>,
    sectsize: U16<BigEndian>,
    inodesize: U16<BigEndian>,
    inopblock: U16<BigEndian>,
    fname: [u8; 12],
    blocklog: u8,
    sectlog: u8,
    inodelog: u8,
    inopblog: u8,
    agblklog: u8,
    rextslog: u8,
    inprogress: u8,
    imax_pct: u8,

    icount: U64<BigEndian>,
    ifree: U64<BigEndian>,
    fdblocks: U64<BigEndian>,
    frextents: U64<BigEndian>,
    uquotino: U64<BigEndian>,
    gquotino: U64<BigEndian>,
    qflags: U16<BigEndian>,
    flags: u8,
    shared_vn: u8,
    inoalignmt: U32<BigEndian>,
    unit: U32<BigEndian>,
    width: U32<BigEndian>,
    dirblklog: u8,
    logsectlog: u8,
    logsectsize: U16<BigEndian>,
    logsunit: U32<BigEndian>,
    features2: U32<BigEndian>,
    bad_features2: U32<BigEndian>,

    features_compat: U32<BigEndian>,
    features_ro_compat: U32<BigEndian>,
    features_incompat: U32<BigEndian>,
    features_log_incompat: U32<BigEndian>,
    /* stored little-endian, unlike the rest of the superblock */
    crc: U32<LittleEndian>,
    spino_align: U32<BigEndian>,
    pquotino: U64<BigEndian>,
    lsn: U64<BigEndian>,
    meta_uuid: [u8; 16],
    rrmapino: U64<BigEndian>,
}

const XFS_MIN_BLOCKSIZE_LOG: u8 = 9;
const XFS_MAX_BLOCKSIZE_LOG: u8 = 16;
const XFS_MIN_BLOCKSIZE: u32 = 1 << XFS_MIN_BLOCKSIZE_LOG;
const XFS_MAX_BLOCKSIZE: u32 = 1 << XFS_MAX_BLOCKSIZE_LOG;
const XFS_MIN_SECTORSIZE_LOG: u8 = 9;
const XFS_MAX_SECTORSIZE_LOG: u8 = 15;
const XFS_MIN_SECTORSIZE: u16 = 1 << XFS_MIN_SECTORSIZE_LOG;
const XFS_MAX_SECTORSIZE: u16 = 1 << XFS_MAX_SECTORSIZE_LOG;
const XFS_DINODE_MIN_LOG: u8 = 8;
const XFS_DINODE_MAX_LOG: u8 = 11;
const XFS_DINODE_MIN_SIZE: u16 = 1 << XFS_DINODE_MIN_LOG;
const XFS_DINODE_MAX_SIZE: u16 = 1 << XFS_DINODE_MAX_LOG;

const XFS_MAX_RTEXTSIZE: u64 = 1024 * 1024 * 1024;
const XFS_MIN_RTEXTSIZE: u64 = 4 * 1024;
const XFS_MIN_AG_BLOCKS: u64 = 64;

fn xfs_max_dblocks(sb: &XfsSuperBlock) -> u64 {
    u64::from(sb.agcount.get()) * u64::from(sb.agblocks.get())
}

fn xfs_min_dblocks(sb: &XfsSuperBlock) -> u64 {
    u64::from(sb.agcount.get() - 1) * u64::from(sb.agblocks.get()) + XFS_MIN_AG_BLOCKS
}

const XFS_SB_VERSION_MOREBITSBIT: u16 = 0x8000;
const XFS_SB_VERSION2_CRCBIT: u32 = 0x0000_0100;

pub fn xfs_verify(sb: &XfsSuperBlock, crc_area: &[u8]) -> Result<(), XfsError> {
    if sb.agcount.get() == 0
        || sb.sectsize.get() < XFS_MIN_SECTORSIZE
        || sb.sectsize.get() > XFS_MAX_SECTORSIZE
        || sb.sectlog < XFS_MIN_SECTORSIZE_LOG
        || sb.sectlog > XFS_MAX_SECTORSIZE_LOG
        || sb.sectsize.get() != (1 << sb.sectlog)
        || sb.blocksize.get() < XFS_MIN_BLOCKSIZE
        || sb.blocksize.get() > XFS_MAX_BLOCKSIZE
        || sb.blocklog < XFS_MIN_BLOCKSIZE_LOG
        || sb.blocklog > XFS_MAX_BLOCKSIZE_LOG
        || sb.blocksize.get() != (1 << sb.blocklog)
        || sb.inodesize.get() < XFS_DINODE_MIN_SIZE
        || sb.inodesize.get() > XFS_DINODE_MAX_SIZE
        || sb.inodelog < XFS_DINODE_MIN_LOG
        || sb.inodelog > XFS_DINODE_MAX_LOG
        || sb.inodesize.get() != (1 << sb.inodelog)
        || sb.blocklog - sb.inodelog != sb.inopblog
        || u64::from(sb.rextsize.get()) * u64::from(sb.blocksize.get()) > XFS_MAX_RTEXTSIZE
        || u64::from(sb.rextsize.get()) * u64::from(sb.blocksize.get()) < XFS_MIN_RTEXTSIZE
        || sb.imax_pct > 100
        || sb.dblocks.get() == 0
        || sb.dblocks.get() > xfs_max_dblocks(sb)
        || sb.dblocks.get() < xfs_min_dblocks(sb)
    {
        return Err(XfsError::InvalidHeaderRanges);
    }

    if (sb.versionnum.get() & 0x0f) == 5 {
        if (sb.versionnum.get() & XFS_SB_VERSION_MOREBITSBIT) == 0 {
            return Err(XfsError::InvalidHeaderVersion);
        };

        if (sb.features2.get() & XFS_SB_VERSION2_CRCBIT) == 0 {
            return Err(XfsError::InvalidHeaderFeatures);
        };

        let csum = crc32c_exclude_offset(crc_area, offset_of!(XfsSuperBlock, crc), 4);
        if csum != sb.crc.get() {
            return Err(XfsError::HeaderChecksumInvalid);
        }
    }
    return Ok(());
}

pub fn xfs_fssize(sb: &XfsSuperBlock) -> u64 {
    let lsize = if sb.logstart.get() != 0 {
        u64::from(sb.logblocks.get())
    } else {
        0
    };

    let avail_blocks = sb.dblocks.get().saturating_sub(lsize);

    return avail_blocks * u64::from(sb.blocksize.get());
}

pub fn probe_xfs(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), XfsError> {
    let sb: XfsSuperBlock = probe.map_from_file(0)?;
    let crc_area = probe.read_vec_at(0, usize::from(sb.sectsize.get()))?;

    xfs_verify(&sb, &crc_area)?;

    let values = probe.values_mut();
    if sb.fname[0] != 0 {
        values.set_label(&sb.fname);
    }
    values.set_uuid(&sb.uuid);
    values.set_fs_size(xfs_fssize(&sb));
    values.set_fs_last_block(sb.dblocks.get());
    values.set_fs_block_size(u64::from(sb.blocksize.get()));
    values.set_block_size(u64::from(sb.sectsize.get()));

    return Ok(());
}

const XLOG_HEADER_MAGIC: u32 = 0xFEED_BABE;
/* first 512 sectors of the log device */
const XLOG_SCAN_SECTORS: u64 = 512;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct XlogRecHeader {
    h_magicno: U32<BigEndian>,
    h_cycle: U32<BigEndian>,
    h_version: U32<BigEndian>,
    h_len: U32<BigEndian>,
    h_lsn: U64<BigEndian>,
    h_tail_lsn: U64<BigEndian>,
    h_crc: U32<BigEndian>,
    h_prev_block: U32<BigEndian>,
    h_num_logops: U32<BigEndian>,
    h_cycle_data: [U32<BigEndian>; 64],
    h_fmt: U32<BigEndian>,
    h_fs_uuid: [u8; 16],
    h_size: U32<BigEndian>,
}

fn xlog_valid_rec_header(rhead: &XlogRecHeader) -> bool {
    return rhead.h_magicno.get() == XLOG_HEADER_MAGIC
        && matches!(rhead.h_version.get(), 1 | 2)
        && rhead.h_len.get() != 0
        && rhead.h_len.get() <= i32::MAX as u32;
}

/// An external XFS log has no superblock of its own; it is recognized by
/// a log record header in one of the first sectors. A device starting
/// with a regular XFS superblock is never reported as a log.
pub fn probe_xfs_log(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), XfsError> {
    for i in 0..XLOG_SCAN_SECTORS {
        let sector: [u8; 4] = probe.read_exact_at(i * 512)?;

        if &sector == b"XFSB" {
            return Err(XfsError::NotExternalLog);
        }

        let rhead: XlogRecHeader = probe.map_from_file(i * 512)?;
        if !xlog_valid_rec_header(&rhead) {
            continue;
        }

        let values = probe.values_mut();
        values.set_uuid_as(TagName::LogUuid, &rhead.h_fs_uuid);
        if values.flags().contains(TagFlags::MAGIC) {
            values.set_value(TagName::Sbmagic, rhead.h_magicno.as_bytes());
            values.set_string(TagName::SbmagicOffset, &(i * 512).to_string());
        }
        values.set_wiper(i * 512, 4);
        return Ok(());
    }

    return Err(XfsError::LogRecordNotFound);
}
