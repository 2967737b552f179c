use std::io::Error as IoError;

use bitflags::bitflags;
use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32, U64},
};

use crate::{
    BlockidError,
    checksum::{crc32c, verify_csum},
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::TagName,
};

#[derive(Debug, Error)]
pub enum ExtError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Superblock checksum invalid")]
    ChecksumInvalid,
    #[error("Journal device, not a filesystem")]
    JournalDev,
    #[error("Not a journal device")]
    NotJournalDev,
    #[error("Filesystem carries a journal")]
    HasJournal,
    #[error("Filesystem carries no journal")]
    NoJournal,
    #[error("Features out of range for this revision")]
    UnsupportedFeatures,
    #[error("Development filesystem flag set")]
    TestFilesys,
}

const EXT_SB_OFFSET: u64 = 1024;

const EXT_MAGIC: &[u8] = &[0x53, 0xEF];
const EXT_MAGICS: &[BlockidMagic] = &[BlockidMagic {
    magic: EXT_MAGIC,
    len: 2,
    b_offset: 0x438,
    zone: None,
}];

pub const JBD_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "jbd",
    usage: UsageType::Other("jbd"),
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_jbd(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(EXT_MAGICS),
};

pub const EXT2_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "ext2",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_ext2(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(EXT_MAGICS),
};

pub const EXT3_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "ext3",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_ext3(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(EXT_MAGICS),
};

pub const EXT4_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "ext4",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_ext4(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(EXT_MAGICS),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct Ext2SuperBlock {
    pub s_inodes_count: U32<LittleEndian>,
    pub s_blocks_count: U32<LittleEndian>,
    pub s_r_blocks_count: U32<LittleEndian>,
    pub s_free_blocks_count: U32<LittleEndian>,
    pub s_free_inodes_count: U32<LittleEndian>,
    pub s_first_data_block: U32<LittleEndian>,
    pub s_log_block_size: U32<LittleEndian>,
    s_dummy3: [U32<LittleEndian>; 7],
    pub s_magic: [u8; 2],
    pub s_state: U16<LittleEndian>,
    pub s_errors: U16<LittleEndian>,
    pub s_minor_rev_level: U16<LittleEndian>,
    pub s_lastcheck: U32<LittleEndian>,
    pub s_checkinterval: U32<LittleEndian>,
    pub s_creator_os: U32<LittleEndian>,
    pub s_rev_level: U32<LittleEndian>,
    pub s_def_resuid: U16<LittleEndian>,
    pub s_def_resgid: U16<LittleEndian>,
    pub s_first_ino: U32<LittleEndian>,
    pub s_inode_size: U16<LittleEndian>,
    pub s_block_group_nr: U16<LittleEndian>,
    pub s_feature_compat: U32<LittleEndian>,
    pub s_feature_incompat: U32<LittleEndian>,
    pub s_feature_ro_compat: U32<LittleEndian>,
    pub s_uuid: [u8; 16],
    pub s_volume_name: [u8; 16],
    pub s_last_mounted: [u8; 64],
    pub s_algorithm_usage_bitmap: U32<LittleEndian>,
    pub s_prealloc_blocks: u8,
    pub s_prealloc_dir_blocks: u8,
    pub s_reserved_gdt_blocks: U16<LittleEndian>,
    pub s_journal_uuid: [u8; 16],
    pub s_journal_inum: U32<LittleEndian>,
    pub s_journal_dev: U32<LittleEndian>,
    pub s_last_orphan: U32<LittleEndian>,
    pub s_hash_seed: [U32<LittleEndian>; 4],
    pub s_def_hash_version: u8,
    pub s_jnl_backup_type: u8,
    pub s_desc_size: U16<LittleEndian>,
    pub s_default_mount_opts: U32<LittleEndian>,
    pub s_first_meta_bg: U32<LittleEndian>,
    pub s_mkfs_time: U32<LittleEndian>,
    pub s_jnl_blocks: [U32<LittleEndian>; 17],
    pub s_blocks_count_hi: U32<LittleEndian>,
    pub s_r_blocks_count_hi: U32<LittleEndian>,
    pub s_free_blocks_hi: U32<LittleEndian>,
    pub s_min_extra_isize: U16<LittleEndian>,
    pub s_want_extra_isize: U16<LittleEndian>,
    pub s_flags: U32<LittleEndian>,
    pub s_raid_stride: U16<LittleEndian>,
    pub s_mmp_interval: U16<LittleEndian>,
    pub s_mmp_block: U64<LittleEndian>,
    pub s_raid_stripe_width: U32<LittleEndian>,
    s_reserved: [U32<LittleEndian>; 162],
    pub s_checksum: U32<LittleEndian>,
}

bitflags! {
    pub struct FeatureCompat: u32 {
        const HAS_JOURNAL = 0x0004;
    }
}

bitflags! {
    pub struct FeatureIncompat: u32 {
        const FILETYPE    = 0x0002;
        const RECOVER     = 0x0004;
        const JOURNAL_DEV = 0x0008;
        const META_BG     = 0x0010;
        const EXTENTS     = 0x0040;
        const IS_64BIT    = 0x0080;
        const MMP         = 0x0100;
        const FLEX_BG     = 0x0200;
    }
}

bitflags! {
    pub struct FeatureRoCompat: u32 {
        const SPARSE_SUPER  = 0x0001;
        const LARGE_FILE    = 0x0002;
        const BTREE_DIR     = 0x0004;
        const HUGE_FILE     = 0x0008;
        const GDT_CSUM      = 0x0010;
        const DIR_NLINK     = 0x0020;
        const EXTRA_ISIZE   = 0x0040;
        const METADATA_CSUM = 0x0400;
    }
}

const EXT2_FLAGS_TEST_FILESYS: u32 = 0x0004;

const EXT2_FEATURE_INCOMPAT_SUPP: u32 =
    FeatureIncompat::FILETYPE.bits() | FeatureIncompat::META_BG.bits();
const EXT2_FEATURE_RO_COMPAT_SUPP: u32 = FeatureRoCompat::SPARSE_SUPER.bits()
    | FeatureRoCompat::LARGE_FILE.bits()
    | FeatureRoCompat::BTREE_DIR.bits();

const EXT3_FEATURE_INCOMPAT_SUPP: u32 = FeatureIncompat::FILETYPE.bits()
    | FeatureIncompat::RECOVER.bits()
    | FeatureIncompat::META_BG.bits();
const EXT3_FEATURE_RO_COMPAT_SUPP: u32 = EXT2_FEATURE_RO_COMPAT_SUPP;

fn ext_get_super(probe: &mut Probe) -> Result<(Ext2SuperBlock, u32, u32, u32), ExtError> {
    let es: Ext2SuperBlock = probe.map_from_file(EXT_SB_OFFSET)?;

    if es.s_feature_ro_compat.get() & FeatureRoCompat::METADATA_CSUM.bits() != 0 {
        let raw = probe.read_vec_at(EXT_SB_OFFSET, size_of::<Ext2SuperBlock>())?;
        let csum = crc32c(&raw[..core::mem::offset_of!(Ext2SuperBlock, s_checksum)]);

        if !verify_csum("ext superblock", es.s_checksum.get(), csum) {
            return Err(ExtError::ChecksumInvalid);
        }
    }

    let fc = es.s_feature_compat.get();
    let fi = es.s_feature_incompat.get();
    let frc = es.s_feature_ro_compat.get();

    return Ok((es, fc, fi, frc));
}

fn ext_get_info(probe: &mut Probe, ver: u8, es: &Ext2SuperBlock) {
    let values = probe.values_mut();

    if es.s_volume_name[0] != 0 {
        values.set_label(&es.s_volume_name);
    }
    values.set_uuid(&es.s_uuid);

    if es.s_feature_compat.get() & FeatureCompat::HAS_JOURNAL.bits() != 0 {
        values.set_uuid_as(TagName::ExtJournal, &es.s_journal_uuid);
    }

    if ver != 2 && es.s_feature_incompat.get() & !EXT2_FEATURE_INCOMPAT_SUPP == 0 {
        values.set_sec_type("ext2");
    }

    let version = format!(
        "{}.{}",
        es.s_rev_level.get(),
        es.s_minor_rev_level.get()
    );
    values.set_version(&version);

    let fslastblock = if es.s_feature_incompat.get() & FeatureIncompat::IS_64BIT.bits() != 0 {
        u64::from(es.s_blocks_count.get()) | (u64::from(es.s_blocks_count_hi.get()) << 32)
    } else {
        u64::from(es.s_blocks_count.get())
    };
    let block_size = 1024u64 << es.s_log_block_size.get();

    values.set_fs_last_block(fslastblock);
    values.set_fs_block_size(block_size);
    values.set_block_size(block_size);
    values.set_fs_size(block_size * fslastblock);
}

pub fn probe_jbd(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), ExtError> {
    let (es, _, fi, _) = ext_get_super(probe)?;

    if fi & FeatureIncompat::JOURNAL_DEV.bits() == 0 {
        return Err(ExtError::NotJournalDev);
    }

    ext_get_info(probe, 2, &es);
    probe
        .values_mut()
        .set_uuid_as(TagName::LogUuid, &es.s_uuid);

    return Ok(());
}

pub fn probe_ext2(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), ExtError> {
    let (es, fc, fi, frc) = ext_get_super(probe)?;

    /* ext3 and later keep a journal */
    if fc & FeatureCompat::HAS_JOURNAL.bits() != 0 {
        return Err(ExtError::HasJournal);
    }

    if frc & !EXT2_FEATURE_RO_COMPAT_SUPP != 0 || fi & !EXT2_FEATURE_INCOMPAT_SUPP != 0 {
        return Err(ExtError::UnsupportedFeatures);
    }

    ext_get_info(probe, 2, &es);
    return Ok(());
}

pub fn probe_ext3(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), ExtError> {
    let (es, fc, fi, frc) = ext_get_super(probe)?;

    if fc & FeatureCompat::HAS_JOURNAL.bits() == 0 {
        return Err(ExtError::NoJournal);
    }

    if frc & !EXT3_FEATURE_RO_COMPAT_SUPP != 0 || fi & !EXT3_FEATURE_INCOMPAT_SUPP != 0 {
        return Err(ExtError::UnsupportedFeatures);
    }

    ext_get_info(probe, 3, &es);
    return Ok(());
}

pub fn probe_ext4(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), ExtError> {
    let (es, _, fi, frc) = ext_get_super(probe)?;

    if fi & FeatureIncompat::JOURNAL_DEV.bits() != 0 {
        return Err(ExtError::JournalDev);
    }

    /* an ext4 without any post-ext3 feature is ext2 or ext3 */
    if frc & !EXT3_FEATURE_RO_COMPAT_SUPP == 0 && fi & !EXT3_FEATURE_INCOMPAT_SUPP == 0 {
        return Err(ExtError::UnsupportedFeatures);
    }

    if es.s_flags.get() & EXT2_FLAGS_TEST_FILESYS != 0 {
        return Err(ExtError::TestFilesys);
    }

    ext_get_info(probe, 4, &es);
    return Ok(());
}
