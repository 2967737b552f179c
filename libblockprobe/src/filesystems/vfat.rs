use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32},
};

use crate::{
    BlockidError,
    filesystems::{FsError, volume_id::VolumeId32},
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    util::is_power_2,
    values::TagName,
};

#[derive(Debug, Error)]
pub enum FatError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Invalid FAT boot sector")]
    InvalidBootSector,
    #[error("Invalid FAT32 fsinfo sector")]
    InvalidFsInfo,
}

pub const VFAT_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "vfat",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_vfat(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(VFAT_MAGICS),
};

const VFAT_MAGICS: &[BlockidMagic] = &[
    BlockidMagic {
        magic: b"MSWIN",
        len: 5,
        b_offset: 0x52,
        zone: None,
    },
    BlockidMagic {
        magic: b"FAT32   ",
        len: 8,
        b_offset: 0x52,
        zone: None,
    },
    BlockidMagic {
        magic: b"MSDOS",
        len: 5,
        b_offset: 0x36,
        zone: None,
    },
    BlockidMagic {
        magic: b"FAT16   ",
        len: 8,
        b_offset: 0x36,
        zone: None,
    },
    BlockidMagic {
        magic: b"FAT12   ",
        len: 8,
        b_offset: 0x36,
        zone: None,
    },
    BlockidMagic {
        magic: b"FAT     ",
        len: 8,
        b_offset: 0x36,
        zone: None,
    },
    BlockidMagic {
        magic: b"\xeb",
        len: 1,
        b_offset: 0,
        zone: None,
    },
    BlockidMagic {
        magic: b"\xe9",
        len: 1,
        b_offset: 0,
        zone: None,
    },
    BlockidMagic {
        magic: b"\x55\xaa",
        len: 2,
        b_offset: 0x1fe,
        zone: None,
    },
];

/* Yucky misaligned values */
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct VfatSuperBlock {
    pub vs_ignored: [u8; 3],
    pub vs_sysid: [u8; 8],
    pub vs_sector_size: [u8; 2],
    pub vs_cluster_size: u8,
    pub vs_reserved: U16<LittleEndian>,
    pub vs_fats: u8,
    pub vs_dir_entries: [u8; 2],
    pub vs_sectors: [u8; 2],
    pub vs_media: u8,
    pub vs_fat_length: U16<LittleEndian>,
    pub vs_secs_track: U16<LittleEndian>,
    pub vs_heads: U16<LittleEndian>,
    pub vs_hidden: U32<LittleEndian>,
    pub vs_total_sect: U32<LittleEndian>,
    pub vs_fat32_length: U32<LittleEndian>,
    pub vs_flags: U16<LittleEndian>,
    pub vs_version: [u8; 2],
    pub vs_root_cluster: U32<LittleEndian>,
    pub vs_fsinfo_sector: U16<LittleEndian>,
    pub vs_backup_boot: U16<LittleEndian>,
    pub vs_reserved2: [U16<LittleEndian>; 6],
    pub vs_drive_number: u8,
    pub vs_boot_flags: u8,
    /* 0x28 without label and magic, 0x29 with */
    pub vs_ext_boot_sign: u8,
    pub vs_serno: [u8; 4],
    pub vs_label: [u8; 11],
    pub vs_magic: [u8; 8],
    pub vs_dummy2: [u8; 0x1fe - 0x5a],
    pub vs_pmagic: [u8; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct MsdosSuperBlock {
    /* DOS 2.0 BPB */
    pub ms_ignored: [u8; 3],
    pub ms_sysid: [u8; 8],
    pub ms_sector_size: [u8; 2],
    pub ms_cluster_size: u8,
    pub ms_reserved: U16<LittleEndian>,
    pub ms_fats: u8,
    pub ms_dir_entries: [u8; 2],
    /* zero means DOS 3 or later */
    pub ms_sectors: [u8; 2],
    pub ms_media: u8,
    pub ms_fat_length: U16<LittleEndian>,
    /* DOS 3.0 BPB */
    pub ms_secs_track: U16<LittleEndian>,
    pub ms_heads: U16<LittleEndian>,
    pub ms_hidden: U32<LittleEndian>,
    /* DOS 3.31 BPB */
    pub ms_total_sect: U32<LittleEndian>,
    /* DOS 3.4 EBPB */
    pub ms_drive_number: u8,
    pub ms_boot_flags: u8,
    pub ms_ext_boot_sign: u8,
    pub ms_serno: [u8; 4],
    /* DOS 4.0 EBPB */
    pub ms_label: [u8; 11],
    pub ms_magic: [u8; 8],
    pub ms_dummy2: [u8; 0x1fe - 0x3e],
    pub ms_pmagic: [u8; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct VfatDirEntry {
    pub name: [u8; 11],
    pub attr: u8,
    pub time_creat: U16<LittleEndian>,
    pub date_creat: U16<LittleEndian>,
    pub time_acc: U16<LittleEndian>,
    pub date_acc: U16<LittleEndian>,
    pub cluster_high: U16<LittleEndian>,
    pub time_write: U16<LittleEndian>,
    pub date_write: U16<LittleEndian>,
    pub cluster_low: U16<LittleEndian>,
    pub size: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct Fat32FsInfo {
    pub signature1: [u8; 4],
    pub reserved1: [U32<LittleEndian>; 120],
    pub signature2: [u8; 4],
    pub free_clusters: U32<LittleEndian>,
    pub next_cluster: U32<LittleEndian>,
    pub reserved2: [U32<LittleEndian>; 4],
}

const FAT12_MAX: u32 = 0xFF4;
const FAT16_MAX: u32 = 0xFFF4;
const FAT32_MAX: u32 = 0x0FFF_FFF6;

const FAT_ATTR_VOLUME_ID: u8 = 0x08;
const FAT_ATTR_DIR: u8 = 0x10;
const FAT_ATTR_LONG_NAME: u8 = 0x0f;
const FAT_ATTR_MASK: u8 = 0x3f;
const FAT_ENTRY_FREE: u8 = 0xe5;

const NO_NAME: &[u8; 11] = b"NO NAME    ";

fn unaligned_le16(bytes: &[u8; 2]) -> u16 {
    u16::from_le_bytes(*bytes)
}

/// Look for the volume-id attribute in a FAT directory region.
fn search_fat_label(
    probe: &mut Probe,
    offset: u64,
    entries: u32,
) -> Result<Option<[u8; 11]>, IoError> {
    for i in 0..u64::from(entries) {
        let ent: VfatDirEntry =
            match probe.map_from_file(offset + i * size_of::<VfatDirEntry>() as u64) {
                Ok(ent) => ent,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };

        if ent.name[0] == 0x00 {
            break;
        }

        if ent.name[0] == FAT_ENTRY_FREE
            || ent.cluster_high.get() != 0
            || ent.cluster_low.get() != 0
            || (ent.attr & FAT_ATTR_MASK) == FAT_ATTR_LONG_NAME
        {
            continue;
        }

        if (ent.attr & (FAT_ATTR_VOLUME_ID | FAT_ATTR_DIR)) == FAT_ATTR_VOLUME_ID {
            let mut name = ent.name;
            if name[0] == 0x05 {
                name[0] = 0xE5;
            }
            return Ok(Some(name));
        }
    }
    return Ok(None);
}

fn fat_valid_superblock(
    magic: &BlockidMagic,
    ms: &MsdosSuperBlock,
    vs: &VfatSuperBlock,
) -> Option<(u32, u32)> {
    /* extra checks for FATs without magic strings */
    if magic.len <= 2 {
        /* old floppies still have a valid MBR signature */
        if ms.ms_pmagic != [0x55, 0xAA] {
            return None;
        }

        /* OS/2 places a FAT-like pseudo-superblock in front of JFS and HPFS */
        if &ms.ms_magic == b"JFS     " || &ms.ms_magic == b"HPFS    " {
            return None;
        }
    }

    if ms.ms_fats == 0 {
        return None;
    }
    if ms.ms_reserved.get() == 0 {
        return None;
    }
    if !(ms.ms_media >= 0xf8 || ms.ms_media == 0xf0) {
        return None;
    }
    if !is_power_2(u64::from(ms.ms_cluster_size)) {
        return None;
    }

    let sector_size = unaligned_le16(&ms.ms_sector_size);
    if !is_power_2(u64::from(sector_size)) || !(512..=4096).contains(&sector_size) {
        return None;
    }

    let dir_entries = u32::from(unaligned_le16(&ms.ms_dir_entries));
    let reserved = u32::from(ms.ms_reserved.get());
    let mut sect_count = u32::from(unaligned_le16(&ms.ms_sectors));
    if sect_count == 0 {
        sect_count = ms.ms_total_sect.get();
    }

    let mut fat_length = u32::from(ms.ms_fat_length.get());
    if fat_length == 0 {
        fat_length = vs.vs_fat32_length.get();
    }

    let fat_size = fat_length * u32::from(ms.ms_fats);
    let dir_size = (dir_entries * size_of::<VfatDirEntry>() as u32)
        .div_ceil(u32::from(sector_size));

    let cluster_count = sect_count
        .checked_sub(reserved + fat_size + dir_size)?
        / u32::from(ms.ms_cluster_size);

    let max_count = if ms.ms_fat_length.get() == 0 && vs.vs_fat32_length.get() != 0 {
        FAT32_MAX
    } else if cluster_count > FAT12_MAX {
        FAT16_MAX
    } else {
        FAT12_MAX
    };

    if cluster_count > max_count {
        return None;
    }

    return Some((cluster_count, fat_size));
}

/// Used by the MBR parser to avoid misreading a FAT boot sector as a
/// partition table.
pub(crate) fn probe_is_vfat(probe: &mut Probe) -> Result<bool, IoError> {
    let magic = match probe.get_magic(&VFAT_ID_INFO) {
        Ok(Some(magic)) => magic,
        Ok(None) => return Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(e),
    };

    let ms: MsdosSuperBlock = probe.map_from_file(0)?;
    let vs: VfatSuperBlock = probe.map_from_file(0)?;

    return Ok(fat_valid_superblock(&magic, &ms, &vs).is_some());
}

pub fn probe_vfat(probe: &mut Probe, magic: BlockidMagic) -> Result<(), FatError> {
    let ms: MsdosSuperBlock = probe.map_from_file(0)?;
    let vs: VfatSuperBlock = probe.map_from_file(0)?;

    let (cluster_count, fat_size) =
        fat_valid_superblock(&magic, &ms, &vs).ok_or(FatError::InvalidBootSector)?;

    let sector_size = u32::from(unaligned_le16(&ms.ms_sector_size));
    let reserved = u32::from(ms.ms_reserved.get());

    let mut vol_label: Option<[u8; 11]> = None;
    let mut boot_label: Option<[u8; 11]> = None;
    let mut vol_serno: Option<[u8; 4]> = None;
    let mut version: Option<&str> = None;

    if ms.ms_fat_length.get() != 0 {
        /* the label may be an attribute in the root directory */
        let root_start = u64::from((reserved + fat_size) * sector_size);
        let root_dir_entries = u32::from(unaligned_le16(&vs.vs_dir_entries));

        vol_label = search_fat_label(probe, root_start, root_dir_entries)?;

        if ms.ms_ext_boot_sign == 0x29 {
            boot_label = Some(ms.ms_label);
        }
        if ms.ms_ext_boot_sign == 0x28 || ms.ms_ext_boot_sign == 0x29 {
            vol_serno = Some(ms.ms_serno);
        }

        probe.values_mut().set_sec_type("msdos");

        if cluster_count < FAT12_MAX {
            version = Some("FAT12");
        } else if cluster_count < FAT16_MAX {
            version = Some("FAT16");
        }
    } else if vs.vs_fat32_length.get() != 0 {
        /* walk the root directory cluster chain for the label attribute */
        let buf_size = u32::from(vs.vs_cluster_size) * sector_size;
        let start_data_sect = reserved + fat_size;
        let entries =
            (u64::from(vs.vs_fat32_length.get()) * u64::from(sector_size) / 4) as u32;
        let mut next = vs.vs_root_cluster.get();

        let mut maxloop = 100;
        while next != 0 && next < entries && maxloop > 0 {
            maxloop -= 1;

            let next_sect_off = (next - 2) * u32::from(vs.vs_cluster_size);
            let next_off = u64::from(start_data_sect + next_sect_off) * u64::from(sector_size);
            let count = buf_size / size_of::<VfatDirEntry>() as u32;

            vol_label = search_fat_label(probe, next_off, count)?;
            if vol_label.is_some() {
                break;
            }

            let fat_entry_off = u64::from(reserved) * u64::from(sector_size) + u64::from(next) * 4;
            let entry: [u8; 4] = match probe.read_exact_at(fat_entry_off) {
                Ok(entry) => entry,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(FatError::from(e)),
            };
            next = u32::from_le_bytes(entry) & 0x0fff_ffff;
        }

        version = Some("FAT32");

        if vs.vs_ext_boot_sign == 0x29 {
            boot_label = Some(vs.vs_label);
        }
        vol_serno = Some(vs.vs_serno);

        /*
         * FAT32 should have a valid signature in the fsinfo block, but
         * some volumes leave all bytes zero.
         */
        let fsinfo_sect = vs.vs_fsinfo_sector.get();
        if fsinfo_sect != 0 {
            let fsinfo: Fat32FsInfo =
                probe.map_from_file(u64::from(fsinfo_sect) * u64::from(sector_size))?;

            if fsinfo.signature1 != *b"\x52\x52\x61\x41"
                && fsinfo.signature1 != *b"\x52\x52\x64\x41"
                && fsinfo.signature1 != [0u8; 4]
            {
                return Err(FatError::InvalidFsInfo);
            }
            if fsinfo.signature2 != *b"\x72\x72\x41\x61" && fsinfo.signature2 != [0u8; 4] {
                return Err(FatError::InvalidFsInfo);
            }
        }
    }

    let values = probe.values_mut();

    if let Some(label) = vol_label {
        values.set_label(&label);
    } else if let Some(label) = boot_label
        && &label != NO_NAME
    {
        values.set_label(&label);
    }

    if let Some(serno) = vol_serno {
        let id = VolumeId32::new(serno);
        values.set_string_uuid(TagName::Uuid, &id.to_string());
    }
    if let Some(version) = version {
        values.set_version(version);
    }

    values.set_block_size(u64::from(sector_size));

    return Ok(());
}
