use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32, U64},
};

use crate::{
    BlockidError,
    checksum::verify_csum,
    filesystems::{FsError, volume_id::VolumeId32},
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::{LabelEncoding, TagName},
};

#[derive(Debug, Error)]
pub enum ExFatError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Invalid exFAT boot sector")]
    InvalidBootSector,
    #[error("Boot region checksum invalid")]
    ChecksumInvalid,
}

pub const EXFAT_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "exfat",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_exfat(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[BlockidMagic {
        magic: b"EXFAT   ",
        len: 8,
        b_offset: 3,
        zone: None,
    }]),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct ExfatSuperBlock {
    pub jump_boot: [u8; 3],
    pub fs_name: [u8; 8],
    pub must_be_zero: [u8; 53],
    pub partition_offset: U64<LittleEndian>,
    pub volume_length: U64<LittleEndian>,
    pub fat_offset: U32<LittleEndian>,
    pub fat_length: U32<LittleEndian>,
    pub cluster_heap_offset: U32<LittleEndian>,
    pub cluster_count: U32<LittleEndian>,
    pub first_cluster_of_root: U32<LittleEndian>,
    pub volume_serial: [u8; 4],
    pub vermin: u8,
    pub vermaj: u8,
    pub volume_flags: U16<LittleEndian>,
    pub bytes_per_sector_shift: u8,
    pub sectors_per_cluster_shift: u8,
    pub number_of_fats: u8,
    pub drive_select: u8,
    pub percent_in_use: u8,
    pub reserved: [u8; 7],
    pub boot_code: [u8; 390],
    pub boot_signature: U16<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct ExfatEntryLabel {
    pub entry_type: u8,
    pub length: u8,
    pub name: [u8; 22],
    pub reserved: [u8; 8],
}

const EXFAT_FIRST_DATA_CLUSTER: u32 = 2;
const EXFAT_LAST_DATA_CLUSTER: u32 = 0xfff_fff6;
const EXFAT_ENTRY_SIZE: u64 = 32;

const EXFAT_ENTRY_EOD: u8 = 0x00;
const EXFAT_ENTRY_LABEL: u8 = 0x83;

const EXFAT_MAX_DIR_SIZE: u64 = 256 * 1024 * 1024;

fn block_size(sb: &ExfatSuperBlock) -> u64 {
    if sb.bytes_per_sector_shift < 32 {
        1u64 << sb.bytes_per_sector_shift
    } else {
        0
    }
}

fn cluster_size(sb: &ExfatSuperBlock) -> u64 {
    if sb.sectors_per_cluster_shift < 32 {
        block_size(sb) << sb.sectors_per_cluster_shift
    } else {
        0
    }
}

fn block_to_offset(sb: &ExfatSuperBlock, block: u64) -> u64 {
    block << sb.bytes_per_sector_shift
}

fn cluster_to_offset(sb: &ExfatSuperBlock, cluster: u32) -> u64 {
    let block = u64::from(sb.cluster_heap_offset.get())
        + (u64::from(cluster - EXFAT_FIRST_DATA_CLUSTER) << sb.sectors_per_cluster_shift);
    block_to_offset(sb, block)
}

fn next_cluster(probe: &mut Probe, sb: &ExfatSuperBlock, cluster: u32) -> Result<u32, IoError> {
    let fat_offset =
        block_to_offset(sb, u64::from(sb.fat_offset.get())) + u64::from(cluster) * 4;
    let next: [u8; 4] = probe.read_exact_at(fat_offset)?;
    return Ok(u32::from_le_bytes(next));
}

fn find_label(
    probe: &mut Probe,
    sb: &ExfatSuperBlock,
) -> Result<Option<ExfatEntryLabel>, IoError> {
    let mut cluster = sb.first_cluster_of_root.get();
    let mut offset = cluster_to_offset(sb, cluster);

    for _ in 0..EXFAT_MAX_DIR_SIZE / EXFAT_ENTRY_SIZE {
        let entry: ExfatEntryLabel = match probe.map_from_file(offset) {
            Ok(entry) => entry,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        };

        if entry.entry_type == EXFAT_ENTRY_EOD {
            return Ok(None);
        }
        if entry.entry_type == EXFAT_ENTRY_LABEL {
            return Ok(Some(entry));
        }

        offset += EXFAT_ENTRY_SIZE;
        let csize = cluster_size(sb);
        if csize != 0 && offset % csize == 0 {
            cluster = next_cluster(probe, sb, cluster)?;
            if !(EXFAT_FIRST_DATA_CLUSTER..=EXFAT_LAST_DATA_CLUSTER).contains(&cluster) {
                return Ok(None);
            }
            offset = cluster_to_offset(sb, cluster);
        }
    }

    return Ok(None);
}

/// Rotate-right checksum over the first 11 boot sectors, skipping the
/// VolumeFlags and PercentInUse bytes, per the exFAT specification.
fn exfat_boot_checksum(sectors: &[u8]) -> u32 {
    let mut checksum = 0u32;

    for (i, &byte) in sectors.iter().enumerate() {
        if i == 106 || i == 107 || i == 112 {
            continue;
        }
        checksum = (if checksum & 1 != 0 { 0x8000_0000u32 } else { 0 })
            .wrapping_add(checksum >> 1)
            .wrapping_add(u32::from(byte));
    }

    return checksum;
}

fn exfat_validate_checksum(probe: &mut Probe, sb: &ExfatSuperBlock) -> Result<bool, IoError> {
    let sector_size = block_size(sb) as usize;
    /* 11 sectors are checksummed, the 12th repeats the expected value */
    let data = probe.read_vec_at(0, sector_size * 12)?;

    let checksum = exfat_boot_checksum(&data[..sector_size * 11]);

    for i in 0..sector_size / 4 {
        let offset = sector_size * 11 + i * 4;
        let expected = u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]);
        if !verify_csum("exfat boot region", expected, checksum) {
            return Ok(false);
        }
    }

    return Ok(true);
}

fn exfat_valid_superblock(probe: &mut Probe, sb: &ExfatSuperBlock) -> Result<(), ExFatError> {
    if sb.boot_signature.get() != 0xAA55 {
        return Err(ExFatError::InvalidBootSector);
    }
    if cluster_size(sb) == 0 {
        return Err(ExFatError::InvalidBootSector);
    }
    if sb.jump_boot != [0xEB, 0x76, 0x90] {
        return Err(ExFatError::InvalidBootSector);
    }
    if &sb.fs_name != b"EXFAT   " {
        return Err(ExFatError::InvalidBootSector);
    }
    if sb.must_be_zero.iter().any(|&b| b != 0) {
        return Err(ExFatError::InvalidBootSector);
    }
    if !(1..=2).contains(&sb.number_of_fats) {
        return Err(ExFatError::InvalidBootSector);
    }
    if !(9..=12).contains(&sb.bytes_per_sector_shift) {
        return Err(ExFatError::InvalidBootSector);
    }
    if sb.sectors_per_cluster_shift > 25 - sb.bytes_per_sector_shift {
        return Err(ExFatError::InvalidBootSector);
    }

    let fat_end = sb
        .cluster_heap_offset
        .get()
        .wrapping_sub(sb.fat_length.get().wrapping_mul(u32::from(sb.number_of_fats)));
    if sb.fat_offset.get() < 24 || sb.fat_offset.get() > fat_end {
        return Err(ExFatError::InvalidBootSector);
    }

    let heap_start = sb
        .fat_offset
        .get()
        .wrapping_add(sb.fat_length.get().wrapping_mul(u32::from(sb.number_of_fats)));
    if sb.cluster_heap_offset.get() < heap_start
        || sb.cluster_heap_offset.get() > 1u32 << 31
    {
        return Err(ExFatError::InvalidBootSector);
    }

    if !(2..=sb.cluster_count.get() + 1).contains(&sb.first_cluster_of_root.get()) {
        return Err(ExFatError::InvalidBootSector);
    }

    if !exfat_validate_checksum(probe, sb)? {
        return Err(ExFatError::ChecksumInvalid);
    }

    return Ok(());
}

/// Used by the MBR parser to avoid misreading an exFAT boot sector as a
/// partition table.
pub(crate) fn probe_is_exfat(probe: &mut Probe) -> Result<bool, IoError> {
    use crate::filesystems::vfat::VFAT_ID_INFO;

    match probe.get_magic(&VFAT_ID_INFO) {
        Ok(Some(_)) => (),
        Ok(None) => return Ok(false),
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::UnexpectedEof
            ) =>
        {
            return Ok(false);
        }
        Err(e) => return Err(e),
    }

    let sb: ExfatSuperBlock = probe.map_from_file(0)?;
    if &sb.fs_name != b"EXFAT   " {
        return Ok(false);
    }

    return Ok(exfat_valid_superblock(probe, &sb).is_ok());
}

pub fn probe_exfat(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), ExFatError> {
    let sb: ExfatSuperBlock = probe.map_from_file(0)?;

    exfat_valid_superblock(probe, &sb)?;

    if let Some(label) = find_label(probe, &sb)? {
        let len = usize::min(usize::from(label.length) * 2, label.name.len());
        probe
            .values_mut()
            .set_utf8_label(&label.name[..len], LabelEncoding::Utf16Le);
    }

    let serno = VolumeId32::new(sb.volume_serial);

    let bsize = block_size(&sb);
    let values = probe.values_mut();
    values.set_string_uuid(TagName::Uuid, &serno.to_string());
    values.set_version(&format!("{}.{}", sb.vermaj, sb.vermin));
    values.set_fs_block_size(bsize);
    values.set_block_size(bsize);
    values.set_fs_size(bsize * sb.volume_length.get());

    return Ok(());
}
