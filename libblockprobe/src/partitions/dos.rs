use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U32},
};

use crate::{
    BlockidError,
    filesystems::{exfat::probe_is_exfat, vfat::probe_is_vfat},
    partitions::PtError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::TagName,
};

#[derive(Debug, Error)]
pub enum DosPtError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Boot sector belongs to a FAT filesystem")]
    FatBootSector,
    #[error("Protective entry present, the disk is GPT labelled")]
    GptProtective,
    #[error("Invalid boot indicator in entry {0}")]
    InvalidBootFlag(usize),
}

pub const DOS_PT_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "dos",
    usage: UsageType::PartitionTable,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_dos_pt(probe, magic)
            .map_err(PtError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[BlockidMagic {
        magic: &[0x55, 0xAA],
        len: 2,
        b_offset: 0x1FE,
        zone: None,
    }]),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct MbrPartitionEntry {
    boot_ind: u8,
    begin_chs: [u8; 3],
    sys_ind: u8,
    end_chs: [u8; 3],
    start_sect: U32<LittleEndian>,
    nr_sects: U32<LittleEndian>,
}

const MBR_ENTRIES_OFFSET: usize = 446;
const MBR_DISK_ID_OFFSET: usize = 0x1B8;
const MBR_GPT_PROTECTIVE: u8 = 0xEE;

pub fn probe_dos_pt(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), DosPtError> {
    // FAT boot sectors carry the same 0x55AA signature
    if probe_is_vfat(probe)? || probe_is_exfat(probe)? {
        return Err(DosPtError::FatBootSector);
    }

    let sector = probe.read_vec_at(0, 512)?;

    for slot in 0..4 {
        let raw = &sector[MBR_ENTRIES_OFFSET + slot * size_of::<MbrPartitionEntry>()..];
        let Ok(entry) = MbrPartitionEntry::read_from_bytes(&raw[..size_of::<MbrPartitionEntry>()])
        else {
            continue;
        };

        if entry.sys_ind == MBR_GPT_PROTECTIVE {
            return Err(DosPtError::GptProtective);
        }
        // a real MBR only ever stores 0x00 or 0x80 here
        if entry.boot_ind != 0 && entry.boot_ind != 0x80 {
            return Err(DosPtError::InvalidBootFlag(slot));
        }
    }

    let disk_id = u32::from_le_bytes([
        sector[MBR_DISK_ID_OFFSET],
        sector[MBR_DISK_ID_OFFSET + 1],
        sector[MBR_DISK_ID_OFFSET + 2],
        sector[MBR_DISK_ID_OFFSET + 3],
    ]);
    if disk_id != 0 {
        probe
            .values_mut()
            .set_string(TagName::PtUuid, &format!("{disk_id:08x}"));
    }

    return Ok(());
}
