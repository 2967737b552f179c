use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32, U64},
};

use crate::{
    BlockidError,
    filesystems::{FsError, volume_id::VolumeId64},
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::{LabelEncoding, TagName},
};

#[derive(Debug, Error)]
pub enum NtfsError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Invalid BIOS parameter block")]
    InvalidBpb,
    #[error("MFT record out of range")]
    MftOutOfRange,
    #[error("MFT record magic missing")]
    MftMagicMissing,
}

pub const NTFS_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "ntfs",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_ntfs(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[BlockidMagic {
        magic: b"NTFS    ",
        len: 8,
        b_offset: 3,
        zone: None,
    }]),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct NtfsBiosParameters {
    pub sector_size: U16<LittleEndian>,
    pub sectors_per_cluster: u8,
    /* must be zero */
    pub reserved_sectors: U16<LittleEndian>,
    /* must be zero */
    pub fats: u8,
    /* must be zero */
    pub root_entries: U16<LittleEndian>,
    /* must be zero */
    pub sectors: U16<LittleEndian>,
    pub media_type: u8,
    /* must be zero */
    pub sectors_per_fat: U16<LittleEndian>,
    pub sectors_per_track: U16<LittleEndian>,
    pub heads: U16<LittleEndian>,
    pub hidden_sectors: U32<LittleEndian>,
    /* must be zero */
    pub large_sectors: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct NtfsSuperBlock {
    pub jump: [u8; 3],
    pub oem_id: [u8; 8],
    pub bpb: NtfsBiosParameters,
    pub unused: [U16<LittleEndian>; 2],
    pub number_of_sectors: U64<LittleEndian>,
    pub mft_cluster_location: U64<LittleEndian>,
    pub mft_mirror_cluster_location: U64<LittleEndian>,
    pub clusters_per_mft_record: u8,
    pub reserved1: [u8; 3],
    pub cluster_per_index_record: u8,
    pub reserved2: [u8; 3],
    pub volume_serial: U64<LittleEndian>,
    pub checksum: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct MftRecord {
    pub magic: [u8; 4],
    pub usa_ofs: U16<LittleEndian>,
    pub usa_count: U16<LittleEndian>,
    pub lsn: U64<LittleEndian>,
    pub sequence_number: U16<LittleEndian>,
    pub link_count: U16<LittleEndian>,
    pub attrs_offset: U16<LittleEndian>,
    pub flags: U16<LittleEndian>,
    pub bytes_in_use: U32<LittleEndian>,
    pub bytes_allocated: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct FileAttribute {
    pub attr_type: U32<LittleEndian>,
    pub len: U32<LittleEndian>,
    pub non_resident: u8,
    pub name_len: u8,
    pub name_offset: U16<LittleEndian>,
    pub flags: U16<LittleEndian>,
    pub instance: U16<LittleEndian>,
    pub value_len: U32<LittleEndian>,
    pub value_offset: U16<LittleEndian>,
}

const MFT_RECORD_VOLUME: u64 = 3;
const NTFS_MAX_CLUSTER_SIZE: u32 = 64 * 1024;

const MFT_RECORD_ATTR_VOLUME_NAME: u32 = 0x60;
const MFT_RECORD_ATTR_END: u32 = 0xffff_ffff;

pub fn probe_ntfs(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), NtfsError> {
    let ns: NtfsSuperBlock = probe.map_from_file(0)?;

    let sector_size = u32::from(ns.bpb.sector_size.get());
    let sectors_per_cluster = u32::from(ns.bpb.sectors_per_cluster);

    if !(256..=4096).contains(&sector_size) {
        return Err(NtfsError::InvalidBpb);
    }
    if !matches!(sectors_per_cluster, 1 | 2 | 4 | 8 | 16 | 32 | 64 | 128) {
        return Err(NtfsError::InvalidBpb);
    }
    if sector_size * sectors_per_cluster > NTFS_MAX_CLUSTER_SIZE {
        return Err(NtfsError::InvalidBpb);
    }

    if ns.bpb.reserved_sectors.get() != 0
        || ns.bpb.root_entries.get() != 0
        || ns.bpb.sectors.get() != 0
        || ns.bpb.sectors_per_fat.get() != 0
        || ns.bpb.large_sectors.get() != 0
        || ns.bpb.fats != 0
    {
        return Err(NtfsError::InvalidBpb);
    }

    /* values >= 0xe1 encode a negative power of two */
    let mft_record_size = if (0xe1..=0xf7).contains(&ns.clusters_per_mft_record) {
        1u32 << (-i32::from(ns.clusters_per_mft_record as i8))
    } else {
        if !matches!(ns.clusters_per_mft_record, 1 | 2 | 4 | 8 | 16 | 32 | 64) {
            return Err(NtfsError::InvalidBpb);
        }
        u32::from(ns.clusters_per_mft_record) * sectors_per_cluster * sector_size
    };

    let nr_clusters = ns.number_of_sectors.get() / u64::from(sectors_per_cluster);
    if ns.mft_cluster_location.get() > nr_clusters
        || ns.mft_mirror_cluster_location.get() > nr_clusters
    {
        return Err(NtfsError::MftOutOfRange);
    }

    let mut off =
        ns.mft_cluster_location.get() * u64::from(sector_size) * u64::from(sectors_per_cluster);

    let head: [u8; 4] = probe.read_exact_at(off)?;
    if &head != b"FILE" {
        return Err(NtfsError::MftMagicMissing);
    }

    off += MFT_RECORD_VOLUME * u64::from(mft_record_size);

    let buf_mft = probe.read_vec_at(off, mft_record_size as usize)?;
    if &buf_mft[..4] != b"FILE" {
        return Err(NtfsError::MftMagicMissing);
    }

    let mft = MftRecord::read_from_bytes(&buf_mft[..size_of::<MftRecord>()])
        .map_err(|_| NtfsError::MftMagicMissing)?;
    let mut attr_off = u32::from(mft.attrs_offset.get());

    while attr_off as usize + size_of::<FileAttribute>() <= buf_mft.len()
        && attr_off <= mft.bytes_allocated.get()
    {
        let attr = FileAttribute::read_from_bytes(
            &buf_mft[attr_off as usize..attr_off as usize + size_of::<FileAttribute>()],
        )
        .map_err(|_| NtfsError::MftMagicMissing)?;

        let attr_len = attr.len.get();
        if attr_len == 0 {
            break;
        }
        if attr.attr_type.get() == MFT_RECORD_ATTR_END {
            break;
        }
        if attr.attr_type.get() == MFT_RECORD_ATTR_VOLUME_NAME {
            let val_off = attr_off as usize + usize::from(attr.value_offset.get());
            let val_len = attr.value_len.get() as usize;

            if val_off + val_len <= buf_mft.len() {
                probe
                    .values_mut()
                    .set_utf8_label(&buf_mft[val_off..val_off + val_len], LabelEncoding::Utf16Le);
            }
            break;
        }

        attr_off = match attr_off.checked_add(attr_len) {
            Some(next) => next,
            None => break,
        };
    }

    let serial = VolumeId64::from_u64_le(ns.volume_serial.get());
    let values = probe.values_mut();
    values.set_string_uuid(TagName::Uuid, &serial.to_string());
    values.set_block_size(u64::from(sector_size));
    values.set_fs_block_size(u64::from(sector_size * sectors_per_cluster));
    values.set_fs_size(ns.number_of_sectors.get() * u64::from(sector_size));
    values.set_fs_last_block(ns.number_of_sectors.get());

    return Ok(());
}
