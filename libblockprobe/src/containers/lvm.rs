use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U32, U64},
};

use crate::{
    BlockidError,
    checksum::verify_csum,
    containers::ContError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::TagName,
};

#[derive(Debug, Error)]
pub enum LvmError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("No LABELONE header in the first sectors")]
    NoLabel,
    #[error("Label sector number does not match its location")]
    SectorMismatch,
    #[error("Label checksum mismatch")]
    ChecksumInvalid,
}

const LVM2_ID_LEN: usize = 32;
const LVM2_LABEL_SIZE: usize = 512;
// id + sector_xl + crc_xl, everything after is covered by the crc
const LVM2_CRC_START: usize = 20;

pub const LVM2_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "LVM2_member",
    usage: UsageType::Raid,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_lvm2(probe, magic)
            .map_err(ContError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[
        BlockidMagic {
            magic: b"LVM2 001",
            len: 8,
            b_offset: 0x018,
            zone: None,
        },
        BlockidMagic {
            magic: b"LVM2 001",
            len: 8,
            b_offset: 0x218,
            zone: None,
        },
        BlockidMagic {
            magic: b"LVM2 001",
            len: 8,
            b_offset: 1024 + 0x018,
            zone: None,
        },
        BlockidMagic {
            magic: b"LVM2 001",
            len: 8,
            b_offset: 1024 + 0x218,
            zone: None,
        },
    ]),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct Lvm2PvLabelHeader {
    id: [u8; 8],
    sector_xl: U64<LittleEndian>,
    crc_xl: U32<LittleEndian>,
    offset_xl: U32<LittleEndian>,
    label_type: [u8; 8],
    pv_uuid: [u8; LVM2_ID_LEN],
}

/// LVM's own label CRC, a nibble-at-a-time CRC32 variant seeded with
/// 0xf597a6cf.
fn lvm2_calc_crc(data: &[u8]) -> u32 {
    const CRCTAB: [u32; 16] = [
        0x00000000, 0x1db71064, 0x3b6e20c8, 0x26d930ac, 0x76dc4190, 0x6b6b51f4, 0x4db26158,
        0x5005713c, 0xedb88320, 0xf00f9344, 0xd6d6a3e8, 0xcb61b38c, 0x9b64c2b0, 0x86d3d2d4,
        0xa00ae278, 0xbdbdf21c,
    ];

    let mut crc: u32 = 0xf597a6cf;
    for byte in data {
        crc ^= u32::from(*byte);
        crc = (crc >> 4) ^ CRCTAB[(crc & 0xf) as usize];
        crc = (crc >> 4) ^ CRCTAB[(crc & 0xf) as usize];
    }
    return crc;
}

/// Re-renders the 32-character on-disk UUID with dashes after
/// characters 6, 10, 14, 18, 22 and 26.
fn format_lvm_uuid(src: &[u8; LVM2_ID_LEN]) -> String {
    let mut uuid = String::with_capacity(LVM2_ID_LEN + 6);
    for (i, c) in src.iter().enumerate() {
        if (1u64 << i) & 0x4444440 != 0 {
            uuid.push('-');
        }
        uuid.push(*c as char);
    }
    return uuid;
}

pub fn probe_lvm2(probe: &mut Probe, mag: BlockidMagic) -> Result<(), LvmError> {
    // the type magic sits 0x18 into the label header, which starts on
    // a sector boundary within the first two KiB
    let label_offset = mag.b_offset - 0x18;
    let sector = label_offset / 512;

    let buf = probe.read_vec_at(label_offset, LVM2_LABEL_SIZE)?;
    let Ok(label) = Lvm2PvLabelHeader::read_from_bytes(&buf[..size_of::<Lvm2PvLabelHeader>()])
    else {
        return Err(LvmError::NoLabel);
    };

    if &label.id != b"LABELONE" {
        return Err(LvmError::NoLabel);
    }
    if label.sector_xl.get() != sector {
        return Err(LvmError::SectorMismatch);
    }

    let computed = lvm2_calc_crc(&buf[LVM2_CRC_START..]);
    if !verify_csum("lvm2 label", label.crc_xl.get(), computed) {
        return Err(LvmError::ChecksumInvalid);
    }

    let values = probe.values_mut();
    values.set_string_uuid(TagName::Uuid, &format_lvm_uuid(&label.pv_uuid));
    values.set_version(&String::from_utf8_lossy(mag.magic));

    // pvcreate wipes the start of the device; remembering the range
    // resolves conflicts with stale partition tables
    values.set_wiper(0, 8 * 1024);

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_is_dash_grouped() {
        let id = *b"2pHr0qa72k9Drareleav0Hv4DRI6Oblc";
        assert_eq!(
            format_lvm_uuid(&id),
            "2pHr0q-a72k-9Dra-rele-av0H-v4DR-I6Oblc"
        );
    }

    #[test]
    fn crc_matches_known_vector() {
        // from the dm docs: empty input leaves the seed untouched
        assert_eq!(lvm2_calc_crc(&[]), 0xf597a6cf);
        assert_ne!(lvm2_calc_crc(b"LVM2 001"), lvm2_calc_crc(b"LVM2 002"));
    }
}
