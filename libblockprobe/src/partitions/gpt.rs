use std::io::{Error as IoError, ErrorKind as IoErrorKind};

use thiserror::Error;
use uuid::Uuid;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32, U64},
};

use crate::{
    BlockidError,
    checksum::{crc32, crc32_exclude_offset, verify_csum},
    partitions::PtError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, ProbeFlags, UsageType},
    values::TagName,
};

#[derive(Debug, Error)]
pub enum GptError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("No protective MBR in front of the header")]
    MissingPmbr,
    #[error("GPT header error: {0}")]
    InvalidHeader(&'static str),
}

pub const GPT_PT_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "gpt",
    usage: UsageType::PartitionTable,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_gpt_pt(probe, magic)
            .map_err(PtError::from)
            .map_err(BlockidError::from)
    },
    // position depends on the sector size, checked by the handler
    magics: None,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
struct EfiGuid {
    time_low: U32<LittleEndian>,
    time_mid: U16<LittleEndian>,
    time_hi_and_version: U16<LittleEndian>,
    clock_seq_hi: u8,
    clock_seq_low: u8,
    node: [u8; 6],
}

impl From<EfiGuid> for Uuid {
    fn from(guid: EfiGuid) -> Self {
        Uuid::from_fields(
            guid.time_low.get(),
            guid.time_mid.get(),
            guid.time_hi_and_version.get(),
            &[
                guid.clock_seq_hi,
                guid.clock_seq_low,
                guid.node[0],
                guid.node[1],
                guid.node[2],
                guid.node[3],
                guid.node[4],
                guid.node[5],
            ],
        )
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
struct GptHeader {
    signature: U64<LittleEndian>,
    revision: U32<LittleEndian>,
    header_size: U32<LittleEndian>,
    header_crc32: U32<LittleEndian>,
    reserved1: U32<LittleEndian>,
    my_lba: U64<LittleEndian>,
    alternate_lba: U64<LittleEndian>,
    first_usable_lba: U64<LittleEndian>,
    last_usable_lba: U64<LittleEndian>,
    disk_guid: EfiGuid,
    partition_entries_lba: U64<LittleEndian>,
    num_partition_entries: U32<LittleEndian>,
    sizeof_partition_entry: U32<LittleEndian>,
    partition_entry_array_crc32: U32<LittleEndian>,
}

impl GptHeader {
    const SIGNATURE: u64 = 0x5452415020494645; // "EFI PART"
    const CRC_FIELD_OFFSET: usize = 16;
}

const MSDOS_SIGNATURE: [u8; 2] = [0x55, 0xAA];
const MBR_ENTRIES_OFFSET: usize = 446;
const MBR_ENTRY_SIZE: usize = 16;
const GPT_PROTECTIVE_TYPE: u8 = 0xEE;

fn last_lba(probe: &Probe) -> Option<u64> {
    let sz = probe.size();
    let ssz = probe.ssz();

    if sz < ssz {
        return None;
    }
    return Some(sz / ssz - 1);
}

/// The sector in front of a GPT carries an MBR with a single 0xEE entry
/// spanning the disk. Anything bootable from the pre-GPT era may also
/// carry one, so only the entry type is checked.
fn is_pmbr_valid(probe: &mut Probe) -> Result<bool, GptError> {
    let buf = match probe.read_vec_at(0, 512) {
        Ok(buf) => buf,
        Err(e) if e.kind() == IoErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(GptError::from(e)),
    };

    if buf[510..512] != MSDOS_SIGNATURE {
        return Ok(false);
    }

    for slot in 0..4 {
        let entry = &buf[MBR_ENTRIES_OFFSET + slot * MBR_ENTRY_SIZE..];
        if entry[4] == GPT_PROTECTIVE_TYPE {
            return Ok(true);
        }
    }
    return Ok(false);
}

fn read_gpt_header(probe: &mut Probe, lba: u64, last: u64) -> Result<GptHeader, GptError> {
    let ssz = probe.ssz();
    let raw = probe.read_vec_at(lba * ssz, ssz as usize)?;

    let header = GptHeader::read_from_bytes(&raw[..size_of::<GptHeader>()])
        .map_err(|_| GptError::InvalidHeader("short header sector"))?;

    if header.signature.get() != GptHeader::SIGNATURE {
        return Err(GptError::InvalidHeader("missing signature"));
    }

    let hsz = u64::from(header.header_size.get());
    if hsz > ssz || hsz < size_of::<GptHeader>() as u64 {
        return Err(GptError::InvalidHeader("implausible header size"));
    }

    let computed = crc32_exclude_offset(
        &raw[..hsz as usize],
        GptHeader::CRC_FIELD_OFFSET,
        size_of::<u32>(),
    );
    if !verify_csum("gpt header", header.header_crc32.get(), computed) {
        return Err(GptError::InvalidHeader("header checksum mismatch"));
    }

    if header.my_lba.get() != lba {
        return Err(GptError::InvalidHeader("my_lba does not match the read position"));
    }

    let fu = header.first_usable_lba.get();
    let lu = header.last_usable_lba.get();
    if lu < fu || fu > last || lu > last {
        return Err(GptError::InvalidHeader("usable range out of order"));
    }
    if fu < lba && lba < lu {
        return Err(GptError::InvalidHeader("header inside the usable area"));
    }

    let esz = u64::from(header.sizeof_partition_entry.get());
    let total = u64::from(header.num_partition_entries.get()) * esz;
    if total == 0 || total >= u64::from(u32::MAX) {
        return Err(GptError::InvalidHeader("entry array undefined"));
    }
    if !esz.is_power_of_two() || !(128..=4096).contains(&esz) {
        return Err(GptError::InvalidHeader("implausible entry size"));
    }

    let entries = probe.read_vec_at(header.partition_entries_lba.get() * ssz, total as usize)?;
    let computed = crc32(&entries);
    if !verify_csum(
        "gpt entry array",
        header.partition_entry_array_crc32.get(),
        computed,
    ) {
        return Err(GptError::InvalidHeader("entry array checksum mismatch"));
    }

    return Ok(header);
}

pub fn probe_gpt_pt(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), GptError> {
    let Some(last) = last_lba(probe) else {
        return Err(GptError::InvalidHeader("device smaller than one sector"));
    };

    if !is_pmbr_valid(probe)? && !probe.flags().contains(ProbeFlags::FORCE_GPT_PMBR) {
        return Err(GptError::MissingPmbr);
    }

    let header = match read_gpt_header(probe, 1, last) {
        Ok(header) => header,
        Err(GptError::IoError(e)) => return Err(GptError::from(e)),
        // primary corrupt, the backup at the end of the disk may
        // still be intact
        Err(e) => {
            log::debug!("gpt primary header rejected: {e}, trying the alternate");
            read_gpt_header(probe, last, last)?
        }
    };

    let ssz = probe.ssz();
    let values = probe.values_mut();
    let uuid = Uuid::from(header.disk_guid);
    values.set_string(TagName::PtUuid, &uuid.to_string());
    values.set_wiper(header.my_lba.get() * ssz, ssz);

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_guid_renders_mixed_endian() {
        let raw = [
            0xafu8, 0xdb, 0x56, 0x3b, 0x0c, 0xbf, 0x4c, 0x44, 0x80, 0xbf, 0x8b, 0x87, 0xa3,
            0x1a, 0x4b, 0x7e,
        ];
        let guid = EfiGuid::read_from_bytes(&raw).unwrap();
        assert_eq!(
            Uuid::from(guid).to_string(),
            "3b56dbaf-bf0c-444c-80bf-8b87a31a4b7e"
        );
    }

    #[test]
    fn header_is_92_bytes() {
        assert_eq!(size_of::<GptHeader>(), 92);
    }
}
