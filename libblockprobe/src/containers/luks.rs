use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{BigEndian, U16, U64},
};

use crate::{
    BlockidError,
    containers::ContError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::TagName,
};

// https://cdn.kernel.org/pub/linux/utils/cryptsetup/LUKS_docs/on-disk-format.pdf
// https://gitlab.com/cryptsetup/LUKS2-docs

#[derive(Debug, Error)]
pub enum LuksError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Not a valid LUKS1 header")]
    NotLuks1,
    #[error("Not a valid LUKS2 header")]
    NotLuks2,
}

pub const LUKS1_MAGIC: [u8; 6] = *b"LUKS\xba\xbe";
pub const LUKS2_SECONDARY_MAGIC: [u8; 6] = *b"SKUL\xba\xbe";

/// Allowed secondary-header offsets, tied to the LUKS2 metadata area
/// sizes.
pub const SECONDARY_OFFSETS: [u64; 9] = [
    0x04000, 0x008000, 0x010000, 0x020000, 0x40000, 0x080000, 0x100000, 0x200000, 0x400000,
];

pub const LUKS1_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "crypto_LUKS",
    usage: UsageType::Crypto,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_luks1(probe, magic)
            .map_err(ContError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[BlockidMagic {
        magic: &LUKS1_MAGIC,
        len: 6,
        b_offset: 0,
        zone: None,
    }]),
};

pub const LUKS2_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "crypto_LUKS",
    usage: UsageType::Crypto,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_luks2(probe, magic)
            .map_err(ContError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[BlockidMagic {
        magic: &LUKS1_MAGIC,
        len: 6,
        b_offset: 0,
        zone: None,
    }]),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct Luks1Header {
    magic: [u8; 6],
    version: U16<BigEndian>,
    cipher_name: [u8; 32],
    cipher_mode: [u8; 32],
    hash_spec: [u8; 32],
    payload_offset: zerocopy::byteorder::U32<BigEndian>,
    key_bytes: zerocopy::byteorder::U32<BigEndian>,
    mk_digest: [u8; 20],
    mk_digest_salt: [u8; 32],
    mk_digest_iterations: zerocopy::byteorder::U32<BigEndian>,
    uuid: [u8; 40],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct Luks2Header {
    magic: [u8; 6],
    version: U16<BigEndian>,
    hdr_size: U64<BigEndian>,
    seqid: U64<BigEndian>,
    label: [u8; 48],
    checksum_alg: [u8; 32],
    salt: [u8; 64],
    uuid: [u8; 40],
    subsystem: [u8; 48],
    hdr_offset: U64<BigEndian>,
    padding: [u8; 184],
    csum: [u8; 64],
}

fn set_luks2_values(probe: &mut Probe, header: &Luks2Header) {
    let values = probe.values_mut();
    if header.label[0] != 0 {
        values.set_label(&header.label);
    }
    values.strncpy_uuid(TagName::Uuid, &header.uuid);
    if header.subsystem[0] != 0 {
        let subsystem = String::from_utf8_lossy(&header.subsystem);
        values.set_sec_type(subsystem.trim_end_matches('\0'));
    }
    values.set_version("2");
}

pub fn probe_luks1(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), LuksError> {
    let header: Luks1Header = probe.map_from_file(0)?;

    if header.magic != LUKS1_MAGIC || header.version.get() != 1 {
        return Err(LuksError::NotLuks1);
    }

    let values = probe.values_mut();
    values.strncpy_uuid(TagName::Uuid, &header.uuid);
    values.set_version("1");

    return Ok(());
}

pub fn probe_luks2(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), LuksError> {
    let header: Luks2Header = probe.map_from_file(0)?;

    if header.magic == LUKS1_MAGIC && header.version.get() == 2 {
        set_luks2_values(probe, &header);
        return Ok(());
    }

    // the primary header may be torn; a secondary header whose
    // recorded offset matches its location still identifies the device
    for offset in SECONDARY_OFFSETS {
        let secondary: Luks2Header = match probe.map_from_file(offset) {
            Ok(h) => h,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(LuksError::from(e)),
        };

        if secondary.magic == LUKS2_SECONDARY_MAGIC
            && secondary.version.get() == 2
            && secondary.hdr_offset.get() == offset
        {
            set_luks2_values(probe, &secondary);
            return Ok(());
        }
    }

    return Err(LuksError::NotLuks2);
}
