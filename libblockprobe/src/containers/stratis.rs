use std::io::{Error as IoError, ErrorKind as IoErrorKind};

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U32, U64},
};

use crate::{
    BlockidError,
    checksum::{crc32c, verify_csum},
    containers::ContError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::TagName,
};

#[derive(Debug, Error)]
pub enum StratisError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Neither sigblock copy is valid")]
    NoValidSigblock,
}

const SECTOR: u64 = 512;
const FIRST_COPY_OFFSET: u64 = SECTOR;
const SECOND_COPY_OFFSET: u64 = SECTOR * 9;

const STRATIS_MAGIC: &[u8] = b"!Stra0tis\x86\xff\x02$\x1d";
const MAGIC_OFFSET: u64 = 4;

pub const STRATIS_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "stratis",
    usage: UsageType::Raid,
    minsz: Some(1024 * 1024),
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_stratis(probe, magic)
            .map_err(ContError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[
        BlockidMagic {
            magic: STRATIS_MAGIC,
            len: STRATIS_MAGIC.len(),
            b_offset: FIRST_COPY_OFFSET + MAGIC_OFFSET,
            zone: None,
        },
        BlockidMagic {
            magic: STRATIS_MAGIC,
            len: STRATIS_MAGIC.len(),
            b_offset: SECOND_COPY_OFFSET + MAGIC_OFFSET,
            zone: None,
        },
    ]),
};

/// One 512-byte sigblock copy; the pool writes identical copies at
/// sectors 1 and 9.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct StratisSigblock {
    crc: U32<LittleEndian>,
    magic: [u8; 16],
    sectors: U64<LittleEndian>,
    sigblock_version: u8,
    pad0: [u8; 3],
    pool_uuid: [u8; 32],
    dev_uuid: [u8; 32],
    mda_size: U64<LittleEndian>,
    reserved_size: U64<LittleEndian>,
    pad1: [u8; 8],
    initialization_time: U64<LittleEndian>,
}

fn read_sigblock(probe: &mut Probe, offset: u64) -> Result<Option<StratisSigblock>, StratisError> {
    let buf = match probe.read_vec_at(offset, SECTOR as usize) {
        Ok(buf) => buf,
        Err(e) if e.kind() == IoErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(StratisError::from(e)),
    };

    if !buf[MAGIC_OFFSET as usize..].starts_with(STRATIS_MAGIC) {
        return Ok(None);
    }

    let sb = match StratisSigblock::read_from_bytes(&buf[..size_of::<StratisSigblock>()]) {
        Ok(sb) => sb,
        Err(_) => return Ok(None),
    };

    // stored checksum covers everything after its own field
    if !verify_csum("stratis sigblock", sb.crc.get(), crc32c(&buf[4..])) {
        return Ok(None);
    }

    return Ok(Some(sb));
}

pub fn probe_stratis(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), StratisError> {
    let mut sigblock = read_sigblock(probe, FIRST_COPY_OFFSET)?;
    if sigblock.is_none() {
        sigblock = read_sigblock(probe, SECOND_COPY_OFFSET)?;
    }

    let Some(sb) = sigblock else {
        return Err(StratisError::NoValidSigblock);
    };

    let values = probe.values_mut();
    values.strncpy_uuid(TagName::PoolUuid, &sb.pool_uuid);
    values.strncpy_uuid(TagName::Uuid, &sb.dev_uuid);
    values.set_string(TagName::BlockdevSectors, &sb.sectors.get().to_string());
    values.set_string(
        TagName::BlockdevInittime,
        &sb.initialization_time.get().to_string(),
    );

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigblock_layout_is_512_bytes_prefixed() {
        assert_eq!(std::mem::offset_of!(StratisSigblock, pool_uuid), 32);
        assert_eq!(std::mem::offset_of!(StratisSigblock, initialization_time), 120);
        assert_eq!(size_of::<StratisSigblock>(), 128);
    }
}
