use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32, U64},
};

use crate::{
    BlockidError,
    checksum::{crc32c, verify_csum},
    containers::ContError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
};

#[derive(Debug, Error)]
pub enum MpoolError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Superblock descriptor checksum is invalid")]
    ChecksumInvalid,
}

const MPOOL_MAGIC: &[u8] = b"mpoolDev";

pub const MPOOL_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "mpool",
    usage: UsageType::Raid,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_mpool(probe, magic)
            .map_err(ContError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[BlockidMagic {
        magic: MPOOL_MAGIC,
        len: MPOOL_MAGIC.len(),
        b_offset: 0,
        zone: None,
    }]),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct OmfSbDescriptor {
    magic: U64<LittleEndian>,
    name: [u8; 16],
    poolid: [u8; 16],
    vers: U16<LittleEndian>,
    generation: U32<LittleEndian>,
    cksum: U32<LittleEndian>,
}

// crc field sits at the end; the stored value is the non-finalized
// CRC32C of everything before it
const CKSUM_OFFSET: usize = 46;

pub fn probe_mpool(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), MpoolError> {
    let buf = probe.read_vec_at(0, size_of::<OmfSbDescriptor>())?;
    let Ok(osd) = OmfSbDescriptor::read_from_bytes(&buf) else {
        return Err(MpoolError::ChecksumInvalid);
    };

    let computed = !crc32c(&buf[..CKSUM_OFFSET]);
    if !verify_csum("mpool descriptor", osd.cksum.get(), computed) {
        return Err(MpoolError::ChecksumInvalid);
    }

    let values = probe.values_mut();
    values.set_label(&osd.name);
    values.set_uuid(&osd.poolid);

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cksum_is_the_trailing_field() {
        assert_eq!(std::mem::offset_of!(OmfSbDescriptor, cksum), CKSUM_OFFSET);
        assert_eq!(size_of::<OmfSbDescriptor>(), CKSUM_OFFSET + 4);
    }
}
