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
pub enum Fvault2Error {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Volume header checksum is invalid")]
    ChecksumInvalid,
    #[error("Volume header field outside the accepted values")]
    UnexpectedHeaderField,
}

pub const FVAULT2_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "cs_fvault2",
    usage: UsageType::Crypto,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_fvault2(probe, magic)
            .map_err(ContError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[BlockidMagic {
        magic: b"CS",
        len: 2,
        b_offset: 88,
        zone: None,
    }]),
};

/// Core Storage physical volume header, first 512 bytes of the volume.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct Fvault2VolumeHeader {
    checksum: U32<LittleEndian>,
    checksum_seed: U32<LittleEndian>,
    version: U16<LittleEndian>,
    block_type: U16<LittleEndian>,
    serial_number: U32<LittleEndian>,
    unknown1: [u8; 8],
    volume_size: U64<LittleEndian>,
    unknown2: [u8; 56],
    signature: [u8; 2],
    checksum_algo: U32<LittleEndian>,
    unknown3: [u8; 2],
    block_size: U32<LittleEndian>,
    metadata_size: U32<LittleEndian>,
    metadata_blocks: [U64<LittleEndian>; 4],
    unknown4: [u8; 8],
    key_data_size: U32<LittleEndian>,
    cipher: U32<LittleEndian>,
    key_data: [u8; 16],
    unknown5: [u8; 8],
    pv_uuid: [u8; 16],
    vg_uuid: [u8; 16],
}

const HEADER_SIZE: usize = 512;

pub fn probe_fvault2(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), Fvault2Error> {
    let buf = probe.read_vec_at(0, HEADER_SIZE)?;
    let Ok(hdr) = Fvault2VolumeHeader::read_from_bytes(&buf[..size_of::<Fvault2VolumeHeader>()])
    else {
        return Err(Fvault2Error::UnexpectedHeaderField);
    };

    // the only published combination; anything else is not a FileVault2
    // physical volume
    if hdr.version.get() != 1
        || hdr.block_type.get() != 0x10
        || hdr.checksum_algo.get() != 1
        || hdr.key_data_size.get() != 16
        || hdr.cipher.get() != 2
    {
        return Err(Fvault2Error::UnexpectedHeaderField);
    }

    // stored as the non-finalized CRC32C of everything after the
    // checksum pair
    let computed = !crc32c(&buf[8..]);
    if !verify_csum("fvault2 header", hdr.checksum.get(), computed) {
        return Err(Fvault2Error::ChecksumInvalid);
    }

    let values = probe.values_mut();
    values.set_uuid(&hdr.pv_uuid);
    values.set_version(&hdr.version.get().to_string());

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_sits_at_offset_88() {
        assert_eq!(std::mem::offset_of!(Fvault2VolumeHeader, signature), 88);
        assert_eq!(std::mem::offset_of!(Fvault2VolumeHeader, block_size), 96);
        assert_eq!(std::mem::offset_of!(Fvault2VolumeHeader, key_data_size), 144);
        assert_eq!(std::mem::offset_of!(Fvault2VolumeHeader, cipher), 148);
        assert_eq!(std::mem::offset_of!(Fvault2VolumeHeader, pv_uuid), 176);
    }
}
