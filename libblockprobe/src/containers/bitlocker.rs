use std::io::{Error as IoError, ErrorKind as IoErrorKind};

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32, U64},
};

use crate::{
    BlockidError,
    containers::ContError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::TagName,
};

#[derive(Debug, Error)]
pub enum BitlockerError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("No BitLocker boot signature")]
    UnknownBootSignature,
    #[error("FVE metadata block not found")]
    NoFveMetadata,
}

const BDE_MAGIC_VISTA: &[u8; 11] = b"\xeb\x52\x90-FVE-FS-";
const BDE_MAGIC_WIN7: &[u8; 11] = b"\xeb\x58\x90-FVE-FS-";
const BDE_MAGIC_TOGO: &[u8; 11] = b"\xeb\x58\x90MSWIN4.1";
const BDE_MAGIC_FVE: &[u8; 8] = b"-FVE-FS-";

pub const BITLOCKER_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "BitLocker",
    usage: UsageType::Crypto,
    minsz: None,
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_bitlocker(probe, magic)
            .map_err(ContError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[
        BlockidMagic {
            magic: BDE_MAGIC_VISTA,
            len: 11,
            b_offset: 0,
            zone: None,
        },
        BlockidMagic {
            magic: BDE_MAGIC_WIN7,
            len: 11,
            b_offset: 0,
            zone: None,
        },
        BlockidMagic {
            magic: BDE_MAGIC_TOGO,
            len: 11,
            b_offset: 0,
            zone: None,
        },
    ]),
};

/// Win7-era volume header; a pseudo-NTFS boot sector carrying the FVE
/// metadata offset.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct BdeHeaderWin7 {
    boot_entry_point: [u8; 3],
    fs_signature: [u8; 8],
    reserved0: [u8; 56],
    /* NTFS itself uses a 64-bit serial here */
    volume_serial: U32<LittleEndian>,
    volume_label: [u8; 11],
    reserved1: [u8; 78],
    guid: [u8; 16],
    fve_metadata_offset: U64<LittleEndian>,
}

/// BitLocker To Go keeps a FAT-like boot sector with the metadata
/// offset much further in.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct BdeHeaderToGo {
    boot_entry_point: [u8; 3],
    fs_signature: [u8; 8],
    reserved: [u8; 413],
    guid: [u8; 16],
    fve_metadata_offset: U64<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct BdeFveMetadata {
    signature: [u8; 8],
    size: U16<LittleEndian>,
    version: U16<LittleEndian>,
}

fn read_fve(probe: &mut Probe, offset: u64) -> Result<BdeFveMetadata, BitlockerError> {
    if offset == 0 {
        return Err(BitlockerError::NoFveMetadata);
    }

    let fve: BdeFveMetadata = match probe.map_from_file(offset) {
        Ok(fve) => fve,
        Err(e) if e.kind() == IoErrorKind::UnexpectedEof => {
            return Err(BitlockerError::NoFveMetadata);
        }
        Err(e) => return Err(BitlockerError::from(e)),
    };
    if &fve.signature != BDE_MAGIC_FVE {
        return Err(BitlockerError::NoFveMetadata);
    }

    return Ok(fve);
}

pub fn probe_bitlocker(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), BitlockerError> {
    let head: [u8; 11] = probe.read_exact_at(0)?;

    if head == *BDE_MAGIC_VISTA {
        /* the Vista layout carries no usable metadata beyond the magic */
        return Ok(());
    }

    if head == *BDE_MAGIC_WIN7 {
        let hdr: BdeHeaderWin7 = probe.map_from_file(0)?;
        let fve = read_fve(probe, hdr.fve_metadata_offset.get())?;

        /* no real uuid on disk; the NTFS serial is the next best thing */
        probe.values_mut().set_string_uuid(
            TagName::Uuid,
            &format!("{:016}", hdr.volume_serial.get()),
        );
        probe
            .values_mut()
            .set_version(&fve.version.get().to_string());
        return Ok(());
    }

    if head == *BDE_MAGIC_TOGO {
        let hdr: BdeHeaderToGo = probe.map_from_file(0)?;
        let fve = read_fve(probe, hdr.fve_metadata_offset.get())?;

        probe
            .values_mut()
            .set_version(&fve.version.get().to_string());
        return Ok(());
    }

    return Err(BitlockerError::UnknownBootSignature);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layouts_line_up() {
        assert_eq!(std::mem::offset_of!(BdeHeaderWin7, volume_serial), 67);
        assert_eq!(std::mem::offset_of!(BdeHeaderWin7, guid), 160);
        assert_eq!(std::mem::offset_of!(BdeHeaderWin7, fve_metadata_offset), 176);
        assert_eq!(std::mem::offset_of!(BdeHeaderToGo, guid), 424);
        assert_eq!(std::mem::offset_of!(BdeHeaderToGo, fve_metadata_offset), 440);
    }
}
