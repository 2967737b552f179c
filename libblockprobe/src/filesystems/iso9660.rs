use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use crate::{
    BlockidError,
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Probe, UsageType},
    values::{LabelEncoding, ProbeValues, TagName},
};

#[derive(Debug, Error)]
pub enum IsoError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
}

const ISO_SUPERBLOCK_OFFSET: u64 = 0x8000;
const ISO_SECTOR_SIZE: u64 = 0x800;
const ISO_VD_OFFSET: u64 = ISO_SUPERBLOCK_OFFSET + ISO_SECTOR_SIZE;

const ISO_VD_BOOT_RECORD: u8 = 0x0;
const ISO_VD_SUPPLEMENTARY: u8 = 0x2;
const ISO_VD_END: u8 = 0xff;
const ISO_VD_MAX: usize = 16;

pub const ISO9660_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "iso9660",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: true,
    probe_fn: |probe, magic| {
        probe_iso9660(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[
        BlockidMagic {
            magic: b"CD001",
            len: 5,
            b_offset: 32 * 1024 + 1,
            zone: None,
        },
        BlockidMagic {
            magic: b"CDROM",
            len: 5,
            b_offset: 32 * 1024 + 9,
            zone: None,
        },
    ]),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct Iso9660Date {
    year: [u8; 4],
    month: [u8; 2],
    day: [u8; 2],
    hour: [u8; 2],
    minute: [u8; 2],
    second: [u8; 2],
    hundredth: [u8; 2],
    offset: u8,
}

/// Primary (and supplementary) volume descriptor, ECMA-119 layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct IsoVolumeDescriptor {
    vd_type: u8,
    vd_id: [u8; 5],
    vd_version: u8,
    flags: u8,
    system_id: [u8; 32],
    volume_id: [u8; 32],
    unused: [u8; 8],
    space_size: [u8; 8],
    escape_sequences: [u8; 8],
    unused1: [u8; 94],
    volume_set_id: [u8; 128],
    publisher_id: [u8; 128],
    data_preparer_id: [u8; 128],
    application_id: [u8; 128],
    unused3: [u8; 111],
    created: Iso9660Date,
    modified: Iso9660Date,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct BootRecord {
    vd_type: u8,
    vd_id: [u8; 5],
    vd_version: u8,
    boot_system_id: [u8; 32],
    boot_id: [u8; 32],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct HighSierraVolumeDescriptor {
    foo: [u8; 8],
    hs_type: u8,
    id: [u8; 5],
    version: u8,
    unused1: u8,
    system_id: [u8; 32],
    volume_id: [u8; 32],
}

fn is_str_empty(s: &[u8]) -> bool {
    if s.first().is_none_or(|&b| b == 0) {
        return true;
    }
    return s.iter().all(|b| b.is_ascii_whitespace() || *b == 0);
}

fn set_id(values: &mut ProbeValues, name: TagName, data: &[u8]) {
    if is_str_empty(data) {
        return;
    }
    let text = String::from_utf8_lossy(data);
    values.set_string(name, text.trim_end_matches(['\0', ' ']));
}

/// True when the ascii label equals the start of the UTF-16BE one.
fn ascii_eq_utf16be(ascii: &[u8], utf16: &[u8]) -> bool {
    for (a, pair) in ascii.iter().zip(utf16.chunks_exact(2)) {
        if pair[0] != 0 || *a != pair[1] {
            return false;
        }
    }
    return true;
}

/// The PVD dates are recorded as ASCII digit strings, which gives a
/// readable `YYYY-MM-DD-hh-mm-ss-cc` UUID. An all-'0' date with a zero
/// offset is unset.
fn iso9660_date_uuid(values: &mut ProbeValues, date: &Iso9660Date) -> bool {
    let mut buffer = [0u8; 16];
    buffer[0..4].copy_from_slice(&date.year);
    buffer[4..6].copy_from_slice(&date.month);
    buffer[6..8].copy_from_slice(&date.day);
    buffer[8..10].copy_from_slice(&date.hour);
    buffer[10..12].copy_from_slice(&date.minute);
    buffer[12..14].copy_from_slice(&date.second);
    buffer[14..16].copy_from_slice(&date.hundredth);

    if buffer.iter().all(|&b| b == b'0') && date.offset == 0 {
        return false;
    }

    let b = |i: usize| buffer[i] as char;
    let text = format!(
        "{}{}{}{}-{}{}-{}{}-{}{}-{}{}-{}{}-{}{}",
        b(0),
        b(1),
        b(2),
        b(3),
        b(4),
        b(5),
        b(6),
        b(7),
        b(8),
        b(9),
        b(10),
        b(11),
        b(12),
        b(13),
        b(14),
        b(15)
    );
    values.set_string_uuid(TagName::Uuid, &text);
    return true;
}

fn probe_iso9660_hsfs(probe: &mut Probe, mag: BlockidMagic) -> Result<(), IsoError> {
    let iso: HighSierraVolumeDescriptor = probe.map_from_file(mag.b_offset - 9)?;

    let values = probe.values_mut();
    values.set_version("High Sierra");
    values.set_label(&iso.volume_id);
    return Ok(());
}

pub fn probe_iso9660(probe: &mut Probe, mag: BlockidMagic) -> Result<(), IsoError> {
    if mag.magic == b"CDROM" {
        return probe_iso9660_hsfs(probe, mag);
    }

    let iso: IsoVolumeDescriptor = probe.map_from_file(mag.b_offset - 1)?;
    let label = iso.volume_id;

    let values = probe.values_mut();
    set_id(values, TagName::SystemId, &iso.system_id);
    set_id(values, TagName::VolumeSetId, &iso.volume_set_id);
    set_id(values, TagName::PublisherId, &iso.publisher_id);
    set_id(values, TagName::DataPreparerId, &iso.data_preparer_id);
    set_id(values, TagName::ApplicationId, &iso.application_id);

    if !iso9660_date_uuid(values, &iso.modified) {
        iso9660_date_uuid(values, &iso.created);
    }

    // scan the descriptor list for a boot record and a Joliet
    // supplementary descriptor
    let mut have_joliet_label = false;
    let mut off = ISO_VD_OFFSET;
    for _ in 0..ISO_VD_MAX {
        let svd: IsoVolumeDescriptor = match probe.map_from_file(off) {
            Ok(svd) => svd,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(IsoError::from(e)),
        };

        if svd.vd_type == ISO_VD_END {
            break;
        }

        if svd.vd_type == ISO_VD_BOOT_RECORD {
            let boot: BootRecord = probe.map_from_file(off)?;
            let values = probe.values_mut();
            set_id(values, TagName::BootSystemId, &boot.boot_system_id);
            off += ISO_SECTOR_SIZE;
            continue;
        }

        if svd.vd_type != ISO_VD_SUPPLEMENTARY {
            off += ISO_SECTOR_SIZE;
            continue;
        }

        if matches!(&svd.escape_sequences[..3], b"%/@" | b"%/C" | b"%/E") {
            let values = probe.values_mut();
            values.set_version("Joliet Extension");

            // the UTF-16 rendition may be trimmed, so prefer the PVD
            // label when both agree
            if ascii_eq_utf16be(&label, &svd.volume_id) {
                break;
            }

            values.set_utf8_label(&svd.volume_id, LabelEncoding::Utf16Be);
            have_joliet_label = true;
            break;
        }
        off += ISO_SECTOR_SIZE;
    }

    if !have_joliet_label {
        probe.values_mut().set_label(&label);
    }

    probe.values_mut().set_block_size(ISO_SECTOR_SIZE);

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_date_yields_no_uuid() {
        let date = Iso9660Date {
            year: *b"0000",
            month: *b"00",
            day: *b"00",
            hour: *b"00",
            minute: *b"00",
            second: *b"00",
            hundredth: *b"00",
            offset: 0,
        };
        let mut values = ProbeValues::new();
        assert!(!iso9660_date_uuid(&mut values, &date));
        assert!(values.lookup(TagName::Uuid).is_none());
    }

    #[test]
    fn date_uuid_is_dash_separated() {
        let date = Iso9660Date {
            year: *b"2023",
            month: *b"08",
            day: *b"01",
            hour: *b"12",
            minute: *b"30",
            second: *b"45",
            hundredth: *b"00",
            offset: 8,
        };
        let mut values = ProbeValues::new();
        assert!(iso9660_date_uuid(&mut values, &date));
        assert_eq!(
            values.lookup_string(TagName::Uuid).as_deref(),
            Some("2023-08-01-12-30-45-00")
        );
    }

    #[test]
    fn joliet_label_comparison() {
        let ascii = *b"ARCHLINUX";
        let mut utf16 = [0u8; 18];
        for (i, b) in ascii.iter().enumerate() {
            utf16[i * 2 + 1] = *b;
        }
        assert!(ascii_eq_utf16be(&ascii, &utf16));

        utf16[1] = b'X';
        assert!(!ascii_eq_utf16be(&ascii, &utf16));
    }
}
