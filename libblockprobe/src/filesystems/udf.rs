use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U16, U32},
};

use crate::{
    BlockidError,
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Endianness, Probe, UsageType},
    util::{decode_latin1_lossy_from, decode_utf16_lossy_from},
    values::{TagFlags, TagName},
};

#[derive(Debug, Error)]
pub enum UdfError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("No volume structure descriptor recorded")]
    NoVsd,
    #[error("No NSR descriptor in the VSD list")]
    NoNsr,
    #[error("No anchor volume descriptor pointer at block 256")]
    NoAnchor,
}

const UDF_VSD_OFFSET: u64 = 0x8000;

pub const UDF_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "udf",
    usage: UsageType::Filesystem,
    minsz: None,
    tolerant: true,
    probe_fn: |probe, magic| {
        probe_udf(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[
        BlockidMagic {
            magic: b"BEA01",
            len: 5,
            b_offset: 32 * 1024 + 1,
            zone: None,
        },
        BlockidMagic {
            magic: b"BOOT2",
            len: 5,
            b_offset: 32 * 1024 + 1,
            zone: None,
        },
        BlockidMagic {
            magic: b"CD001",
            len: 5,
            b_offset: 32 * 1024 + 1,
            zone: None,
        },
        BlockidMagic {
            magic: b"CDW02",
            len: 5,
            b_offset: 32 * 1024 + 1,
            zone: None,
        },
        BlockidMagic {
            magic: b"NSR02",
            len: 5,
            b_offset: 32 * 1024 + 1,
            zone: None,
        },
        BlockidMagic {
            magic: b"NSR03",
            len: 5,
            b_offset: 32 * 1024 + 1,
            zone: None,
        },
        BlockidMagic {
            magic: b"TEA01",
            len: 5,
            b_offset: 32 * 1024 + 1,
            zone: None,
        },
    ]),
};

const TAG_ID_PVD: u16 = 1;
const TAG_ID_AVDP: u16 = 2;
const TAG_ID_LVD: u16 = 6;
const TAG_ID_LVID: u16 = 9;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct DescriptorTag {
    id: U16<LittleEndian>,
    version: U16<LittleEndian>,
    checksum: u8,
    reserved: u8,
    serial: U16<LittleEndian>,
    crc: U16<LittleEndian>,
    crc_len: U16<LittleEndian>,
    location: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct Dstring32 {
    cid: u8,
    c: [u8; 30],
    clen: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct Dstring128 {
    cid: u8,
    c: [u8; 126],
    clen: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct AnchorDescriptor {
    tag: DescriptorTag,
    length: U32<LittleEndian>,
    location: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct PrimaryDescriptor {
    tag: DescriptorTag,
    seq_num: U32<LittleEndian>,
    desc_num: U32<LittleEndian>,
    ident: Dstring32,
    vds_num: U16<LittleEndian>,
    max_vol_seq: U16<LittleEndian>,
    ichg_lvl: U16<LittleEndian>,
    max_ichg_lvl: U16<LittleEndian>,
    charset_list: U32<LittleEndian>,
    max_charset_list: U32<LittleEndian>,
    volset_id: Dstring128,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct LogicalDescriptor {
    tag: DescriptorTag,
    seq_num: U32<LittleEndian>,
    desc_charset: [u8; 64],
    logvol_id: Dstring128,
    logical_blocksize: U32<LittleEndian>,
    domain_id: [u8; 32],
    logical_contents_use: [u8; 16],
    map_table_length: U32<LittleEndian>,
    num_partition_maps: U32<LittleEndian>,
    imp_id: [u8; 32],
    imp_use: [u8; 128],
    lvid_length: U32<LittleEndian>,
    lvid_location: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct LvidImpUse {
    imp_id: [u8; 32],
    num_files: U32<LittleEndian>,
    num_dirs: U32<LittleEndian>,
    min_udf_read_rev: U16<LittleEndian>,
    min_udf_write_rev: U16<LittleEndian>,
    max_udf_write_rev: U16<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct VolumeStructureDescriptor {
    vsd_type: u8,
    id: [u8; 5],
    version: u8,
}

fn lvidiu_offset(num_partition_maps: u32) -> u64 {
    return 80 + 2 * 4 * u64::from(num_partition_maps);
}

/// dstrings record the OSTA compression id in the first byte and the
/// recorded length in the last. Only CS0 8-bit (latin1) and 16-bit
/// (UTF-16BE) forms are decodable.
fn decode_dstring(cid: u8, chars: &[u8], clen: u8) -> Option<String> {
    let mut len = usize::from(clen);
    len = len.saturating_sub(1).min(chars.len());

    return match cid {
        8 => Some(decode_latin1_lossy_from(&chars[..len])),
        16 => Some(decode_utf16_lossy_from(&chars[..len], Endianness::Big).to_string()),
        _ => None,
    };
}

/// Builds a 16-character UUID from the first 16 characters of the
/// VolumeSetIdentifier. Hexadecimal prefixes are kept lowercased,
/// anything else is re-encoded to hex.
fn gen_uuid_from_volset_id(volset_id: &Dstring128) -> Option<String> {
    let decoded = decode_dstring(volset_id.cid, &volset_id.c, volset_id.clen)?;

    let mut buf = [0u8; 16];
    let utf8 = decoded.as_bytes();
    let len = utf8.len().min(16);
    buf[..len].copy_from_slice(&utf8[..len]);

    if len < 8 {
        return None;
    }

    let nonhexpos = buf
        .iter()
        .position(|b| !b.is_ascii_hexdigit())
        .unwrap_or(16);

    let uuid = if nonhexpos < 8 {
        buf[..8].iter().map(|b| format!("{b:02x}")).collect()
    } else if nonhexpos < 16 {
        let mut head = String::from_utf8_lossy(&buf[..8]).to_lowercase();
        for b in &buf[8..12] {
            head.push_str(&format!("{b:02x}"));
        }
        head
    } else {
        String::from_utf8_lossy(&buf).to_lowercase()
    };

    return Some(uuid);
}

pub fn probe_udf(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), UdfError> {
    // candidate block sizes; the device sector size comes first so
    // real media win over image files
    let pbs: [u64; 5] = [probe.ssz(), 512, 1024, 2048, 4096];

    // each volume structure descriptor is 2048 bytes long
    let mut seen = false;
    for b in (0..0x8000u64).step_by(0x800) {
        let vsd: VolumeStructureDescriptor = probe.map_from_file(UDF_VSD_OFFSET + b)?;
        if vsd.id[0] != 0 {
            seen = true;
            break;
        }
    }
    if !seen {
        return Err(UdfError::NoVsd);
    }

    let mut found_nsr = false;
    for b in 0..64u64 {
        let vsd: VolumeStructureDescriptor = probe.map_from_file(UDF_VSD_OFFSET + b * 0x800)?;
        if &vsd.id == b"NSR02" || &vsd.id == b"NSR03" {
            found_nsr = true;
            break;
        }
    }
    if !found_nsr {
        return Err(UdfError::NoNsr);
    }

    // locate the anchor volume descriptor pointer, fixing the real
    // block size as a side effect
    let mut anchor: Option<(u64, AnchorDescriptor)> = None;
    for bs in pbs {
        let vd: AnchorDescriptor = probe.map_from_file(256 * bs)?;
        if vd.tag.id.get() == TAG_ID_AVDP {
            anchor = Some((bs, vd));
            break;
        }
    }
    let Some((bs, avdp)) = anchor else {
        return Err(UdfError::NoAnchor);
    };

    let count = u64::from(avdp.length.get()) / bs;
    let loc = u64::from(avdp.location.get());

    let mut have_label = false;
    let mut have_uuid = false;
    let mut have_logvolid = false;
    let mut have_volid = false;
    let mut have_volsetid = false;
    let mut num_partition_maps = 0u32;
    let mut lvid_count = 0u64;
    let mut lvid_loc = 0u64;

    for b in 0..count {
        let tag: DescriptorTag = probe.map_from_file((loc + b) * bs)?;
        let tag_id = tag.id.get();
        if tag_id == 0 {
            break;
        }
        if u64::from(tag.location.get()) != loc + b {
            break;
        }

        if tag_id == TAG_ID_PVD {
            let pvd: PrimaryDescriptor = probe.map_from_file((loc + b) * bs)?;

            if !have_volid
                && let Some(volid) =
                    decode_dstring(pvd.ident.cid, &pvd.ident.c, pvd.ident.clen)
            {
                probe.values_mut().set_string(TagName::VolumeId, &volid);
                have_volid = true;
            }
            if !have_uuid && let Some(uuid) = gen_uuid_from_volset_id(&pvd.volset_id) {
                probe.values_mut().set_string_uuid(TagName::Uuid, &uuid);
                have_uuid = true;
            }
            if !have_volsetid
                && let Some(volsetid) =
                    decode_dstring(pvd.volset_id.cid, &pvd.volset_id.c, pvd.volset_id.clen)
            {
                probe
                    .values_mut()
                    .set_string(TagName::VolumeSetId, &volsetid);
                have_volsetid = true;
            }
        } else if tag_id == TAG_ID_LVD {
            let lvd: LogicalDescriptor = probe.map_from_file((loc + b) * bs)?;

            if num_partition_maps == 0 || lvid_count == 0 || lvid_loc == 0 {
                num_partition_maps = lvd.num_partition_maps.get();
                lvid_count = u64::from(lvd.lvid_length.get()) / bs;
                lvid_loc = u64::from(lvd.lvid_location.get());
            }
            if (!have_logvolid || !have_label)
                && let Some(logvolid) =
                    decode_dstring(lvd.logvol_id.cid, &lvd.logvol_id.c, lvd.logvol_id.clen)
            {
                let values = probe.values_mut();
                if !have_label && values.flags().contains(TagFlags::LABEL) {
                    values.set_string(TagName::Label, logvolid.trim_end_matches(['\0', ' ']));
                    have_label = true;
                }
                if !have_logvolid {
                    values.set_string(TagName::LogicalVolumeId, &logvolid);
                    have_logvolid = true;
                }
            }
        }

        if have_volid
            && have_uuid
            && have_volsetid
            && have_logvolid
            && have_label
            && num_partition_maps != 0
            && lvid_count != 0
            && lvid_loc != 0
        {
            break;
        }
    }

    // the integrity descriptor carries the minimum UDF read revision,
    // reported as VERSION
    if lvid_count != 0 && lvid_loc != 0 && num_partition_maps != 0 {
        for b in 0..lvid_count {
            let tag: DescriptorTag = probe.map_from_file((lvid_loc + b) * bs)?;
            let tag_id = tag.id.get();
            if tag_id == 0 {
                break;
            }
            if u64::from(tag.location.get()) != lvid_loc + b {
                break;
            }
            if tag_id == TAG_ID_LVID {
                let lvidiu: LvidImpUse = probe
                    .map_from_file((lvid_loc + b) * bs + lvidiu_offset(num_partition_maps))?;
                let udf_rev = lvidiu.min_udf_read_rev.get();
                if udf_rev != 0 {
                    probe
                        .values_mut()
                        .set_version(&format!("{}.{:02}", udf_rev >> 8, udf_rev & 0xFF));
                    break;
                }
            }
        }
    }

    probe.values_mut().set_block_size(bs);

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dstring128(cid: u8, text: &[u8]) -> Dstring128 {
        let mut c = [0u8; 126];
        c[..text.len()].copy_from_slice(text);
        Dstring128 {
            cid,
            c,
            clen: text.len() as u8 + 1,
        }
    }

    #[test]
    fn volset_uuid_keeps_hex_prefix() {
        let id = dstring128(8, b"4d98f55a0cfb8b84");
        assert_eq!(
            gen_uuid_from_volset_id(&id).as_deref(),
            Some("4d98f55a0cfb8b84")
        );
    }

    #[test]
    fn volset_uuid_reencodes_nonhex_tail() {
        let id = dstring128(8, b"4d98f55aLinuxUDF");
        assert_eq!(
            gen_uuid_from_volset_id(&id).as_deref(),
            Some("4d98f55a4c696e75")
        );
    }

    #[test]
    fn volset_uuid_reencodes_nonhex_time_value() {
        let id = dstring128(8, b"DVDVIDEO");
        assert_eq!(
            gen_uuid_from_volset_id(&id).as_deref(),
            Some("445644564944454f")
        );
    }

    #[test]
    fn short_volset_id_yields_no_uuid() {
        let id = dstring128(8, b"abc");
        assert_eq!(gen_uuid_from_volset_id(&id), None);
    }
}
