use std::io::Error as IoError;

use thiserror::Error;

use crate::{
    BlockidError,
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Endianness, Probe, UsageType},
    values::TagName,
};

#[derive(Debug, Error)]
pub enum ZfsError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("No usable vdev label found")]
    NoVdevLabel,
}

pub const ZFS_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "zfs_member",
    usage: UsageType::Filesystem,
    minsz: Some(64 * 1024 * 1024),
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_zfs(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: None,
};

const VDEV_LABEL_SIZE: u64 = 256 * 1024;
const VDEV_LABEL_NVPAIR: u64 = 16 * 1024;
/* the wanted pairs sit well within the first 4k of the nvlist */
const VDEV_NVLIST_SCAN: usize = 4096;

const NV_ENCODE_XDR: u8 = 1;

const DATA_TYPE_UINT64: u32 = 8;
const DATA_TYPE_STRING: u32 = 9;

const POOL_STATE_SPARE: u64 = 3;
const POOL_STATE_L2CACHE: u64 = 4;
const POOL_STATE_POTENTIALLY_ACTIVE: u64 = 7;

#[derive(Debug, Default)]
struct VdevLabelInfo {
    name: Option<Vec<u8>>,
    pool_guid: Option<u64>,
    guid: Option<u64>,
    version: Option<u64>,
    state: Option<u64>,
    txg: Option<u64>,
    ashift: Option<u64>,
    little_endian: bool,
}

fn be32(data: &[u8], off: usize) -> Option<u32> {
    Some(u32::from_be_bytes(
        data.get(off..off + 4)?.try_into().ok()?,
    ))
}

fn be64(data: &[u8], off: usize) -> Option<u64> {
    Some(u64::from_be_bytes(
        data.get(off..off + 8)?.try_into().ok()?,
    ))
}

/// Walk an XDR-encoded nvlist and pick out the pool identification
/// pairs. The element fields are big-endian regardless of the host
/// byte in the nvlist header.
fn parse_nvlist(data: &[u8]) -> Option<VdevLabelInfo> {
    let encoding = *data.first()?;
    let endian = *data.get(1)?;

    if encoding != NV_ENCODE_XDR || endian > 1 {
        return None;
    }

    let mut info = VdevLabelInfo {
        little_endian: endian == 1,
        ..VdevLabelInfo::default()
    };

    /* header (4) + nvlist version (4) + nvflag (4) */
    let mut off = 12usize;

    while off + 12 <= data.len() {
        let nvp_size = be32(data, off)? as usize;
        if nvp_size == 0 {
            break;
        }
        let namelen = be32(data, off + 8)? as usize;
        let namesize = (namelen + 3) & !3;

        /* pair fits in buffer and name fits in pair? */
        if nvp_size > data.len() - off || namesize + 12 > nvp_size {
            break;
        }

        let name = &data[off + 12..off + 12 + namelen];
        let value_off = off + 12 + namesize;
        let value_len = nvp_size - namesize - 12;

        match name {
            b"name" if value_len >= 12 => {
                let nvs_type = be32(data, value_off)?;
                let strlen = be32(data, value_off + 8)? as usize;
                if nvs_type == DATA_TYPE_STRING && strlen <= value_len - 12 {
                    info.name = Some(data[value_off + 12..value_off + 12 + strlen].to_vec());
                }
            }
            b"guid" | b"pool_guid" | b"version" | b"state" | b"txg" | b"ashift"
                if value_len >= 16 =>
            {
                let nvu_type = be32(data, value_off)?;
                if nvu_type == DATA_TYPE_UINT64 {
                    let value = be64(data, value_off + 8)?;
                    match name {
                        b"guid" => info.guid = Some(value),
                        b"pool_guid" => info.pool_guid = Some(value),
                        b"version" => info.version = Some(value),
                        b"state" => info.state = Some(value),
                        b"txg" => info.txg = Some(value),
                        b"ashift" => info.ashift = Some(value),
                        _ => (),
                    }
                }
            }
            _ => (),
        }

        off += nvp_size;
    }

    return Some(info);
}

/// A member device carries four 256KiB vdev labels, two at the front
/// and two at the end. Any one with a sane nvlist and pool state
/// identifies the device.
pub fn probe_zfs(probe: &mut Probe, _mag: BlockidMagic) -> Result<(), ZfsError> {
    let size = probe.size();
    let blk_align = size % VDEV_LABEL_SIZE;

    let offsets = [
        0,
        VDEV_LABEL_SIZE,
        size.saturating_sub(2 * VDEV_LABEL_SIZE + blk_align),
        size.saturating_sub(VDEV_LABEL_SIZE + blk_align),
    ];

    for label_off in offsets {
        let nv_off = label_off + VDEV_LABEL_NVPAIR;
        let data = match probe.read_vec_at(nv_off, VDEV_NVLIST_SCAN) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => continue,
            Err(e) => return Err(ZfsError::from(e)),
        };

        let Some(info) = parse_nvlist(&data) else {
            continue;
        };

        let Some(state) = info.state else { continue };
        if state > POOL_STATE_POTENTIALLY_ACTIVE {
            continue;
        }

        /* cache and spare devices never carry a txg */
        let active = matches!(state, POOL_STATE_L2CACHE | POOL_STATE_SPARE)
            || info.txg.unwrap_or(0) > 0;
        if !active {
            continue;
        }

        let endianness = if info.little_endian == cfg!(target_endian = "little") {
            Endianness::Native
        } else {
            Endianness::Other
        };

        let values = probe.values_mut();
        if let Some(name) = &info.name {
            values.set_label(name);
        }
        if let Some(pool_guid) = info.pool_guid {
            values.set_string_uuid(TagName::Uuid, &pool_guid.to_string());
        }
        if let Some(guid) = info.guid {
            values.set_string_uuid(TagName::UuidSub, &guid.to_string());
        }
        if let Some(version) = info.version {
            values.set_version(&version.to_string());
        }
        if let Some(ashift) = info.ashift {
            if ashift < 64 {
                values.set_fs_block_size(1u64 << ashift);
                values.set_block_size(1u64 << ashift);
            }
        }
        values.set_endianness(endianness);
        values.set_wiper(nv_off, 4);

        return Ok(());
    }

    return Err(ZfsError::NoVdevLabel);
}
