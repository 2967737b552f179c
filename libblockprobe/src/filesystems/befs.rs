use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use crate::{
    BlockidError,
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Endianness, Probe, UsageType},
    values::TagName,
};

#[derive(Debug, Error)]
pub enum BefsError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Superblock magics do not match either byte order")]
    UnknownByteOrder,
    #[error("Invalid superblock geometry")]
    InvalidGeometry,
}

const B_OS_NAME_LENGTH: u64 = 0x20;

pub const BEFS_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "befs",
    usage: UsageType::Filesystem,
    minsz: Some(1024 * 1440),
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_befs(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[
        BlockidMagic {
            magic: b"BFS1",
            len: 4,
            b_offset: B_OS_NAME_LENGTH,
            zone: None,
        },
        BlockidMagic {
            magic: b"1SFB",
            len: 4,
            b_offset: B_OS_NAME_LENGTH,
            zone: None,
        },
        BlockidMagic {
            magic: b"BFS1",
            len: 4,
            b_offset: 0x200 + B_OS_NAME_LENGTH,
            zone: None,
        },
        BlockidMagic {
            magic: b"1SFB",
            len: 4,
            b_offset: 0x200 + B_OS_NAME_LENGTH,
            zone: None,
        },
    ]),
};

const SUPER_BLOCK_MAGIC1: u32 = 0x4246_5331;
const SUPER_BLOCK_MAGIC2: u32 = 0xdd12_1031;
const SUPER_BLOCK_MAGIC3: u32 = 0x15b6_830e;
const SUPER_BLOCK_FS_ENDIAN: u32 = 0x4249_4745;
const INODE_MAGIC1: u32 = 0x3bbe_0ad9;
const BPLUSTREE_MAGIC: u32 = 0x69f6_c2e8;
const BPLUSTREE_NULL: i64 = -1;
const NUM_DIRECT_BLOCKS: usize = 12;
const B_UINT64_TYPE: u32 = 0x554c_4c47;
const KEY_NAME: &[u8] = b"be:volume_id";
const KEY_SIZE: u64 = 8;

/// Fields are stored in the byte order of the formatting host, so the
/// structs carry native integers and every access goes through
/// [`fs16`], [`fs32`] or [`fs64`].
fn fs16(value: u16, fs_le: bool) -> u16 {
    if fs_le {
        return u16::from_le(value);
    }
    return u16::from_be(value);
}

fn fs32(value: u32, fs_le: bool) -> u32 {
    if fs_le {
        return u32::from_le(value);
    }
    return u32::from_be(value);
}

fn fs64(value: u64, fs_le: bool) -> u64 {
    if fs_le {
        return u64::from_le(value);
    }
    return u64::from_be(value);
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct BlockRun {
    allocation_group: u32,
    start: u16,
    len: u16,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct BefsSuperBlock {
    name: [u8; 0x20],
    magic1: u32,
    fs_byte_order: u32,
    block_size: u32,
    block_shift: u32,
    num_blocks: u64,
    used_blocks: u64,
    inode_size: u32,
    magic2: u32,
    blocks_per_ag: u32,
    ag_shift: u32,
    num_ags: u32,
    flags: u32,
    log_blocks: BlockRun,
    log_start: u64,
    log_end: u64,
    magic3: u32,
    root_dir: BlockRun,
    indices: BlockRun,
    pad: [u32; 8],
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct DataStream {
    direct: [BlockRun; NUM_DIRECT_BLOCKS],
    max_direct_range: u64,
    indirect: BlockRun,
    max_indirect_range: u64,
    double_indirect: BlockRun,
    max_double_indirect_range: u64,
    size: u64,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct BefsInode {
    magic1: u32,
    inode_num: BlockRun,
    uid: u32,
    gid: u32,
    mode: u32,
    flags: u32,
    create_time: u64,
    last_modified_time: u64,
    parent: BlockRun,
    attributes: BlockRun,
    attr_type: u32,
    inode_size: u32,
    etc: u32,
    data: DataStream,
    pad: [u32; 4],
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct SmallDataHeader {
    sd_type: u32,
    name_size: u16,
    data_size: u16,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct BplustreeHeader {
    magic: u32,
    node_size: u32,
    max_number_of_levels: u32,
    data_type: u32,
    root_node_pointer: u64,
    free_node_pointer: u64,
    maximum_size: u64,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Unaligned, Immutable, KnownLayout)]
struct BplustreeNodeHeader {
    left_link: u64,
    right_link: u64,
    overflow_link: u64,
    all_key_count: u16,
    all_key_length: u16,
}

fn run_offset(bs: &BefsSuperBlock, br: &BlockRun, fs_le: bool) -> Option<u64> {
    let ag_shift = fs32(bs.ag_shift, fs_le);
    let block_shift = fs32(bs.block_shift, fs_le);

    let ag = u64::from(fs32(br.allocation_group, fs_le))
        .checked_shl(ag_shift)?
        .checked_shl(block_shift)?;
    let start = u64::from(fs16(br.start, fs_le)).checked_shl(block_shift)?;

    return ag.checked_add(start);
}

fn run_length(bs: &BefsSuperBlock, br: &BlockRun, fs_le: bool) -> u64 {
    return u64::from(fs16(br.len, fs_le)) << fs32(bs.block_shift, fs_le);
}

fn get_block_run(
    probe: &mut Probe,
    bs: &BefsSuperBlock,
    br: &BlockRun,
    fs_le: bool,
) -> Result<Option<Vec<u8>>, IoError> {
    let Some(offset) = run_offset(bs, br, fs_le) else {
        return Ok(None);
    };
    let length = run_length(bs, br, fs_le);
    if length == 0 || length > 1 << 24 {
        return Ok(None);
    }

    match probe.read_vec_at(offset, length as usize) {
        Ok(buf) => return Ok(Some(buf)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
}

fn get_custom_block_run(
    probe: &mut Probe,
    bs: &BefsSuperBlock,
    br: &BlockRun,
    offset: u64,
    length: u32,
    fs_le: bool,
) -> Result<Option<Vec<u8>>, IoError> {
    if offset + u64::from(length) > run_length(bs, br, fs_le) {
        return Ok(None);
    }
    let Some(base) = run_offset(bs, br, fs_le) else {
        return Ok(None);
    };

    match probe.read_vec_at(base + offset, length as usize) {
        Ok(buf) => return Ok(Some(buf)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
}

fn block_run_at(buf: &[u8], index: usize) -> Option<BlockRun> {
    let start = index.checked_mul(size_of::<BlockRun>())?;
    let bytes = buf.get(start..start + size_of::<BlockRun>())?;
    return BlockRun::read_from_bytes(bytes).ok();
}

/// Resolve `start` within a data stream to on-disk bytes, following
/// direct, indirect and double-indirect runs the way the Haiku driver
/// does.
fn get_tree_node(
    probe: &mut Probe,
    bs: &BefsSuperBlock,
    ds: &DataStream,
    start: u64,
    length: u32,
    fs_le: bool,
) -> Result<Option<Vec<u8>>, IoError> {
    if start < fs64(ds.max_direct_range, fs_le) {
        let mut start = start;
        for i in 0..NUM_DIRECT_BLOCKS {
            let br_len = run_length(bs, &ds.direct[i], fs_le);
            if start < br_len {
                return get_custom_block_run(probe, bs, &ds.direct[i], start, length, fs_le);
            }
            start -= br_len;
        }
    } else if start < fs64(ds.max_indirect_range, fs_le) {
        let Some(mut start) = start.checked_sub(fs64(ds.max_direct_range, fs_le)) else {
            return Ok(None);
        };

        let max_br = run_length(bs, &ds.indirect, fs_le) / size_of::<BlockRun>() as u64;
        let Some(buf) = get_block_run(probe, bs, &ds.indirect, fs_le)? else {
            return Ok(None);
        };

        for i in 0..max_br {
            let Some(br) = block_run_at(&buf, i as usize) else {
                return Ok(None);
            };
            let br_len = run_length(bs, &br, fs_le);
            if start < br_len {
                return get_custom_block_run(probe, bs, &br, start, length, fs_le);
            }
            start -= br_len;
        }
    } else if start < fs64(ds.max_double_indirect_range, fs_le) {
        let Some(start) = start.checked_sub(fs64(ds.max_indirect_range, fs_le)) else {
            return Ok(None);
        };

        let di_br_size = run_length(bs, &ds.double_indirect, fs_le);
        if di_br_size == 0 {
            return Ok(None);
        }

        let br_per_di_br = di_br_size / size_of::<BlockRun>() as u64;
        if br_per_di_br == 0 {
            return Ok(None);
        }

        let di_index = start / (br_per_di_br * di_br_size);
        let i_index = (start % (br_per_di_br * di_br_size)) / di_br_size;
        let start = (start % (br_per_di_br * di_br_size)) % di_br_size;

        if di_index >= br_per_di_br {
            return Ok(None);
        }

        let Some(buf) = get_block_run(probe, bs, &ds.double_indirect, fs_le)? else {
            return Ok(None);
        };
        let Some(di_br) = block_run_at(&buf, di_index as usize) else {
            return Ok(None);
        };

        let max_br = run_length(bs, &di_br, fs_le) / size_of::<BlockRun>() as u64;
        if i_index >= max_br {
            return Ok(None);
        }

        let Some(buf) = get_block_run(probe, bs, &di_br, fs_le)? else {
            return Ok(None);
        };
        let Some(br) = block_run_at(&buf, i_index as usize) else {
            return Ok(None);
        };

        return get_custom_block_run(probe, bs, &br, start, length, fs_le);
    }
    return Ok(None);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyCmp {
    Bad,
    Order(i32),
}

fn compare_keys(
    node: &[u8],
    keylengths_offset: usize,
    keys_offset: usize,
    index: usize,
    key: &[u8],
    all_key_length: usize,
    fs_le: bool,
) -> KeyCmp {
    let keylen_at = |i: usize| -> Option<u16> {
        let start = keylengths_offset + i * 2;
        let bytes = node.get(start..start + 2)?;
        let raw = u16::from_ne_bytes([bytes[0], bytes[1]]);
        return Some(fs16(raw, fs_le));
    };

    let keystart = if index == 0 {
        0
    } else {
        match keylen_at(index - 1) {
            Some(v) => usize::from(v),
            None => return KeyCmp::Bad,
        }
    };
    let keyend = match keylen_at(index) {
        Some(v) => usize::from(v),
        None => return KeyCmp::Bad,
    };
    let Some(keylength) = keyend.checked_sub(keystart) else {
        return KeyCmp::Bad;
    };

    if keyend > all_key_length {
        return KeyCmp::Bad;
    }
    let Some(key1) = node.get(keys_offset + keystart..keys_offset + keystart + keylength) else {
        return KeyCmp::Bad;
    };

    let shared = keylength.min(key.len());
    return match key1[..shared].cmp(&key[..shared]) {
        std::cmp::Ordering::Equal => KeyCmp::Order(keylength as i32 - key.len() as i32),
        std::cmp::Ordering::Less => KeyCmp::Order(-1),
        std::cmp::Ordering::Greater => KeyCmp::Order(1),
    };
}

fn u64_at(buf: &[u8], offset: usize) -> Option<u64> {
    let bytes = buf.get(offset..offset + 8)?;
    return Some(u64::from_ne_bytes(bytes.try_into().ok()?));
}

/// Binary-search the attribute B+tree for `key`. Returns the stored
/// value, or `None` when the key is absent or the tree looks corrupt.
/// Node hops are capped at 100 to survive cyclic link chains.
fn get_key_value(
    probe: &mut Probe,
    bs: &BefsSuperBlock,
    bi: &BefsInode,
    key: &[u8],
    fs_le: bool,
) -> Result<Option<u64>, IoError> {
    let Some(buf) = get_tree_node(
        probe,
        bs,
        &bi.data,
        0,
        size_of::<BplustreeHeader>() as u32,
        fs_le,
    )?
    else {
        return Ok(None);
    };
    let Ok(bh) = BplustreeHeader::read_from_bytes(&buf[..size_of::<BplustreeHeader>()]) else {
        return Ok(None);
    };

    if fs32(bh.magic, fs_le) != BPLUSTREE_MAGIC {
        return Ok(None);
    }

    let mut node_pointer = fs64(bh.root_node_pointer, fs_le);
    let bn_size = fs32(bh.node_size, fs_le);

    if (bn_size as usize) < size_of::<BplustreeNodeHeader>() || bn_size > 1 << 20 {
        return Ok(None);
    }

    for _ in 0..100 {
        let Some(node) = get_tree_node(probe, bs, &bi.data, node_pointer, bn_size, fs_le)? else {
            return Ok(None);
        };
        let Ok(bn) = BplustreeNodeHeader::read_from_bytes(&node[..size_of::<BplustreeNodeHeader>()])
        else {
            return Ok(None);
        };

        let all_key_count = usize::from(fs16(bn.all_key_count, fs_le));
        let all_key_length = usize::from(fs16(bn.all_key_length, fs_le));
        let keys_offset = size_of::<BplustreeNodeHeader>();
        let keylengths_offset = (keys_offset + all_key_length + 7) & !7;
        let values_offset = keylengths_offset + all_key_count * 2;

        if all_key_count == 0 || values_offset + all_key_count * 8 > node.len() {
            return Ok(None);
        }

        let value_at = |i: usize| -> Option<u64> {
            return Some(fs64(u64_at(&node, values_offset + i * 8)?, fs_le));
        };

        let overflow = fs64(bn.overflow_link, fs_le) as i64;
        let mut first = 0i64;
        let mut mid = 0i64;
        let mut last = all_key_count as i64 - 1;

        let cmp = compare_keys(
            &node,
            keylengths_offset,
            keys_offset,
            last as usize,
            key,
            all_key_length,
            fs_le,
        );
        match cmp {
            KeyCmp::Bad => return Ok(None),
            KeyCmp::Order(0) => {
                let Some(value) = value_at(last as usize) else {
                    return Ok(None);
                };
                if overflow == BPLUSTREE_NULL {
                    return Ok(Some(value));
                }
                node_pointer = value;
            }
            KeyCmp::Order(c) if c < 0 => {
                node_pointer = overflow as u64;
            }
            KeyCmp::Order(_) => {
                let mut cmp = 1i32;
                while first <= last {
                    mid = (first + last) / 2;

                    match compare_keys(
                        &node,
                        keylengths_offset,
                        keys_offset,
                        mid as usize,
                        key,
                        all_key_length,
                        fs_le,
                    ) {
                        KeyCmp::Bad => return Ok(None),
                        KeyCmp::Order(c) => cmp = c,
                    }

                    if cmp == 0 {
                        if overflow == BPLUSTREE_NULL {
                            return Ok(value_at(mid as usize));
                        }
                        break;
                    }

                    if cmp < 0 {
                        first = mid + 1;
                    } else {
                        last = mid - 1;
                    }
                }
                let next = if cmp < 0 {
                    value_at(mid as usize + 1)
                } else {
                    value_at(mid as usize)
                };
                let Some(next) = next else {
                    return Ok(None);
                };
                node_pointer = next;
            }
        }

        if overflow == BPLUSTREE_NULL {
            break;
        }
    }
    return Ok(None);
}

fn inode_from_bytes(buf: &[u8]) -> Option<BefsInode> {
    let bytes = buf.get(..size_of::<BefsInode>())?;
    return BefsInode::read_from_bytes(bytes).ok();
}

/// The volume id lives either inline in the root directory inode's
/// small_data area or as a `be:volume_id` attribute.
fn get_uuid(probe: &mut Probe, bs: &BefsSuperBlock, fs_le: bool) -> Result<Option<u64>, IoError> {
    let Some(root_buf) = get_block_run(probe, bs, &bs.root_dir, fs_le)? else {
        return Ok(None);
    };
    let Some(bi) = inode_from_bytes(&root_buf) else {
        return Ok(None);
    };

    if fs32(bi.magic1, fs_le) != INODE_MAGIC1 {
        return Ok(None);
    }

    let bi_size = run_length(bs, &bs.root_dir, fs_le);
    let sd_total = (bi_size.saturating_sub(size_of::<BefsInode>() as u64))
        .min(u64::from(fs32(bi.inode_size, fs_le))) as usize;

    let mut uuid: u64 = 0;
    let mut offset = 0usize;

    while offset + size_of::<SmallDataHeader>() <= sd_total {
        let sd_start = size_of::<BefsInode>() + offset;
        let Some(sd_bytes) = root_buf.get(sd_start..sd_start + size_of::<SmallDataHeader>()) else {
            break;
        };
        let Ok(sd) = SmallDataHeader::read_from_bytes(sd_bytes) else {
            break;
        };

        let name_size = usize::from(fs16(sd.name_size, fs_le));
        let data_size = usize::from(fs16(sd.data_size, fs_le));
        let sd_size = size_of::<SmallDataHeader>() + name_size + 3 + data_size + 1;

        if offset + sd_size > sd_total {
            break;
        }

        let name_start = sd_start + size_of::<SmallDataHeader>();
        if fs32(sd.sd_type, fs_le) == B_UINT64_TYPE
            && name_size == KEY_NAME.len()
            && data_size == KEY_SIZE as usize
            && root_buf.get(name_start..name_start + name_size) == Some(KEY_NAME)
        {
            let data_start = name_start + name_size + 3;
            if let Some(value) = u64_at(&root_buf, data_start) {
                uuid = value;
            }
            break;
        }

        if fs32(sd.sd_type, fs_le) == 0 && name_size == 0 && data_size == 0 {
            break;
        }

        offset += sd_size;
    }

    let attrs = bi.attributes;
    let has_attrs = fs32(attrs.allocation_group, fs_le) != 0
        || fs16(attrs.start, fs_le) != 0
        || fs16(attrs.len, fs_le) != 0;

    if uuid == 0 && has_attrs {
        let Some(attr_buf) = get_block_run(probe, bs, &attrs, fs_le)? else {
            return Ok(None);
        };
        let Some(bi) = inode_from_bytes(&attr_buf) else {
            return Ok(None);
        };

        if fs32(bi.magic1, fs_le) != INODE_MAGIC1 {
            return Ok(None);
        }

        let Some(value) = get_key_value(probe, bs, &bi, KEY_NAME, fs_le)? else {
            return Ok(Some(uuid).filter(|u| *u != 0));
        };

        if value > 0 {
            let block_shift = fs32(bs.block_shift, fs_le);
            let Some(offset) = value.checked_shl(block_shift) else {
                return Ok(None);
            };
            let block_size = fs32(bs.block_size, fs_le) as usize;

            let buf = match probe.read_vec_at(offset, block_size) {
                Ok(buf) => buf,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e),
            };
            let Some(bi) = inode_from_bytes(&buf) else {
                return Ok(None);
            };

            if fs32(bi.magic1, fs_le) != INODE_MAGIC1 {
                return Ok(None);
            }

            if fs32(bi.attr_type, fs_le) == B_UINT64_TYPE
                && fs64(bi.data.size, fs_le) == KEY_SIZE
                && fs16(bi.data.direct[0].len, fs_le) == 1
            {
                if let Some(data) = get_block_run(probe, bs, &bi.data.direct[0], fs_le)? {
                    if let Some(value) = u64_at(&data, 0) {
                        uuid = value;
                    }
                }
            }
        }
    }

    return Ok(Some(uuid).filter(|u| *u != 0));
}

pub fn probe_befs(probe: &mut Probe, mag: BlockidMagic) -> Result<(), BefsError> {
    let sb_offset = mag.b_offset - B_OS_NAME_LENGTH;
    let bs: BefsSuperBlock = probe.map_from_file(sb_offset)?;

    let fs_le = if u32::from_le(bs.magic1) == SUPER_BLOCK_MAGIC1
        && u32::from_le(bs.magic2) == SUPER_BLOCK_MAGIC2
        && u32::from_le(bs.magic3) == SUPER_BLOCK_MAGIC3
        && u32::from_le(bs.fs_byte_order) == SUPER_BLOCK_FS_ENDIAN
    {
        true
    } else if u32::from_be(bs.magic1) == SUPER_BLOCK_MAGIC1
        && u32::from_be(bs.magic2) == SUPER_BLOCK_MAGIC2
        && u32::from_be(bs.magic3) == SUPER_BLOCK_MAGIC3
        && u32::from_be(bs.fs_byte_order) == SUPER_BLOCK_FS_ENDIAN
    {
        false
    } else {
        return Err(BefsError::UnknownByteOrder);
    };

    let block_size = fs32(bs.block_size, fs_le);
    let block_shift = fs32(bs.block_shift, fs_le);

    if !(10..=13).contains(&block_shift) || block_size != 1 << block_shift {
        return Err(BefsError::InvalidGeometry);
    }
    if fs32(bs.ag_shift, fs_le) > 64 {
        return Err(BefsError::InvalidGeometry);
    }

    let volume_id = get_uuid(probe, &bs, fs_le)?;

    let values = probe.values_mut();
    if bs.name[0] != 0 {
        values.set_label(&bs.name);
    }
    values.set_version(if fs_le { "little-endian" } else { "big-endian" });

    if let Some(volume_id) = volume_id {
        values.set_string_uuid(TagName::Uuid, &format!("{:016x}", fs64(volume_id, fs_le)));
    }

    values.set_fs_block_size(u64::from(block_size));
    values.set_block_size(u64::from(block_size));
    values.set_endianness(if fs_le {
        Endianness::Little
    } else {
        Endianness::Big
    });

    return Ok(());
}
