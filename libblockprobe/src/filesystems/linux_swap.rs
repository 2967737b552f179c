use std::io::Error as IoError;

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    BlockidError,
    filesystems::FsError,
    probe::{BlockidIdinfo, BlockidMagic, Endianness, Probe, UsageType},
};

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Swap area has TuxOnIce magic signature")]
    ProbablyTuxOnIce,
    #[error("Unexpected swap magic")]
    UnexpectedMagic,
    #[error("Swap header version or last page not valid")]
    InvalidHeader,
}

const TOI_MAGIC_STRING: [u8; 8] = *b"\xed\xc3\x02\xe9\x98\x56\xe5\x0c";

pub const LINUX_SWAP_V0_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "linux_swap_v0",
    usage: UsageType::Other("swap"),
    minsz: Some(10 * 4096),
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_swap_v0(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[
        BlockidMagic {
            magic: b"SWAP-SPACE",
            len: 10,
            b_offset: 0xff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"SWAP-SPACE",
            len: 10,
            b_offset: 0x1ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"SWAP-SPACE",
            len: 10,
            b_offset: 0x3ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"SWAP-SPACE",
            len: 10,
            b_offset: 0x7ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"SWAP-SPACE",
            len: 10,
            b_offset: 0xfff6,
            zone: None,
        },
    ]),
};

pub const LINUX_SWAP_V1_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "linux_swap_v1",
    usage: UsageType::Other("swap"),
    minsz: Some(10 * 4096),
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_swap_v1(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[
        BlockidMagic {
            magic: b"SWAPSPACE2",
            len: 10,
            b_offset: 0xff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"SWAPSPACE2",
            len: 10,
            b_offset: 0x1ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"SWAPSPACE2",
            len: 10,
            b_offset: 0x3ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"SWAPSPACE2",
            len: 10,
            b_offset: 0x7ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"SWAPSPACE2",
            len: 10,
            b_offset: 0xfff6,
            zone: None,
        },
    ]),
};

pub const SWSUSPEND_ID_INFO: BlockidIdinfo = BlockidIdinfo {
    name: "swsuspend",
    usage: UsageType::Other("swsuspend"),
    minsz: Some(10 * 4096),
    tolerant: false,
    probe_fn: |probe, magic| {
        probe_swsuspend(probe, magic)
            .map_err(FsError::from)
            .map_err(BlockidError::from)
    },
    magics: Some(&[
        BlockidMagic {
            magic: &TOI_MAGIC_STRING,
            len: 8,
            b_offset: 0,
            zone: None,
        },
        BlockidMagic {
            magic: b"S1SUSPEND",
            len: 9,
            b_offset: 0xff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"S2SUSPEND",
            len: 9,
            b_offset: 0xff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"ULSUSPEND",
            len: 9,
            b_offset: 0xff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"LINHIB0001",
            len: 10,
            b_offset: 0xff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"S1SUSPEND",
            len: 9,
            b_offset: 0x1ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"S2SUSPEND",
            len: 9,
            b_offset: 0x1ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"ULSUSPEND",
            len: 9,
            b_offset: 0x1ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"LINHIB0001",
            len: 10,
            b_offset: 0x1ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"S1SUSPEND",
            len: 9,
            b_offset: 0x3ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"S2SUSPEND",
            len: 9,
            b_offset: 0x3ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"ULSUSPEND",
            len: 9,
            b_offset: 0x3ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"LINHIB0001",
            len: 10,
            b_offset: 0x3ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"S1SUSPEND",
            len: 9,
            b_offset: 0x7ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"S2SUSPEND",
            len: 9,
            b_offset: 0x7ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"ULSUSPEND",
            len: 9,
            b_offset: 0x7ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"LINHIB0001",
            len: 10,
            b_offset: 0x7ff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"S1SUSPEND",
            len: 9,
            b_offset: 0xfff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"S2SUSPEND",
            len: 9,
            b_offset: 0xfff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"ULSUSPEND",
            len: 9,
            b_offset: 0xfff6,
            zone: None,
        },
        BlockidMagic {
            magic: b"LINHIB0001",
            len: 10,
            b_offset: 0xfff6,
            zone: None,
        },
    ]),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct SwapHeaderV1 {
    pub version: [u8; 4],
    pub lastpage: [u8; 4],
    pub nr_badpages: [u8; 4],
    pub uuid: [u8; 16],
    pub volume: [u8; 16],
    pub padding: [u8; 117 * 4],
}

/// The page size never appears in the header; it is implied by where the
/// magic string was found, as the magic sits in the last bytes of the
/// first page.
fn swap_set_info(probe: &mut Probe, magic: BlockidMagic, header: &SwapHeaderV1) {
    let endianness = if u32::from_be_bytes(header.version) == 1 {
        Endianness::Big
    } else {
        Endianness::Little
    };

    let pagesize = magic.b_offset + magic.len as u64;

    let lastpage = if endianness == Endianness::Little {
        u64::from(u32::from_le_bytes(header.lastpage))
    } else {
        u64::from(u32::from_be_bytes(header.lastpage))
    };

    let values = probe.values_mut();
    values.set_fs_block_size(pagesize);
    values.set_fs_size(pagesize * lastpage);
    values.set_fs_last_block(lastpage + 1);
    values.set_endianness(endianness);
    values.set_wiper(magic.b_offset, magic.len as u64);
}

/// Label and uuid are only trusted when the padding words right after
/// the known fields are clear; anything else means garbage from an old
/// mkswap layout.
fn swap_label_uuid(probe: &mut Probe, header: &SwapHeaderV1) {
    if header.padding[128..136].iter().any(|&b| b != 0) {
        return;
    }

    let values = probe.values_mut();
    if header.volume[0] != 0 {
        values.set_label(&header.volume);
    }
    values.set_uuid(&header.uuid);
}

fn toi_check(probe: &mut Probe) -> Result<(), SwapError> {
    let check: [u8; 8] = probe.read_exact_at(0)?;

    if check == TOI_MAGIC_STRING {
        return Err(SwapError::ProbablyTuxOnIce);
    }
    return Ok(());
}

pub fn probe_swap_v0(probe: &mut Probe, magic: BlockidMagic) -> Result<(), SwapError> {
    toi_check(probe)?;

    if magic.magic != b"SWAP-SPACE" {
        return Err(SwapError::UnexpectedMagic);
    }

    let header: SwapHeaderV1 = probe.map_from_file(1024)?;
    swap_set_info(probe, magic, &header);
    probe.values_mut().set_version("0");

    return Ok(());
}

pub fn probe_swap_v1(probe: &mut Probe, magic: BlockidMagic) -> Result<(), SwapError> {
    toi_check(probe)?;

    if magic.magic != b"SWAPSPACE2" {
        return Err(SwapError::UnexpectedMagic);
    }

    let header: SwapHeaderV1 = probe.map_from_file(1024)?;
    if u32::from_le_bytes(header.version) != 1 && u32::from_be_bytes(header.version) != 1 {
        return Err(SwapError::InvalidHeader);
    }
    if header.lastpage == [0u8; 4] {
        return Err(SwapError::InvalidHeader);
    }

    swap_set_info(probe, magic, &header);
    swap_label_uuid(probe, &header);
    probe.values_mut().set_version("1");

    return Ok(());
}

pub fn probe_swsuspend(probe: &mut Probe, magic: BlockidMagic) -> Result<(), SwapError> {
    /* TuxOnIce keeps its magic at offset 0, so no page size can be
     * derived from it */
    let variant = if magic.b_offset == 0 {
        "tuxonice"
    } else if magic.magic == b"S1SUSPEND" {
        "s1suspend"
    } else if magic.magic == b"S2SUSPEND" {
        "s2suspend"
    } else if magic.magic == b"ULSUSPEND" {
        "ulsuspend"
    } else if magic.magic == b"LINHIB0001" {
        "linhib0001"
    } else {
        return Err(SwapError::UnexpectedMagic);
    };

    if magic.b_offset != 0 {
        let header: SwapHeaderV1 = probe.map_from_file(1024)?;
        swap_set_info(probe, magic, &header);
        swap_label_uuid(probe, &header);
    }
    probe.values_mut().set_version(variant);

    return Ok(());
}
