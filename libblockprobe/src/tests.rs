use std::{fs::File, io::Write as _};

use tempfile::NamedTempFile;

use crate::{
    BlockidError, Probe, ProbeOutcome, TagName,
    checksum::{crc32, crc32_exclude_offset, crc32_seeded, crc32c, crc32c_exclude_offset},
    containers::fvault2::probe_fvault2,
    filesystems::udf::{UdfError, probe_udf},
    probe::BlockidMagic,
};

const MIB: usize = 1024 * 1024;

fn image_probe(bytes: &[u8]) -> (NamedTempFile, Probe) {
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(bytes).unwrap();
    tmp.flush().unwrap();

    let file = File::open(tmp.path()).unwrap();
    let probe = Probe::new(file, tmp.path(), 0, None).unwrap();
    (tmp, probe)
}

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

#[test]
fn stratis_member_is_detected() {
    let mut img = vec![0u8; 2 * MIB];

    let mut sector = [0u8; 512];
    put(&mut sector, 4, b"!Stra0tis\x86\xff\x02$\x1d");
    put(&mut sector, 20, &8192u64.to_le_bytes());
    sector[28] = 1;
    put(&mut sector, 32, b"9bf5b908125645fa8e1b0d52dd7f2e32");
    put(&mut sector, 64, b"16dd4b1ffcf44b9f8f5ff68fabcd0001");
    put(&mut sector, 120, &1700000000u64.to_le_bytes());
    let crc = crc32c(&sector[4..]);
    put(&mut sector, 0, &crc.to_le_bytes());

    put(&mut img, 512, &sector);

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(v.lookup_string(TagName::Type).as_deref(), Some("stratis"));
    assert_eq!(
        v.lookup_string(TagName::PoolUuid).as_deref(),
        Some("9bf5b908125645fa8e1b0d52dd7f2e32")
    );
    assert_eq!(
        v.lookup_string(TagName::BlockdevSectors).as_deref(),
        Some("8192")
    );
    assert_eq!(
        v.lookup_string(TagName::BlockdevInittime).as_deref(),
        Some("1700000000")
    );
}

#[test]
fn stratis_backup_sigblock_is_used_when_primary_is_gone() {
    let mut img = vec![0u8; 2 * MIB];

    let mut sector = [0u8; 512];
    put(&mut sector, 4, b"!Stra0tis\x86\xff\x02$\x1d");
    put(&mut sector, 20, &4096u64.to_le_bytes());
    sector[28] = 1;
    put(&mut sector, 32, b"9bf5b908125645fa8e1b0d52dd7f2e32");
    put(&mut sector, 64, b"16dd4b1ffcf44b9f8f5ff68fabcd0000");
    let crc = crc32c(&sector[4..]);
    put(&mut sector, 0, &crc.to_le_bytes());

    // only the second copy at sector 9 survives
    put(&mut img, 512 * 9, &sector);

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);
    assert_eq!(
        probe.values().lookup_string(TagName::Type).as_deref(),
        Some("stratis")
    );
}

#[test]
fn mpool_descriptor_checksum_gates_the_match() {
    let mut img = vec![0u8; 4096];
    put(&mut img, 0, b"mpoolDev");
    put(&mut img, 8, b"mp0");
    let poolid: [u8; 16] = core::array::from_fn(|i| i as u8 + 1);
    put(&mut img, 24, &poolid);
    let cksum = !crc32c(&img[..46]);
    put(&mut img, 46, &cksum.to_le_bytes());

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(v.lookup_string(TagName::Type).as_deref(), Some("mpool"));
    assert_eq!(v.lookup_string(TagName::Label).as_deref(), Some("mp0"));
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("01020304-0506-0708-090a-0b0c0d0e0f10")
    );

    // same image with one pool id byte flipped and a stale checksum
    img[30] ^= 0xFF;
    let (_tmp2, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Nothing);
}

#[test]
fn fvault2_volume_header_round_trips() {
    let mut img = vec![0u8; 4096];
    put(&mut img, 8, &1u16.to_le_bytes());
    put(&mut img, 10, &0x10u16.to_le_bytes());
    put(&mut img, 88, b"CS");
    put(&mut img, 92, &1u32.to_le_bytes());
    put(&mut img, 144, &16u32.to_le_bytes());
    put(&mut img, 148, &2u32.to_le_bytes());
    let pv_uuid: [u8; 16] = core::array::from_fn(|i| 0x40 + i as u8);
    put(&mut img, 176, &pv_uuid);
    let cksum = !crc32c(&img[8..512]);
    put(&mut img, 0, &cksum.to_le_bytes());

    let (_tmp, mut probe) = image_probe(&img);
    probe_fvault2(&mut probe, BlockidMagic::EMPTY_MAGIC).unwrap();

    let v = probe.values();
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("40414243-4445-4647-4849-4a4b4c4d4e4f")
    );
    assert_eq!(v.lookup_string(TagName::Version).as_deref(), Some("1"));
}

#[test]
fn luks1_header_yields_uuid_and_version() {
    let mut img = vec![0u8; 2 * MIB];
    put(&mut img, 0, b"LUKS\xba\xbe");
    put(&mut img, 6, &1u16.to_be_bytes());
    put(&mut img, 168, b"c5d88c31-5ad7-4c7c-b1d1-b2cbc6dc12a7");

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(
        v.lookup_string(TagName::Type).as_deref(),
        Some("crypto_LUKS")
    );
    assert_eq!(v.lookup_string(TagName::Version).as_deref(), Some("1"));
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("c5d88c31-5ad7-4c7c-b1d1-b2cbc6dc12a7")
    );
}

#[test]
fn md_raid_12_superblock_is_detected() {
    let mut img = vec![0u8; MIB];

    let off = 4096usize;
    put(&mut img, off, &0xa92b4efcu32.to_le_bytes());
    put(&mut img, off + 4, &1u32.to_le_bytes());
    let set_uuid: [u8; 16] = core::array::from_fn(|i| 0x10 + i as u8);
    put(&mut img, off + 16, &set_uuid);
    put(&mut img, off + 32, b"array0");
    // sector of the superblock itself
    put(&mut img, off + 144, &8u64.to_le_bytes());

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(
        v.lookup_string(TagName::Type).as_deref(),
        Some("linux_raid_member")
    );
    assert_eq!(v.lookup_string(TagName::Version).as_deref(), Some("1.2"));
    assert_eq!(v.lookup_string(TagName::Label).as_deref(), Some("array0"));
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("10111213-1415-1617-1819-1a1b1c1d1e1f")
    );
}

#[test]
fn md_raid_090_superblock_at_the_end() {
    let mut img = vec![0u8; MIB];

    let off = MIB - 64 * 1024;
    put(&mut img, off, &0xa92b4efcu32.to_le_bytes());
    put(&mut img, off + 4, &0u32.to_le_bytes());
    put(&mut img, off + 8, &90u32.to_le_bytes());
    put(&mut img, off + 20, &0x11223344u32.to_le_bytes());
    put(&mut img, off + 52, &0x55667788u32.to_le_bytes());
    put(&mut img, off + 56, &0x99aabbccu32.to_le_bytes());
    put(&mut img, off + 60, &0xddeeff00u32.to_le_bytes());

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(
        v.lookup_string(TagName::Type).as_deref(),
        Some("linux_raid_member")
    );
    assert_eq!(v.lookup_string(TagName::Version).as_deref(), Some("0.90.0"));
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("11223344-5566-7788-99aa-bbccddeeff00")
    );
}

#[test]
fn gpt_label_sets_pttype_and_ptuuid() {
    let mut img = vec![0u8; MIB];

    // protective MBR
    img[510] = 0x55;
    img[511] = 0xAA;
    img[446 + 4] = 0xEE;

    let last = (MIB as u64 / 512) - 1;
    let mut hdr = [0u8; 92];
    put(&mut hdr, 0, b"EFI PART");
    put(&mut hdr, 8, &0x00010000u32.to_le_bytes());
    put(&mut hdr, 12, &92u32.to_le_bytes());
    put(&mut hdr, 24, &1u64.to_le_bytes());
    put(&mut hdr, 32, &last.to_le_bytes());
    put(&mut hdr, 40, &34u64.to_le_bytes());
    put(&mut hdr, 48, &(last - 33).to_le_bytes());
    put(
        &mut hdr,
        56,
        &[
            0xaf, 0xdb, 0x56, 0x3b, 0x0c, 0xbf, 0x4c, 0x44, 0x80, 0xbf, 0x8b, 0x87, 0xa3, 0x1a,
            0x4b, 0x7e,
        ],
    );
    put(&mut hdr, 72, &2u64.to_le_bytes());
    put(&mut hdr, 80, &4u32.to_le_bytes());
    put(&mut hdr, 84, &128u32.to_le_bytes());
    put(&mut hdr, 88, &crc32(&[0u8; 512]).to_le_bytes());
    let crc = crc32_exclude_offset(&hdr, 16, 4);
    put(&mut hdr, 16, &crc.to_le_bytes());
    put(&mut img, 512, &hdr);

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(v.lookup_string(TagName::PtType).as_deref(), Some("gpt"));
    assert_eq!(
        v.lookup_string(TagName::PtUuid).as_deref(),
        Some("3b56dbaf-bf0c-444c-80bf-8b87a31a4b7e")
    );
    // the GPT-only label never claims a filesystem type
    assert_eq!(v.lookup_string(TagName::Type), None);
}

#[test]
fn mbr_label_sets_pttype_and_disk_id() {
    let mut img = vec![0u8; MIB];
    img[510] = 0x55;
    img[511] = 0xAA;
    img[446] = 0x80;
    img[446 + 4] = 0x83;
    put(&mut img, 446 + 8, &2048u32.to_le_bytes());
    put(&mut img, 446 + 12, &2000u32.to_le_bytes());
    put(&mut img, 0x1B8, &0xdeadbeefu32.to_le_bytes());

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(v.lookup_string(TagName::PtType).as_deref(), Some("dos"));
    assert_eq!(
        v.lookup_string(TagName::PtUuid).as_deref(),
        Some("deadbeef")
    );
}

#[test]
fn two_plausible_superblocks_are_ambivalent() {
    let mut img = vec![0u8; 2 * MIB];

    // minix v1, little-endian
    put(&mut img, 1024, &128u16.to_le_bytes());
    put(&mut img, 1026, &1000u16.to_le_bytes());
    put(&mut img, 1028, &1u16.to_le_bytes());
    put(&mut img, 1030, &1u16.to_le_bytes());
    put(&mut img, 1032, &10u16.to_le_bytes());
    put(&mut img, 1040, &0x137Fu16.to_le_bytes());
    put(&mut img, 1042, &1u16.to_le_bytes());

    // reiserfs 3.5 in the 8 KiB slot
    let sb = 8192usize;
    put(&mut img, sb + 12, &100u32.to_le_bytes());
    put(&mut img, sb + 44, &4096u16.to_le_bytes());
    put(&mut img, sb + 52, b"ReIsErFs");

    let (_tmp, mut probe) = image_probe(&img);
    match probe.do_safeprobe() {
        Err(BlockidError::AmbivalentProbe(n)) => assert_eq!(n, 2),
        other => panic!("expected an ambivalent result, got {other:?}"),
    }
}

#[test]
fn ext4_metadata_csum_gates_the_match() {
    let mut img = vec![0u8; 4 * MIB];

    let sb = 1024usize;
    put(&mut img, sb + 4, &4096u32.to_le_bytes());
    put(&mut img, sb + 24, &0u32.to_le_bytes());
    put(&mut img, sb + 56, &[0x53, 0xEF]);
    put(&mut img, sb + 62, &0u16.to_le_bytes());
    put(&mut img, sb + 76, &1u32.to_le_bytes());
    // FILETYPE | EXTENTS, METADATA_CSUM
    put(&mut img, sb + 96, &0x42u32.to_le_bytes());
    put(&mut img, sb + 100, &0x400u32.to_le_bytes());
    let uuid: [u8; 16] = [
        0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f, 0x6a, 0x7b, 0x8c, 0x9d, 0xae, 0xbf, 0xc0, 0xd1,
        0xe2, 0xf3,
    ];
    put(&mut img, sb + 104, &uuid);
    put(&mut img, sb + 120, b"ROOT");
    let csum = crc32c(&img[sb..sb + 1020]);
    put(&mut img, sb + 1020, &csum.to_le_bytes());

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(v.lookup_string(TagName::Type).as_deref(), Some("ext4"));
    assert_eq!(v.lookup_string(TagName::Label).as_deref(), Some("ROOT"));
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("0a1b2c3d-4e5f-6a7b-8c9d-aebfc0d1e2f3")
    );
    assert_eq!(v.lookup_string(TagName::Version).as_deref(), Some("1.0"));
    assert_eq!(
        v.lookup_string(TagName::FsBlockSize).as_deref(),
        Some("1024")
    );
    assert_eq!(
        v.lookup_string(TagName::FsLastBlock).as_deref(),
        Some("4096")
    );
    // EXTENTS rules out the plain-ext2 compatibility claim
    assert_eq!(v.lookup_string(TagName::SecType), None);

    // one flipped label byte invalidates the superblock checksum
    img[sb + 121] ^= 0xFF;
    let (_tmp2, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Nothing);
}

#[test]
fn fat32_serial_without_label() {
    let mut img = vec![0u8; 2 * MIB];

    put(&mut img, 0, &[0xEB, 0x3C, 0x90]);
    put(&mut img, 3, b"MSWIN4.1");
    put(&mut img, 11, &512u16.to_le_bytes());
    img[13] = 1; // sectors per cluster
    put(&mut img, 14, &32u16.to_le_bytes());
    img[16] = 2; // fat copies
    img[21] = 0xF8;
    put(&mut img, 32, &4096u32.to_le_bytes());
    put(&mut img, 36, &8u32.to_le_bytes());
    put(&mut img, 44, &2u32.to_le_bytes());
    put(&mut img, 48, &1u16.to_le_bytes());
    img[66] = 0x29;
    put(&mut img, 67, &0xABCD1234u32.to_le_bytes());
    put(&mut img, 71, b"NO NAME    ");
    put(&mut img, 82, b"FAT32   ");
    img[510] = 0x55;
    img[511] = 0xAA;

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(v.lookup_string(TagName::Type).as_deref(), Some("vfat"));
    assert_eq!(v.lookup_string(TagName::Version).as_deref(), Some("FAT32"));
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("ABCD-1234")
    );
    // the boot-sector default label is treated as absent
    assert_eq!(v.lookup_string(TagName::Label), None);
    assert_eq!(v.lookup_string(TagName::SecType), None);
    assert_eq!(v.lookup_string(TagName::BlockSize).as_deref(), Some("512"));
}

#[test]
fn xfs_v5_superblock_checksum_verifies() {
    let mut img = vec![0u8; MIB];

    put(&mut img, 0, b"XFSB");
    put(&mut img, 4, &4096u32.to_be_bytes());
    put(&mut img, 8, &25600u64.to_be_bytes());
    let uuid: [u8; 16] = core::array::from_fn(|i| 0x50 + i as u8);
    put(&mut img, 32, &uuid);
    put(&mut img, 80, &1u32.to_be_bytes());
    put(&mut img, 84, &6400u32.to_be_bytes());
    put(&mut img, 88, &4u32.to_be_bytes());
    put(&mut img, 100, &0x8005u16.to_be_bytes());
    put(&mut img, 102, &512u16.to_be_bytes());
    put(&mut img, 104, &512u16.to_be_bytes());
    put(&mut img, 106, &8u16.to_be_bytes());
    put(&mut img, 108, b"v5fs");
    img[120] = 12; // blocklog
    img[121] = 9; // sectlog
    img[122] = 9; // inodelog
    img[123] = 3; // inopblog
    img[127] = 25; // imax_pct
    put(&mut img, 200, &0x100u32.to_be_bytes());
    // sb_crc is the one little-endian field of the superblock
    let csum = crc32c_exclude_offset(&img[..512], 224, 4);
    put(&mut img, 224, &csum.to_le_bytes());

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(v.lookup_string(TagName::Type).as_deref(), Some("xfs"));
    assert_eq!(v.lookup_string(TagName::Label).as_deref(), Some("v5fs"));
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("50515253-5455-5657-5859-5a5b5c5d5e5f")
    );
    assert_eq!(
        v.lookup_string(TagName::FsSize).as_deref(),
        Some("104857600")
    );
    assert_eq!(
        v.lookup_string(TagName::FsLastBlock).as_deref(),
        Some("25600")
    );
    assert_eq!(
        v.lookup_string(TagName::FsBlockSize).as_deref(),
        Some("4096")
    );
    assert_eq!(v.lookup_string(TagName::BlockSize).as_deref(), Some("512"));

    // a corrupted byte outside sb_crc must fail verification
    img[110] ^= 0xFF;
    let (_tmp2, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Nothing);
}

#[test]
fn btrfs_superblock_reports_geometry() {
    let mut img = vec![0u8; 2 * MIB];

    let off = 64 * 1024;
    let mut sb = vec![0u8; 4096];
    let fsid: [u8; 16] = core::array::from_fn(|i| 0x60 + i as u8);
    put(&mut sb, 32, &fsid);
    put(&mut sb, 64, b"_BHRfS_M");
    put(&mut sb, 72, &7u64.to_le_bytes());
    put(&mut sb, 112, &(2 * MIB as u64).to_le_bytes());
    put(&mut sb, 144, &4096u32.to_le_bytes());
    put(&mut sb, 196, &0u16.to_le_bytes());
    let dev_uuid: [u8; 16] = core::array::from_fn(|i| 0x20 + i as u8);
    put(&mut sb, 267, &dev_uuid);
    put(&mut sb, 299, b"scratch");
    let csum = crc32c(&sb[32..]);
    put(&mut sb, 0, &csum.to_le_bytes());
    put(&mut img, off, &sb);

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(v.lookup_string(TagName::Type).as_deref(), Some("btrfs"));
    assert_eq!(v.lookup_string(TagName::Label).as_deref(), Some("scratch"));
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("60616263-6465-6667-6869-6a6b6c6d6e6f")
    );
    assert_eq!(
        v.lookup_string(TagName::UuidSub).as_deref(),
        Some("20212223-2425-2627-2829-2a2b2c2d2e2f")
    );
    assert_eq!(v.lookup_string(TagName::FsSize).as_deref(), Some("2097152"));
    assert_eq!(
        v.lookup_string(TagName::FsBlockSize).as_deref(),
        Some("4096")
    );
    assert_eq!(
        v.lookup_string(TagName::FsLastBlock).as_deref(),
        Some("512")
    );
    assert_eq!(v.lookup_string(TagName::BlockSize).as_deref(), Some("4096"));
}

fn nvpair_u64(name: &str, value: u64) -> Vec<u8> {
    let namesize = (name.len() + 3) & !3;
    let nvp_size = 12 + namesize + 16;
    let mut out = vec![0u8; nvp_size];
    put(&mut out, 0, &(nvp_size as u32).to_be_bytes());
    put(&mut out, 8, &(name.len() as u32).to_be_bytes());
    put(&mut out, 12, name.as_bytes());
    put(&mut out, 12 + namesize, &8u32.to_be_bytes());
    put(&mut out, 12 + namesize + 4, &1u32.to_be_bytes());
    put(&mut out, 12 + namesize + 8, &value.to_be_bytes());
    out
}

fn nvpair_str(name: &str, value: &str) -> Vec<u8> {
    let namesize = (name.len() + 3) & !3;
    let valuesize = 12 + ((value.len() + 3) & !3);
    let nvp_size = 12 + namesize + valuesize;
    let mut out = vec![0u8; nvp_size];
    put(&mut out, 0, &(nvp_size as u32).to_be_bytes());
    put(&mut out, 8, &(name.len() as u32).to_be_bytes());
    put(&mut out, 12, name.as_bytes());
    put(&mut out, 12 + namesize, &9u32.to_be_bytes());
    put(&mut out, 12 + namesize + 4, &1u32.to_be_bytes());
    put(&mut out, 12 + namesize + 8, &(value.len() as u32).to_be_bytes());
    put(&mut out, 12 + namesize + 12, value.as_bytes());
    out
}

#[test]
fn zfs_member_is_identified_from_the_nvlist() {
    let mut img = vec![0u8; 64 * MIB];

    // XDR encoding, written by a little-endian host
    let nv = 16 * 1024;
    img[nv] = 1;
    img[nv + 1] = 1;

    let mut off = nv + 12;
    for pair in [
        nvpair_str("name", "tank"),
        nvpair_u64("pool_guid", 0x0102_0304_0506_0708),
        nvpair_u64("guid", 0x0a0b_0c0d_0e0f_1011),
        nvpair_u64("version", 5000),
        nvpair_u64("state", 0),
        nvpair_u64("txg", 42),
        nvpair_u64("ashift", 12),
    ] {
        put(&mut img, off, &pair);
        off += pair.len();
    }

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(
        v.lookup_string(TagName::Type).as_deref(),
        Some("zfs_member")
    );
    assert_eq!(v.lookup_string(TagName::Label).as_deref(), Some("tank"));
    assert_eq!(
        v.lookup_string(TagName::Uuid),
        Some(0x0102_0304_0506_0708u64.to_string())
    );
    assert_eq!(
        v.lookup_string(TagName::UuidSub),
        Some(0x0a0b_0c0d_0e0f_1011u64.to_string())
    );
    assert_eq!(v.lookup_string(TagName::Version).as_deref(), Some("5000"));
    assert_eq!(
        v.lookup_string(TagName::FsBlockSize).as_deref(),
        Some("4096")
    );
    assert_eq!(v.lookup_string(TagName::BlockSize).as_deref(), Some("4096"));
}

#[test]
fn swap_v1_header_label_and_uuid() {
    let mut img = vec![0u8; 64 * 1024];

    put(&mut img, 0xff6, b"SWAPSPACE2");
    put(&mut img, 1024, &1u32.to_le_bytes());
    put(&mut img, 1028, &15u32.to_le_bytes());
    let uuid: [u8; 16] = core::array::from_fn(|i| 0x30 + i as u8);
    put(&mut img, 1036, &uuid);
    put(&mut img, 1052, b"swap0");

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(
        v.lookup_string(TagName::Type).as_deref(),
        Some("linux_swap_v1")
    );
    assert_eq!(v.lookup_string(TagName::Version).as_deref(), Some("1"));
    assert_eq!(v.lookup_string(TagName::Label).as_deref(), Some("swap0"));
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("30313233-3435-3637-3839-3a3b3c3d3e3f")
    );
    assert_eq!(
        v.lookup_string(TagName::FsBlockSize).as_deref(),
        Some("4096")
    );
    assert_eq!(v.lookup_string(TagName::FsSize).as_deref(), Some("61440"));
}

#[test]
fn swsuspend_version_names_the_variant() {
    let mut img = vec![0u8; 64 * 1024];
    put(&mut img, 0xff6, b"S1SUSPEND");

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(v.lookup_string(TagName::Type).as_deref(), Some("swsuspend"));
    assert_eq!(
        v.lookup_string(TagName::Version).as_deref(),
        Some("s1suspend")
    );
}

#[test]
fn tuxonice_image_has_no_page_geometry() {
    let mut img = vec![0u8; 64 * 1024];
    put(&mut img, 0, b"\xed\xc3\x02\xe9\x98\x56\xe5\x0c");

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(v.lookup_string(TagName::Type).as_deref(), Some("swsuspend"));
    assert_eq!(
        v.lookup_string(TagName::Version).as_deref(),
        Some("tuxonice")
    );
    // the magic sits at offset 0, so no page size can be inferred
    assert_eq!(v.lookup_string(TagName::FsBlockSize), None);
    assert_eq!(v.lookup_string(TagName::FsSize), None);
}

#[test]
fn udf_without_anchor_is_rejected() {
    let mut img = vec![0u8; 2 * MIB];
    put(&mut img, 0x8001, b"BEA01");
    img[0x8006] = 1;
    put(&mut img, 0x8801, b"NSR02");
    img[0x8806] = 1;

    let (_tmp, mut probe) = image_probe(&img);
    let err = probe_udf(&mut probe, BlockidMagic::EMPTY_MAGIC).unwrap_err();
    assert!(matches!(err, UdfError::NoAnchor));

    let (_tmp2, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Nothing);
}

#[test]
fn f2fs_checksum_and_utf16_label() {
    let mut img = vec![0u8; 2 * MIB];

    let sb = 1024usize;
    put(&mut img, sb, b"\x10\x20\xf5\xf2");
    put(&mut img, sb + 4, &1u16.to_le_bytes());
    put(&mut img, sb + 6, &4u16.to_le_bytes());
    put(&mut img, sb + 16, &12u32.to_le_bytes());
    put(&mut img, sb + 32, &3072u32.to_le_bytes());
    put(&mut img, sb + 36, &512u64.to_le_bytes());
    let uuid: [u8; 16] = core::array::from_fn(|i| 0x70 + i as u8);
    put(&mut img, sb + 108, &uuid);
    put(&mut img, sb + 124, b"f\0l\0a\0s\0h\0");
    let csum = crc32_seeded(0xf2f5_2010, &img[sb..sb + 3072]);
    put(&mut img, sb + 3072, &csum.to_le_bytes());

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(v.lookup_string(TagName::Type).as_deref(), Some("f2fs"));
    assert_eq!(v.lookup_string(TagName::Label).as_deref(), Some("flash"));
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("70717273-7475-7677-7879-7a7b7c7d7e7f")
    );
    assert_eq!(v.lookup_string(TagName::Version).as_deref(), Some("1.4"));
    assert_eq!(
        v.lookup_string(TagName::FsBlockSize).as_deref(),
        Some("4096")
    );
    assert_eq!(v.lookup_string(TagName::FsSize).as_deref(), Some("2097152"));

    // a stale checksum demotes the device to no match
    img[sb + 124] = b'F';
    let (_tmp2, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Nothing);
}

#[test]
fn nilfs2_seeded_crc_gates_the_match() {
    let mut img = vec![0u8; 2 * MIB];

    let sb = 1024usize;
    put(&mut img, sb, &2u32.to_le_bytes());
    put(&mut img, sb + 6, &0x3434u16.to_le_bytes());
    put(&mut img, sb + 8, &248u16.to_le_bytes());
    let seed = 0x4e49_4c46u32;
    put(&mut img, sb + 12, &seed.to_le_bytes());
    put(&mut img, sb + 32, &(2 * MIB as u64).to_le_bytes());
    put(&mut img, sb + 56, &7u64.to_le_bytes());
    let uuid: [u8; 16] = core::array::from_fn(|i| 0x80 + i as u8);
    put(&mut img, sb + 152, &uuid);
    put(&mut img, sb + 168, b"backlog");
    let mut crc = crc32_seeded(seed, &img[sb..sb + 16]);
    crc = crc32_seeded(crc, &[0u8; 4]);
    crc = crc32_seeded(crc, &img[sb + 20..sb + 248]);
    put(&mut img, sb + 16, &crc.to_le_bytes());

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(v.lookup_string(TagName::Type).as_deref(), Some("nilfs2"));
    assert_eq!(v.lookup_string(TagName::Label).as_deref(), Some("backlog"));
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("80818283-8485-8687-8889-8a8b8c8d8e8f")
    );
    assert_eq!(v.lookup_string(TagName::Version).as_deref(), Some("2"));
    assert_eq!(v.lookup_string(TagName::BlockSize).as_deref(), Some("1024"));

    img[sb + 170] ^= 0xFF;
    let (_tmp2, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Nothing);
}

#[test]
fn bitlocker_win7_volume_is_recognized() {
    let mut img = vec![0u8; 64 * 1024];

    put(&mut img, 0, b"\xeb\x58\x90-FVE-FS-");
    put(&mut img, 67, &0x1234ABCDu32.to_le_bytes());
    put(&mut img, 176, &4096u64.to_le_bytes());
    put(&mut img, 4096, b"-FVE-FS-");
    put(&mut img, 4104, &48u16.to_le_bytes());
    put(&mut img, 4106, &2u16.to_le_bytes());

    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Found);

    let v = probe.values();
    assert_eq!(
        v.lookup_string(TagName::Type).as_deref(),
        Some("BitLocker")
    );
    assert_eq!(v.lookup_string(TagName::Version).as_deref(), Some("2"));
    assert_eq!(
        v.lookup_string(TagName::Uuid).as_deref(),
        Some("0000000305441741")
    );
}

#[test]
fn empty_device_probes_to_nothing() {
    let img = vec![0u8; 2 * MIB];
    let (_tmp, mut probe) = image_probe(&img);
    assert_eq!(probe.do_safeprobe().unwrap(), ProbeOutcome::Nothing);
}
