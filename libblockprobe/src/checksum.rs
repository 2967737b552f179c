use std::fmt;

use crc::{Algorithm, CRC_32_ISO_HDLC, Crc};
use crc_fast::{CrcAlgorithm::Crc32Iscsi, Digest};
use sha2::{Digest as _, Sha256};

const CRC32_ETH: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/* Ethernet polynomial without the conventional pre/post inversion; the
 * register starts at a caller-supplied seed and is returned as-is */
const CRC_32_RAW: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04c1_1db7,
    init: 0,
    refin: true,
    refout: true,
    xorout: 0,
    check: 0,
    residue: 0,
};

const CRC32_SEEDED: Crc<u32> = Crc::<u32>::new(&CRC_32_RAW);

/// CRC32C (Castagnoli) over `data`.
pub fn crc32c(data: &[u8]) -> u32 {
    let mut digest = Digest::new(Crc32Iscsi);
    digest.update(data);
    digest.finalize() as u32
}

/// CRC32C over `data` with `len` bytes at `offset` treated as zeros.
///
/// Used by formats whose stored checksum lives inside the region it
/// covers.
pub fn crc32c_exclude_offset(data: &[u8], offset: usize, len: usize) -> u32 {
    let mut digest = Digest::new(Crc32Iscsi);
    digest.update(&data[..offset]);
    digest.update(&vec![0u8; len]);
    digest.update(&data[offset + len..]);
    digest.finalize() as u32
}

/// CRC32 (Ethernet polynomial) over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32_ETH.checksum(data)
}

/// CRC32 (Ethernet polynomial) with `len` bytes at `offset` zeroed.
pub fn crc32_exclude_offset(data: &[u8], offset: usize, len: usize) -> u32 {
    let mut digest = CRC32_ETH.digest();
    digest.update(&data[..offset]);
    digest.update(&vec![0u8; len]);
    digest.update(&data[offset + len..]);
    digest.finalize()
}

/// Raw CRC32 (Ethernet polynomial) starting from `seed`, with no final
/// inversion. f2fs and nilfs2 store their superblock checksums in this
/// form.
///
/// `digest_with_initial` reflects the value it is given before loading
/// the register, so the seed is pre-reversed here to land unchanged.
pub fn crc32_seeded(seed: u32, data: &[u8]) -> u32 {
    let mut digest = CRC32_SEEDED.digest_with_initial(seed.reverse_bits());
    digest.update(data);
    digest.finalize()
}

/// XXH64 with explicit seed.
pub fn xxh64(data: &[u8], seed: u64) -> u64 {
    xxhash_rust::xxh64::xxh64(data, seed)
}

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Compares a stored checksum against the computed one, logging the
/// mismatch. The caller decides what a `false` means (usually "no
/// match", never a hard error).
pub fn verify_csum<T>(what: &str, expected: T, got: T) -> bool
where
    T: PartialEq + fmt::LowerHex,
{
    if expected != got {
        log::debug!("{what} checksum mismatch: expected {expected:#x}, got {got:#x}");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32c_known_vector() {
        // RFC 3720 appendix vector
        assert_eq!(crc32c(&[0u8; 32]), 0x8a9136aa);
    }

    #[test]
    fn crc32_known_vector() {
        assert_eq!(crc32(b"123456789"), 0xcbf43926);
    }

    #[test]
    fn exclude_offset_matches_zeroed_copy() {
        let data: Vec<u8> = (0u8..64).collect();
        let mut zeroed = data.clone();
        zeroed[8..12].fill(0);

        assert_eq!(crc32c_exclude_offset(&data, 8, 4), crc32c(&zeroed));
        assert_eq!(crc32_exclude_offset(&data, 8, 4), crc32(&zeroed));
    }

    #[test]
    fn crc32_seeded_matches_inverted_crc32() {
        // a seed of all-ones with no final inversion is JAMCRC
        assert_eq!(crc32_seeded(0xffff_ffff, b"123456789"), 0x340bc6d9);
        // the register chains across calls
        assert_eq!(
            crc32_seeded(crc32_seeded(0xf2f5_2010, b"1234"), b"56789"),
            crc32_seeded(0xf2f5_2010, b"123456789")
        );
    }

    #[test]
    fn xxh64_seed_changes_digest() {
        assert_ne!(xxh64(b"blockprobe", 0), xxh64(b"blockprobe", 1));
    }
}
