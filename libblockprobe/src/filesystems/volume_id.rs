use core::fmt;

/// 32-bit DOS-style volume serial, stored little-endian on disk and
/// rendered most-significant byte first.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VolumeId32([u8; 4]);

/// 64-bit volume serial, as used by NTFS.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VolumeId64([u8; 8]);

impl VolumeId32 {
    pub fn new(value: [u8; 4]) -> Self {
        VolumeId32(value)
    }

    pub fn from_u32_le(value: u32) -> VolumeId32 {
        VolumeId32(value.to_le_bytes())
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 4]
    }
}

impl VolumeId64 {
    pub fn new(value: [u8; 8]) -> Self {
        VolumeId64(value)
    }

    pub fn from_u64_le(value: u64) -> VolumeId64 {
        VolumeId64(value.to_le_bytes())
    }
}

/// `XXXX-XXXX`, the form DOS and Windows print for FAT serials.
impl fmt::Display for VolumeId32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}{:02X}-{:02X}{:02X}",
            self.0[3], self.0[2], self.0[1], self.0[0]
        )
    }
}

impl fmt::Display for VolumeId64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.0[7], self.0[6], self.0[5], self.0[4], self.0[3], self.0[2], self.0[1], self.0[0]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vfat_serial_renders_swapped() {
        let id = VolumeId32::new([0x78, 0x56, 0x34, 0x12]);
        assert_eq!(id.to_string(), "1234-5678");
    }

    #[test]
    fn ntfs_serial_renders_as_sixteen_hex_digits() {
        let id = VolumeId64::from_u64_le(0x01CD_2652_9580_0FA6);
        assert_eq!(id.to_string(), "01CD265295800FA6");
    }
}
