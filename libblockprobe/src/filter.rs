use bitflags::bitflags;

use crate::probe::{PROBES, UsageType};

/// How a filter list is applied.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FilterFlag {
    /// Disable the named probes, keep the rest.
    NotIn,
    /// Keep only the named probes.
    OnlyIn,
}

bitflags! {
    /// Usage classes for [`ChainFilter::filter_usage`].
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
    pub struct UsageFlags: u32 {
        const FILESYSTEM = 1 << 0;
        const RAID = 1 << 1;
        const CRYPTO = 1 << 2;
        const OTHER = 1 << 3;
        const PARTTABLE = 1 << 4;
    }
}

impl UsageFlags {
    pub(crate) fn from_usage(usage: UsageType) -> UsageFlags {
        match usage {
            UsageType::Filesystem => UsageFlags::FILESYSTEM,
            UsageType::Raid => UsageFlags::RAID,
            UsageType::Crypto => UsageFlags::CRYPTO,
            UsageType::Other(_) => UsageFlags::OTHER,
            UsageType::PartitionTable => UsageFlags::PARTTABLE,
        }
    }
}

/// Bitmap over the probe registry; a set bit disables the probe at that
/// position. Unknown names are ignored.
#[derive(Debug, Default, Clone)]
pub struct ChainFilter {
    skip: u64,
}

fn chain_mask() -> u64 {
    (1u64 << PROBES.len()) - 1
}

impl ChainFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables every probe again.
    pub fn reset(&mut self) {
        self.skip = 0;
    }

    /// Flips every probe's bit.
    pub fn invert(&mut self) {
        self.skip ^= chain_mask();
    }

    pub(crate) fn is_skipped(&self, idx: usize) -> bool {
        self.skip & (1u64 << idx) != 0
    }

    /// Filter by probe names. `NotIn` disables the listed probes,
    /// `OnlyIn` disables everything else.
    pub fn filter_types(&mut self, flag: FilterFlag, names: &[&str]) {
        for (idx, info) in PROBES.iter().enumerate() {
            let listed = names.contains(&info.name);
            let skip = match flag {
                FilterFlag::NotIn => listed,
                FilterFlag::OnlyIn => !listed,
            };
            if skip {
                self.skip |= 1u64 << idx;
            }
        }
    }

    /// Filter by usage class.
    pub fn filter_usage(&mut self, flag: FilterFlag, usage: UsageFlags) {
        for (idx, info) in PROBES.iter().enumerate() {
            let listed = usage.intersects(UsageFlags::from_usage(info.usage));
            let skip = match flag {
                FilterFlag::NotIn => listed,
                FilterFlag::OnlyIn => !listed,
            };
            if skip {
                self.skip |= 1u64 << idx;
            }
        }
    }
}
