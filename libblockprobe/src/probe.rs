use std::{
    collections::VecDeque,
    fmt,
    fs::File,
    io::{Error as IoError, ErrorKind as IoErrorKind, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use bitflags::bitflags;
use rustix::{
    fd::AsFd,
    fs::{Dev, FileType, Mode, fstat, major, minor},
};
use zerocopy::FromBytes;

#[cfg(target_os = "linux")]
use crate::ioctl::{OpalStatusFlags, ioctl_blkgetzonesz, ioctl_ioc_opal_get_status};
use crate::ioctl::{device_size_bytes, logical_sector_size};

use crate::{
    BlockidError,
    containers::{
        bitlocker::BITLOCKER_ID_INFO,
        fvault2::FVAULT2_ID_INFO,
        luks::{LUKS1_ID_INFO, LUKS2_ID_INFO},
        lvm::LVM2_ID_INFO,
        md_raid::MD_RAID_ID_INFO,
        mpool::MPOOL_ID_INFO,
        stratis::STRATIS_ID_INFO,
    },
    filesystems::{
        befs::BEFS_ID_INFO,
        btrfs::BTRFS_ID_INFO,
        exfat::EXFAT_ID_INFO,
        ext::{EXT2_ID_INFO, EXT3_ID_INFO, EXT4_ID_INFO, JBD_ID_INFO},
        f2fs::F2FS_ID_INFO,
        iso9660::ISO9660_ID_INFO,
        linux_swap::{LINUX_SWAP_V0_ID_INFO, LINUX_SWAP_V1_ID_INFO, SWSUSPEND_ID_INFO},
        minix::MINIX_ID_INFO,
        nilfs2::NILFS2_ID_INFO,
        ntfs::NTFS_ID_INFO,
        reiserfs::REISERFS_ID_INFO,
        scoutfs::{SCOUTFS_DATA_ID_INFO, SCOUTFS_META_ID_INFO},
        squashfs::SQUASHFS_ID_INFO,
        udf::UDF_ID_INFO,
        vfat::VFAT_ID_INFO,
        xfs::{XFS_ID_INFO, XFS_LOG_ID_INFO},
        zfs::ZFS_ID_INFO,
    },
    filter::ChainFilter,
    partitions::{dos::DOS_PT_ID_INFO, gpt::GPT_PT_ID_INFO},
    values::{ProbeValues, SavedValues, TagFlags, TagName},
};

/// Probe table defining the order of detection attempts.
///
/// Containers and crypto layers come first so a stale filesystem
/// superblock inside a member region never wins over the layer above it,
/// then partition table signatures, then swap, then filesystems.
pub const PROBES: &[BlockidIdinfo] = &[
    MD_RAID_ID_INFO,
    LVM2_ID_INFO,
    LUKS1_ID_INFO,
    LUKS2_ID_INFO,
    FVAULT2_ID_INFO,
    BITLOCKER_ID_INFO,
    STRATIS_ID_INFO,
    MPOOL_ID_INFO,
    GPT_PT_ID_INFO,
    DOS_PT_ID_INFO,
    LINUX_SWAP_V0_ID_INFO,
    LINUX_SWAP_V1_ID_INFO,
    SWSUSPEND_ID_INFO,
    ZFS_ID_INFO,
    BEFS_ID_INFO,
    JBD_ID_INFO,
    EXT4_ID_INFO,
    EXT3_ID_INFO,
    EXT2_ID_INFO,
    XFS_ID_INFO,
    XFS_LOG_ID_INFO,
    BTRFS_ID_INFO,
    NILFS2_ID_INFO,
    F2FS_ID_INFO,
    MINIX_ID_INFO,
    REISERFS_ID_INFO,
    NTFS_ID_INFO,
    EXFAT_ID_INFO,
    VFAT_ID_INFO,
    UDF_ID_INFO,
    ISO9660_ID_INFO,
    SQUASHFS_ID_INFO,
    SCOUTFS_META_ID_INFO,
    SCOUTFS_DATA_ID_INFO,
];

/// Block devices below this are flagged [`ProbeFlags::TINY_DEV`].
const TINY_DEV_SIZE: u64 = 1024 * 1024;

/* Cached reads are rounded out to this granularity. */
const BUFFER_CHUNK: u64 = 1024;
const BUFFER_SLOTS: usize = 8;

#[derive(Debug)]
struct ProbeBuffer {
    off: u64,
    data: Vec<u8>,
}

impl ProbeBuffer {
    fn covers(&self, off: u64, len: u64) -> bool {
        off >= self.off && off + len <= self.off + self.data.len() as u64
    }
}

/// Outcome of a driver call: either a probe matched and the value list
/// holds its tags, or the registry is exhausted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProbeOutcome {
    Found,
    Nothing,
}

/// Represents a probe session on a file or block device.
///
/// A [`Probe`] provides access to the underlying file or device, keeps a
/// small cache of read buffers, and stores the tags of the detected
/// container, partition table signature, or filesystem.
///
/// Reads are always relative to the probing window `[offset, offset+size)`;
/// a request past the end of the window fails with `UnexpectedEof`, which
/// probes treat as "no match".
#[derive(Debug)]
pub struct Probe {
    file: File,
    path: PathBuf,
    offset: u64,
    size: u64,
    io_size: i64,

    devno: Dev,
    disk_devno: Dev,
    sector_size: u64,
    mode: Mode,
    zone_size: u64,

    flags: ProbeFlags,
    filter: ChainFilter,
    chain_idx: Option<usize>,
    buffers: VecDeque<ProbeBuffer>,
    values: ProbeValues,
}

impl Probe {
    /// Returns the short names of all supported probes, in chain order.
    pub fn supported_names() -> impl Iterator<Item = &'static str> {
        PROBES.iter().map(|info| info.name)
    }

    /// Create a probe from a [`File`].
    ///
    /// - Reads file metadata via [`fstat`](rustix::fs::fstat).
    /// - If the file is a block device, queries the logical sector size,
    ///   total size and (Linux) zone size via ioctls, each with graceful
    ///   fallback.
    /// - If the file is not a block device, the sector size defaults to
    ///   `512` and the size comes from [`fstat`](rustix::fs::fstat).
    ///
    /// `size` restricts the probing window; `None` means "rest of the
    /// device after `offset`".
    pub fn new(
        file: File,
        path: &Path,
        offset: u64,
        size: Option<u64>,
    ) -> Result<Probe, BlockidError> {
        let stat = fstat(file.as_fd())?;
        let is_blkdev = FileType::from_raw_mode(stat.st_mode).is_block_device();

        let (sector_size, whole_size) = if is_blkdev {
            (
                u64::from(logical_sector_size(file.as_fd())),
                device_size_bytes(&file)?,
            )
        } else {
            (512, stat.st_size as u64)
        };

        #[cfg(target_os = "linux")]
        let zone_size = if is_blkdev {
            u64::from(ioctl_blkgetzonesz(file.as_fd()).unwrap_or(0)) << 9
        } else {
            0
        };
        #[cfg(not(target_os = "linux"))]
        let zone_size = 0;

        let window = whole_size.saturating_sub(offset);
        let size = match size {
            Some(s) if s != 0 => s.min(window),
            _ => window,
        };

        let mut flags = ProbeFlags::empty();
        if is_blkdev && size < TINY_DEV_SIZE {
            flags.insert(ProbeFlags::TINY_DEV);
        }
        if zone_size != 0 {
            flags.insert(ProbeFlags::ZONED_DEV);
        }
        #[cfg(target_os = "linux")]
        if is_blkdev {
            match major(stat.st_rdev) {
                11 => flags.insert(ProbeFlags::CDROM_DEV),
                2 => flags.insert(ProbeFlags::FLOPPY_DEV),
                _ => (),
            }
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            offset,
            size,
            /* Some architectures use a different integer size for blksize in stat */
            #[allow(clippy::useless_conversion)]
            io_size: stat.st_blksize.into(),
            devno: stat.st_rdev,
            disk_devno: stat.st_dev,
            sector_size,
            mode: Mode::from(stat.st_mode),
            zone_size,
            flags,
            filter: ChainFilter::default(),
            chain_idx: None,
            buffers: VecDeque::new(),
            values: ProbeValues::new(),
        })
    }

    /// Create a probe from a file path, opened read-only.
    pub fn from_filename(filename: &Path) -> Result<Probe, BlockidError> {
        let file = File::open(filename)?;

        let probe = Probe::new(file, filename, 0, None)?;

        return Ok(probe);
    }

    /// Serve `len` bytes at window-relative `off`, reading through the
    /// buffer cache. Repeated requests for the same range do not reissue
    /// I/O.
    fn get_buffer(&mut self, off: u64, len: u64) -> Result<&[u8], IoError> {
        if len == 0 {
            return Err(IoErrorKind::InvalidInput.into());
        }
        let end = off
            .checked_add(len)
            .ok_or(IoError::from(IoErrorKind::UnexpectedEof))?;
        if end > self.size {
            return Err(IoErrorKind::UnexpectedEof.into());
        }

        if let Some(pos) = self.buffers.iter().position(|b| b.covers(off, len)) {
            if pos != 0 {
                let hit = self.buffers.remove(pos).ok_or(IoErrorKind::NotFound)?;
                self.buffers.push_front(hit);
            }
        } else {
            let lo = off & !(BUFFER_CHUNK - 1);
            let hi = end
                .checked_add(BUFFER_CHUNK - 1)
                .map(|e| (e & !(BUFFER_CHUNK - 1)).min(self.size))
                .ok_or(IoError::from(IoErrorKind::UnexpectedEof))?;

            let mut data = vec![0u8; (hi - lo) as usize];
            self.file.seek(SeekFrom::Start(self.offset + lo))?;
            self.file.read_exact(&mut data)?;

            self.buffers.push_front(ProbeBuffer { off: lo, data });
            while self.buffers.len() > BUFFER_SLOTS {
                self.buffers.pop_back();
            }
        }

        let buf = self
            .buffers
            .front()
            .ok_or(IoError::from(IoErrorKind::NotFound))?;
        let start = (off - buf.off) as usize;
        return Ok(&buf.data[start..start + len as usize]);
    }

    /// Drops all cached buffers.
    pub fn reset_buffers(&mut self) {
        self.buffers.clear();
    }

    pub(crate) fn read_exact_at<const S: usize>(
        &mut self,
        offset: u64,
    ) -> Result<[u8; S], IoError> {
        let mut buffer = [0u8; S];
        buffer.copy_from_slice(self.get_buffer(offset, S as u64)?);

        return Ok(buffer);
    }

    pub(crate) fn read_vec_at(&mut self, offset: u64, buf_size: usize) -> Result<Vec<u8>, IoError> {
        return Ok(self.get_buffer(offset, buf_size as u64)?.to_vec());
    }

    pub(crate) fn map_from_file<T: FromBytes>(&mut self, offset: u64) -> Result<T, IoError> {
        let buffer = self.get_buffer(offset, core::mem::size_of::<T>() as u64)?;

        let data = T::read_from_bytes(buffer).map_err(|_| IoErrorKind::UnexpectedEof)?;

        return Ok(data);
    }

    /// Absolute window-relative offset of a magic descriptor, resolving
    /// the zone selector against the device's zone size.
    pub(crate) fn magic_offset(&self, magic: &BlockidMagic) -> u64 {
        match magic.zone {
            Some(zonenum) => zonenum * self.zone_size + magic.b_offset,
            None => magic.b_offset,
        }
    }

    /// Look up and validate a block magic.
    ///
    /// Reads up to [`BlockidMagic::len`] bytes at each descriptor's offset
    /// and compares against the expected pattern.
    ///
    /// # Returns
    /// - `Ok(Some(BlockidMagic))` if a match is found.
    /// - `Ok(None)` if no magics are defined (handler validates).
    /// - `Err(IoError)` with kind `NotFound` if no magic matched, or the
    ///   underlying I/O error.
    pub(crate) fn get_magic(
        &mut self,
        id_info: &BlockidIdinfo,
    ) -> Result<Option<BlockidMagic>, IoError> {
        match id_info.magics {
            Some(magics) => {
                for magic in magics {
                    if magic.zone.is_some() && self.zone_size == 0 {
                        continue;
                    }
                    let off = self.magic_offset(magic);
                    let buffer = match self.get_buffer(off, magic.len as u64) {
                        Ok(buffer) => buffer,
                        /* magic past the end of a small device is a miss */
                        Err(e) if e.kind() == IoErrorKind::UnexpectedEof => continue,
                        Err(e) => return Err(e),
                    };

                    if buffer == magic.magic {
                        return Ok(Some(*magic));
                    }
                }
            }
            None => return Ok(None),
        }

        return Err(IoErrorKind::NotFound.into());
    }

    /// Advance to the next probe in the registry.
    ///
    /// On a match the value list carries the probe's tags plus the
    /// driver-owned `TYPE`, `USAGE`, `SBMAGIC` and `SBMAGIC_OFFSET`
    /// (or `PTTYPE` for partition table signatures) and the call returns
    /// [`ProbeOutcome::Found`]. When the registry is exhausted it returns
    /// [`ProbeOutcome::Nothing`]. Handler rejections clear the value list
    /// and move on; genuine I/O failures propagate.
    pub fn do_probe(&mut self) -> Result<ProbeOutcome, BlockidError> {
        let start = self.chain_idx.map_or(0, |idx| idx + 1);

        for idx in start..PROBES.len() {
            self.chain_idx = Some(idx);
            let info = &PROBES[idx];

            if self.flags.contains(ProbeFlags::NOSCAN_DEV) {
                break;
            }
            if self.filter.is_skipped(idx) {
                continue;
            }
            if let Some(minsz) = info.minsz
                && minsz > self.size
            {
                continue;
            }
            if self.flags.contains(ProbeFlags::CDROM_DEV)
                && matches!(info.usage, UsageType::Raid | UsageType::Other(_))
            {
                continue;
            }
            if self.flags.contains(ProbeFlags::FLOPPY_DEV) && info.usage == UsageType::Raid {
                continue;
            }
            if self.flags.contains(ProbeFlags::IGNORE_PT)
                && info.usage == UsageType::PartitionTable
            {
                continue;
            }

            self.values.clear();

            let magic = match self.get_magic(info) {
                Ok(Some(magic)) => magic,
                Ok(None) => BlockidMagic::EMPTY_MAGIC,
                Err(e)
                    if matches!(e.kind(), IoErrorKind::NotFound | IoErrorKind::UnexpectedEof) =>
                {
                    continue;
                }
                Err(e) => return Err(BlockidError::from(e)),
            };

            log::debug!("probing {} at {:?}", info.name, self.path);

            match (info.probe_fn)(self, magic) {
                Ok(()) => {
                    self.finalize_match(info, magic);
                    log::debug!("{} matched {:?}", info.name, self.path);
                    return Ok(ProbeOutcome::Found);
                }
                Err(e) if e.is_fatal_io() => {
                    self.values.clear();
                    return Err(e);
                }
                Err(e) => {
                    log::debug!("{} rejected {:?}: {e}", info.name, self.path);
                    self.values.clear();
                }
            }
        }

        self.chain_idx = Some(PROBES.len());
        return Ok(ProbeOutcome::Nothing);
    }

    /// Run the whole chain and settle on one answer.
    ///
    /// - On a tiny device the first match wins.
    /// - A RAID or crypto match wins immediately; nothing beneath that
    ///   layer is considered.
    /// - Two or more non-tolerant matches produce
    ///   [`BlockidError::AmbivalentProbe`], which is distinct from
    ///   [`ProbeOutcome::Nothing`].
    /// - Otherwise the first match's tags are restored and returned.
    pub fn do_safeprobe(&mut self) -> Result<ProbeOutcome, BlockidError> {
        self.reset_chain();

        #[cfg(target_os = "linux")]
        if self.is_block_device() && self.is_opal_locked().unwrap_or(false) {
            log::warn!("{:?} is OPAL locked, not probing", self.path);
            self.flags.insert(ProbeFlags::NOSCAN_DEV);
            return Ok(ProbeOutcome::Nothing);
        }

        let mut count = 0usize;
        let mut intolerable = 0usize;
        let mut first: Option<SavedValues> = None;

        loop {
            match self.do_probe()? {
                ProbeOutcome::Nothing => break,
                ProbeOutcome::Found => {
                    let info = &PROBES[self.chain_idx.unwrap_or(0)];
                    count += 1;

                    if !info.tolerant {
                        intolerable += 1;
                    }
                    if first.is_none() {
                        first = Some(self.values.save());
                    }

                    if self.flags.contains(ProbeFlags::TINY_DEV) {
                        break;
                    }
                    if matches!(info.usage, UsageType::Raid | UsageType::Crypto) {
                        break;
                    }
                }
            }
        }

        if count == 0 {
            return Ok(ProbeOutcome::Nothing);
        }
        if intolerable > 1 {
            self.values.clear();
            return Err(BlockidError::AmbivalentProbe(intolerable));
        }
        if let Some(saved) = first {
            self.values.restore(saved);
        }
        return Ok(ProbeOutcome::Found);
    }

    /// Rewind the chain so the registry can be walked again, clearing the
    /// value list and the per-run flags.
    pub fn reset_chain(&mut self) {
        self.chain_idx = None;
        self.values.clear();
        self.flags.remove(ProbeFlags::IGNORE_PT);
    }

    fn finalize_match(&mut self, info: &BlockidIdinfo, magic: BlockidMagic) {
        if info.usage == UsageType::PartitionTable {
            self.values.set_string(TagName::PtType, info.name);
        } else {
            if self.values.flags().contains(TagFlags::TYPE) {
                self.values.set_string(TagName::Type, info.name);
            }
            if self.values.flags().contains(TagFlags::USAGE) {
                let usage = info.usage.to_string();
                self.values.set_string(TagName::Usage, &usage);
            }
            if magic.len != 0 && self.values.flags().contains(TagFlags::MAGIC) {
                self.values.set_value(TagName::Sbmagic, magic.magic);
                let off = self.magic_offset(&magic).to_string();
                self.values.set_string(TagName::SbmagicOffset, &off);
            }
        }

        if matches!(info.usage, UsageType::Raid | UsageType::Crypto) {
            self.flags.insert(ProbeFlags::IGNORE_PT);
        }
    }

    /// Tags of the current match.
    pub fn values(&self) -> &ProbeValues {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut ProbeValues {
        &mut self.values
    }

    /// Selects which tag names probing runs may emit.
    pub fn set_tag_flags(&mut self, flags: TagFlags) {
        self.values.set_flags(flags);
    }

    /// Restricts which probes the chain runs.
    pub fn set_filter(&mut self, filter: ChainFilter) {
        self.filter = filter;
    }

    pub fn filter_mut(&mut self) -> &mut ChainFilter {
        &mut self.filter
    }

    /// Returns the path of the probed file or device as a [`Path`].
    #[inline]
    pub fn path(&self) -> &Path {
        return self.path.as_path();
    }

    /// Returns the size in bytes of the probing window.
    #[inline]
    pub fn size(&self) -> u64 {
        return self.size;
    }

    /// Returns the starting offset in bytes used for this probe.
    #[inline]
    pub fn offset(&self) -> u64 {
        return self.offset;
    }

    /// Returns the logical sector size in bytes of the device.
    #[inline]
    pub fn ssz(&self) -> u64 {
        return self.sector_size;
    }

    /// Returns the zone size in bytes of the block device, `0` when the
    /// device is not zoned.
    #[inline]
    pub fn zsz(&self) -> u64 {
        return self.zone_size;
    }

    /// Returns the device number of the probed file.
    #[inline]
    pub fn devno(&self) -> Dev {
        return self.devno;
    }

    /// Returns the major number of the probed device.
    #[inline]
    pub fn devno_maj(&self) -> u32 {
        return major(self.devno);
    }

    /// Returns the minor number of the probed device.
    #[inline]
    pub fn devno_min(&self) -> u32 {
        return minor(self.devno);
    }

    /// Returns the device number of the disk containing the probed file.
    #[inline]
    pub fn disk_devno(&self) -> Dev {
        return self.disk_devno;
    }

    /// Returns if the probed file is a block device.
    #[inline]
    pub fn is_block_device(&self) -> bool {
        return FileType::from_raw_mode(self.mode.as_raw_mode()).is_block_device();
    }

    /// Returns if the probed file is a regular file.
    #[inline]
    pub fn is_regular_file(&self) -> bool {
        return FileType::from_raw_mode(self.mode.as_raw_mode()).is_file();
    }

    /// On Linux only:
    /// - queries OPAL device status via ioctl (if not already checked).
    /// - sets `ProbeFlags::OPAL_CHECKED` and conditionally `OPAL_LOCKED`.
    /// - returns whether the device is currently OPAL locked.
    #[cfg(target_os = "linux")]
    pub(crate) fn is_opal_locked(&mut self) -> Result<bool, rustix::io::Errno> {
        if !self.flags.contains(ProbeFlags::OPAL_CHECKED) {
            let status = ioctl_ioc_opal_get_status(self.file.as_fd())?;

            if status.flags.contains(OpalStatusFlags::OPAL_FL_LOCKED) {
                self.flags.insert(ProbeFlags::OPAL_LOCKED);
            }

            self.flags.insert(ProbeFlags::OPAL_CHECKED);
        }

        return Ok(self.flags.contains(ProbeFlags::OPAL_LOCKED));
    }

    /// Returns current Probe flags.
    pub fn flags(&self) -> ProbeFlags {
        self.flags
    }

    pub(crate) fn flags_mut(&mut self) -> &mut ProbeFlags {
        &mut self.flags
    }

    /// Returns [`File`] being probed.
    pub fn file(&mut self) -> &File {
        &self.file
    }
}

bitflags! {
    /// Flags controlling the behavior of a [`Probe`].
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
    pub struct ProbeFlags: u64 {
        /// The device is too small for most formats; first match wins.
        const TINY_DEV = 1 << 0;
        /// Marks that the OPAL status has been checked.
        const OPAL_CHECKED = 1 << 1;
        /// Marks that the device is OPAL locked.
        const OPAL_LOCKED = 1 << 2;
        /// Forces GPT detection even if the protective MBR is missing.
        const FORCE_GPT_PMBR = 1 << 3;
        /// The device is a CD/DVD drive.
        const CDROM_DEV = 1 << 4;
        /// The device is a floppy drive.
        const FLOPPY_DEV = 1 << 5;
        /// The device reports a non-zero zone size.
        const ZONED_DEV = 1 << 6;
        /// Skip all probes (set for locked devices).
        const NOSCAN_DEV = 1 << 7;
        /// A RAID or crypto layer matched; ignore partition table
        /// signatures for the rest of the walk.
        const IGNORE_PT = 1 << 8;
    }
}

#[derive(Debug, Copy, Clone)]
pub struct BlockidIdinfo {
    /// Short lowercase tag the driver publishes as `TYPE`.
    pub name: &'static str,
    pub usage: UsageType,
    /// Refuse devices smaller than this.
    pub minsz: Option<u64>,
    /// A tolerant probe's match never makes the result ambivalent.
    pub tolerant: bool,
    pub probe_fn: ProbeFn,
    pub magics: Option<&'static [BlockidMagic]>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum UsageType {
    Filesystem,
    PartitionTable,
    Raid,
    Crypto,
    Other(&'static str),
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem => write!(f, "filesystem"),
            Self::PartitionTable => write!(f, "partition-table"),
            Self::Raid => write!(f, "raid"),
            Self::Crypto => write!(f, "crypto"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Endianness {
    Little,
    Big,
    /// Matches the host byte order.
    Native,
    /// Swapped relative to the host byte order.
    Other,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Little => write!(f, "little"),
            Self::Big => write!(f, "big"),
            Self::Native => write!(f, "native"),
            Self::Other => write!(f, "other"),
        }
    }
}

pub type ProbeFn = fn(&mut Probe, BlockidMagic) -> Result<(), BlockidError>;

/// Represents a magic identifier for a block format.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BlockidMagic {
    /// The magic value as a byte slice.
    pub magic: &'static [u8],
    /// Number of magic bytes compared.
    pub len: usize,
    /// Offset of the magic value, relative to the window start, or to the
    /// start of the selected zone when `zone` is set.
    pub b_offset: u64,
    /// Zone index for zoned-device formats.
    pub zone: Option<u64>,
}

impl BlockidMagic {
    /// An empty [`BlockidMagic`] used when a probe has no magic list.
    pub const EMPTY_MAGIC: BlockidMagic = BlockidMagic {
        magic: &[0],
        len: 0,
        b_offset: 0,
        zone: None,
    };
}
