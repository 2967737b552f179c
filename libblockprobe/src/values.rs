use std::{borrow::Cow, fmt};

use bitflags::bitflags;
use uuid::Uuid;

use crate::{
    probe::Endianness,
    util::{decode_latin1_lossy_from, decode_utf16_lossy_from},
};

/// Tag names a probe result may carry.
///
/// The vocabulary is closed: probes can only publish values under one of
/// these names, which keeps the output of every probe uniform.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TagName {
    Type,
    SecType,
    Label,
    LabelRaw,
    Uuid,
    UuidRaw,
    UuidSub,
    LogUuid,
    ExtJournal,
    Version,
    Usage,
    Sbmagic,
    SbmagicOffset,
    BlockSize,
    FsBlockSize,
    FsLastBlock,
    FsSize,
    Endianness,
    PtType,
    PtUuid,
    SystemId,
    PublisherId,
    ApplicationId,
    BootSystemId,
    DataPreparerId,
    VolumeId,
    VolumeSetId,
    LogicalVolumeId,
    PoolUuid,
    BlockdevSectors,
    BlockdevInittime,
    Fsid,
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Type => "TYPE",
            Self::SecType => "SEC_TYPE",
            Self::Label => "LABEL",
            Self::LabelRaw => "LABEL_RAW",
            Self::Uuid => "UUID",
            Self::UuidRaw => "UUID_RAW",
            Self::UuidSub => "UUID_SUB",
            Self::LogUuid => "LOGUUID",
            Self::ExtJournal => "EXT_JOURNAL",
            Self::Version => "VERSION",
            Self::Usage => "USAGE",
            Self::Sbmagic => "SBMAGIC",
            Self::SbmagicOffset => "SBMAGIC_OFFSET",
            Self::BlockSize => "BLOCK_SIZE",
            Self::FsBlockSize => "FS_BLOCKSIZE",
            Self::FsLastBlock => "FS_LASTBLOCK",
            Self::FsSize => "FS_SIZE",
            Self::Endianness => "ENDIANNESS",
            Self::PtType => "PTTYPE",
            Self::PtUuid => "PTUUID",
            Self::SystemId => "SYSTEM_ID",
            Self::PublisherId => "PUBLISHER_ID",
            Self::ApplicationId => "APPLICATION_ID",
            Self::BootSystemId => "BOOT_SYSTEM_ID",
            Self::DataPreparerId => "DATA_PREPARER_ID",
            Self::VolumeId => "VOLUME_ID",
            Self::VolumeSetId => "VOLUME_SET_ID",
            Self::LogicalVolumeId => "LOGICAL_VOLUME_ID",
            Self::PoolUuid => "POOL_UUID",
            Self::BlockdevSectors => "BLOCKDEV_SECTORS",
            Self::BlockdevInittime => "BLOCKDEV_INITTIME",
            Self::Fsid => "FSID",
        };
        write!(f, "{name}")
    }
}

bitflags! {
    /// Selects which tag names a probing run is allowed to emit.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct TagFlags: u32 {
        const LABEL = 1 << 0;
        const LABEL_RAW = 1 << 1;
        const UUID = 1 << 2;
        const UUID_RAW = 1 << 3;
        const TYPE = 1 << 4;
        const SEC_TYPE = 1 << 5;
        const USAGE = 1 << 6;
        const VERSION = 1 << 7;
        const MAGIC = 1 << 8;
        /// FS_SIZE, FS_LASTBLOCK, FS_BLOCKSIZE and BLOCK_SIZE.
        const FS_INFO = 1 << 9;
    }
}

impl Default for TagFlags {
    fn default() -> Self {
        TagFlags::all()
    }
}

/// Character encoding of an on-disk label.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LabelEncoding {
    Latin1,
    Utf16Le,
    Utf16Be,
}

/// One stored tag.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProbeValue {
    name: TagName,
    data: Vec<u8>,
}

impl ProbeValue {
    pub fn name(&self) -> TagName {
        self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Value as text, lossily decoded for display.
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// Ordered list of tags collected by the running probe, plus the wiper
/// range recording where the matched signature lives on disk.
///
/// The list is cleared before every probe attempt and whenever a probe
/// rejects the device, so it only ever describes a single match.
#[derive(Debug, Default, Clone)]
pub struct ProbeValues {
    values: Vec<ProbeValue>,
    wiper: Option<(u64, u64)>,
    flags: TagFlags,
}

impl ProbeValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flags(&mut self, flags: TagFlags) {
        self.flags = flags;
    }

    pub fn flags(&self) -> TagFlags {
        self.flags
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.wiper = None;
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProbeValue> {
        self.values.iter()
    }

    pub fn lookup(&self, name: TagName) -> Option<&[u8]> {
        self.values
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.data.as_slice())
    }

    pub fn lookup_string(&self, name: TagName) -> Option<String> {
        self.lookup(name)
            .map(|data| String::from_utf8_lossy(data).to_string())
    }

    /// Stores `data` under `name`, replacing any previous value.
    pub fn set_value(&mut self, name: TagName, data: &[u8]) {
        if let Some(v) = self.values.iter_mut().find(|v| v.name == name) {
            v.data = data.to_vec();
        } else {
            self.values.push(ProbeValue {
                name,
                data: data.to_vec(),
            });
        }
    }

    pub fn set_string(&mut self, name: TagName, data: &str) {
        self.set_value(name, data.as_bytes());
    }

    /// Stores the raw label bytes under LABEL_RAW, then the trimmed
    /// rendition under LABEL. An empty trimmed label is discarded.
    pub fn set_label(&mut self, data: &[u8]) {
        if self.flags.contains(TagFlags::LABEL_RAW) {
            self.set_value(TagName::LabelRaw, data);
        }
        if !self.flags.contains(TagFlags::LABEL) {
            return;
        }

        let end = data
            .iter()
            .rposition(|&b| b != 0 && b != b' ')
            .map_or(0, |p| p + 1);

        if end != 0 {
            let label = String::from_utf8_lossy(&data[..end]);
            self.set_value(TagName::Label, label.as_bytes());
        }
    }

    /// Decodes `data` from its on-disk encoding and stores it like
    /// [`ProbeValues::set_label`].
    pub fn set_utf8_label(&mut self, data: &[u8], encoding: LabelEncoding) {
        let decoded = match encoding {
            LabelEncoding::Latin1 => decode_latin1_lossy_from(data),
            LabelEncoding::Utf16Le => {
                decode_utf16_lossy_from(data, Endianness::Little).to_string()
            }
            LabelEncoding::Utf16Be => decode_utf16_lossy_from(data, Endianness::Big).to_string(),
        };

        if self.flags.contains(TagFlags::LABEL_RAW) {
            self.set_value(TagName::LabelRaw, data);
        }

        let label = decoded.trim_end_matches(['\0', ' ']);
        if !label.is_empty() && self.flags.contains(TagFlags::LABEL) {
            self.set_value(TagName::Label, label.as_bytes());
        }
    }

    /// Stores a binary UUID under UUID_RAW and its DCE text form under
    /// UUID. All-zero UUIDs are discarded.
    pub fn set_uuid(&mut self, uuid: &[u8; 16]) {
        if uuid.iter().all(|&b| b == 0) {
            return;
        }
        if self.flags.contains(TagFlags::UUID_RAW) {
            self.set_value(TagName::UuidRaw, uuid);
        }
        if self.flags.contains(TagFlags::UUID) {
            let text = Uuid::from_bytes(*uuid).to_string();
            self.set_value(TagName::Uuid, text.as_bytes());
        }
    }

    /// Stores a binary UUID in DCE text form under an explicit tag name.
    /// All-zero UUIDs are discarded. No raw copy is kept.
    pub fn set_uuid_as(&mut self, name: TagName, uuid: &[u8; 16]) {
        if uuid.iter().all(|&b| b == 0) {
            return;
        }
        let text = Uuid::from_bytes(*uuid).to_string();
        self.set_value(name, text.as_bytes());
    }

    /// Stores a pre-formatted UUID string (FAT serials, decimal GUIDs).
    pub fn set_string_uuid(&mut self, name: TagName, uuid: &str) {
        if uuid.is_empty() {
            return;
        }
        self.set_value(name, uuid.as_bytes());
    }

    /// Stores a NUL-padded on-disk UUID text field, trimmed.
    pub fn strncpy_uuid(&mut self, name: TagName, data: &[u8]) {
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        if end != 0 {
            let text = String::from_utf8_lossy(&data[..end]);
            self.set_value(name, text.trim_end().as_bytes());
        }
    }

    pub fn set_sec_type(&mut self, sec_type: &str) {
        if self.flags.contains(TagFlags::SEC_TYPE) {
            self.set_string(TagName::SecType, sec_type);
        }
    }

    pub fn set_version(&mut self, version: &str) {
        if self.flags.contains(TagFlags::VERSION) {
            self.set_string(TagName::Version, version);
        }
    }

    pub fn set_block_size(&mut self, size: u64) {
        if self.flags.contains(TagFlags::FS_INFO) {
            self.set_string(TagName::BlockSize, &size.to_string());
        }
    }

    pub fn set_fs_block_size(&mut self, size: u64) {
        if self.flags.contains(TagFlags::FS_INFO) {
            self.set_string(TagName::FsBlockSize, &size.to_string());
        }
    }

    pub fn set_fs_size(&mut self, size: u64) {
        if self.flags.contains(TagFlags::FS_INFO) {
            self.set_string(TagName::FsSize, &size.to_string());
        }
    }

    pub fn set_fs_last_block(&mut self, block: u64) {
        if self.flags.contains(TagFlags::FS_INFO) {
            self.set_string(TagName::FsLastBlock, &block.to_string());
        }
    }

    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.set_string(TagName::Endianness, &endianness.to_string());
    }

    /// Records the on-disk region of the matched signature.
    pub fn set_wiper(&mut self, offset: u64, len: u64) {
        self.wiper = Some((offset, len));
    }

    pub fn wiper(&self) -> Option<(u64, u64)> {
        self.wiper
    }

    /// Snapshot of the full list, used to keep the first match while the
    /// chain keeps walking.
    pub fn save(&self) -> SavedValues {
        SavedValues {
            values: self.values.clone(),
            wiper: self.wiper,
        }
    }

    pub fn restore(&mut self, saved: SavedValues) {
        self.values = saved.values;
        self.wiper = saved.wiper;
    }
}

/// Opaque snapshot returned by [`ProbeValues::save`].
#[derive(Debug, Clone)]
pub struct SavedValues {
    values: Vec<ProbeValue>,
    wiper: Option<(u64, u64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_trims_trailing_padding() {
        let mut values = ProbeValues::new();
        values.set_label(b"boot       ");

        assert_eq!(values.lookup(TagName::Label), Some(b"boot".as_slice()));
        assert_eq!(
            values.lookup(TagName::LabelRaw),
            Some(b"boot       ".as_slice())
        );
    }

    #[test]
    fn empty_label_is_discarded() {
        let mut values = ProbeValues::new();
        values.set_label(&[0u8; 11]);

        assert_eq!(values.lookup(TagName::Label), None);
        assert!(values.lookup(TagName::LabelRaw).is_some());
    }

    #[test]
    fn zero_uuid_is_discarded() {
        let mut values = ProbeValues::new();
        values.set_uuid(&[0u8; 16]);

        assert!(values.lookup(TagName::Uuid).is_none());
        assert!(values.lookup(TagName::UuidRaw).is_none());
    }

    #[test]
    fn uuid_renders_dce_form() {
        let mut values = ProbeValues::new();
        values.set_uuid(&[
            0xd6, 0x5b, 0x25, 0x5e, 0xb2, 0x33, 0x43, 0x3c, 0x82, 0x22, 0xfa, 0x3c, 0xa6, 0x55,
            0xa4, 0xbf,
        ]);

        assert_eq!(
            values.lookup_string(TagName::Uuid).as_deref(),
            Some("d65b255e-b233-433c-8222-fa3ca655a4bf")
        );
    }

    #[test]
    fn save_restore_round_trip() {
        let mut values = ProbeValues::new();
        values.set_string(TagName::Type, "ext4");
        values.set_wiper(1024, 2);
        let saved = values.save();

        values.clear();
        values.set_string(TagName::Type, "xfs");

        values.restore(saved);
        assert_eq!(values.lookup_string(TagName::Type).as_deref(), Some("ext4"));
        assert_eq!(values.wiper(), Some((1024, 2)));
    }

    #[test]
    fn utf16_label_is_decoded() {
        let mut values = ProbeValues::new();
        let raw: Vec<u8> = "data".encode_utf16().flat_map(u16::to_be_bytes).collect();
        values.set_utf8_label(&raw, LabelEncoding::Utf16Be);

        assert_eq!(values.lookup(TagName::Label), Some(b"data".as_slice()));
    }
}
