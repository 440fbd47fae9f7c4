//! Block devices and the attribute surface they share.
//!
//! A `Device` holds the data common to every variant plus a `DeviceKind`
//! carrying the variant-specific payload. Attributes that depend on the rest
//! of the graph (leaf status, membership, volume lookup) are answered by
//! `graph::DeviceRef`.

use std::fmt::Display;

use strum_macros::{EnumIter, IntoStaticStr};

use sysdefs::osuuid::OsUuid;

use crate::{
    btrfs::devices::{BtrfsSnapShot, BtrfsSubVolume, BtrfsVolume},
    primitives::size::Size,
    raid::mdraid::MdArray,
};

pub mod format;
pub mod parents;
pub mod plain;

pub use format::Format;
pub use parents::ParentList;

/// Stable string tag of each device variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, IntoStaticStr, EnumIter)]
pub enum DeviceType {
    /// A generic block device, such as a partition.
    #[strum(serialize = "storage")]
    Storage,

    /// A whole disk
    #[strum(serialize = "disk")]
    Disk,

    /// An optical drive
    #[strum(serialize = "cdrom")]
    Optical,

    /// An MD container grouping disks for firmware RAID sets
    #[strum(serialize = "mdcontainer")]
    MdContainer,

    /// A software RAID array
    #[strum(serialize = "mdarray")]
    MdArray,

    /// A firmware (BIOS) RAID set living in an MD container
    #[strum(serialize = "mdbiosraidarray")]
    MdBiosRaidArray,

    #[strum(serialize = "btrfs volume")]
    BtrfsVolume,

    #[strum(serialize = "btrfs subvolume")]
    BtrfsSubVolume,

    #[strum(serialize = "btrfs snapshot")]
    BtrfsSnapShot,
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", <&'static str>::from(self))
    }
}

bitflags::bitflags! {
    /// Bitflags for device types
    ///
    /// MUST MATCH THE CONTENTS OF DeviceType
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceTypeFlag: u32 {
        const Storage = 1;
        const Disk = 1 << 1;
        const Optical = 1 << 2;
        const MdContainer = 1 << 3;
        const MdArray = 1 << 4;
        const MdBiosRaidArray = 1 << 5;
        const BtrfsVolume = 1 << 6;
        const BtrfsSubVolume = 1 << 7;
        const BtrfsSnapShot = 1 << 8;

        /// Devices that can act as a btrfs subvolume: the volume itself is
        /// the top-level subvolume.
        const BtrfsSubVolumeLike = Self::BtrfsVolume.bits()
            | Self::BtrfsSubVolume.bits()
            | Self::BtrfsSnapShot.bits();
    }
}

bitflags::bitflags! {
    /// Static capabilities of a device type.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const Disk = 1;
        const Partitionable = 1 << 1;
        const Media = 1 << 2;
    }
}

/// Whether a device type is usable as a raw block device without going
/// through a composite layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Directness {
    Always,
    Never,
    /// Direct only while nothing is stacked on top of it.
    WhenLeaf,
}

impl DeviceType {
    pub fn as_flag(self) -> DeviceTypeFlag {
        match self {
            Self::Storage => DeviceTypeFlag::Storage,
            Self::Disk => DeviceTypeFlag::Disk,
            Self::Optical => DeviceTypeFlag::Optical,
            Self::MdContainer => DeviceTypeFlag::MdContainer,
            Self::MdArray => DeviceTypeFlag::MdArray,
            Self::MdBiosRaidArray => DeviceTypeFlag::MdBiosRaidArray,
            Self::BtrfsVolume => DeviceTypeFlag::BtrfsVolume,
            Self::BtrfsSubVolume => DeviceTypeFlag::BtrfsSubVolume,
            Self::BtrfsSnapShot => DeviceTypeFlag::BtrfsSnapShot,
        }
    }

    pub fn capabilities(self) -> Capabilities {
        match self {
            Self::Disk | Self::MdBiosRaidArray => {
                Capabilities::Disk | Capabilities::Partitionable | Capabilities::Media
            }
            Self::MdContainer => Capabilities::empty(),
            Self::Storage
            | Self::Optical
            | Self::MdArray
            | Self::BtrfsVolume
            | Self::BtrfsSubVolume
            | Self::BtrfsSnapShot => Capabilities::Media,
        }
    }

    pub(crate) fn directness(self) -> Directness {
        match self {
            Self::Disk
            | Self::MdBiosRaidArray
            | Self::BtrfsVolume
            | Self::BtrfsSubVolume
            | Self::BtrfsSnapShot => Directness::Always,
            Self::MdContainer => Directness::Never,
            Self::Storage | Self::Optical | Self::MdArray => Directness::WhenLeaf,
        }
    }
}

/// The four size attributes every device reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceSizes {
    pub size: Size,
    pub current: Size,
    pub target: Size,
    pub max: Size,
}

impl DeviceSizes {
    /// Sizes of a device with a single known capacity. Only existing devices
    /// have a current and maximum size.
    pub(crate) fn known(size: Size, exists: bool) -> Self {
        Self::planned(size, size, exists)
    }

    /// Sizes of a device whose computed capacity and requested size may
    /// differ.
    pub(crate) fn planned(size: Size, target: Size, exists: bool) -> Self {
        let on_disk = if exists { size } else { Size::ZERO };
        Self {
            size,
            current: on_disk,
            target,
            max: on_disk,
        }
    }

    /// Sizes of a derived device: every attribute mirrors the capacity.
    pub(crate) fn uniform(size: Size) -> Self {
        Self {
            size,
            current: size,
            target: size,
            max: size,
        }
    }
}

/// Variant-specific payload of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    Storage,
    Disk,
    Optical,
    MdContainer(MdArray),
    MdArray(MdArray),
    MdBiosRaidArray(MdArray),
    BtrfsVolume(BtrfsVolume),
    BtrfsSubVolume(BtrfsSubVolume),
    BtrfsSnapShot(BtrfsSnapShot),
}

impl DeviceKind {
    pub fn device_type(&self) -> DeviceType {
        match self {
            Self::Storage => DeviceType::Storage,
            Self::Disk => DeviceType::Disk,
            Self::Optical => DeviceType::Optical,
            Self::MdContainer(_) => DeviceType::MdContainer,
            Self::MdArray(_) => DeviceType::MdArray,
            Self::MdBiosRaidArray(_) => DeviceType::MdBiosRaidArray,
            Self::BtrfsVolume(_) => DeviceType::BtrfsVolume,
            Self::BtrfsSubVolume(_) => DeviceType::BtrfsSubVolume,
            Self::BtrfsSnapShot(_) => DeviceType::BtrfsSnapShot,
        }
    }

    /// Returns the MD payload of any MD variant.
    pub fn as_md(&self) -> Option<&MdArray> {
        match self {
            Self::MdContainer(md) | Self::MdArray(md) | Self::MdBiosRaidArray(md) => Some(md),
            _ => None,
        }
    }

    pub(crate) fn as_md_mut(&mut self) -> Option<&mut MdArray> {
        match self {
            Self::MdContainer(md) | Self::MdArray(md) | Self::MdBiosRaidArray(md) => Some(md),
            _ => None,
        }
    }

    pub fn as_btrfs_volume(&self) -> Option<&BtrfsVolume> {
        match self {
            Self::BtrfsVolume(volume) => Some(volume),
            _ => None,
        }
    }

    /// Returns the subvolume payload of subvolumes and snapshots.
    pub fn as_btrfs_subvolume(&self) -> Option<&BtrfsSubVolume> {
        match self {
            Self::BtrfsSubVolume(subvolume) => Some(subvolume),
            Self::BtrfsSnapShot(snapshot) => Some(&snapshot.subvolume),
            _ => None,
        }
    }

    pub fn as_btrfs_snapshot(&self) -> Option<&BtrfsSnapShot> {
        match self {
            Self::BtrfsSnapShot(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn is_btrfs(&self) -> bool {
        matches!(
            self,
            Self::BtrfsVolume(_) | Self::BtrfsSubVolume(_) | Self::BtrfsSnapShot(_)
        )
    }
}

/// A block device in a `DeviceGraph`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub(crate) name: String,
    pub(crate) exists: bool,
    pub(crate) format: Option<Format>,
    pub(crate) parents: ParentList,
    pub(crate) uuid: Option<OsUuid>,
    pub(crate) sizes: DeviceSizes,
    pub(crate) path: String,
    pub(crate) kind: DeviceKind,
}

impl Device {
    pub fn parents(&self) -> &ParentList {
        &self.parents
    }

    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub fn sizes(&self) -> DeviceSizes {
        self.sizes
    }

    /// Short human readable description used in logs.
    pub fn describe(&self) -> String {
        format!(
            "{} '{}'{}",
            self.device_type(),
            self.name,
            if self.exists { " (existing)" } else { "" }
        )
    }
}

/// Attribute surface shared by every device variant.
///
/// Nothing here probes the system: values describe the planned state of the
/// device, and kernel-assigned attributes report their unassigned defaults.
pub trait BlockDevice {
    fn name(&self) -> &str;
    fn exists(&self) -> bool;
    fn format(&self) -> Option<&Format>;
    fn uuid(&self) -> Option<&OsUuid>;
    fn device_type(&self) -> DeviceType;
    fn size(&self) -> Size;
    fn current_size(&self) -> Size;
    fn target_size(&self) -> Size;
    fn max_size(&self) -> Size;
    fn path(&self) -> &str;

    fn is_disk(&self) -> bool {
        self.device_type()
            .capabilities()
            .contains(Capabilities::Disk)
    }

    fn partitionable(&self) -> bool {
        self.device_type()
            .capabilities()
            .contains(Capabilities::Partitionable)
    }

    fn media_present(&self) -> bool {
        self.device_type()
            .capabilities()
            .contains(Capabilities::Media)
    }

    fn resizable(&self) -> bool {
        false
    }

    /// Whether the device is active on the system.
    fn status(&self) -> bool {
        false
    }

    fn sysfs_path(&self) -> &str {
        ""
    }

    fn major(&self) -> u32 {
        0
    }

    fn minor(&self) -> u32 {
        0
    }

    /// Whether the device is large enough for the format it carries.
    fn fits_format(&self) -> bool {
        self.format()
            .map_or(true, |format| self.size() >= format.min_size())
    }
}

impl BlockDevice for Device {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self) -> bool {
        self.exists
    }

    fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    fn uuid(&self) -> Option<&OsUuid> {
        self.uuid.as_ref()
    }

    fn device_type(&self) -> DeviceType {
        self.kind.device_type()
    }

    fn size(&self) -> Size {
        self.sizes.size
    }

    fn current_size(&self) -> Size {
        self.sizes.current
    }

    fn target_size(&self) -> Size {
        self.sizes.target
    }

    fn max_size(&self) -> Size {
        self.sizes.max
    }

    fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;
    use sysdefs::formats::FormatKind;

    use super::*;

    #[test]
    fn test_device_type_tags() {
        let tags = DeviceType::iter().map(|t| t.to_string()).collect::<Vec<_>>();
        assert_eq!(
            tags,
            vec![
                "storage",
                "disk",
                "cdrom",
                "mdcontainer",
                "mdarray",
                "mdbiosraidarray",
                "btrfs volume",
                "btrfs subvolume",
                "btrfs snapshot"
            ]
        );

        // Every type maps to its own flag.
        let all = DeviceType::iter().fold(DeviceTypeFlag::empty(), |acc, t| {
            assert!(!acc.contains(t.as_flag()));
            acc | t.as_flag()
        });
        assert!(all.contains(DeviceTypeFlag::BtrfsSubVolumeLike));
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(DeviceType::MdContainer.capabilities(), Capabilities::empty());
        assert!(DeviceType::MdBiosRaidArray
            .capabilities()
            .contains(Capabilities::Disk | Capabilities::Partitionable));
        assert_eq!(DeviceType::MdArray.capabilities(), Capabilities::Media);

        assert_eq!(DeviceType::MdContainer.directness(), Directness::Never);
        assert_eq!(DeviceType::Disk.directness(), Directness::Always);
        assert_eq!(DeviceType::Storage.directness(), Directness::WhenLeaf);
    }

    #[test]
    fn test_block_device_defaults() {
        let device = Device {
            name: "sda".into(),
            exists: true,
            format: Some(Format::new(FormatKind::Btrfs)),
            parents: ParentList::default(),
            uuid: None,
            sizes: DeviceSizes::known(Size::from_mib(128), true),
            path: "/dev/sda".into(),
            kind: DeviceKind::Disk,
        };

        assert!(device.is_disk());
        assert!(device.partitionable());
        assert!(device.media_present());
        assert!(!device.resizable());
        assert!(!device.status());
        assert_eq!(device.sysfs_path(), "");
        assert_eq!((device.major(), device.minor()), (0, 0));
        assert_eq!(device.describe(), "disk 'sda' (existing)");

        // 128 MiB is below the btrfs minimum.
        assert!(!device.fits_format());
    }

    #[test]
    fn test_sizes() {
        let sizes = DeviceSizes::planned(Size::from_mib(4), Size::from_mib(32), false);
        assert_eq!(sizes.size, Size::from_mib(4));
        assert_eq!(sizes.target, Size::from_mib(32));
        assert_eq!(sizes.current, Size::ZERO);
        assert_eq!(sizes.max, Size::ZERO);

        let sizes = DeviceSizes::known(Size::from_mib(4), true);
        assert_eq!(sizes, DeviceSizes::uniform(Size::from_mib(4)));
    }
}
