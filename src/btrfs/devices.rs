use std::ops::Deref;

use log::trace;

use sysdefs::{formats::FormatKind, osuuid::OsUuid};

use crate::{
    constants::{FSTAB_LABEL_PREFIX, FSTAB_UUID_PREFIX},
    device::{
        BlockDevice, Device, DeviceKind, DeviceSizes, DeviceTypeFlag, Format, ParentList,
    },
    error::{DeviceError, HierarchyViolation, LevelFamily},
    graph::{DeviceGraph, DeviceId, DeviceRef},
    primitives::size::Size,
};

use super::level::BtrfsRaidLevel;

/// Volume-specific state of a btrfs volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtrfsVolume {
    pub(crate) data_level: Option<BtrfsRaidLevel>,
    pub(crate) metadata_level: Option<BtrfsRaidLevel>,

    /// The format UUID follows the first member.
    pub(crate) inherits_uuid: bool,
}

impl BtrfsVolume {
    pub fn data_level(&self) -> Option<BtrfsRaidLevel> {
        self.data_level
    }

    pub fn metadata_level(&self) -> Option<BtrfsRaidLevel> {
        self.metadata_level
    }

    /// The volume itself is the top-level subvolume and has no assigned id.
    pub fn vol_id(&self) -> Option<u64> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtrfsSubVolume {
    pub(crate) vol_id: Option<u64>,
}

impl BtrfsSubVolume {
    /// Subvolume id, once assigned by btrfs.
    pub fn vol_id(&self) -> Option<u64> {
        self.vol_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtrfsSnapShot {
    pub(crate) subvolume: BtrfsSubVolume,
    pub(crate) origin: Option<DeviceId>,
}

impl BtrfsSnapShot {
    pub fn subvolume(&self) -> &BtrfsSubVolume {
        &self.subvolume
    }

    /// The subvolume the snapshot was taken from.
    pub fn origin(&self) -> Option<DeviceId> {
        self.origin
    }
}

/// Description of a btrfs volume to add to a `DeviceGraph`.
#[derive(Debug, Clone, Default)]
pub struct BtrfsVolumeSpec {
    pub name: String,

    /// Member devices. Each must carry a btrfs member format.
    pub parents: Vec<DeviceId>,

    pub data_level: Option<String>,
    pub metadata_level: Option<String>,
    pub exists: bool,
    pub uuid: Option<OsUuid>,

    /// Defaults to a btrfs format sharing the first member's UUID.
    pub format: Option<Format>,
}

/// Description of a btrfs subvolume to add to a `DeviceGraph`.
#[derive(Debug, Clone, Default)]
pub struct BtrfsSubVolumeSpec {
    pub name: String,

    /// Exactly one btrfs volume, subvolume or snapshot.
    pub parents: Vec<DeviceId>,

    pub exists: bool,
    pub vol_id: Option<u64>,
    pub format: Option<Format>,
}

/// Description of a btrfs snapshot to add to a `DeviceGraph`.
#[derive(Debug, Clone, Default)]
pub struct BtrfsSnapShotSpec {
    pub name: String,

    /// Exactly one btrfs volume, subvolume or snapshot.
    pub parents: Vec<DeviceId>,

    /// Existing subvolume of the same volume to snapshot. Mandatory unless
    /// the snapshot already exists.
    pub source: Option<DeviceId>,

    pub exists: bool,
    pub vol_id: Option<u64>,
    pub format: Option<Format>,
}

impl BtrfsVolumeSpec {
    pub(crate) fn build(self, graph: &DeviceGraph) -> Result<Device, DeviceError> {
        let BtrfsVolumeSpec {
            name,
            parents,
            data_level,
            metadata_level,
            exists,
            uuid,
            format,
        } = self;

        trace!("Checking btrfs volume '{name}'");
        graph.check_name(&name)?;
        let parents = graph.resolve_parents(&name, &parents)?;

        let data_level =
            BtrfsRaidLevel::parse(&name, LevelFamily::BtrfsData, data_level.as_deref())?;
        let metadata_level = BtrfsRaidLevel::parse(
            &name,
            LevelFamily::BtrfsMetadata,
            metadata_level.as_deref(),
        )?;
        check_volume_members(&name, parents.len(), data_level, metadata_level)?;

        trace!("Checking member formats of '{name}'");
        for parent in parents.iter() {
            graph.check_member_format(&name, parent, &graph.config().btrfs_member_formats)?;
        }

        let (path, member_uuid) = member_identity(graph, &parents);
        let mut format = format.unwrap_or_else(|| Format {
            exists,
            ..Format::new(FormatKind::Btrfs)
        });
        let inherits_uuid = format.uuid.is_none();
        if inherits_uuid {
            format.uuid = member_uuid;
        }

        Ok(Device {
            path,
            sizes: DeviceSizes::uniform(volume_size(graph, &parents, data_level)),
            name,
            exists,
            format: Some(format),
            parents,
            uuid,
            kind: DeviceKind::BtrfsVolume(BtrfsVolume {
                data_level,
                metadata_level,
                inherits_uuid,
            }),
        })
    }
}

impl BtrfsSubVolumeSpec {
    pub(crate) fn build(self, graph: &DeviceGraph) -> Result<Device, DeviceError> {
        let BtrfsSubVolumeSpec {
            name,
            parents,
            exists,
            vol_id,
            format,
        } = self;

        trace!("Checking btrfs subvolume '{name}'");
        graph.check_name(&name)?;
        let parents = graph.resolve_parents(&name, &parents)?;
        let volume = graph.get(parent_volume(graph, &name, &parents)?)?;

        Ok(Device {
            path: volume.path().to_owned(),
            sizes: DeviceSizes::uniform(volume.size()),
            name,
            exists,
            format: Some(format.unwrap_or_else(|| Format {
                exists,
                ..Format::new(FormatKind::Btrfs)
            })),
            parents,
            uuid: None,
            kind: DeviceKind::BtrfsSubVolume(BtrfsSubVolume { vol_id }),
        })
    }
}

impl BtrfsSnapShotSpec {
    pub(crate) fn build(self, graph: &DeviceGraph) -> Result<Device, DeviceError> {
        let BtrfsSnapShotSpec {
            name,
            parents,
            source,
            exists,
            vol_id,
            format,
        } = self;

        trace!("Checking btrfs snapshot '{name}'");
        graph.check_name(&name)?;
        let parents = graph.resolve_parents(&name, &parents)?;
        let volume_id = parent_volume(graph, &name, &parents)?;

        let origin = match source {
            Some(origin) => {
                check_snapshot_source(graph, &name, origin, volume_id)?;
                Some(origin)
            }
            None if exists => None,
            None => {
                return Err(DeviceError::HierarchyViolation {
                    device: name,
                    reason: HierarchyViolation::MissingSnapshotSource,
                })
            }
        };

        let volume = graph.get(volume_id)?;
        Ok(Device {
            path: volume.path().to_owned(),
            sizes: DeviceSizes::uniform(volume.size()),
            name,
            exists,
            format: Some(format.unwrap_or_else(|| Format {
                exists,
                ..Format::new(FormatKind::Btrfs)
            })),
            parents,
            uuid: None,
            kind: DeviceKind::BtrfsSnapShot(BtrfsSnapShot {
                subvolume: BtrfsSubVolume { vol_id },
                origin,
            }),
        })
    }
}

/// Fails when the volume has fewer members than its profiles need. Every
/// volume needs at least one member.
pub(crate) fn check_volume_members(
    device: &str,
    count: usize,
    data_level: Option<BtrfsRaidLevel>,
    metadata_level: Option<BtrfsRaidLevel>,
) -> Result<(), DeviceError> {
    let levels = [
        Some(data_level.unwrap_or(BtrfsRaidLevel::Single)),
        metadata_level,
    ];

    for level in levels.into_iter().flatten() {
        if count < level.min_members() {
            return Err(DeviceError::TooFewMembers {
                device: device.to_owned(),
                level: level.name().to_owned(),
                min: level.min_members(),
                actual: count,
            });
        }
    }

    Ok(())
}

/// Resolves the volume a subvolume or snapshot with the given parents lives
/// in.
fn parent_volume(
    graph: &DeviceGraph,
    device: &str,
    parents: &ParentList,
) -> Result<DeviceId, DeviceError> {
    let parent = match parents.as_slice() {
        [parent] => *parent,
        _ => {
            return Err(DeviceError::HierarchyViolation {
                device: device.to_owned(),
                reason: HierarchyViolation::ParentCount {
                    expected: 1,
                    actual: parents.len(),
                },
            })
        }
    };

    volume_of(graph, parent).ok_or_else(|| DeviceError::HierarchyViolation {
        device: device.to_owned(),
        reason: HierarchyViolation::NotAVolume {
            parent: graph.name_of(parent),
        },
    })
}

fn check_snapshot_source(
    graph: &DeviceGraph,
    device: &str,
    origin: DeviceId,
    volume: DeviceId,
) -> Result<(), DeviceError> {
    let source_device = graph.get(origin)?;
    let violation = |reason| {
        Err(DeviceError::HierarchyViolation {
            device: device.to_owned(),
            reason,
        })
    };

    let origin_name = source_device.name().to_owned();
    if !DeviceTypeFlag::BtrfsSubVolumeLike.contains(source_device.device_type().as_flag()) {
        return violation(HierarchyViolation::SourceNotSubvolume {
            origin: origin_name,
        });
    }

    if !source_device.exists() {
        return violation(HierarchyViolation::SourceNotExisting {
            origin: origin_name,
        });
    }

    if volume_of(graph, origin) != Some(volume) {
        return violation(HierarchyViolation::SourceVolumeMismatch {
            origin: origin_name,
        });
    }

    Ok(())
}

/// Finds the volume a btrfs device belongs to by walking up its parents.
/// Returns `None` for devices outside the btrfs layer.
pub(crate) fn volume_of(graph: &DeviceGraph, id: DeviceId) -> Option<DeviceId> {
    let mut current = id;
    loop {
        let device = graph.get(current).ok()?;
        match device.kind() {
            DeviceKind::BtrfsVolume(_) => return Some(current),
            DeviceKind::BtrfsSubVolume(_) | DeviceKind::BtrfsSnapShot(_) => {
                current = device.parents().first()?;
            }
            _ => return None,
        }
    }
}

/// Capacity of a volume built on the given members.
pub(crate) fn volume_size(
    graph: &DeviceGraph,
    parents: &ParentList,
    data_level: Option<BtrfsRaidLevel>,
) -> Size {
    let total = parents
        .iter()
        .filter_map(|id| graph.get(id).ok())
        .map(|member| member.size())
        .sum::<Size>();

    if data_level.is_some_and(BtrfsRaidLevel::is_mirrored) {
        total / 2
    } else {
        total
    }
}

/// Path and format UUID a volume takes from its first member.
pub(crate) fn member_identity(
    graph: &DeviceGraph,
    parents: &ParentList,
) -> (String, Option<OsUuid>) {
    let first = parents.first().and_then(|id| graph.get(id).ok());
    (
        first.map(|member| member.path().to_owned()).unwrap_or_default(),
        first
            .and_then(|member| member.format())
            .and_then(|format| format.uuid.clone()),
    )
}

/// The fstab source of a btrfs device: the volume's UUID when known, then
/// its label, otherwise its path.
fn fstab_spec(graph: &DeviceGraph, id: DeviceId) -> Option<String> {
    let volume = graph.get(volume_of(graph, id)?).ok()?;
    let format = volume.format();
    if let Some(uuid) = format.and_then(|format| format.uuid.as_ref()) {
        return Some(format!("{FSTAB_UUID_PREFIX}{uuid}"));
    }

    Some(match format.and_then(|format| format.label.as_deref()) {
        Some(label) => format!("{FSTAB_LABEL_PREFIX}{label}"),
        None => volume.path().to_owned(),
    })
}

/// View of a btrfs volume inside its graph.
#[derive(Debug, Clone, Copy)]
pub struct BtrfsVolumeRef<'a> {
    device: DeviceRef<'a>,
    volume: &'a BtrfsVolume,
}

impl<'a> BtrfsVolumeRef<'a> {
    pub(crate) fn new(device: DeviceRef<'a>, volume: &'a BtrfsVolume) -> Self {
        Self { device, volume }
    }

    pub fn device(&self) -> DeviceRef<'a> {
        self.device
    }

    pub fn fstab_spec(&self) -> String {
        fstab_spec(self.device.graph(), self.device.id()).unwrap_or_default()
    }

    /// Subvolumes and snapshots created directly on the volume.
    pub fn subvolumes(&self) -> Vec<DeviceRef<'a>> {
        self.device
            .dependents()
            .into_iter()
            .filter(|dependent| dependent.kind().as_btrfs_subvolume().is_some())
            .collect()
    }
}

impl Deref for BtrfsVolumeRef<'_> {
    type Target = BtrfsVolume;

    fn deref(&self) -> &BtrfsVolume {
        self.volume
    }
}

/// View of a btrfs subvolume (or snapshot) inside its graph.
#[derive(Debug, Clone, Copy)]
pub struct BtrfsSubVolumeRef<'a> {
    device: DeviceRef<'a>,
    subvolume: &'a BtrfsSubVolume,
}

impl<'a> BtrfsSubVolumeRef<'a> {
    pub(crate) fn new(device: DeviceRef<'a>, subvolume: &'a BtrfsSubVolume) -> Self {
        Self { device, subvolume }
    }

    pub fn device(&self) -> DeviceRef<'a> {
        self.device
    }

    /// The volume this subvolume lives in.
    pub fn volume(&self) -> Option<BtrfsVolumeRef<'a>> {
        let graph = self.device.graph();
        graph
            .device(volume_of(graph, self.device.id())?)
            .ok()?
            .as_btrfs_volume()
    }

    pub fn fstab_spec(&self) -> String {
        fstab_spec(self.device.graph(), self.device.id()).unwrap_or_default()
    }
}

impl Deref for BtrfsSubVolumeRef<'_> {
    type Target = BtrfsSubVolume;

    fn deref(&self) -> &BtrfsSubVolume {
        self.subvolume
    }
}

/// View of a btrfs snapshot inside its graph.
#[derive(Debug, Clone, Copy)]
pub struct BtrfsSnapShotRef<'a> {
    device: DeviceRef<'a>,
    snapshot: &'a BtrfsSnapShot,
}

impl<'a> BtrfsSnapShotRef<'a> {
    pub(crate) fn new(device: DeviceRef<'a>, snapshot: &'a BtrfsSnapShot) -> Self {
        Self { device, snapshot }
    }

    pub fn device(&self) -> DeviceRef<'a> {
        self.device
    }

    pub fn as_subvolume(&self) -> BtrfsSubVolumeRef<'a> {
        BtrfsSubVolumeRef::new(self.device, &self.snapshot.subvolume)
    }

    /// The subvolume the snapshot was taken from.
    pub fn source(&self) -> Option<DeviceRef<'a>> {
        self.device
            .graph()
            .device(self.snapshot.origin?)
            .ok()
    }
}

impl Deref for BtrfsSnapShotRef<'_> {
    type Target = BtrfsSnapShot;

    fn deref(&self) -> &BtrfsSnapShot {
        self.snapshot
    }
}
