use std::ops::Deref;

use log::trace;

use sysdefs::osuuid::OsUuid;

use crate::{
    constants::{DEV_MD_PATH, MD_METADATA_VERSION_DEFAULT},
    device::{BlockDevice, Device, DeviceKind, DeviceSizes, DeviceType, Format, ParentList},
    error::{DeviceError, HierarchyViolation, LevelFamily},
    graph::{DeviceGraph, DeviceId, DeviceRef},
    primitives::size::Size,
};

use super::level::{LevelInput, RaidLevel};

/// Flavor of MD device to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MdVariant {
    /// A regular software RAID array.
    #[default]
    Array,

    /// A container grouping disks for firmware RAID sets.
    Container,

    /// A firmware RAID set inside a container.
    BiosRaid,
}

impl MdVariant {
    pub(crate) fn of(kind: &DeviceKind) -> Option<Self> {
        match kind {
            DeviceKind::MdArray(_) => Some(Self::Array),
            DeviceKind::MdContainer(_) => Some(Self::Container),
            DeviceKind::MdBiosRaidArray(_) => Some(Self::BiosRaid),
            _ => None,
        }
    }
}

/// MD-specific state of an array, container or BIOS RAID set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdArray {
    pub(crate) level: Option<RaidLevel>,
    pub(crate) member_devices: usize,
    pub(crate) total_devices: usize,
    pub(crate) metadata_version: Option<String>,

    /// Size requested by the caller. For existing arrays this is the size
    /// reported by the system.
    pub(crate) requested_size: Option<Size>,

    pub(crate) create_bitmap: bool,
}

impl MdArray {
    /// Level of the array. Only existing arrays may have no level.
    pub fn level(&self) -> Option<RaidLevel> {
        self.level
    }

    /// Number of active members.
    pub fn member_devices(&self) -> usize {
        self.member_devices
    }

    /// Number of members, spares included.
    pub fn total_devices(&self) -> usize {
        self.total_devices
    }

    pub fn spares(&self) -> usize {
        self.total_devices.saturating_sub(self.member_devices)
    }

    pub fn metadata_version(&self) -> Option<&str> {
        self.metadata_version.as_deref()
    }

    /// Whether a write-intent bitmap will be created with the array.
    pub fn create_bitmap(&self) -> bool {
        self.create_bitmap
    }

    fn into_kind(self, variant: MdVariant) -> DeviceKind {
        match variant {
            MdVariant::Array => DeviceKind::MdArray(self),
            MdVariant::Container => DeviceKind::MdContainer(self),
            MdVariant::BiosRaid => DeviceKind::MdBiosRaidArray(self),
        }
    }
}

/// Description of an MD device to add to a `DeviceGraph`.
#[derive(Debug, Clone, Default)]
pub struct MdArraySpec {
    pub name: String,
    pub variant: MdVariant,

    /// Mandatory for arrays that do not exist yet. Containers default to
    /// `container`.
    pub level: Option<LevelInput>,

    /// Member devices in order. A BIOS RAID set takes exactly one MD
    /// container instead.
    pub parents: Vec<DeviceId>,

    /// Active members. Defaults to the number of parents.
    pub member_devices: Option<usize>,

    /// Active members plus spares. Defaults to `member_devices`.
    pub total_devices: Option<usize>,

    pub exists: bool,
    pub uuid: Option<OsUuid>,

    /// Requested size of a new array, or the actual size of an existing one.
    pub size: Option<Size>,

    pub metadata_version: Option<String>,
    pub format: Option<Format>,
}

impl MdArraySpec {
    pub(crate) fn build(self, graph: &DeviceGraph) -> Result<Device, DeviceError> {
        let MdArraySpec {
            name,
            variant,
            level,
            parents,
            member_devices,
            total_devices,
            exists,
            uuid,
            size,
            metadata_version,
            format,
        } = self;

        trace!("Checking MD device '{name}' ({variant:?})");
        graph.check_name(&name)?;
        let parents = graph.resolve_parents(&name, &parents)?;

        trace!("Resolving level of '{name}'");
        let level = resolve_level(&name, variant, level.as_ref(), exists)?;

        if variant == MdVariant::BiosRaid {
            check_bios_raid_parents(graph, &name, &parents)?;
        }
        let candidates = member_candidates(graph, variant, &parents);

        if !exists {
            check_min_members(&name, level, candidates.len())?;

            // BIOS RAID members were checked when they joined the container.
            if variant != MdVariant::BiosRaid {
                trace!("Checking member formats of '{name}'");
                for member in candidates.iter() {
                    graph.check_member_format(&name, *member, &graph.config().md_member_formats)?;
                }
            }
        }

        let (member_devices, total_devices) = match variant {
            MdVariant::BiosRaid => container_counts(graph, &parents),
            MdVariant::Array | MdVariant::Container => {
                let member_devices = member_devices.unwrap_or(parents.len());
                (member_devices, total_devices.unwrap_or(member_devices))
            }
        };
        check_member_counts(
            &name,
            exists,
            level,
            member_devices,
            total_devices,
            candidates.len(),
        )?;

        let md = MdArray {
            level,
            member_devices,
            total_devices,
            metadata_version: if exists {
                None
            } else {
                Some(metadata_version.unwrap_or_else(|| MD_METADATA_VERSION_DEFAULT.to_owned()))
            },
            requested_size: size,
            create_bitmap: false,
        };
        let (md, sizes) = derive(graph, variant, exists, &parents, &md);

        Ok(Device {
            path: format!("{DEV_MD_PATH}/{name}"),
            name,
            exists,
            format,
            parents,
            uuid,
            sizes,
            kind: md.into_kind(variant),
        })
    }
}

/// Resolves the level of a new MD device.
fn resolve_level(
    device: &str,
    variant: MdVariant,
    input: Option<&LevelInput>,
    exists: bool,
) -> Result<Option<RaidLevel>, DeviceError> {
    let level = match (variant, input) {
        (MdVariant::Container, None) => return Ok(Some(RaidLevel::Container)),
        (_, None) if exists => return Ok(None),
        (_, input) => RaidLevel::parse(device, input)?,
    };

    // Containers hold no data and data arrays cannot be containers.
    if (variant == MdVariant::Container) != (level == RaidLevel::Container) {
        return Err(DeviceError::InvalidLevel {
            device: device.to_owned(),
            family: LevelFamily::Md,
            level: Some(level.name().to_owned()),
        });
    }

    Ok(Some(level))
}

/// Resolves a level assigned to an existing MD array or BIOS RAID set.
pub(crate) fn resolve_new_level(
    device: &str,
    input: Option<&LevelInput>,
) -> Result<RaidLevel, DeviceError> {
    match resolve_level(device, MdVariant::Array, input, false)? {
        Some(level) => Ok(level),
        None => Err(DeviceError::InvalidLevel {
            device: device.to_owned(),
            family: LevelFamily::Md,
            level: None,
        }),
    }
}

fn check_bios_raid_parents(
    graph: &DeviceGraph,
    device: &str,
    parents: &ParentList,
) -> Result<(), DeviceError> {
    let container = match parents.as_slice() {
        [container] => *container,
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

    let container = graph.get(container)?;
    if container.device_type() != DeviceType::MdContainer {
        return Err(DeviceError::HierarchyViolation {
            device: device.to_owned(),
            reason: HierarchyViolation::NotAContainer {
                parent: container.name().to_owned(),
            },
        });
    }

    Ok(())
}

/// Member counts of the container a BIOS RAID set lives in.
fn container_counts(graph: &DeviceGraph, parents: &ParentList) -> (usize, usize) {
    parents
        .first()
        .and_then(|id| graph.get(id).ok())
        .and_then(|container| container.kind().as_md())
        .map_or((0, 0), |md| (md.member_devices, md.total_devices))
}

/// Devices an MD device is assembled from, spares included: its own parents,
/// or the disks of the container for a BIOS RAID set.
pub(crate) fn member_candidates(
    graph: &DeviceGraph,
    variant: MdVariant,
    parents: &ParentList,
) -> Vec<DeviceId> {
    match variant {
        MdVariant::BiosRaid => parents
            .first()
            .and_then(|id| graph.get(id).ok())
            .map(|container| container.parents().as_slice().to_vec())
            .unwrap_or_default(),
        MdVariant::Array | MdVariant::Container => parents.as_slice().to_vec(),
    }
}

/// Fails when `count` members are not enough for `level`.
pub(crate) fn check_min_members(
    device: &str,
    level: Option<RaidLevel>,
    count: usize,
) -> Result<(), DeviceError> {
    match level {
        Some(level) if level != RaidLevel::Container && count < level.min_members() => {
            Err(DeviceError::TooFewMembers {
                device: device.to_owned(),
                level: level.name().to_owned(),
                min: level.min_members(),
                actual: count,
            })
        }
        _ => Ok(()),
    }
}

pub(crate) fn check_member_counts(
    device: &str,
    exists: bool,
    level: Option<RaidLevel>,
    member_devices: usize,
    total_devices: usize,
    candidates: usize,
) -> Result<(), DeviceError> {
    if total_devices < member_devices || (!exists && member_devices > candidates) {
        return Err(DeviceError::InvalidMemberCount {
            device: device.to_owned(),
            member_devices,
            total_devices,
            parents: candidates,
        });
    }

    if !exists {
        check_min_members(device, level, member_devices)?;
    }

    Ok(())
}

/// Recomputes the derived state of an MD device from its members.
pub(crate) fn derive(
    graph: &DeviceGraph,
    variant: MdVariant,
    exists: bool,
    parents: &ParentList,
    md: &MdArray,
) -> (MdArray, DeviceSizes) {
    let mut md = md.clone();
    if variant == MdVariant::BiosRaid {
        (md.member_devices, md.total_devices) = container_counts(graph, parents);
    }

    if variant == MdVariant::Container {
        md.create_bitmap = false;
        return (md, DeviceSizes::default());
    }

    if exists {
        let sizes = DeviceSizes::uniform(md.requested_size.unwrap_or_default());
        md.create_bitmap = false;
        return (md, sizes);
    }

    let config = graph.config();
    let member_sizes = member_candidates(graph, variant, parents)
        .into_iter()
        .filter_map(|id| graph.get(id).ok())
        .map(|member| member.size())
        .collect::<Vec<_>>();

    let size = md.level.map_or(Size::ZERO, |level| {
        level.compute_size(&member_sizes, md.member_devices, |member| {
            config.superblock_size(member, md.metadata_version.as_deref())
        })
    });
    let sizes = DeviceSizes::planned(size, md.requested_size.unwrap_or(size), false);
    md.create_bitmap = md
        .level
        .is_some_and(|level| level.bitmap_eligible(size, config.chunk_size));

    (md, sizes)
}

/// View of an MD device inside its graph.
#[derive(Debug, Clone, Copy)]
pub struct MdArrayRef<'a> {
    device: DeviceRef<'a>,
    md: &'a MdArray,
}

impl<'a> MdArrayRef<'a> {
    pub(crate) fn new(device: DeviceRef<'a>, md: &'a MdArray) -> Self {
        Self { device, md }
    }

    pub fn device(&self) -> DeviceRef<'a> {
        self.device
    }

    /// Active, non-spare members in order.
    pub fn members(&self) -> Vec<DeviceRef<'a>> {
        let graph = self.device.graph();
        let Some(variant) = MdVariant::of(self.device.kind()) else {
            return Vec::new();
        };

        member_candidates(graph, variant, self.device.parents())
            .into_iter()
            .take(self.md.member_devices)
            .filter_map(|id| graph.device(id).ok())
            .collect()
    }

    /// The array UUID in mdadm notation, when the UUID is resolvable.
    pub fn mdadm_format_uuid(&self) -> Option<String> {
        self.device.uuid()?.to_mdadm_format()
    }

    pub fn description(&self) -> String {
        let level = self
            .md
            .level
            .map_or("unknown level", |level| level.name());
        match self.device.device_type() {
            DeviceType::MdContainer => "BIOS RAID container".to_owned(),
            DeviceType::MdBiosRaidArray => format!("BIOS RAID set ({level})"),
            _ => format!("MDRAID set ({level})"),
        }
    }
}

impl Deref for MdArrayRef<'_> {
    type Target = MdArray;

    fn deref(&self) -> &MdArray {
        self.md
    }
}
