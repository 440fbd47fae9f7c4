use std::fmt::Display;

use log::{debug, trace};
use petgraph::{
    algo::toposort,
    csr::DefaultIx,
    stable_graph::{NodeIndex as PetgraphNodeIndex, StableGraph},
    visit::{Dfs, EdgeRef, IntoNodeReferences, Reversed, Walker},
    Directed, Direction,
};
use strum_macros::Display as StrumDisplay;

use sysdefs::formats::FormatKind;

use crate::{
    btrfs::{
        self,
        devices::{BtrfsSnapShotSpec, BtrfsSubVolumeSpec, BtrfsVolumeSpec},
    },
    config::StorageConfig,
    device::{
        parents::ParentList, plain::StorageDeviceSpec, BlockDevice, Device, DeviceKind,
        DeviceSizes,
    },
    error::DeviceError,
    raid::mdraid::{self, MdArraySpec, MdVariant},
};

use super::view::DeviceRef;

/// The type of the node index used in the DeviceGraph.
pub(crate) type NodeIndex = PetgraphNodeIndex<DefaultIx>;

/// The type of the graph used to store devices and their relationships.
pub(crate) type DevicePetgraph = StableGraph<Device, Relation, Directed, DefaultIx>;

/// Handle of a device inside a `DeviceGraph`. Handles stay valid until the
/// device is removed. The arena reuses the slots of removed devices, so a
/// handle also carries the generation of its slot and a stale handle never
/// resolves to a later device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub(crate) NodeIndex, pub(crate) u64);

impl Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0.index())
    }
}

/// Kind of an edge. Edges go from a device to the device it depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
pub enum Relation {
    /// The target is a parent of the source.
    #[strum(serialize = "parent")]
    Parent,

    /// The target is the subvolume the source snapshot was taken from.
    #[strum(serialize = "snapshot source")]
    SnapshotSource,
}

/// Arena of block devices linked by their dependencies.
#[derive(Debug, Clone, Default)]
pub struct DeviceGraph {
    pub(super) inner: DevicePetgraph,
    config: StorageConfig,

    /// Generation of the device occupying each slot of `inner`.
    generations: Vec<u64>,
    last_generation: u64,
}

impl DeviceGraph {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Number of devices in the graph.
    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Returns the device with the given handle.
    pub fn get(&self, id: DeviceId) -> Result<&Device, DeviceError> {
        self.inner
            .node_weight(id.0)
            .filter(|_| self.generations.get(id.0.index()) == Some(&id.1))
            .ok_or(DeviceError::UnknownDevice(id))
    }

    /// Returns a graph-aware view of the device with the given handle.
    pub fn device(&self, id: DeviceId) -> Result<DeviceRef<'_>, DeviceError> {
        let device = self.get(id)?;
        Ok(DeviceRef::new(self, id, device))
    }

    /// Returns the handle of the device with the given name.
    pub fn find(&self, name: &str) -> Option<DeviceId> {
        self.inner
            .node_references()
            .find(|(_, device)| device.name == name)
            .map(|(idx, _)| self.id_at(idx))
    }

    /// Iterates over every device in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = DeviceRef<'_>> {
        self.inner
            .node_references()
            .map(move |(idx, device)| DeviceRef::new(self, self.id_at(idx), device))
    }

    pub fn add_storage_device(&mut self, spec: StorageDeviceSpec) -> Result<DeviceId, DeviceError> {
        let device = spec.build(self)?;
        Ok(self.insert(device))
    }

    /// Adds an MD array, container or BIOS RAID set.
    pub fn add_md_array(&mut self, spec: MdArraySpec) -> Result<DeviceId, DeviceError> {
        let device = spec.build(self)?;
        Ok(self.insert(device))
    }

    pub fn add_btrfs_volume(&mut self, spec: BtrfsVolumeSpec) -> Result<DeviceId, DeviceError> {
        let device = spec.build(self)?;
        Ok(self.insert(device))
    }

    pub fn add_btrfs_subvolume(
        &mut self,
        spec: BtrfsSubVolumeSpec,
    ) -> Result<DeviceId, DeviceError> {
        let device = spec.build(self)?;
        Ok(self.insert(device))
    }

    pub fn add_btrfs_snapshot(&mut self, spec: BtrfsSnapShotSpec) -> Result<DeviceId, DeviceError> {
        let device = spec.build(self)?;
        Ok(self.insert(device))
    }

    /// Returns whether no other device uses the device as a parent.
    pub fn is_leaf(&self, id: DeviceId) -> Result<bool, DeviceError> {
        self.get(id)?;
        Ok(self.leaf(id))
    }

    /// Returns whether `device` depends on `other`, directly or through any
    /// chain of parents or snapshot sources. A device never depends on
    /// itself.
    pub fn depends_on(&self, device: DeviceId, other: DeviceId) -> Result<bool, DeviceError> {
        self.get(device)?;
        self.get(other)?;
        Ok(self.reaches(device, other))
    }

    /// Renders the graph as one line per device followed by its parents.
    pub fn describe(&self) -> String {
        let mut description = String::new();
        for (idx, device) in self.inner.node_references() {
            description.push_str(&format!("{} {}", self.id_at(idx), device.describe()));
            let targets = self
                .inner
                .edges(idx)
                .map(|edge| {
                    format!(
                        "{} ({})",
                        self.name_of(self.id_at(edge.target())),
                        edge.weight()
                    )
                })
                .collect::<Vec<_>>();
            if !targets.is_empty() {
                description.push_str(&format!(" -> {}", targets.join(", ")));
            }
            description.push('\n');
        }
        description
    }

    pub(crate) fn leaf(&self, id: DeviceId) -> bool {
        !self
            .inner
            .edges_directed(id.0, Direction::Incoming)
            .any(|edge| *edge.weight() == Relation::Parent)
    }

    pub(crate) fn reaches(&self, from: DeviceId, to: DeviceId) -> bool {
        // The first node visited is the start node itself.
        Dfs::new(&self.inner, from.0)
            .iter(&self.inner)
            .skip(1)
            .any(|idx| idx == to.0)
    }

    /// Devices with an edge pointing at the given device, without duplicates.
    pub(crate) fn dependents_of(&self, id: DeviceId) -> Vec<DeviceId> {
        let mut dependents = Vec::new();
        for idx in self.inner.neighbors_directed(id.0, Direction::Incoming) {
            let dependent = self.id_at(idx);
            if !dependents.contains(&dependent) {
                dependents.push(dependent);
            }
        }
        dependents.sort();
        dependents
    }

    /// Name of the device for error messages. Falls back to the handle when
    /// the device is unknown.
    pub(crate) fn name_of(&self, id: DeviceId) -> String {
        self.get(id)
            .map_or_else(|_| id.to_string(), |device| device.name.clone())
    }

    pub(crate) fn check_name(&self, name: &str) -> Result<(), DeviceError> {
        if self.find(name).is_some() {
            return Err(DeviceError::DuplicateName(name.to_owned()));
        }
        Ok(())
    }

    /// Checks that every parent exists and appears only once.
    pub(crate) fn resolve_parents(
        &self,
        device: &str,
        ids: &[DeviceId],
    ) -> Result<ParentList, DeviceError> {
        for id in ids {
            self.get(*id)?;
        }

        ParentList::try_from_ids(ids.iter().copied()).map_err(|duplicate| {
            DeviceError::DuplicateParent {
                device: device.to_owned(),
                parent: self.name_of(duplicate),
            }
        })
    }

    /// Checks that `member` carries one of the `allowed` formats.
    pub(crate) fn check_member_format(
        &self,
        device: &str,
        member: DeviceId,
        allowed: &[FormatKind],
    ) -> Result<(), DeviceError> {
        let member = self.get(member)?;
        let found = member.format().map(|format| format.kind);
        if found.is_some_and(|kind| allowed.contains(&kind)) {
            return Ok(());
        }

        Err(DeviceError::FormatMismatch {
            device: device.to_owned(),
            parent: member.name.clone(),
            expected: allowed.to_vec(),
            found,
        })
    }

    fn insert(&mut self, device: Device) -> DeviceId {
        let description = device.describe();
        let parents = device.parents.clone();
        let origin = device.kind.as_btrfs_snapshot().and_then(|s| s.origin());

        trace!("Adding node: {description}");
        let idx = self.inner.add_node(device);
        if self.generations.len() <= idx.index() {
            self.generations.resize(idx.index() + 1, 0);
        }
        self.last_generation += 1;
        self.generations[idx.index()] = self.last_generation;
        let id = DeviceId(idx, self.last_generation);
        for parent in parents.iter() {
            self.add_edge(id, parent, Relation::Parent);
        }
        if let Some(origin) = origin {
            self.add_edge(id, origin, Relation::SnapshotSource);
        }

        debug!("Added {description} as {id}");
        id
    }

    /// Handle of the device currently stored at `idx`.
    fn id_at(&self, idx: NodeIndex) -> DeviceId {
        DeviceId(
            idx,
            self.generations.get(idx.index()).copied().unwrap_or_default(),
        )
    }

    pub(super) fn add_edge(&mut self, from: DeviceId, to: DeviceId, relation: Relation) {
        trace!(
            "Adding edge from '{}' to '{}' with kind [{relation}]",
            self.name_of(from),
            self.name_of(to)
        );
        self.inner.add_edge(from.0, to.0, relation);
    }

    /// Recomputes the derived attributes of the device and of everything
    /// that depends on it, parents before dependents.
    pub(super) fn refresh(&mut self, id: DeviceId) -> Result<(), DeviceError> {
        let reversed = Reversed(&self.inner);
        let affected = Dfs::new(reversed, id.0)
            .iter(reversed)
            .collect::<Vec<_>>();

        let order = toposort(&self.inner, None).map_err(|cycle| {
            let device = self.id_at(cycle.node_id());
            DeviceError::CyclicDependency {
                device: self.name_of(device),
                parent: self.name_of(id),
            }
        })?;

        // Topological order puts dependents first since edges point at
        // parents.
        for idx in order.into_iter().rev().filter(|idx| affected.contains(idx)) {
            let id = self.id_at(idx);
            self.recompute(id);
        }

        Ok(())
    }

    fn recompute(&mut self, id: DeviceId) {
        let Ok(device) = self.get(id) else {
            return;
        };

        let mut updated_md = None;
        // Path and, when inherited, format UUID of btrfs devices.
        let mut identity = None;
        let sizes = match &device.kind {
            DeviceKind::Storage | DeviceKind::Disk | DeviceKind::Optical => return,
            DeviceKind::MdContainer(md)
            | DeviceKind::MdArray(md)
            | DeviceKind::MdBiosRaidArray(md) => {
                let Some(variant) = MdVariant::of(&device.kind) else {
                    return;
                };
                let (md, sizes) = mdraid::derive(self, variant, device.exists, &device.parents, md);
                updated_md = Some(md);
                sizes
            }
            DeviceKind::BtrfsVolume(volume) => {
                let (path, uuid) = btrfs::devices::member_identity(self, &device.parents);
                identity = Some((path, volume.inherits_uuid.then_some(uuid)));
                DeviceSizes::uniform(btrfs::devices::volume_size(
                    self,
                    &device.parents,
                    volume.data_level,
                ))
            }
            DeviceKind::BtrfsSubVolume(_) | DeviceKind::BtrfsSnapShot(_) => {
                let volume = btrfs::devices::volume_of(self, id)
                    .and_then(|volume| self.get(volume).ok());
                identity = volume.map(|volume| (volume.path().to_owned(), None));
                DeviceSizes::uniform(volume.map(|volume| volume.size()).unwrap_or_default())
            }
        };

        trace!("Refreshed {}: size {}", device.describe(), sizes.size);
        let device = &mut self.inner[id.0];
        device.sizes = sizes;
        if let (Some(updated), Some(md)) = (updated_md, device.kind.as_md_mut()) {
            *md = updated;
        }
        if let Some((path, uuid)) = identity {
            device.path = path;
            if let (Some(uuid), Some(format)) = (uuid, device.format.as_mut()) {
                format.uuid = uuid;
            }
        }
    }
}
