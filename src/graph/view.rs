use std::ops::Deref;

use crate::{
    btrfs::devices::{BtrfsSnapShotRef, BtrfsSubVolumeRef, BtrfsVolumeRef},
    device::{BlockDevice, Device, DeviceKind, Directness},
    raid::mdraid::MdArrayRef,
};

use super::graph::{DeviceGraph, DeviceId};

/// Read-only view of a device that can answer questions involving the rest
/// of the graph.
#[derive(Debug, Clone, Copy)]
pub struct DeviceRef<'a> {
    graph: &'a DeviceGraph,
    id: DeviceId,
    device: &'a Device,
}

impl<'a> DeviceRef<'a> {
    pub(crate) fn new(graph: &'a DeviceGraph, id: DeviceId, device: &'a Device) -> Self {
        Self { graph, id, device }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub(crate) fn graph(&self) -> &'a DeviceGraph {
        self.graph
    }

    /// Returns whether no other device is stacked on this one.
    pub fn is_leaf(&self) -> bool {
        self.graph.leaf(self.id)
    }

    /// Returns whether the device is used as a raw block device rather than
    /// through a composite layer.
    pub fn direct(&self) -> bool {
        match self.device.device_type().directness() {
            Directness::Always => true,
            Directness::Never => false,
            Directness::WhenLeaf => self.is_leaf(),
        }
    }

    /// Returns whether this device depends on `other` through any chain of
    /// parents or snapshot sources.
    pub fn depends_on(&self, other: DeviceId) -> bool {
        self.graph.reaches(self.id, other)
    }

    /// Parents of the device, in order.
    pub fn parent_devices(&self) -> Vec<DeviceRef<'a>> {
        self.device
            .parents
            .iter()
            .filter_map(|id| self.graph.device(id).ok())
            .collect()
    }

    /// Devices that directly use this one as a parent or snapshot source.
    pub fn dependents(&self) -> Vec<DeviceRef<'a>> {
        self.graph
            .dependents_of(self.id)
            .into_iter()
            .filter_map(|id| self.graph.device(id).ok())
            .collect()
    }

    /// Returns the MD view of arrays, containers and BIOS RAID sets.
    pub fn as_md_array(&self) -> Option<MdArrayRef<'a>> {
        let device: &'a Device = self.device;
        device.kind.as_md().map(|md| MdArrayRef::new(*self, md))
    }

    pub fn as_btrfs_volume(&self) -> Option<BtrfsVolumeRef<'a>> {
        let device: &'a Device = self.device;
        device
            .kind
            .as_btrfs_volume()
            .map(|volume| BtrfsVolumeRef::new(*self, volume))
    }

    /// Returns the subvolume view of subvolumes and snapshots.
    pub fn as_btrfs_subvolume(&self) -> Option<BtrfsSubVolumeRef<'a>> {
        let device: &'a Device = self.device;
        device
            .kind
            .as_btrfs_subvolume()
            .map(|subvolume| BtrfsSubVolumeRef::new(*self, subvolume))
    }

    pub fn as_btrfs_snapshot(&self) -> Option<BtrfsSnapShotRef<'a>> {
        let device: &'a Device = self.device;
        match &device.kind {
            DeviceKind::BtrfsSnapShot(snapshot) => Some(BtrfsSnapShotRef::new(*self, snapshot)),
            _ => None,
        }
    }
}

impl Deref for DeviceRef<'_> {
    type Target = Device;

    fn deref(&self) -> &Device {
        self.device
    }
}
