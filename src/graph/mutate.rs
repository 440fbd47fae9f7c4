use log::debug;
use petgraph::visit::EdgeRef;

use crate::{
    btrfs::devices::check_volume_members,
    device::{BlockDevice, Device, DeviceKind, DeviceSizes, DeviceType},
    error::{DeviceError, HierarchyViolation},
    primitives::size::Size,
    raid::{
        level::LevelInput,
        mdraid::{self, MdArray},
    },
};

use super::graph::{DeviceGraph, DeviceId, Relation};

fn immutable(device: &Device, attribute: &'static str) -> DeviceError {
    DeviceError::ImmutableAttribute {
        device: device.name.clone(),
        device_type: device.device_type(),
        attribute,
    }
}

/// Fails unless the parents of the device may change.
fn check_parents_mutable(device: &Device) -> Result<(), DeviceError> {
    if device.exists {
        return Err(immutable(device, "parents"));
    }

    match device.device_type() {
        device_type @ (DeviceType::MdBiosRaidArray
        | DeviceType::BtrfsSubVolume
        | DeviceType::BtrfsSnapShot) => Err(DeviceError::HierarchyViolation {
            device: device.name.clone(),
            reason: HierarchyViolation::FixedParents { device_type },
        }),
        _ => Ok(()),
    }
}

impl DeviceGraph {
    /// Changes the level of an MD array or BIOS RAID set. Containers always
    /// keep the `container` level.
    pub fn set_level(&mut self, id: DeviceId, level: Option<LevelInput>) -> Result<(), DeviceError> {
        let device = self.get(id)?;
        let md = match &device.kind {
            DeviceKind::MdArray(md) | DeviceKind::MdBiosRaidArray(md) => md,
            _ => return Err(immutable(device, "level")),
        };

        let level = mdraid::resolve_new_level(&device.name, level.as_ref())?;
        if !device.exists {
            mdraid::check_min_members(&device.name, Some(level), md.member_devices)?;
        }

        debug!("Setting level of {} to {level}", device.describe());
        if let Some(md) = self.inner[id.0].kind.as_md_mut() {
            md.level = Some(level);
        }
        self.refresh(id)
    }

    /// Sets the requested size of a device that does not exist yet.
    ///
    /// The size of btrfs devices follows their members and cannot be set.
    pub fn set_size(&mut self, id: DeviceId, size: Size) -> Result<(), DeviceError> {
        let device = self.get(id)?;
        if device.exists
            || device.kind.is_btrfs()
            || device.device_type() == DeviceType::MdContainer
        {
            return Err(immutable(device, "size"));
        }

        debug!("Setting size of {} to {size}", device.describe());
        let device = &mut self.inner[id.0];
        match device.kind.as_md_mut() {
            Some(md) => md.requested_size = Some(size),
            None => device.sizes = DeviceSizes::known(size, false),
        }
        self.refresh(id)
    }

    /// Appends `parent` to the parents of `child`.
    ///
    /// A parent joining an MD array first fills a declared slot that no
    /// parent backs yet, keeping the member counts. Otherwise it adds a slot:
    /// an active one when every current parent is active, a spare one
    /// otherwise.
    pub fn add_parent(&mut self, child: DeviceId, parent: DeviceId) -> Result<(), DeviceError> {
        let device = self.get(child)?;
        let parent_device = self.get(parent)?;

        if device.parents.contains(parent) {
            return Err(DeviceError::DuplicateParent {
                device: device.name.clone(),
                parent: parent_device.name.clone(),
            });
        }

        if child == parent || self.reaches(parent, child) {
            return Err(DeviceError::CyclicDependency {
                device: device.name.clone(),
                parent: parent_device.name.clone(),
            });
        }

        check_parents_mutable(device)?;

        let mut updated_md: Option<MdArray> = None;
        match &device.kind {
            DeviceKind::MdArray(md) | DeviceKind::MdContainer(md) => {
                self.check_member_format(&device.name, parent, &self.config().md_member_formats)?;
                let mut md = md.clone();
                let parents = device.parents.len();
                if md.total_devices <= parents {
                    if md.member_devices == parents {
                        md.member_devices += 1;
                    }
                    md.total_devices += 1;
                }
                updated_md = Some(md);
            }
            DeviceKind::BtrfsVolume(_) => {
                self.check_member_format(
                    &device.name,
                    parent,
                    &self.config().btrfs_member_formats,
                )?;
            }
            _ => {}
        }

        debug!(
            "Adding '{}' as a parent of {}",
            parent_device.name,
            device.describe()
        );
        let node = &mut self.inner[child.0];
        node.parents.append(parent);
        if let (Some(updated), Some(md)) = (updated_md, node.kind.as_md_mut()) {
            *md = updated;
        }
        self.add_edge(child, parent, Relation::Parent);
        self.refresh(child)
    }

    /// Removes `parent` from the parents of `child`.
    pub fn remove_parent(&mut self, child: DeviceId, parent: DeviceId) -> Result<(), DeviceError> {
        let device = self.get(child)?;
        let Some(position) = device.parents.position(parent) else {
            return Err(DeviceError::HierarchyViolation {
                device: device.name.clone(),
                reason: HierarchyViolation::NotAParent {
                    parent: self.name_of(parent),
                },
            });
        };

        check_parents_mutable(device)?;

        let remaining = device.parents.len() - 1;
        let mut updated_md: Option<MdArray> = None;
        match &device.kind {
            DeviceKind::MdArray(md) | DeviceKind::MdContainer(md) => {
                let mut md = md.clone();
                // Spares sit after the active members.
                if position < md.member_devices {
                    md.member_devices -= 1;
                }
                md.total_devices = md.total_devices.saturating_sub(1);
                mdraid::check_min_members(&device.name, md.level, md.member_devices)?;
                updated_md = Some(md);
            }
            DeviceKind::BtrfsVolume(volume) => {
                check_volume_members(
                    &device.name,
                    remaining,
                    volume.data_level,
                    volume.metadata_level,
                )?;
            }
            _ => {}
        }

        debug!(
            "Removing '{}' from the parents of {}",
            self.name_of(parent),
            device.describe()
        );
        let node = &mut self.inner[child.0];
        node.parents.remove(parent);
        if let (Some(updated), Some(md)) = (updated_md, node.kind.as_md_mut()) {
            *md = updated;
        }

        let edges = self
            .inner
            .edges(child.0)
            .filter(|edge| edge.target() == parent.0 && *edge.weight() == Relation::Parent)
            .map(|edge| edge.id())
            .collect::<Vec<_>>();
        for edge in edges {
            self.inner.remove_edge(edge);
        }

        self.refresh(child)
    }

    /// Removes a device nothing depends on and returns it.
    pub fn remove_device(&mut self, id: DeviceId) -> Result<Device, DeviceError> {
        let device = self.get(id)?;
        let dependents = self.dependents_of(id);
        if !dependents.is_empty() {
            return Err(DeviceError::HierarchyViolation {
                device: device.name.clone(),
                reason: HierarchyViolation::HasDependents {
                    dependents: dependents.into_iter().map(|d| self.name_of(d)).collect(),
                },
            });
        }

        debug!("Removing {}", device.describe());
        self.inner
            .remove_node(id.0)
            .ok_or(DeviceError::UnknownDevice(id))
    }
}

#[cfg(test)]
mod tests {
    use crate::device::plain::{StorageDeviceSpec, StorageKind};

    use super::*;

    #[test]
    fn test_set_size_of_plain_device() {
        let mut graph = DeviceGraph::default();
        let sda = graph
            .add_storage_device(StorageDeviceSpec {
                name: "sda".into(),
                kind: StorageKind::Disk,
                ..Default::default()
            })
            .unwrap();

        graph.set_size(sda, Size::from_mib(64)).unwrap();
        let device = graph.get(sda).unwrap();
        assert_eq!(device.size(), Size::from_mib(64));
        assert_eq!(device.target_size(), Size::from_mib(64));
        assert_eq!(device.current_size(), Size::ZERO);
    }

    #[test]
    fn test_existing_device_is_immutable() {
        let mut graph = DeviceGraph::default();
        let sda = graph
            .add_storage_device(StorageDeviceSpec {
                name: "sda".into(),
                kind: StorageKind::Disk,
                exists: true,
                size: Some(Size::from_gib(1)),
                ..Default::default()
            })
            .unwrap();
        let sdb = graph
            .add_storage_device(StorageDeviceSpec {
                name: "sdb".into(),
                kind: StorageKind::Disk,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            graph.set_size(sda, Size::from_mib(1)).unwrap_err().to_string(),
            "Cannot directly set size of disk 'sda'"
        );
        assert_eq!(
            graph.add_parent(sda, sdb).unwrap_err().to_string(),
            "Cannot directly set parents of disk 'sda'"
        );
        assert_eq!(
            graph.set_level(sda, Some(1.into())).unwrap_err().to_string(),
            "Cannot directly set level of disk 'sda'"
        );
        assert_eq!(graph.get(sda).unwrap().size(), Size::from_gib(1));
    }

    #[test]
    fn test_cycles_are_rejected() {
        let mut graph = DeviceGraph::default();
        let sda = graph
            .add_storage_device(StorageDeviceSpec {
                name: "sda".into(),
                ..Default::default()
            })
            .unwrap();
        let sda1 = graph
            .add_storage_device(StorageDeviceSpec {
                name: "sda1".into(),
                parents: vec![sda],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            graph.add_parent(sda, sda1).unwrap_err(),
            DeviceError::CyclicDependency {
                device: "sda".into(),
                parent: "sda1".into(),
            }
        );
        assert!(matches!(
            graph.add_parent(sda, sda),
            Err(DeviceError::CyclicDependency { .. })
        ));
        assert!(graph.is_leaf(sda1).unwrap());
    }

    #[test]
    fn test_remove_device_with_dependents() {
        let mut graph = DeviceGraph::default();
        let sda = graph
            .add_storage_device(StorageDeviceSpec {
                name: "sda".into(),
                ..Default::default()
            })
            .unwrap();
        let sda1 = graph
            .add_storage_device(StorageDeviceSpec {
                name: "sda1".into(),
                parents: vec![sda],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            graph.remove_device(sda).unwrap_err().to_string(),
            "Device 'sda' is invalid: device is still used by sda1"
        );

        graph.remove_parent(sda1, sda).unwrap();
        assert!(graph.get(sda1).unwrap().parents().is_empty());
        assert!(graph.is_leaf(sda).unwrap());
        graph.remove_device(sda).unwrap();
        assert_eq!(graph.len(), 1);

        assert!(matches!(
            graph.remove_parent(sda1, sda),
            Err(DeviceError::HierarchyViolation {
                reason: HierarchyViolation::NotAParent { .. },
                ..
            })
        ));
    }
}
