use log::trace;

use sysdefs::osuuid::OsUuid;

use crate::{
    constants::DEV_PATH,
    error::DeviceError,
    graph::{DeviceGraph, DeviceId},
    primitives::size::Size,
};

use super::{Device, DeviceKind, DeviceSizes, Format};

/// Kinds of simple, non-composite devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageKind {
    /// A generic block device, such as a partition.
    #[default]
    Storage,
    Disk,
    Optical,
}

/// Description of a simple device to add to a `DeviceGraph`.
#[derive(Debug, Clone, Default)]
pub struct StorageDeviceSpec {
    pub name: String,
    pub kind: StorageKind,
    pub exists: bool,
    pub format: Option<Format>,

    /// Capacity of the device. Zero when unknown.
    pub size: Option<Size>,

    pub uuid: Option<OsUuid>,

    /// Devices this one lives on, e.g. the disk holding a partition.
    pub parents: Vec<DeviceId>,
}

impl StorageDeviceSpec {
    pub(crate) fn build(self, graph: &DeviceGraph) -> Result<Device, DeviceError> {
        trace!("Checking {:?} device '{}'", self.kind, self.name);
        graph.check_name(&self.name)?;
        let parents = graph.resolve_parents(&self.name, &self.parents)?;

        Ok(Device {
            path: format!("{DEV_PATH}/{}", self.name),
            sizes: DeviceSizes::known(self.size.unwrap_or_default(), self.exists),
            name: self.name,
            exists: self.exists,
            format: self.format,
            parents,
            uuid: self.uuid,
            kind: match self.kind {
                StorageKind::Storage => DeviceKind::Storage,
                StorageKind::Disk => DeviceKind::Disk,
                StorageKind::Optical => DeviceKind::Optical,
            },
        })
    }
}
