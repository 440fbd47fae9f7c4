//! Planning core for block device stacks.
//!
//! Devices (disks, partitions, MD arrays, BIOS RAID sets, btrfs volumes,
//! subvolumes and snapshots) live in a `DeviceGraph`. Every device is
//! validated against its parents when it is added, and derived attributes
//! such as array sizes are kept up to date as the graph changes. Nothing
//! here touches the host.

pub mod btrfs;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod graph;
pub mod primitives;
pub mod raid;

pub use config::StorageConfig;
pub use device::{BlockDevice, Device, DeviceKind, DeviceType, Format};
pub use error::DeviceError;
pub use graph::{DeviceGraph, DeviceId, DeviceRef};
pub use primitives::size::Size;
