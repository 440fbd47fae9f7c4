//! # Device Graph
//!
//! The purpose of this module is to hold every planned or existing block
//! device in a single arena and keep the graph valid while callers build and
//! change it.
//!
//! In broad terms, this module is used as follows:
//!
//! 1. Create a `DeviceGraph` with a `StorageConfig`.
//! 2. Add devices bottom-up with the `add_*` methods, passing a spec
//!    (`StorageDeviceSpec`, `MdArraySpec`, `BtrfsVolumeSpec`...) that only
//!    references devices already in the graph.
//! 3. Each `add_*` call validates the new device against its parents and
//!    computes its derived attributes. On failure nothing is inserted.
//! 4. Query devices through `DeviceRef` views, or mutate them with
//!    `set_level`, `set_size`, `add_parent`, `remove_parent` and
//!    `remove_device`. Mutations are all-or-nothing and refresh the derived
//!    attributes of every dependent.
//!
//! Edges point from a device to the devices it depends on, so the devices a
//! node points at are its parents and the devices pointing at it are its
//! dependents.
//!
//! ## Layout
//!
//! ```text
//! src/graph
//! ├── graph.rs -------------> # DeviceGraph, DeviceId & core queries.
//! ├── mod.rs ---------------> # This file.
//! ├── mutate.rs ------------> # Mutations of devices already in the graph.
//! ├── validation_tests.rs --> # Validation tests.
//! └── view.rs --------------> # DeviceRef, the read-only view of a device.
//! ```
//!

#[allow(clippy::module_inception)]
mod graph;
mod mutate;
mod view;

pub use graph::{DeviceGraph, DeviceId, Relation};
pub use view::DeviceRef;
