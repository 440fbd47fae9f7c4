use strum_macros::Display;

use sysdefs::formats::FormatKind;

use crate::{device::DeviceType, graph::DeviceId};

/// Pluralizes a word based on the count.
fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

/// Renders an optional level token for an error message.
fn pretty_level(level: &Option<String>) -> String {
    match level {
        Some(level) => format!("'{level}'"),
        None => "(none)".to_owned(),
    }
}

fn pretty_format(format: &Option<FormatKind>) -> String {
    match format {
        Some(format) => format!("'{format}'"),
        None => "no format".to_owned(),
    }
}

fn pretty_formats(formats: &[FormatKind]) -> String {
    formats
        .iter()
        .map(|f| format!("'{f}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The level vocabulary a level token was parsed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LevelFamily {
    #[strum(serialize = "RAID")]
    Md,
    #[strum(serialize = "btrfs data")]
    BtrfsData,
    #[strum(serialize = "btrfs metadata")]
    BtrfsMetadata,
}

/// Errors raised while building or mutating devices in a `DeviceGraph`.
///
/// Every error is raised before anything is applied, so a failed operation
/// leaves the graph untouched.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device '{device}' has an invalid {family} level: {}", pretty_level(.level))]
    InvalidLevel {
        device: String,
        family: LevelFamily,
        level: Option<String>,
    },

    #[error(
        "Device '{device}' with level '{level}' requires at least {}, found {actual}",
        pluralize(*.min, "member", "members")
    )]
    TooFewMembers {
        device: String,
        level: String,
        min: usize,
        actual: usize,
    },

    #[error("Device '{parent}' is already a parent of '{device}'")]
    DuplicateParent { device: String, parent: String },

    #[error(
        "Parent '{parent}' of '{device}' has {}, but the format must be one of: {}",
        pretty_format(.found),
        pretty_formats(.expected)
    )]
    FormatMismatch {
        device: String,
        parent: String,
        expected: Vec<FormatKind>,
        found: Option<FormatKind>,
    },

    #[error("Device '{device}' is invalid: {reason}")]
    HierarchyViolation {
        device: String,
        reason: HierarchyViolation,
    },

    #[error("Cannot directly set {attribute} of {device_type} '{device}'")]
    ImmutableAttribute {
        device: String,
        device_type: DeviceType,
        attribute: &'static str,
    },

    #[error("Device {0} does not exist in this graph")]
    UnknownDevice(DeviceId),

    #[error("Device '{0}' is defined more than once")]
    DuplicateName(String),

    #[error("Making '{parent}' a parent of '{device}' would create a dependency cycle")]
    CyclicDependency { device: String, parent: String },

    #[error(
        "Device '{device}' has an invalid member count: {member_devices} active and \
            {total_devices} total members with {}",
        pluralize(*.parents, "parent", "parents")
    )]
    InvalidMemberCount {
        device: String,
        member_devices: usize,
        total_devices: usize,
        parents: usize,
    },
}

/// Structural rules of composite devices.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyViolation {
    #[error("parent '{parent}' must be a btrfs volume")]
    NotAVolume { parent: String },

    #[error("parent '{parent}' must be an MD container")]
    NotAContainer { parent: String },

    #[error(
        "expected exactly {}, found {actual}",
        pluralize(*.expected, "parent", "parents")
    )]
    ParentCount { expected: usize, actual: usize },

    #[error("non-existent btrfs snapshots must have a source")]
    MissingSnapshotSource,

    #[error("btrfs snapshot source '{origin}' must be a btrfs subvolume")]
    SourceNotSubvolume { origin: String },

    #[error("btrfs snapshot source '{origin}' must already exist")]
    SourceNotExisting { origin: String },

    #[error("btrfs snapshot and source '{origin}' must be in the same volume")]
    SourceVolumeMismatch { origin: String },

    #[error("device is still used by {}", .dependents.join(", "))]
    HasDependents { dependents: Vec<String> },

    #[error("parents of a {device_type} device cannot be changed")]
    FixedParents { device_type: DeviceType },

    #[error("'{parent}' is not a parent of this device")]
    NotAParent { parent: String },
}
