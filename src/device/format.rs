use sysdefs::{formats::FormatKind, osuuid::OsUuid};

use crate::{
    constants::{BTRFS_MIN_MEMBER_SIZE, XFS_MIN_SIZE},
    primitives::size::Size,
};

/// Content format carried by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pub kind: FormatKind,

    /// Whether the format is already written to the device.
    pub exists: bool,

    pub uuid: Option<OsUuid>,
    pub label: Option<String>,
}

impl Format {
    pub fn new(kind: FormatKind) -> Self {
        Self {
            kind,
            exists: false,
            uuid: None,
            label: None,
        }
    }

    /// A format already present on the device.
    pub fn existing(kind: FormatKind) -> Self {
        Self {
            exists: true,
            ..Self::new(kind)
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<OsUuid>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Smallest device the format can be created on.
    pub fn min_size(&self) -> Size {
        match self.kind {
            FormatKind::Btrfs => BTRFS_MIN_MEMBER_SIZE,
            FormatKind::Xfs => XFS_MIN_SIZE,
            _ => Size::ZERO,
        }
    }
}

impl From<FormatKind> for Format {
    fn from(kind: FormatKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let format = Format::existing(FormatKind::Btrfs)
            .with_uuid("3386ff85-f501-2621-4a43-5f061eb47236")
            .with_label("data");
        assert!(format.exists);
        assert!(matches!(format.uuid, Some(OsUuid::Uuid(_))));
        assert_eq!(format.label.as_deref(), Some("data"));
        assert_eq!(format.min_size(), Size::from_mib(256));

        assert_eq!(Format::from(FormatKind::Xfs).min_size(), Size::from_mib(300));
        assert_eq!(Format::new(FormatKind::MdMember).min_size(), Size::ZERO);
    }
}
