use std::str::FromStr;

use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{DeviceError, LevelFamily};

/// Allocation profiles of a btrfs volume.
#[derive(
    Copy, Clone, Debug, Hash, Eq, PartialEq, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BtrfsRaidLevel {
    Single,

    /// Two copies on the same device. Metadata only.
    Dup,

    Raid0,
    Raid1,
    Raid10,
}

impl BtrfsRaidLevel {
    /// Parses an optional level token for the given profile family.
    pub fn parse(
        device: &str,
        family: LevelFamily,
        input: Option<&str>,
    ) -> Result<Option<Self>, DeviceError> {
        let Some(input) = input else {
            return Ok(None);
        };

        match Self::from_str(input.trim()) {
            Ok(Self::Dup) if family == LevelFamily::BtrfsData => {}
            Ok(level) => return Ok(Some(level)),
            Err(_) => {}
        }

        Err(DeviceError::InvalidLevel {
            device: device.to_owned(),
            family,
            level: Some(input.to_owned()),
        })
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn min_members(self) -> usize {
        match self {
            Self::Single | Self::Dup => 1,
            Self::Raid0 | Self::Raid1 => 2,
            Self::Raid10 => 4,
        }
    }

    /// Whether every block is stored on two devices.
    pub fn is_mirrored(self) -> bool {
        matches!(self, Self::Raid1 | Self::Raid10)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(
            BtrfsRaidLevel::parse("vol", LevelFamily::BtrfsData, None).unwrap(),
            None
        );
        assert_eq!(
            BtrfsRaidLevel::parse("vol", LevelFamily::BtrfsData, Some("RAID1")).unwrap(),
            Some(BtrfsRaidLevel::Raid1)
        );
        assert_eq!(
            BtrfsRaidLevel::parse("vol", LevelFamily::BtrfsMetadata, Some("dup")).unwrap(),
            Some(BtrfsRaidLevel::Dup)
        );

        let err = BtrfsRaidLevel::parse("vol", LevelFamily::BtrfsData, Some("dup")).unwrap_err();
        assert_eq!(
            err,
            DeviceError::InvalidLevel {
                device: "vol".into(),
                family: LevelFamily::BtrfsData,
                level: Some("dup".into()),
            }
        );
        assert!(err.to_string().contains("invalid"));

        assert!(BtrfsRaidLevel::parse("vol", LevelFamily::BtrfsMetadata, Some("raid5")).is_err());
    }

    #[test]
    fn test_properties() {
        let table = BtrfsRaidLevel::iter()
            .map(|l| (l.name(), l.min_members(), l.is_mirrored()))
            .collect::<Vec<_>>();
        assert_eq!(
            table,
            vec![
                ("single", 1, false),
                ("dup", 1, false),
                ("raid0", 2, false),
                ("raid1", 2, true),
                ("raid10", 4, true),
            ]
        );
    }
}
