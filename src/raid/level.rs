use std::{fmt::Display, str::FromStr};

use strum_macros::{Display as StrumDisplay, EnumIter, IntoStaticStr};

use crate::{
    error::{DeviceError, LevelFamily},
    primitives::size::Size,
};

/// MD RAID levels.
#[derive(
    Copy, Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, StrumDisplay, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum RaidLevel {
    /// Metadata-only grouping of disks, holds no data.
    Container,

    /// Concatenation
    Linear,

    /// Striping
    Raid0,

    /// Mirroring
    Raid1,

    /// Striping with a dedicated parity disk
    Raid4,

    /// Striping with distributed parity
    Raid5,

    /// Striping with double parity
    Raid6,

    /// Stripe of mirrors
    Raid10,
}

/// Loosely typed level as callers provide it: a name or a numeric code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelInput {
    Name(String),
    Number(i64),
}

impl From<&str> for LevelInput {
    fn from(value: &str) -> Self {
        Self::Name(value.to_owned())
    }
}

impl From<String> for LevelInput {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<i32> for LevelInput {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<RaidLevel> for LevelInput {
    fn from(value: RaidLevel) -> Self {
        Self::Name(value.name().to_owned())
    }
}

impl Display for LevelInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelInput::Name(name) => write!(f, "{name}"),
            LevelInput::Number(number) => write!(f, "{number}"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown RAID level '{0}'")]
pub struct LevelParseError(pub String);

impl FromStr for RaidLevel {
    type Err = LevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if let Ok(number) = normalized.parse::<i64>() {
            return Self::from_number(number).ok_or_else(|| LevelParseError(s.to_owned()));
        }

        Ok(match normalized.as_str() {
            "container" => Self::Container,
            "linear" => Self::Linear,
            "raid0" | "stripe" | "striped" => Self::Raid0,
            "raid1" | "mirror" | "mirrored" => Self::Raid1,
            "raid4" => Self::Raid4,
            "raid5" => Self::Raid5,
            "raid6" => Self::Raid6,
            "raid10" => Self::Raid10,
            _ => return Err(LevelParseError(s.to_owned())),
        })
    }
}

impl RaidLevel {
    /// Resolves a level from its numeric code.
    pub fn from_number(number: i64) -> Option<Self> {
        match number {
            -1 => Some(Self::Linear),
            0 => Some(Self::Raid0),
            1 => Some(Self::Raid1),
            4 => Some(Self::Raid4),
            5 => Some(Self::Raid5),
            6 => Some(Self::Raid6),
            10 => Some(Self::Raid10),
            _ => None,
        }
    }

    /// Resolves a level for the given device, failing when it is missing or
    /// not recognized.
    pub fn parse(device: &str, input: Option<&LevelInput>) -> Result<Self, DeviceError> {
        let invalid = || DeviceError::InvalidLevel {
            device: device.to_owned(),
            family: LevelFamily::Md,
            level: input.map(ToString::to_string),
        };

        match input {
            None => Err(invalid()),
            Some(LevelInput::Name(name)) => name.parse().map_err(|_| invalid()),
            Some(LevelInput::Number(number)) => Self::from_number(*number).ok_or_else(invalid),
        }
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Numeric code of the level, as used by mdadm.
    pub fn number(self) -> Option<i32> {
        match self {
            Self::Container => None,
            Self::Linear => Some(-1),
            Self::Raid0 => Some(0),
            Self::Raid1 => Some(1),
            Self::Raid4 => Some(4),
            Self::Raid5 => Some(5),
            Self::Raid6 => Some(6),
            Self::Raid10 => Some(10),
        }
    }

    pub fn min_members(self) -> usize {
        match self {
            Self::Container | Self::Linear => 1,
            Self::Raid0 | Self::Raid1 => 2,
            Self::Raid4 | Self::Raid5 => 3,
            Self::Raid6 | Self::Raid10 => 4,
        }
    }

    /// Computes the data capacity of an array.
    ///
    /// Only the first `member_devices` sizes belong to active members; the
    /// rest are spares. The superblock reservation returned by `superblock`
    /// is subtracted from each active member first.
    pub fn compute_size(
        self,
        member_sizes: &[Size],
        member_devices: usize,
        superblock: impl Fn(Size) -> Size,
    ) -> Size {
        let active = member_sizes
            .iter()
            .take(member_devices)
            .map(|size| *size - superblock(*size))
            .collect::<Vec<_>>();

        let Some(smallest) = active.iter().min().copied() else {
            return Size::ZERO;
        };
        let count = active.len() as u64;

        match self {
            Self::Container => Size::ZERO,
            Self::Linear | Self::Raid0 => active.iter().copied().sum(),
            Self::Raid1 => smallest,
            Self::Raid4 | Self::Raid5 => smallest * count.saturating_sub(1),
            Self::Raid6 => smallest * count.saturating_sub(2),
            Self::Raid10 => smallest * (count / 2),
        }
    }

    /// Whether an array of this level and size gets a write-intent bitmap.
    pub fn bitmap_eligible(self, size: Size, chunk_size: Size) -> bool {
        match self {
            Self::Raid4 | Self::Raid5 | Self::Raid6 | Self::Raid10 => size > chunk_size,
            Self::Container | Self::Linear | Self::Raid0 | Self::Raid1 => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    fn mib(sizes: &[u64]) -> Vec<Size> {
        sizes.iter().map(|s| Size::from_mib(*s)).collect()
    }

    #[test]
    fn test_parse_aliases() {
        for (input, expected) in [
            ("raid1", RaidLevel::Raid1),
            ("RAID1", RaidLevel::Raid1),
            ("mirror", RaidLevel::Raid1),
            ("1", RaidLevel::Raid1),
            ("stripe", RaidLevel::Raid0),
            ("0", RaidLevel::Raid0),
            ("-1", RaidLevel::Linear),
            ("linear", RaidLevel::Linear),
            ("container", RaidLevel::Container),
            (" raid10 ", RaidLevel::Raid10),
        ] {
            assert_eq!(input.parse::<RaidLevel>().unwrap(), expected, "{input}");
        }

        for input in ["raid2", "2", "junk", ""] {
            assert_eq!(
                input.parse::<RaidLevel>(),
                Err(LevelParseError(input.to_owned()))
            );
        }

        // Names and numbers round-trip through the parser.
        for level in RaidLevel::iter() {
            assert_eq!(level.name().parse::<RaidLevel>().unwrap(), level);
            if let Some(number) = level.number() {
                assert_eq!(RaidLevel::from_number(number.into()), Some(level));
            }
        }
    }

    #[test]
    fn test_parse_for_device() {
        assert_eq!(
            RaidLevel::parse("md0", Some(&5.into())).unwrap(),
            RaidLevel::Raid5
        );
        assert_eq!(
            RaidLevel::parse("md0", Some(&"raid5".into())).unwrap(),
            RaidLevel::Raid5
        );

        assert_eq!(
            RaidLevel::parse("md0", None).unwrap_err(),
            DeviceError::InvalidLevel {
                device: "md0".into(),
                family: LevelFamily::Md,
                level: None,
            }
        );
        assert_eq!(
            RaidLevel::parse("md0", Some(&"junk".into())).unwrap_err(),
            DeviceError::InvalidLevel {
                device: "md0".into(),
                family: LevelFamily::Md,
                level: Some("junk".into()),
            }
        );
        assert!(RaidLevel::parse("md0", Some(&3.into()))
            .unwrap_err()
            .to_string()
            .contains("invalid"));
    }

    #[test]
    fn test_min_members_and_numbers() {
        let table = RaidLevel::iter()
            .map(|l| (l.name(), l.number(), l.min_members()))
            .collect::<Vec<_>>();
        assert_eq!(
            table,
            vec![
                ("container", None, 1),
                ("linear", Some(-1), 1),
                ("raid0", Some(0), 2),
                ("raid1", Some(1), 2),
                ("raid4", Some(4), 3),
                ("raid5", Some(5), 3),
                ("raid6", Some(6), 4),
                ("raid10", Some(10), 4),
            ]
        );
    }

    #[test]
    fn test_compute_size() {
        let none = |_| Size::ZERO;

        assert_eq!(
            RaidLevel::Raid0.compute_size(&mib(&[4, 2]), 2, none),
            Size::from_mib(6)
        );
        assert_eq!(
            RaidLevel::Linear.compute_size(&mib(&[4, 2]), 2, none),
            Size::from_mib(6)
        );
        assert_eq!(
            RaidLevel::Raid1.compute_size(&mib(&[4, 2]), 2, none),
            Size::from_mib(2)
        );
        assert_eq!(
            RaidLevel::Raid1.compute_size(&mib(&[2, 4]), 2, none),
            Size::from_mib(2)
        );
        assert_eq!(
            RaidLevel::Raid5.compute_size(&mib(&[4, 2, 2]), 3, none),
            Size::from_mib(4)
        );
        assert_eq!(
            RaidLevel::Raid4.compute_size(&mib(&[3, 3, 3]), 3, none),
            Size::from_mib(6)
        );
        assert_eq!(
            RaidLevel::Raid6.compute_size(&mib(&[4, 4, 2, 2]), 4, none),
            Size::from_mib(4)
        );
        assert_eq!(
            RaidLevel::Raid10.compute_size(&mib(&[4, 4, 4, 4]), 4, none),
            Size::from_mib(8)
        );
        assert_eq!(
            RaidLevel::Container.compute_size(&mib(&[4, 4]), 2, none),
            Size::ZERO
        );

        // Spares do not contribute.
        assert_eq!(
            RaidLevel::Raid0.compute_size(&mib(&[4, 4, 1]), 2, none),
            Size::from_mib(8)
        );
        assert_eq!(
            RaidLevel::Raid1.compute_size(&mib(&[4, 4, 1]), 2, none),
            Size::from_mib(4)
        );

        // No members, no capacity.
        assert_eq!(RaidLevel::Raid1.compute_size(&[], 0, none), Size::ZERO);

        // Superblock overhead comes off every active member.
        assert_eq!(
            RaidLevel::Raid0.compute_size(&mib(&[4, 2]), 2, |_| Size::from_mib(1)),
            Size::from_mib(4)
        );
        assert_eq!(
            RaidLevel::Raid1.compute_size(&mib(&[1, 4]), 2, |_| Size::from_mib(2)),
            Size::ZERO
        );
    }

    #[test]
    fn test_bitmap_eligible() {
        let chunk = Size::from_mib(1);
        for level in [
            RaidLevel::Raid4,
            RaidLevel::Raid5,
            RaidLevel::Raid6,
            RaidLevel::Raid10,
        ] {
            assert!(level.bitmap_eligible(Size::from_mib(4), chunk));
            assert!(!level.bitmap_eligible(Size::from_mib(1), chunk));
        }

        for level in [
            RaidLevel::Container,
            RaidLevel::Linear,
            RaidLevel::Raid0,
            RaidLevel::Raid1,
        ] {
            assert!(!level.bitmap_eligible(Size::from_gib(4), chunk));
        }
    }
}
