use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Content formats a block device may carry.
///
/// Besides real filesystems this includes the member signatures written by
/// composite-device tooling (mdadm, LVM, LUKS), since those decide whether a
/// device may join a composite device.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FormatKind {
    Btrfs,
    Ext2,
    Ext3,
    Ext4,
    Iso9660,
    Luks,
    LvmPv,
    MdMember,
    Swap,
    Vfat,
    Xfs,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_format_kind_names() {
        assert_eq!(FormatKind::MdMember.to_string(), "mdmember");
        assert_eq!(FormatKind::LvmPv.to_string(), "lvmpv");
        assert_eq!(FormatKind::from_str("BTRFS").unwrap(), FormatKind::Btrfs);
        assert!(FormatKind::from_str("zfs").is_err());

        let fs: FormatKind = serde_json::from_str(r#""mdmember""#).unwrap();
        assert_eq!(fs, FormatKind::MdMember);

        // String form and serde form agree for every variant.
        for kind in FormatKind::iter() {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", <&'static str>::from(kind)));
        }
    }
}
