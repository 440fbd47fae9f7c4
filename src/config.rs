use std::{fs, path::Path};

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

use sysdefs::formats::FormatKind;

use crate::{
    constants::{
        MD_CHUNK_SIZE_DEFAULT, MD_SUPERBLOCK_SIZE_FIXED, MD_SUPERBLOCK_SIZE_MAX,
        MD_SUPERBLOCK_SIZE_MIN,
    },
    primitives::size::Size,
};

/// Tunables consulted while validating devices and deriving their sizes.
///
/// Every `DeviceGraph` owns one of these; there is no process-wide state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StorageConfig {
    /// Chunk size of striped and parity arrays. Arrays at or below this size
    /// never get a write-intent bitmap.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: Size,

    /// Fixed per-member superblock reservation. When unset, the reservation
    /// follows mdadm's data offset policy for the array's metadata version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_superblock_size: Option<Size>,

    /// Formats a device may carry to become an MD array member.
    #[serde(default = "default_md_member_formats")]
    pub md_member_formats: Vec<FormatKind>,

    /// Formats a device may carry to become a BTRFS volume member.
    #[serde(default = "default_btrfs_member_formats")]
    pub btrfs_member_formats: Vec<FormatKind>,
}

fn default_chunk_size() -> Size {
    MD_CHUNK_SIZE_DEFAULT
}

fn default_md_member_formats() -> Vec<FormatKind> {
    vec![FormatKind::MdMember]
}

fn default_btrfs_member_formats() -> Vec<FormatKind> {
    vec![FormatKind::Btrfs]
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            fixed_superblock_size: None,
            md_member_formats: default_md_member_formats(),
            btrfs_member_formats: default_btrfs_member_formats(),
        }
    }
}

impl StorageConfig {
    /// Parses a configuration from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        serde_yaml::from_str(yaml).context("Failed to parse storage configuration")
    }

    /// Reads and parses a configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read storage configuration from '{}'",
                path.display()
            )
        })?;

        Self::from_yaml(&contents).with_context(|| {
            format!(
                "Failed to load storage configuration from '{}'",
                path.display()
            )
        })
    }

    /// Returns the space reserved on a member of the given size for MD
    /// metadata.
    ///
    /// Metadata 0.90 and 1.0 keep the superblock at the end of the member
    /// and reserve a fixed amount. Newer formats reserve roughly 0.1% of the
    /// member, between 1 MiB and 128 MiB.
    pub fn superblock_size(&self, member: Size, metadata_version: Option<&str>) -> Size {
        if let Some(fixed) = self.fixed_superblock_size {
            return fixed;
        }

        if matches!(metadata_version, Some("0.90" | "1.0")) {
            return MD_SUPERBLOCK_SIZE_FIXED;
        }

        let mut headroom = MD_SUPERBLOCK_SIZE_MAX;
        while headroom * 1024 > member && headroom > MD_SUPERBLOCK_SIZE_MIN {
            headroom = headroom / 2;
        }
        headroom
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use indoc::indoc;
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::from_yaml("{}").unwrap();
        assert_eq!(config, StorageConfig::default());
        assert_eq!(config.chunk_size, Size::from_kib(512));
        assert_eq!(config.md_member_formats, vec![FormatKind::MdMember]);
        assert_eq!(config.btrfs_member_formats, vec![FormatKind::Btrfs]);
    }

    #[test]
    fn test_from_yaml() {
        let config = StorageConfig::from_yaml(indoc! {r#"
            chunkSize: 1 MiB
            fixedSuperblockSize: 0
            mdMemberFormats:
              - mdmember
              - ext4
            btrfsMemberFormats:
              - btrfs
        "#})
        .unwrap();

        assert_eq!(config.chunk_size, Size::from_mib(1));
        assert_eq!(config.fixed_superblock_size, Some(Size::ZERO));
        assert_eq!(
            config.md_member_formats,
            vec![FormatKind::MdMember, FormatKind::Ext4]
        );

        // Unknown fields are rejected.
        let err = StorageConfig::from_yaml("chunk: 1M").unwrap_err();
        assert!(
            format!("{err:?}").contains("unknown field"),
            "unexpected error: {err:?}"
        );

        // So are unknown formats.
        assert!(StorageConfig::from_yaml("mdMemberFormats: [zfs]").is_err());
    }

    #[test]
    fn test_load() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"chunkSize: 64K\n").unwrap();

        let config = StorageConfig::load(file.path()).unwrap();
        assert_eq!(config.chunk_size, Size::from_kib(64));

        let dir = tempfile::tempdir().unwrap();
        let err = StorageConfig::load(dir.path().join("missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read storage configuration"));
    }

    #[test]
    fn test_superblock_size() {
        let config = StorageConfig::default();

        // 0.1% of the member, clamped to [1 MiB, 128 MiB].
        assert_eq!(
            config.superblock_size(Size::from_gib(1), None),
            Size::from_mib(1)
        );
        assert_eq!(
            config.superblock_size(Size::from_gib(4), Some("default")),
            Size::from_mib(4)
        );
        assert_eq!(
            config.superblock_size(Size::from_gib(1024), Some("1.2")),
            Size::from_mib(128)
        );
        assert_eq!(
            config.superblock_size(Size::from_mib(10), None),
            Size::from_mib(1)
        );

        // Superblock at the end of the member.
        assert_eq!(
            config.superblock_size(Size::from_gib(1024), Some("0.90")),
            Size::from_mib(2)
        );
        assert_eq!(
            config.superblock_size(Size::from_gib(1024), Some("1.0")),
            Size::from_mib(2)
        );

        let config = StorageConfig {
            fixed_superblock_size: Some(Size::ZERO),
            ..Default::default()
        };
        assert_eq!(
            config.superblock_size(Size::from_gib(1024), None),
            Size::ZERO
        );
    }
}
