use const_format::formatcp;

use crate::primitives::size::Size;

// Path constants

/// Directory holding device nodes.
pub const DEV_PATH: &str = "/dev";

/// Directory holding named MD array device nodes.
pub const DEV_MD_PATH: &str = formatcp!("{DEV_PATH}/md");

/// Prefix of an fstab source that references a filesystem by UUID.
pub const FSTAB_UUID_PREFIX: &str = "UUID=";

/// Prefix of an fstab source that references a filesystem by label.
pub const FSTAB_LABEL_PREFIX: &str = "LABEL=";

// MD RAID constants

/// Default chunk size of striped and parity RAID levels.
pub const MD_CHUNK_SIZE_DEFAULT: Size = Size::from_kib(512);

/// Metadata version recorded for arrays that have not been created yet.
pub const MD_METADATA_VERSION_DEFAULT: &str = "default";

/// Superblock reservation for metadata formats that keep it at the end of the
/// member (0.90 and 1.0).
pub const MD_SUPERBLOCK_SIZE_FIXED: Size = Size::from_mib(2);

/// Upper bound of the data offset mdadm reserves on each member for 1.x
/// metadata.
pub const MD_SUPERBLOCK_SIZE_MAX: Size = Size::from_mib(128);

/// Lower bound of the data offset mdadm reserves on each member for 1.x
/// metadata.
pub const MD_SUPERBLOCK_SIZE_MIN: Size = Size::from_mib(1);

// BTRFS constants

/// Smallest device mkfs.btrfs accepts.
pub const BTRFS_MIN_MEMBER_SIZE: Size = Size::from_mib(256);

/// Smallest device mkfs.xfs accepts.
pub const XFS_MIN_SIZE: Size = Size::from_mib(300);
