use std::fmt::Display;

use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Separator used by mdadm between the four 32-bit words of an array UUID.
const MDADM_UUID_SEPARATOR: char = ':';

/// This enum contains a proper UUID or a relaxed string representation of
/// something that is not a proper UUID.
///
/// Block device metadata may carry proper UUIDs or just some string that
/// uniquely identifies the device without conforming to the UUID format.
/// Relaxed values are kept verbatim and never rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OsUuid {
    Uuid(Uuid),
    Relaxed(String),
}

impl OsUuid {
    /// Checks if the given UUID matches the one stored in this enum.
    pub fn match_uuid(&self, other: &Uuid) -> bool {
        match self {
            OsUuid::Uuid(uuid) => uuid == other,
            OsUuid::Relaxed(_) => false,
        }
    }

    /// Provides the UUID stored in this enum, if it is a proper UUID.
    ///
    /// A relaxed value written in mdadm notation
    /// (`xxxxxxxx:xxxxxxxx:xxxxxxxx:xxxxxxxx`) is also resolved.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            OsUuid::Uuid(uuid) => Some(*uuid),
            OsUuid::Relaxed(s) => {
                let words: Vec<&str> = s.split(MDADM_UUID_SEPARATOR).collect();
                if words.len() != 4 || words.iter().any(|w| w.len() != 8) {
                    return None;
                }
                Uuid::try_parse(&words.concat()).ok()
            }
        }
    }

    /// Renders the UUID the way mdadm reports array UUIDs: 32 lowercase hex
    /// digits in four colon-separated groups of eight.
    ///
    /// Returns `None` when the value cannot be resolved to a proper UUID.
    pub fn to_mdadm_format(&self) -> Option<String> {
        let simple = self.as_uuid()?.simple().to_string();
        Some(
            [&simple[0..8], &simple[8..16], &simple[16..24], &simple[24..32]]
                .join(&MDADM_UUID_SEPARATOR.to_string()),
        )
    }
}

impl From<&str> for OsUuid {
    fn from(value: &str) -> Self {
        match Uuid::parse_str(value) {
            Ok(uuid) => Self::Uuid(uuid),
            Err(_) => Self::Relaxed(value.to_string()),
        }
    }
}

impl From<String> for OsUuid {
    fn from(value: String) -> Self {
        value.as_str().into()
    }
}

impl From<Uuid> for OsUuid {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl Display for OsUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsUuid::Uuid(uuid) => write!(f, "{}", uuid.hyphenated()),
            OsUuid::Relaxed(s) => write!(f, "{s}"),
        }
    }
}

impl<'de> Deserialize<'de> for OsUuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(String::deserialize(deserializer)?.as_str().into())
    }
}

impl Serialize for OsUuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_string().serialize(serializer)
    }
}
