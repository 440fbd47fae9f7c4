use std::{
    fmt::Display,
    iter::Sum,
    num::ParseIntError,
    ops::{Add, AddAssign, Div, Mul, Sub},
    str::FromStr,
};

/// An exact, non-negative amount of bytes.
///
/// Subtraction saturates at zero, since a block device can never have a
/// negative capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Size(pub u64);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeParseError {
    #[error("invalid number: {0}")]
    InvalidNumber(#[from] ParseIntError),

    #[error("unknown unit '{0}', expected one of B, K, KiB, M, MiB, G, GiB, T, TiB")]
    UnknownUnit(String),

    #[error("size '{0}' does not fit in 64 bits")]
    Overflow(String),
}

impl From<u64> for Size {
    fn from(x: u64) -> Self {
        Size(x)
    }
}

impl Size {
    pub const ZERO: Size = Size(0);

    pub const fn from_bytes(bytes: u64) -> Self {
        Size(bytes)
    }

    pub const fn from_kib(kib: u64) -> Self {
        Size(kib << 10)
    }

    pub const fn from_mib(mib: u64) -> Self {
        Size(mib << 20)
    }

    pub const fn from_gib(gib: u64) -> Self {
        Size(gib << 30)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn to_human_readable(&self) -> String {
        match self.0.trailing_zeros() {
            _ if self.0 == 0 => "0 B".to_owned(),
            0..=9 => format!("{} B", self.0),
            10..=19 => format!("{} KiB", self.0 >> 10),
            20..=29 => format!("{} MiB", self.0 >> 20),
            30..=39 => format!("{} GiB", self.0 >> 30),
            _ => format!("{} TiB", self.0 >> 40),
        }
    }

    pub fn from_human_readable(s: &str) -> Result<Self, SizeParseError> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let value = digits.parse::<u64>()?;

        let shift = match unit.trim() {
            "" | "B" => 0,
            "K" | "KiB" => 10,
            "M" | "MiB" => 20,
            "G" | "GiB" => 30,
            "T" | "TiB" => 40,
            other => return Err(SizeParseError::UnknownUnit(other.to_owned())),
        };

        value
            .checked_mul(1 << shift)
            .map(Size)
            .ok_or_else(|| SizeParseError::Overflow(s.to_owned()))
    }
}

impl Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

impl FromStr for Size {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_human_readable(s)
    }
}

impl Add for Size {
    type Output = Size;

    fn add(self, rhs: Size) -> Size {
        Size(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Size {
    fn add_assign(&mut self, rhs: Size) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Size {
    type Output = Size;

    fn sub(self, rhs: Size) -> Size {
        Size(self.0.saturating_sub(rhs.0))
    }
}

impl Mul<u64> for Size {
    type Output = Size;

    fn mul(self, rhs: u64) -> Size {
        Size(self.0.saturating_mul(rhs))
    }
}

impl Div<u64> for Size {
    type Output = Size;

    fn div(self, rhs: u64) -> Size {
        Size(self.0 / rhs)
    }
}

impl Sum for Size {
    fn sum<I: Iterator<Item = Size>>(iter: I) -> Size {
        iter.fold(Size::ZERO, Add::add)
    }
}

impl<'de> serde::Deserialize<'de> for Size {
    fn deserialize<D>(deserializer: D) -> Result<Size, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Size may be provided as a string (e.g. "512 KiB") or as a pure
        // number (e.g. 524288). Serde forces a number when only digits are
        // provided, so deserialize a generic value and then check the type.
        let value = serde_yaml::Value::deserialize(deserializer)?;

        match value {
            serde_yaml::Value::String(s) => Size::from_str(s.as_str())
                .map_err(|e| serde::de::Error::custom(format!("invalid size: {e}"))),
            serde_yaml::Value::Number(n) => {
                let n = n.as_u64().ok_or_else(|| {
                    serde::de::Error::custom("invalid size, expected unsigned integer")
                })?;
                Ok(Size(n))
            }
            _ => Err(serde::de::Error::custom("invalid size")),
        }
    }
}

impl serde::Serialize for Size {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if self.0 & 0x3FF != 0 {
            // Not a multiple of 1024, so it has no shorter unit form.
            serializer.serialize_u64(self.0)
        } else {
            serializer.serialize_str(self.to_human_readable().as_str())
        }
    }
}
