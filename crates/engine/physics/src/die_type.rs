use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical die shape.
///
/// The string form (`"d6"`, `"d100"`, `"dfate"`) is the key used by theme
/// configs and collider face maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
    Fate,
    /// Any other side count. Never has a collider in the stock mesh sets.
    Other(u32),
}

impl DieType {
    /// Die type for a numeric side count
    pub fn from_sides(sides: u32) -> Self {
        match sides {
            4 => Self::D4,
            6 => Self::D6,
            8 => Self::D8,
            10 => Self::D10,
            12 => Self::D12,
            20 => Self::D20,
            100 => Self::D100,
            n => Self::Other(n),
        }
    }

    /// Number of faces, `None` for fate dice
    pub fn sides(&self) -> Option<u32> {
        match self {
            Self::D4 => Some(4),
            Self::D6 => Some(6),
            Self::D8 => Some(8),
            Self::D10 => Some(10),
            Self::D12 => Some(12),
            Self::D20 => Some(20),
            Self::D100 => Some(100),
            Self::Fate => None,
            Self::Other(n) => Some(*n),
        }
    }

    /// Mass factor applied when a mesh bundle does not carry its own
    /// `physicsMass`.
    pub fn default_mass(&self) -> f32 {
        match self {
            Self::D4 => 0.7,
            Self::D6 | Self::Fate => 0.8,
            Self::D8 => 0.82,
            Self::D10 | Self::D100 => 0.85,
            Self::D12 => 0.9,
            Self::D20 | Self::Other(_) => 1.0,
        }
    }

    /// Infer the die type from a collider mesh entry.
    ///
    /// Accepts both `d6_collider` style names and the short `c6` ids used by
    /// the stock collider bundles.
    pub fn from_mesh(name: &str, id: &str) -> Option<Self> {
        if let Some(prefix) = name.strip_suffix("_collider") {
            if let Ok(die) = prefix.parse() {
                return Some(die);
            }
        }
        id.strip_prefix('c')
            .and_then(|n| n.parse::<u32>().ok())
            .map(Self::from_sides)
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fate => write!(f, "dfate"),
            other => write!(f, "d{}", other.sides().unwrap_or_default()),
        }
    }
}

/// Error returned when a die type key cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized die type: {0}")]
pub struct ParseDieTypeError(pub String);

impl FromStr for DieType {
    type Err = ParseDieTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let body = lower
            .strip_prefix('d')
            .ok_or_else(|| ParseDieTypeError(s.to_string()))?;
        match body {
            "f" | "fate" => Ok(Self::Fate),
            digits => match digits.parse::<u32>() {
                Ok(n) if n > 0 => Ok(Self::from_sides(n)),
                _ => Err(ParseDieTypeError(s.to_string())),
            },
        }
    }
}

impl TryFrom<String> for DieType {
    type Error = ParseDieTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DieType> for String {
    fn from(value: DieType) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keys() {
        assert_eq!("d6".parse::<DieType>().unwrap(), DieType::D6);
        assert_eq!("D20".parse::<DieType>().unwrap(), DieType::D20);
        assert_eq!("dfate".parse::<DieType>().unwrap(), DieType::Fate);
        assert_eq!("d7".parse::<DieType>().unwrap(), DieType::Other(7));
        assert!("six".parse::<DieType>().is_err());
        assert!("d0".parse::<DieType>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for die in [DieType::D4, DieType::D100, DieType::Fate, DieType::Other(3)] {
            assert_eq!(die.to_string().parse::<DieType>().unwrap(), die);
        }
    }

    #[test]
    fn test_from_mesh() {
        assert_eq!(DieType::from_mesh("d10_collider", ""), Some(DieType::D10));
        assert_eq!(DieType::from_mesh("collider", "c12"), Some(DieType::D12));
        assert_eq!(DieType::from_mesh("d8", "x"), None);
    }
}
