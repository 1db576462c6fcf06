//! Ledger identities.
//!
//! Body ids come from the physics crate and are never reused within a
//! session. Roll, group and collection ids restart at zero on `clear()`.

use crate::error::DiceError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub use dicebox_physics::BodyId;

/// Ledger id of one die.
///
/// Normally a plain counter (`"3"`). When a caller-supplied id collides with
/// an existing one it is bumped with a dotted suffix: `"3"` to `"3.1"` to
/// `"3.2"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RollId {
    major: u64,
    minor: Option<u32>,
}

impl RollId {
    pub fn new(major: u64) -> Self {
        Self { major, minor: None }
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> Option<u32> {
        self.minor
    }

    /// Next collision-avoidance variant of this id
    pub fn bump(&self) -> Self {
        Self {
            major: self.major,
            minor: Some(self.minor.map_or(1, |m| m + 1)),
        }
    }
}

impl fmt::Display for RollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(f, "{}.{}", self.major, minor),
            None => write!(f, "{}", self.major),
        }
    }
}

impl FromStr for RollId {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DiceError::InvalidValue {
            field: "rollId",
            value: s.to_string(),
        };
        let (major, minor) = match s.trim().split_once('.') {
            Some((major, minor)) => (major, Some(minor.parse().map_err(|_| invalid())?)),
            None => (s.trim(), None),
        };
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor,
        })
    }
}

impl From<u64> for RollId {
    fn from(major: u64) -> Self {
        Self::new(major)
    }
}

impl Serialize for RollId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RollId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self::new(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Group of same-notation dice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One `roll`/`add`/`remove` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub u32);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_sequence() {
        let id: RollId = "3".parse().unwrap();
        assert_eq!(id.bump().to_string(), "3.1");
        assert_eq!(id.bump().bump().to_string(), "3.2");
    }

    #[test]
    fn test_parse_dotted() {
        let id: RollId = "5.12".parse().unwrap();
        assert_eq!(id.major(), 5);
        assert_eq!(id.minor(), Some(12));
        assert!("x".parse::<RollId>().is_err());
        assert!("5.x".parse::<RollId>().is_err());
    }

    #[test]
    fn test_ordering() {
        let base = RollId::new(5);
        assert!(base < base.bump());
        assert!(base.bump() < RollId::new(6));
    }

    #[test]
    fn test_serde_accepts_numbers_and_strings() {
        let from_num: RollId = serde_json::from_str("7").unwrap();
        let from_text: RollId = serde_json::from_str("\"7.1\"").unwrap();
        assert_eq!(from_num, RollId::new(7));
        assert_eq!(from_text, RollId::new(7).bump());
        assert_eq!(serde_json::to_string(&from_text).unwrap(), "\"7.1\"");
    }
}
