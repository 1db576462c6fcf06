//! Dice notation parser using nom
//!
//! Accepts `<qty>d<sides><modifier>` text such as `4d6+2`, `d%`, `2d00` or
//! `3dF`, and object specs with explicit fields. Whitespace is ignored and the
//! `d` is case-insensitive.

use crate::error::{DiceError, Result};
use crate::ids::{GroupId, RollId};
use dicebox_physics::DieType;
use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{digit1, one_of},
    combinator::{all_consuming, map, map_res, not, opt, value},
    sequence::{pair, preceded, terminated},
    IResult, Parser,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Largest side count a die may have
pub const MAX_SIDES: u32 = 1_000_000;

/// Most dice a single spec may throw
pub const MAX_QTY: u32 = 1_000;

/// What kind of faces a die has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sides {
    /// Plain n-sided die; `Numeric(100)` rolls as a tens and a ones body
    Numeric(u32),
    /// Explicit percentile notation (`d%`, `d00`), rolled as a single body
    Percentile,
    /// Fudge die, faces -1, 0 and 1
    Fate,
}

impl Sides {
    pub fn die_type(&self) -> DieType {
        match self {
            Self::Numeric(n) => DieType::from_sides(*n),
            Self::Percentile => DieType::D100,
            Self::Fate => DieType::Fate,
        }
    }

    /// Inclusive value range of a fair roll
    pub fn range(&self) -> (i32, i32) {
        match self {
            Self::Numeric(n) => (1, i32::try_from(*n).unwrap_or(i32::MAX)),
            Self::Percentile => (1, 100),
            Self::Fate => (-1, 1),
        }
    }
}

impl fmt::Display for Sides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Percentile => write!(f, "%"),
            Self::Fate => write!(f, "fate"),
        }
    }
}

impl Serialize for Sides {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Numeric(n) => serializer.serialize_u32(*n),
            Self::Percentile => serializer.serialize_str("100"),
            Self::Fate => serializer.serialize_str("fate"),
        }
    }
}

impl<'de> Deserialize<'de> for Sides {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }
        let sides = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self::Numeric(n),
            Raw::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "f" | "fate" | "df" | "dfate" => Self::Fate,
                "%" | "00" | "100" | "d%" | "d100" => Self::Percentile,
                other => other
                    .trim_start_matches('d')
                    .parse()
                    .map(Self::Numeric)
                    .map_err(|_| serde::de::Error::custom(format!("invalid sides: {text}")))?,
            },
        };
        Ok(sides)
    }
}

/// Structured roll request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DieSpec {
    pub sides: Sides,
    pub qty: u32,
    pub modifier: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<String>,
    /// Join an existing group instead of starting a new one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    /// Requested ledger id; bumped when it collides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll_id: Option<RollId>,
}

impl DieSpec {
    pub fn new(sides: Sides, qty: u32) -> Self {
        Self {
            sides,
            qty,
            modifier: 0,
            theme: None,
            theme_color: None,
            group_id: None,
            roll_id: None,
        }
    }

    pub fn with_modifier(mut self, modifier: i32) -> Self {
        self.modifier = modifier;
        self
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_roll_id(mut self, roll_id: RollId) -> Self {
        self.roll_id = Some(roll_id);
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    /// Reject quantities and side counts outside `1..=MAX_QTY` and
    /// `1..=MAX_SIDES`
    fn validate(self) -> Result<Self> {
        if !(1..=MAX_QTY).contains(&self.qty) {
            return Err(DiceError::InvalidValue {
                field: "qty",
                value: self.qty.to_string(),
            });
        }
        if let Sides::Numeric(n) = self.sides {
            if !(1..=MAX_SIDES).contains(&n) {
                return Err(DiceError::InvalidValue {
                    field: "sides",
                    value: n.to_string(),
                });
            }
        }
        Ok(self)
    }
}

impl fmt::Display for DieSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.qty, self.sides)?;
        if self.modifier != 0 {
            write!(f, "{:+}", self.modifier)?;
        }
        Ok(())
    }
}

/// Object form of a spec as callers send it; `qty` defaults to 1
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDieSpec {
    pub sides: Option<Sides>,
    pub qty: Option<u32>,
    pub modifier: Option<i32>,
    pub theme: Option<String>,
    pub theme_color: Option<String>,
    pub group_id: Option<GroupId>,
    pub roll_id: Option<RollId>,
}

impl RawDieSpec {
    pub fn into_spec(self) -> Result<DieSpec> {
        let sides = self.sides.ok_or(DiceError::MissingSides)?;
        DieSpec {
            sides,
            qty: self.qty.unwrap_or(1),
            modifier: self.modifier.unwrap_or(0),
            theme: self.theme,
            theme_color: self.theme_color,
            group_id: self.group_id,
            roll_id: self.roll_id,
        }
        .validate()
    }
}

/// One entry of a notation request
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Notation {
    Text(String),
    Object(RawDieSpec),
    #[serde(skip)]
    Spec(DieSpec),
}

/// Any accepted notation input: one or many, text or objects, mixed
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotationInput(pub Vec<Notation>);

impl<'de> Deserialize<'de> for NotationInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Many(Vec<Notation>),
            One(Notation),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Many(items) => Self(items),
            Raw::One(item) => Self(vec![item]),
        })
    }
}

impl fmt::Display for NotationInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match item {
                Notation::Text(text) => write!(f, "{text}")?,
                Notation::Spec(spec) => write!(f, "{spec}")?,
                Notation::Object(raw) => match raw.sides {
                    Some(sides) => write!(f, "{}d{sides}", raw.qty.unwrap_or(1))?,
                    None => write!(f, "?")?,
                },
            }
        }
        Ok(())
    }
}

impl From<&str> for NotationInput {
    fn from(text: &str) -> Self {
        Self(vec![Notation::Text(text.to_string())])
    }
}

impl From<String> for NotationInput {
    fn from(text: String) -> Self {
        Self(vec![Notation::Text(text)])
    }
}

impl From<DieSpec> for NotationInput {
    fn from(spec: DieSpec) -> Self {
        Self(vec![Notation::Spec(spec)])
    }
}

impl From<RawDieSpec> for NotationInput {
    fn from(raw: RawDieSpec) -> Self {
        Self(vec![Notation::Object(raw)])
    }
}

impl From<Vec<Notation>> for NotationInput {
    fn from(items: Vec<Notation>) -> Self {
        Self(items)
    }
}

impl From<Vec<DieSpec>> for NotationInput {
    fn from(specs: Vec<DieSpec>) -> Self {
        Self(specs.into_iter().map(Notation::Spec).collect())
    }
}

impl From<Vec<&str>> for NotationInput {
    fn from(texts: Vec<&str>) -> Self {
        Self(texts.into_iter().map(|t| Notation::Text(t.to_string())).collect())
    }
}

impl<const N: usize> From<[&str; N]> for NotationInput {
    fn from(texts: [&str; N]) -> Self {
        Self(texts.iter().map(|t| Notation::Text(t.to_string())).collect())
    }
}

/// Unsigned decimal
fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, |s: &str| s.parse::<u32>()).parse(input)
}

/// `%`, `0`, `00`, ... not followed by another digit
fn percentile(input: &str) -> IResult<&str, Sides> {
    value(
        Sides::Percentile,
        terminated(take_while1(|c: char| c == '0' || c == '%'), not(digit1)),
    )
    .parse(input)
}

/// `f`, `F`, `fate`
fn fate(input: &str) -> IResult<&str, Sides> {
    value(
        Sides::Fate,
        pair(take_while1(|c: char| c == 'f' || c == 'F'), opt(tag_no_case("ate"))),
    )
    .parse(input)
}

fn sides(input: &str) -> IResult<&str, Sides> {
    alt((percentile, fate, map(number, Sides::Numeric))).parse(input)
}

/// `+3` / `-1`
fn modifier(input: &str) -> IResult<&str, i32> {
    map_res(pair(one_of("+-"), digit1), |(sign, digits): (char, &str)| {
        digits
            .parse::<i32>()
            .map(|n| if sign == '-' { -n } else { n })
    })
    .parse(input)
}

fn notation(input: &str) -> IResult<&str, (Option<u32>, Sides, Option<i32>)> {
    all_consuming((
        opt(number),
        preceded(tag_no_case("d"), sides),
        opt(modifier),
    ))
    .parse(input)
}

/// Parse one notation string into a spec
pub fn parse(text: &str) -> Result<DieSpec> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let parse_error = || DiceError::Parse {
        text: text.to_string(),
    };

    let (_, (qty, sides, modifier)) = notation(&clean).map_err(|_| parse_error())?;
    let spec = DieSpec::new(sides, qty.unwrap_or(1)).with_modifier(modifier.unwrap_or(0));
    spec.validate().map_err(|_| parse_error())
}

/// Parse any accepted input into specs, in submission order.
///
/// Fails on the first bad entry; nothing is returned for the others.
pub fn parse_many(input: impl Into<NotationInput>) -> Result<Vec<DieSpec>> {
    input
        .into()
        .0
        .into_iter()
        .map(|item| match item {
            Notation::Text(text) => parse(&text),
            Notation::Object(raw) => raw.into_spec(),
            Notation::Spec(spec) => spec.validate(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let spec = parse("4d6+2").unwrap();
        assert_eq!(spec.qty, 4);
        assert_eq!(spec.sides, Sides::Numeric(6));
        assert_eq!(spec.modifier, 2);
    }

    #[test]
    fn test_parse_case_and_whitespace() {
        let spec = parse(" 2 D 20 - 1 ").unwrap();
        assert_eq!(spec.qty, 2);
        assert_eq!(spec.sides, Sides::Numeric(20));
        assert_eq!(spec.modifier, -1);
    }

    #[test]
    fn test_parse_percentile_tokens() {
        assert_eq!(parse("1d%").unwrap().sides, Sides::Percentile);
        assert_eq!(parse("2d00").unwrap().sides, Sides::Percentile);
        assert_eq!(parse("1d0").unwrap().sides, Sides::Percentile);
        // plain d100 is the two-body numeric die
        assert_eq!(parse("d100").unwrap().sides, Sides::Numeric(100));
        assert_eq!(parse("d100").unwrap().qty, 1);
    }

    #[test]
    fn test_parse_fate() {
        for text in ["3dF", "3df", "3dfate", "3DFATE"] {
            let spec = parse(text).unwrap();
            assert_eq!(spec.sides, Sides::Fate, "{text}");
            assert_eq!(spec.qty, 3);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in ["", "abc", "0d6", "4d", "4d6+", "4d6x", "4x6", "-1d6"] {
            match parse(text) {
                Err(DiceError::Parse { text: t }) => assert_eq!(t, text),
                other => panic!("{text:?} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_rejects_out_of_range_counts() {
        for text in ["1d3000000000", "3d2000000000", "4000000000d6", "1001d6", "1d1000001"] {
            assert!(
                matches!(parse(text), Err(DiceError::Parse { .. })),
                "{text} should be rejected"
            );
        }
        // digits past u32 never parse
        assert!(parse("1d99999999999").is_err());

        let spec = parse(&format!("{MAX_QTY}d{MAX_SIDES}")).unwrap();
        assert_eq!(spec.sides.range(), (1, MAX_SIDES as i32));
    }

    #[test]
    fn test_object_rejects_huge_sides() {
        let raw = RawDieSpec {
            sides: Some(Sides::Numeric(3_000_000_000)),
            ..Default::default()
        };
        assert!(matches!(
            parse_many(raw),
            Err(DiceError::InvalidValue { field: "sides", .. })
        ));
        let spec = DieSpec::new(Sides::Numeric(6), MAX_QTY + 1);
        assert!(matches!(
            parse_many(spec),
            Err(DiceError::InvalidValue { field: "qty", .. })
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["4d6+2", "1d20", "3d8-4", "2d%", "1d100", "5dfate", "10d12+15"] {
            let spec = parse(text).unwrap();
            let printed = spec.to_string();
            assert_eq!(parse(&printed).unwrap(), spec, "{text} -> {printed}");
        }
    }

    #[test]
    fn test_parse_many_mixed() {
        let input: NotationInput = serde_json::from_str(
            r#"["2d6", {"sides": 10, "qty": 3}, {"sides": "fate"}, {"sides": 8, "rollId": "5"}]"#,
        )
        .unwrap();
        let specs = parse_many(input).unwrap();
        assert_eq!(specs.len(), 4);
        assert_eq!(specs[1].qty, 3);
        assert_eq!(specs[2].sides, Sides::Fate);
        assert_eq!(specs[2].qty, 1);
        assert_eq!(specs[3].roll_id, Some(RollId::new(5)));
    }

    #[test]
    fn test_single_object_input() {
        let input: NotationInput = serde_json::from_str(r#"{"sides": "100"}"#).unwrap();
        let specs = parse_many(input).unwrap();
        assert_eq!(specs[0].sides, Sides::Percentile);
    }

    #[test]
    fn test_object_missing_sides() {
        let raw = RawDieSpec {
            qty: Some(2),
            ..Default::default()
        };
        assert!(matches!(parse_many(raw), Err(DiceError::MissingSides)));
    }

    #[test]
    fn test_object_rejects_zero_qty() {
        let raw = RawDieSpec {
            sides: Some(Sides::Numeric(6)),
            qty: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            parse_many(raw),
            Err(DiceError::InvalidValue { field: "qty", .. })
        ));
    }

    #[test]
    fn test_parse_many_fails_whole_batch() {
        assert!(parse_many(["1d6", "bogus", "2d8"]).is_err());
    }
}
