//! Week-of-term sets encoded as fixed-width bitmasks.
//!
//! Bit *i* of a [`WeekMask`] is set when the event recurs in week *i + 1* of
//! the term. Week numbers are 1-based and term-relative. Two textual forms are
//! supported:
//!
//! - the human form, `"1-3,5,7-9"`, produced by [`WeekMask::describe`] and
//!   accepted by [`WeekMask::parse`];
//! - the portal form, a `0/1` string where character *i* flags week *i*
//!   (character 0 is unused), used by the classroom endpoints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Highest week number a term can contain.
pub const MAX_WEEK: u32 = 30;

/// Length of the week string the portal's classroom endpoints expect.
pub const PORTAL_MASK_LEN: usize = 34;

const VALID_BITS: u32 = (1u32 << MAX_WEEK) - 1;

/// A set of term weeks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WeekMask(u32);

impl WeekMask {
    /// The empty set.
    pub const EMPTY: WeekMask = WeekMask(0);

    /// Wrap raw bits, rejecting bits beyond [`MAX_WEEK`].
    pub fn from_bits(bits: u32) -> Result<Self, ValidationError> {
        if bits & !VALID_BITS != 0 {
            let highest = 32 - bits.leading_zeros();
            return Err(ValidationError::InvalidWeekNumber {
                week: i64::from(highest),
                max: MAX_WEEK,
            });
        }
        Ok(Self(bits))
    }

    /// Raw bit representation.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Build a mask from week numbers. Order and duplicates do not matter.
    pub fn generate(weeks: &[i64]) -> Result<Self, ValidationError> {
        weeks
            .iter()
            .try_fold(Self::EMPTY, |mask, &week| mask.with_week(week))
    }

    /// Parse a comma-separated list of weeks (`"n"`) and inclusive ranges
    /// (`"a-b"`). An empty or blank spec yields the empty mask.
    pub fn parse(spec: &str) -> Result<Self, ValidationError> {
        if spec.trim().is_empty() {
            return Ok(Self::EMPTY);
        }

        let mut mask = Self::EMPTY;
        for token in spec.split(',') {
            let token = token.trim();
            match token.split_once('-') {
                Some((start, end)) => {
                    let start = parse_number(start, token)?;
                    let end = parse_number(end, token)?;
                    if start > end {
                        return Err(ValidationError::InvalidRange { start, end });
                    }
                    check_week(start)?;
                    check_week(end)?;
                    for week in start..=end {
                        mask = mask.with_week(week)?;
                    }
                }
                None => mask = mask.with_week(parse_number(token, token)?)?,
            }
        }
        Ok(mask)
    }

    /// Shortest ascending spec for this set: contiguous runs collapse to
    /// `a-b`, isolated weeks stay single. The empty set describes as `""`.
    pub fn describe(self) -> String {
        let mut parts = Vec::new();
        let mut weeks = self.weeks().peekable();

        while let Some(start) = weeks.next() {
            let mut end = start;
            while let Some(&next) = weeks.peek() {
                if next != end + 1 {
                    break;
                }
                end = next;
                weeks.next();
            }
            parts.push(if start == end {
                start.to_string()
            } else {
                format!("{}-{}", start, end)
            });
        }

        parts.join(",")
    }

    /// Weeks in ascending order.
    pub fn weeks(self) -> impl Iterator<Item = u32> {
        (1..=MAX_WEEK).filter(move |week| self.contains(*week))
    }

    pub fn contains(self, week: u32) -> bool {
        (1..=MAX_WEEK).contains(&week) && self.0 & (1 << (week - 1)) != 0
    }

    pub fn intersects(self, other: WeekMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: WeekMask) -> WeekMask {
        WeekMask(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Encode as the portal's `0/1` week string.
    pub fn to_portal_string(self) -> String {
        (0..PORTAL_MASK_LEN)
            .map(|index| {
                if index > 0 && self.contains(index as u32) {
                    '1'
                } else {
                    '0'
                }
            })
            .collect()
    }

    /// Decode the portal's `0/1` week string. Character 0 is ignored.
    pub fn from_portal_string(text: &str) -> Result<Self, ValidationError> {
        let mut mask = Self::EMPTY;
        for (index, flag) in text.trim().chars().enumerate() {
            match flag {
                '0' => {}
                '1' if index == 0 => {}
                '1' => mask = mask.with_week(index as i64)?,
                _ => return Err(ValidationError::MalformedWeekSpec(text.to_string())),
            }
        }
        Ok(mask)
    }

    fn with_week(self, week: i64) -> Result<Self, ValidationError> {
        check_week(week)?;
        Ok(Self(self.0 | 1 << (week - 1)))
    }
}

impl fmt::Display for WeekMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl FromStr for WeekMask {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Caller-supplied week selection: either explicit numbers or a spec string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeekSelection {
    List(Vec<i64>),
    Spec(String),
}

impl WeekSelection {
    /// Pick the list when given, otherwise the spec string.
    pub fn from_parts(list: Option<Vec<i64>>, spec: Option<String>) -> Option<Self> {
        match (list, spec) {
            (Some(list), _) => Some(Self::List(list)),
            (None, Some(spec)) => Some(Self::Spec(spec)),
            (None, None) => None,
        }
    }

    /// Resolve to a non-empty mask.
    pub fn to_mask(&self) -> Result<WeekMask, ValidationError> {
        let mask = match self {
            Self::List(weeks) => WeekMask::generate(weeks)?,
            Self::Spec(spec) => WeekMask::parse(spec)?,
        };
        if mask.is_empty() {
            return Err(ValidationError::EmptyWeekSelection);
        }
        Ok(mask)
    }
}

fn parse_number(text: &str, token: &str) -> Result<i64, ValidationError> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::MalformedWeekSpec(token.to_string()))
}

fn check_week(week: i64) -> Result<(), ValidationError> {
    if week < 1 || week > i64::from(MAX_WEEK) {
        return Err(ValidationError::InvalidWeekNumber {
            week,
            max: MAX_WEEK,
        });
    }
    Ok(())
}
