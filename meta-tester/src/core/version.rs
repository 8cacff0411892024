//! Game build versions with wildcard and partial-segment matching.
//!
//! A `GameVersion` is either the wildcard `any` or one to four dotted numeric
//! segments. Comparison is loose:
//!
//! - the wildcard is `<=` and `>=` every version, itself included;
//! - a segment missing on either side matches anything from that depth on,
//!   so `1.2` is both `<=` and `>=` `1.2.5`.
//!
//! Because of the second rule the ordering is not transitive across versions of
//! differing specificity (`1.2.9 <= 1.2` and `1.2 <= 1.2.1`, yet `1.2.9 > 1.2.1`).
//! Callers only ever compare pairs with [`GameVersion::loose_cmp`]; there is
//! no `PartialOrd`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::errors::VersionFormatError;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.(\d+))?$").expect("valid version regex")
});

const ANY: &str = "any";

/// A game build version, e.g. `1.12.3`, or the wildcard `any`.
#[derive(Debug, Clone)]
pub struct GameVersion {
    raw: String,
    segments: [Option<u64>; 4],
}

impl GameVersion {
    /// Parse `any` or `N[.N[.N[.N]]]`.
    pub fn parse(text: &str) -> Result<Self, VersionFormatError> {
        if text == ANY {
            return Ok(Self::any());
        }
        let caps = VERSION_RE
            .captures(text)
            .ok_or_else(|| VersionFormatError::new(text))?;
        let mut segments = [None; 4];
        for (idx, slot) in segments.iter_mut().enumerate() {
            if let Some(m) = caps.get(idx + 1) {
                *slot = Some(
                    m.as_str()
                        .parse::<u64>()
                        .map_err(|_| VersionFormatError::new(text))?,
                );
            }
        }
        Ok(Self {
            raw: text.to_string(),
            segments,
        })
    }

    /// The wildcard version that is compatible with everything.
    pub fn any() -> Self {
        Self {
            raw: ANY.to_string(),
            segments: [None; 4],
        }
    }

    pub fn is_any(&self) -> bool {
        self.segments[0].is_none()
    }

    pub fn major(&self) -> Option<u64> {
        self.segments[0]
    }

    pub fn minor(&self) -> Option<u64> {
        self.segments[1]
    }

    pub fn patch(&self) -> Option<u64> {
        self.segments[2]
    }

    pub fn build(&self) -> Option<u64> {
        self.segments[3]
    }

    /// Compare segment by segment, stopping with `Equal` at the first segment
    /// that is missing on either side.
    pub fn loose_cmp(&self, other: &GameVersion) -> Ordering {
        for (mine, theirs) in self.segments.iter().zip(other.segments.iter()) {
            match (mine, theirs) {
                (Some(a), Some(b)) => match a.cmp(b) {
                    Ordering::Equal => continue,
                    ord => return ord,
                },
                _ => return Ordering::Equal,
            }
        }
        Ordering::Equal
    }

    /// `self <= other` under loose comparison.
    pub fn at_most(&self, other: &GameVersion) -> bool {
        self.loose_cmp(other) != Ordering::Greater
    }

    /// `self >= other` under loose comparison.
    pub fn at_least(&self, other: &GameVersion) -> bool {
        self.loose_cmp(other) != Ordering::Less
    }

    /// `lower <= self <= upper`.
    pub fn compatible(&self, lower: &GameVersion, upper: &GameVersion) -> bool {
        lower.at_most(self) && self.at_most(upper)
    }
}

/// Exact equality over all four segments. The wildcard equals nothing,
/// not even another wildcard, so this type is `PartialEq` only.
impl PartialEq for GameVersion {
    fn eq(&self, other: &Self) -> bool {
        !self.is_any() && !other.is_any() && self.segments == other.segments
    }
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for GameVersion {
    type Err = VersionFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
