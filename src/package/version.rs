//! Package versions and version ranges.
//!
//! Versions are dotted numeric identifiers (`1`, `1.2`, `1.2.3`, `1.2.3.4`)
//! with an optional `-label` prerelease suffix. Missing numeric parts are
//! treated as zero, so `1.0` and `1.0.0` are the same version.
//!
//! Ranges use interval notation:
//!
//! | Notation     | Meaning            |
//! |--------------|--------------------|
//! | `1.0`        | `>= 1.0`           |
//! | `[1.0]`      | `== 1.0`           |
//! | `[1.0,2.0)`  | `>= 1.0 && < 2.0`  |
//! | `(1.0,]`     | `> 1.0`            |
//! | `(,2.0]`     | `<= 2.0`           |
//! | `*` or empty | any version        |

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const MAX_PARTS: usize = 4;

/// Error returned when a version or range string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionParseError {
    pub input: String,
    pub reason: String,
}

impl fmt::Display for VersionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot parse version '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for VersionParseError {}

fn parse_error(input: &str, reason: impl Into<String>) -> VersionParseError {
    VersionParseError {
        input: input.to_string(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    parts: [u64; MAX_PARTS],
    prerelease: Option<String>,
    original: String,
}

impl Version {
    pub fn prerelease(&self) -> Option<&str> {
        self.prerelease.as_deref()
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// The version without its prerelease label, as originally written.
    pub fn release_part(&self) -> &str {
        self.original
            .split_once('-')
            .map(|(release, _)| release)
            .unwrap_or(&self.original)
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(parse_error(s, "empty version"));
        }

        // Build metadata never participates in ordering.
        let without_build = trimmed.split_once('+').map(|(v, _)| v).unwrap_or(trimmed);

        let (release, prerelease) = match without_build.split_once('-') {
            Some((_, "")) => return Err(parse_error(s, "empty prerelease label")),
            Some((release, label)) => (release, Some(label.to_string())),
            None => (without_build, None),
        };

        let numbers: Vec<&str> = release.split('.').collect();
        if numbers.len() > MAX_PARTS {
            return Err(parse_error(s, "more than four numeric parts"));
        }

        let mut parts = [0u64; MAX_PARTS];
        for (i, number) in numbers.iter().enumerate() {
            parts[i] = number
                .parse::<u64>()
                .map_err(|_| parse_error(s, format!("'{}' is not a number", number)))?;
        }

        Ok(Version {
            parts,
            prerelease,
            original: without_build.to_string(),
        })
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.original
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts
            .cmp(&other.parts)
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                // A release sorts above any of its prereleases
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => compare_labels(a, b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// Compare prerelease labels identifier by identifier. Numeric identifiers
/// compare numerically, everything else case-insensitively.
fn compare_labels(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.to_lowercase().cmp(&y.to_lowercase()),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

/// A version range in interval notation. See the module docs for syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    min: Option<Bound>,
    max: Option<Bound>,
    original: String,
}

impl VersionRange {
    /// A range that every version satisfies.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_any(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn is_satisfied_by(&self, version: &Version) -> bool {
        let above_min = match &self.min {
            Some(Bound {
                version: min,
                inclusive,
            }) => {
                if *inclusive {
                    version >= min
                } else {
                    version > min
                }
            }
            None => true,
        };
        let below_max = match &self.max {
            Some(Bound {
                version: max,
                inclusive,
            }) => {
                if *inclusive {
                    version <= max
                } else {
                    version < max
                }
            }
            None => true,
        };
        above_min && below_max
    }
}

impl FromStr for VersionRange {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        let first = trimmed.chars().next().unwrap_or_default();
        if first != '[' && first != '(' {
            // Bare version: minimum, inclusive
            let version = trimmed.parse::<Version>()?;
            return Ok(VersionRange {
                min: Some(Bound {
                    version,
                    inclusive: true,
                }),
                max: None,
                original: trimmed.to_string(),
            });
        }

        let last = trimmed.chars().last().unwrap_or_default();
        if trimmed.len() < 2 || (last != ']' && last != ')') {
            return Err(parse_error(s, "range must end with ']' or ')'"));
        }
        let min_inclusive = first == '[';
        let max_inclusive = last == ']';
        let inner = &trimmed[1..trimmed.len() - 1];

        let range = match inner.split_once(',') {
            None => {
                // [1.0] is the only form without a comma
                if !min_inclusive || !max_inclusive {
                    return Err(parse_error(s, "exact versions must use '[x]'"));
                }
                let version = inner.parse::<Version>()?;
                VersionRange {
                    min: Some(Bound {
                        version: version.clone(),
                        inclusive: true,
                    }),
                    max: Some(Bound {
                        version,
                        inclusive: true,
                    }),
                    original: trimmed.to_string(),
                }
            }
            Some((low, high)) => {
                if high.contains(',') {
                    return Err(parse_error(s, "too many ',' in range"));
                }
                let bound = |text: &str, inclusive: bool| -> Result<Option<Bound>, Self::Err> {
                    let text = text.trim();
                    if text.is_empty() {
                        Ok(None)
                    } else {
                        Ok(Some(Bound {
                            version: text.parse()?,
                            inclusive,
                        }))
                    }
                };
                VersionRange {
                    min: bound(low, min_inclusive)?,
                    max: bound(high, max_inclusive)?,
                    original: trimmed.to_string(),
                }
            }
        };

        if let (Some(min), Some(max)) = (&range.min, &range.max) {
            let empty = match min.version.cmp(&max.version) {
                Ordering::Greater => true,
                Ordering::Equal => !(min.inclusive && max.inclusive),
                Ordering::Less => false,
            };
            if empty {
                return Err(parse_error(s, "range does not contain any version"));
            }
        }

        Ok(range)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionRange> for String {
    fn from(value: VersionRange) -> Self {
        value.to_string()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("*")
        } else {
            f.write_str(&self.original)
        }
    }
}
