//! Release tags as comparable versions.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Why a tag is not a release version.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("empty tag")]
    Empty,

    #[error("'{0}' is not a version (expected e.g. v1.2.3)")]
    NotAVersion(String),

    #[error("version component out of range in '{0}'")]
    Overflow(String),

    #[error("min_version count must be negative (keep last N), got {0}")]
    InvalidCount(i64),
}

fn version_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([0-9]+)(?:\.([0-9]+)(?:\.([0-9]+)(?:\.([0-9]+))?)?)?$")
            .expect("version pattern is valid")
    })
}

/// `major.minor.patch` plus an optional fourth "revision" component.
///
/// Missing components count as zero, so `v1.2` equals `1.2.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    release: semver::Version,
    revision: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64, revision: u64) -> Self {
        Self {
            release: semver::Version::new(major, minor, patch),
            revision,
        }
    }

    /// Parse a tag such as `v1.2.3`, `V 2.0` or `1.2.3.4`.
    pub fn parse_tag(tag: &str) -> Result<Self, TagError> {
        let trimmed = tag.trim();
        let stripped = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        let compact: String = stripped.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(TagError::Empty);
        }
        let caps = version_pattern()
            .captures(&compact)
            .ok_or_else(|| TagError::NotAVersion(tag.to_string()))?;
        let component = |i: usize| -> Result<u64, TagError> {
            caps.get(i)
                .map_or(Ok(0), |m| m.as_str().parse().map_err(|_| TagError::Overflow(tag.to_string())))
        };
        Ok(Self::new(component(1)?, component(2)?, component(3)?, component(4)?))
    }

    pub fn major(&self) -> u64 {
        self.release.major
    }

    pub fn minor(&self) -> u64 {
        self.release.minor
    }

    pub fn patch(&self) -> u64 {
        self.release.patch
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The `major.minor` series patch squashing groups by
    pub fn series(&self) -> (u64, u64) {
        (self.major(), self.minor())
    }

    /// The three-component semantic version, without the revision
    pub fn release(&self) -> &semver::Version {
        &self.release
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major(), self.minor(), self.patch(), self.revision).cmp(&(
            other.major(),
            other.minor(),
            other.patch(),
            other.revision,
        ))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_tag(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())?;
        if self.revision != 0 {
            write!(f, ".{}", self.revision)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        assert_eq!(Version::parse_tag("v1.2.3").unwrap(), Version::new(1, 2, 3, 0));
        assert_eq!(Version::parse_tag(" V 2.0 ").unwrap(), Version::new(2, 0, 0, 0));
        assert_eq!(Version::parse_tag("1.2.3.4").unwrap(), Version::new(1, 2, 3, 4));
        assert_eq!(Version::parse_tag("7").unwrap(), Version::new(7, 0, 0, 0));
    }

    #[test]
    fn test_rejects_non_versions() {
        assert_eq!(Version::parse_tag("v"), Err(TagError::Empty));
        assert!(matches!(Version::parse_tag("release-1"), Err(TagError::NotAVersion(_))));
        assert!(matches!(Version::parse_tag("1.2.3-rc1"), Err(TagError::NotAVersion(_))));
        assert!(matches!(Version::parse_tag("1.2.3.4.5"), Err(TagError::NotAVersion(_))));
        assert!(matches!(
            Version::parse_tag("99999999999999999999999"),
            Err(TagError::Overflow(_))
        ));
    }

    #[test]
    fn test_ordering_includes_revision() {
        let mut versions: Vec<Version> = ["1.2.3.1", "1.10", "1.2.3", "0.9.9"]
            .iter()
            .map(|t| t.parse().unwrap())
            .collect();
        versions.sort();
        let shown: Vec<String> = versions.iter().map(ToString::to_string).collect();
        assert_eq!(shown, vec!["0.9.9", "1.2.3", "1.2.3.1", "1.10.0"]);
    }
}
