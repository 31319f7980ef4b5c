//! Which revisions get built.

use std::collections::BTreeSet;

use cxxdoc_core::config::{MinVersionSetting, VersionSettings};
use tracing::debug;

use crate::error::OrchestratorError;
use crate::revision::{Revision, RevisionState};
use crate::tags::{TagError, Version};

/// Lower bound on the versions kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinVersion {
    /// Drop versions below this one
    Floor(Version),
    /// Keep only the newest N releases (after squashing)
    LastN(usize),
}

impl MinVersion {
    pub fn from_setting(setting: &MinVersionSetting) -> Result<Self, TagError> {
        match setting {
            MinVersionSetting::Version(text) => Version::parse_tag(text).map(Self::Floor),
            MinVersionSetting::Count(n) if *n < 0 => {
                usize::try_from(n.unsigned_abs()).map(Self::LastN).map_err(|_| TagError::InvalidCount(*n))
            }
            MinVersionSetting::Count(n) => Err(TagError::InvalidCount(*n)),
        }
    }
}

/// Filtering and selection rules applied to discovered tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub min_version: Option<MinVersion>,
    pub squash_patches: bool,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            min_version: None,
            squash_patches: true,
        }
    }
}

impl SelectionPolicy {
    pub fn from_settings(settings: &VersionSettings) -> Result<Self, TagError> {
        Ok(Self {
            min_version: settings.min_version.as_ref().map(MinVersion::from_setting).transpose()?,
            squash_patches: settings.squash_patches,
        })
    }

    /// Run every discovered tag through filtering and selection.
    ///
    /// All revisions are returned, newest first, each left in the last state
    /// it reached; only those in [`RevisionState::Selected`] get built.
    pub fn apply(
        &self,
        tags: impl IntoIterator<Item = String>,
    ) -> Result<Vec<Revision>, OrchestratorError> {
        let mut revisions: Vec<Revision> = tags.into_iter().map(Revision::discovered).collect();

        for revision in &mut revisions {
            match Version::parse_tag(&revision.reference) {
                Ok(version) => {
                    let below_floor = matches!(&self.min_version, Some(MinVersion::Floor(floor)) if version < *floor);
                    revision.version = Some(version);
                    if below_floor {
                        debug!(tag = %revision.reference, "below minimum version");
                    } else {
                        revision.advance(RevisionState::Filtered)?;
                    }
                }
                Err(e) => debug!(tag = %revision.reference, error = %e, "not a release tag"),
            }
        }

        // newest first; ties broken by tag name so the order is stable
        revisions.sort_by(|a, b| b.version.cmp(&a.version).then_with(|| a.reference.cmp(&b.reference)));

        let mut series = BTreeSet::new();
        let mut kept = 0usize;
        let limit = match self.min_version {
            Some(MinVersion::LastN(n)) => n,
            _ => usize::MAX,
        };
        for revision in &mut revisions {
            if revision.state() != RevisionState::Filtered {
                continue;
            }
            let Some(version) = &revision.version else {
                continue;
            };
            if self.squash_patches && !series.insert(version.series()) {
                debug!(tag = %revision.reference, "squashed into a newer patch");
                continue;
            }
            if kept >= limit {
                continue;
            }
            revision.advance(RevisionState::Selected)?;
            kept += 1;
        }
        Ok(revisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selected(policy: &SelectionPolicy, tags: &[&str]) -> Vec<String> {
        policy
            .apply(tags.iter().map(|t| t.to_string()))
            .unwrap()
            .into_iter()
            .filter(|r| r.state() == RevisionState::Selected)
            .map(|r| r.label)
            .collect()
    }

    const TAGS: &[&str] = &["1.2.0", "1.2.1", "1.2.3", "1.3.0"];

    #[test]
    fn test_squash_keeps_highest_patch() {
        let policy = SelectionPolicy::default();
        assert_eq!(selected(&policy, TAGS), vec!["1.3.0", "1.2.3"]);
    }

    #[test]
    fn test_without_squash_keeps_all() {
        let policy = SelectionPolicy {
            squash_patches: false,
            ..SelectionPolicy::default()
        };
        assert_eq!(selected(&policy, TAGS), vec!["1.3.0", "1.2.3", "1.2.1", "1.2.0"]);
    }

    #[test]
    fn test_floor() {
        let policy = SelectionPolicy {
            min_version: Some(MinVersion::Floor(Version::new(1, 3, 0, 0))),
            squash_patches: false,
        };
        assert_eq!(selected(&policy, TAGS), vec!["1.3.0"]);
    }

    #[test]
    fn test_last_n_counts_squashed_releases() {
        let policy = SelectionPolicy {
            min_version: Some(MinVersion::LastN(2)),
            squash_patches: true,
        };
        assert_eq!(selected(&policy, &["v1.0.0", "v1.1.0", "v1.1.4", "v2.0.0"]), vec!["v2.0.0", "v1.1.4"]);
    }

    #[test]
    fn test_unparseable_tags_stay_discovered() {
        let revisions = SelectionPolicy::default()
            .apply(["nightly".to_string(), "v1.0".to_string()])
            .unwrap();
        assert_eq!(revisions[0].label, "v1.0");
        assert_eq!(revisions[0].state(), RevisionState::Selected);
        assert_eq!(revisions[1].label, "nightly");
        assert_eq!(revisions[1].state(), RevisionState::Discovered);
    }

    #[test]
    fn test_from_setting() {
        assert_eq!(
            MinVersion::from_setting(&MinVersionSetting::Version(String::from("v1.3"))).unwrap(),
            MinVersion::Floor(Version::new(1, 3, 0, 0))
        );
        assert_eq!(
            MinVersion::from_setting(&MinVersionSetting::Count(-3)).unwrap(),
            MinVersion::LastN(3)
        );
        assert_eq!(
            MinVersion::from_setting(&MinVersionSetting::Count(2)),
            Err(TagError::InvalidCount(2))
        );
    }
}
