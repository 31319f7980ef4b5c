//! One candidate revision and its lifecycle.

use std::fmt;

use crate::error::OrchestratorError;
use crate::tags::Version;

/// Label shown for the head branch
pub const HEAD_LABEL: &str = "HEAD";

/// Where a revision is in the orchestration.
///
/// Revisions move strictly forward:
/// `Discovered -> Filtered -> Selected -> Built -> Merged`, and a selected
/// revision whose checkout or build fails ends in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RevisionState {
    Discovered,
    Filtered,
    Selected,
    Built,
    Merged,
    Failed,
}

impl RevisionState {
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Discovered, Self::Filtered)
                | (Self::Filtered, Self::Selected)
                | (Self::Selected, Self::Built)
                | (Self::Selected, Self::Failed)
                | (Self::Built, Self::Merged)
        )
    }
}

impl fmt::Display for RevisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discovered => "discovered",
            Self::Filtered => "filtered",
            Self::Selected => "selected",
            Self::Built => "built",
            Self::Merged => "merged",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Tag or branch name handed to the source
    pub reference: String,
    /// Name shown in the switcher
    pub label: String,
    /// `None` for the head branch
    pub version: Option<Version>,
    head: bool,
    state: RevisionState,
    failure: Option<String>,
}

impl Revision {
    /// A tag as found by the source
    pub fn discovered(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            label: tag.trim().to_string(),
            reference: tag,
            version: None,
            head: false,
            state: RevisionState::Discovered,
            failure: None,
        }
    }

    /// The head branch; it skips filtering and is always selected
    pub fn head(branch: impl Into<String>) -> Self {
        Self {
            reference: branch.into(),
            label: String::from(HEAD_LABEL),
            version: None,
            head: true,
            state: RevisionState::Selected,
            failure: None,
        }
    }

    pub fn state(&self) -> RevisionState {
        self.state
    }

    pub fn is_head(&self) -> bool {
        self.head
    }

    /// Why the revision failed, if it did
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Output directory name under the merged tree
    pub fn dir_name(&self) -> String {
        let name: String = self
            .label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
            .collect();
        if name.is_empty() || name.chars().all(|c| c == '.') {
            String::from("-")
        } else {
            name
        }
    }

    pub(crate) fn advance(&mut self, next: RevisionState) -> Result<(), OrchestratorError> {
        if !self.state.can_advance_to(next) {
            return Err(OrchestratorError::InvalidTransition {
                label: self.label.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) -> Result<(), OrchestratorError> {
        self.advance(RevisionState::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only() {
        let mut rev = Revision::discovered("v1.0.0");
        rev.advance(RevisionState::Filtered).unwrap();
        rev.advance(RevisionState::Selected).unwrap();
        assert!(matches!(
            rev.advance(RevisionState::Merged),
            Err(OrchestratorError::InvalidTransition { .. })
        ));
        rev.advance(RevisionState::Built).unwrap();
        assert!(rev.fail("late").is_err());
        rev.advance(RevisionState::Merged).unwrap();
        assert_eq!(rev.state(), RevisionState::Merged);
    }

    #[test]
    fn test_failure_is_recorded() {
        let mut rev = Revision::head("main");
        assert!(rev.is_head());
        rev.fail("checkout failed").unwrap();
        assert_eq!(rev.state(), RevisionState::Failed);
        assert_eq!(rev.failure(), Some("checkout failed"));
    }

    #[test]
    fn test_dir_name() {
        assert_eq!(Revision::discovered("v1.2.3").dir_name(), "v1.2.3");
        assert_eq!(Revision::discovered("release/1.0").dir_name(), "release-1.0");
        assert_eq!(Revision::discovered("..").dir_name(), "-");
    }
}
