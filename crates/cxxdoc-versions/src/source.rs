//! Where revisions come from.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::error::OrchestratorError;
use crate::revision::Revision;

/// Enumerates tags and produces isolated checkouts of them.
pub trait RevisionSource {
    /// Every candidate tag, in any order
    fn tags(&self) -> Result<Vec<String>, OrchestratorError>;

    /// Materialize `revision` at `dest`, which does not exist yet
    fn checkout(&self, revision: &Revision, dest: &Path) -> Result<(), OrchestratorError>;

    /// Dispose of a checkout made by [`RevisionSource::checkout`]
    fn release(&self, _dest: &Path) -> Result<(), OrchestratorError> {
        Ok(())
    }
}

/// A local git repository; checkouts are detached worktrees, so the
/// repository's own working tree is never touched.
#[derive(Debug, Clone)]
pub struct GitSource {
    repo: PathBuf,
}

impl GitSource {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    fn git(&self, args: &[&str]) -> Result<String, OrchestratorError> {
        let command = args.join(" ");
        debug!(repo = %self.repo.display(), %command, "running git");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .map_err(|e| OrchestratorError::Git {
                command: command.clone(),
                message: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(OrchestratorError::Git {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl RevisionSource for GitSource {
    fn tags(&self) -> Result<Vec<String>, OrchestratorError> {
        let out = self.git(&["tag", "--list"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect())
    }

    fn checkout(&self, revision: &Revision, dest: &Path) -> Result<(), OrchestratorError> {
        let dest = dest.to_string_lossy();
        self.git(&["worktree", "add", "--detach", "--force", &dest, &revision.reference])?;
        Ok(())
    }

    fn release(&self, dest: &Path) -> Result<(), OrchestratorError> {
        let path = dest.to_string_lossy();
        if let Err(e) = self.git(&["worktree", "remove", "--force", &path]) {
            warn!(worktree = %path, error = %e, "could not remove worktree");
        }
        self.git(&["worktree", "prune"])?;
        Ok(())
    }
}
