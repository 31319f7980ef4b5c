//! Driving a multi-version build.

use std::path::{Path, PathBuf};

use cxxdoc_core::{Config, Diagnostic, Report};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{info, info_span, warn};

use crate::builder::RevisionBuilder;
use crate::error::OrchestratorError;
use crate::merge::merge;
use crate::revision::{Revision, RevisionState};
use crate::select::SelectionPolicy;
use crate::source::RevisionSource;

/// Everything a finished orchestration knows
#[derive(Debug)]
pub struct Orchestration {
    /// Every discovered revision (plus the head branch), newest first
    pub revisions: Vec<Revision>,
    /// Diagnostics of every build, subjects prefixed with the revision's
    /// directory, plus merge warnings; each failed revision is a failed unit
    pub report: Report,
}

impl Orchestration {
    pub fn merged(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.iter().filter(|r| r.state() == RevisionState::Merged)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.iter().filter(|r| r.state() == RevisionState::Failed)
    }
}

/// Selects revisions, builds each in its own checkout and merges the results
#[derive(Debug, Clone)]
pub struct Orchestrator {
    policy: SelectionPolicy,
    head: Option<String>,
    strict: bool,
    threads: Option<usize>,
    work_dir: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            head: None,
            strict: false,
            threads: None,
            work_dir: None,
        }
    }

    /// Policy, head branch, strictness and worker count from a config file
    pub fn from_config(config: &Config) -> Result<Self, OrchestratorError> {
        Ok(Self::new(SelectionPolicy::from_settings(&config.versions)?)
            .head(config.versions.head.clone())
            .strict(config.strict)
            .threads(config.threads))
    }

    /// Also build this branch, first, labelled `HEAD`
    #[must_use]
    pub fn head(mut self, branch: Option<String>) -> Self {
        self.head = branch;
        self
    }

    /// Fail the whole orchestration when any revision fails
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// How many revisions build at once
    #[must_use]
    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Where checkouts go (a temporary directory by default)
    #[must_use]
    pub fn work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.work_dir = dir;
        self
    }

    /// Discover and select revisions without building anything
    pub fn select(&self, source: &dyn RevisionSource) -> Result<Vec<Revision>, OrchestratorError> {
        let tags = source.tags()?;
        info!(tags = tags.len(), "discovered tags");
        let mut revisions = self.policy.apply(tags)?;
        if let Some(branch) = &self.head {
            revisions.insert(0, Revision::head(branch.clone()));
        }
        Ok(revisions)
    }

    pub fn run(
        &self,
        source: &dyn RevisionSource,
        builder: &dyn RevisionBuilder,
        output: &Path,
    ) -> Result<Orchestration, OrchestratorError> {
        let mut revisions = self.select(source)?;
        let selected: Vec<usize> = revisions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state() == RevisionState::Selected)
            .map(|(i, _)| i)
            .collect();
        if selected.is_empty() {
            return Err(OrchestratorError::NoRevisions);
        }
        info!(
            revisions = ?selected.iter().map(|&i| revisions[i].label.as_str()).collect::<Vec<_>>(),
            "selected"
        );
        std::fs::create_dir_all(output).map_err(|e| OrchestratorError::io(output, e))?;

        let scratch = match &self.work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| OrchestratorError::io(dir, e))?;
                tempfile::tempdir_in(dir)
            }
            None => tempfile::tempdir(),
        }
        .map_err(|e| OrchestratorError::io(std::env::temp_dir(), e))?;

        // checkouts share the repository's metadata, so they are made one at a time
        let mut report = Report::new();
        let mut checkouts: Vec<(usize, PathBuf)> = Vec::new();
        for &i in &selected {
            let dest = scratch.path().join(revisions[i].dir_name());
            match source.checkout(&revisions[i], &dest) {
                Ok(()) => checkouts.push((i, dest)),
                Err(e) => {
                    warn!(revision = %revisions[i].label, error = %e, "checkout failed");
                    report.fail_unit(revisions[i].label.as_str(), format!("checkout failed: {e}"));
                    revisions[i].fail(e.to_string())?;
                }
            }
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads.unwrap_or(0))
            .thread_name(|i| format!("cxxdoc-rev-{i}"))
            .build()?;
        let results: Vec<_> = pool.install(|| {
            checkouts
                .par_iter()
                .map(|(i, checkout)| {
                    let revision = &revisions[*i];
                    let span = info_span!("revision", label = %revision.label);
                    let _guard = span.enter();
                    let dest = output.join(revision.dir_name());
                    (*i, builder.build(revision, checkout, &dest))
                })
                .collect()
        });

        // a checkout that cannot be released does not invalidate its build
        for (i, checkout) in &checkouts {
            if let Err(e) = source.release(checkout) {
                warn!(revision = %revisions[*i].label, error = %e, "release failed");
                report.push(Diagnostic::warning(
                    revisions[*i].label.as_str(),
                    format!("could not release checkout {}: {e}", checkout.display()),
                ));
            }
        }

        for (i, result) in results {
            let revision = &mut revisions[i];
            match result {
                Ok(built) => {
                    let prefix = revision.dir_name();
                    report.extend(built.diagnostics.into_iter().map(|d| {
                        let subject = format!("{prefix}/{}", d.subject);
                        d.with_subject(subject)
                    }));
                    for failed in built.failed_units {
                        report.fail_unit(format!("{prefix}/{}", failed.unit), failed.reason);
                    }
                    report.pages_processed += built.pages_processed;
                    report.pages_changed += built.pages_changed;
                    revision.advance(RevisionState::Built)?;
                }
                Err(e) => {
                    warn!(revision = %revision.label, error = %e, "build failed");
                    report.fail_unit(revision.label.as_str(), format!("build failed: {e}"));
                    revision.fail(e.to_string())?;
                }
            }
        }

        let failed: Vec<String> = revisions
            .iter()
            .filter(|r| r.state() == RevisionState::Failed)
            .map(|r| r.label.clone())
            .collect();
        if self.strict && !failed.is_empty() {
            return Err(OrchestratorError::Strict { labels: failed });
        }
        if !revisions.iter().any(|r| r.state() == RevisionState::Built) {
            return Err(OrchestratorError::NoRevisions);
        }

        let merged = merge(output, &mut revisions)?;
        report.extend(merged.diagnostics);
        report.sort();
        info!(
            built = revisions.iter().filter(|r| r.state() == RevisionState::Merged).count(),
            failed = failed.len(),
            "orchestration finished"
        );
        Ok(Orchestration { revisions, report })
    }
}
