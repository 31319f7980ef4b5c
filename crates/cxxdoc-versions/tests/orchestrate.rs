//! End-to-end orchestration with an in-memory source and a fake builder

use std::path::Path;
use std::sync::Mutex;

use cxxdoc_core::{Diagnostic, Report};
use cxxdoc_versions::{
    BuildError, Orchestrator, OrchestratorError, Revision, RevisionBuilder, RevisionSource,
    RevisionState, SelectionPolicy, DESCRIPTOR_FILE,
};

struct FakeSource {
    tags: Vec<&'static str>,
    released: Mutex<Vec<String>>,
    /// Checkout directory whose release fails
    stuck: Option<&'static str>,
}

impl FakeSource {
    fn new(tags: &[&'static str]) -> Self {
        Self {
            tags: tags.to_vec(),
            released: Mutex::new(Vec::new()),
            stuck: None,
        }
    }
}

impl RevisionSource for FakeSource {
    fn tags(&self) -> Result<Vec<String>, OrchestratorError> {
        Ok(self.tags.iter().map(|t| t.to_string()).collect())
    }

    fn checkout(&self, revision: &Revision, dest: &Path) -> Result<(), OrchestratorError> {
        std::fs::create_dir_all(dest).unwrap();
        std::fs::write(dest.join("REVISION"), &revision.reference).unwrap();
        Ok(())
    }

    fn release(&self, dest: &Path) -> Result<(), OrchestratorError> {
        if self.stuck.is_some_and(|dir| dest.ends_with(dir)) {
            return Err(OrchestratorError::Git {
                command: String::from("worktree remove"),
                message: String::from("worktree is locked"),
            });
        }
        self.released.lock().unwrap().push(dest.display().to_string());
        Ok(())
    }
}

/// Writes one page with a switcher placeholder; fails for `broken`
struct FakeBuilder {
    broken: Option<&'static str>,
}

impl RevisionBuilder for FakeBuilder {
    fn build(
        &self,
        revision: &Revision,
        checkout: &Path,
        output: &Path,
    ) -> Result<Report, BuildError> {
        let reference = std::fs::read_to_string(checkout.join("REVISION")).unwrap();
        assert_eq!(reference, revision.reference);
        if self.broken == Some(revision.label.as_str()) {
            return Err(BuildError::MissingConfig(checkout.join("cxxdoc.toml")));
        }
        std::fs::create_dir_all(output).unwrap();
        std::fs::write(
            output.join("index.html"),
            r#"<ul><li><span class="version-selector">FIXME</span></li></ul>"#,
        )
        .unwrap();
        let mut report = Report::new();
        report.push(Diagnostic::warning("index.html", "something minor"));
        report.pages_processed = 1;
        Ok(report)
    }
}

#[test]
fn test_orchestrates_selected_revisions() {
    let out = tempfile::tempdir().unwrap();
    let source = FakeSource::new(&["v1.2.0", "v1.2.1", "v1.2.3", "v1.3.0", "docs-draft"]);
    let orchestration = Orchestrator::new(SelectionPolicy::default())
        .head(Some(String::from("main")))
        .run(&source, &FakeBuilder { broken: None }, out.path())
        .unwrap();

    let merged: Vec<&str> = orchestration.merged().map(|r| r.label.as_str()).collect();
    assert_eq!(merged, vec!["HEAD", "v1.3.0", "v1.2.3"]);
    assert_eq!(source.released.lock().unwrap().len(), 3);
    assert_eq!(orchestration.report.pages_processed, 3);
    assert!(orchestration
        .report
        .diagnostics
        .iter()
        .any(|d| d.subject == "v1.3.0/index.html"));

    let descriptor = std::fs::read_to_string(out.path().join(DESCRIPTOR_FILE)).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&descriptor).unwrap();
    let labels: Vec<&str> = parsed
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["HEAD", "v1.3.0", "v1.2.3"]);

    let page = std::fs::read_to_string(out.path().join("v1.2.3").join("index.html")).unwrap();
    assert_eq!(
        page,
        concat!(
            r#"<ul><li class="version-selector"><a href="index.html">Version: v1.2.3</a><ol>"#,
            r#"<li><a href="../HEAD/index.html">HEAD</a></li>"#,
            r#"<li><a href="../v1.3.0/index.html">v1.3.0</a></li>"#,
            r#"<li><a href="index.html">v1.2.3</a></li></ol></li></ul>"#
        )
    );

    let draft = orchestration
        .revisions
        .iter()
        .find(|r| r.label == "docs-draft")
        .unwrap();
    assert_eq!(draft.state(), RevisionState::Discovered);
}

#[test]
fn test_failed_revision_is_isolated() {
    let out = tempfile::tempdir().unwrap();
    let source = FakeSource::new(&["v1.0.0", "v2.0.0"]);
    let orchestration = Orchestrator::new(SelectionPolicy::default())
        .run(&source, &FakeBuilder { broken: Some("v1.0.0") }, out.path())
        .unwrap();

    let merged: Vec<&str> = orchestration.merged().map(|r| r.label.as_str()).collect();
    assert_eq!(merged, vec!["v2.0.0"]);
    let failed: Vec<&Revision> = orchestration.failed().collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].failure().unwrap().contains("cxxdoc.toml"));

    // the other revision is merged, but the run as a whole did not succeed
    assert_eq!(orchestration.report.failed_units.len(), 1);
    assert_eq!(orchestration.report.failed_units[0].unit, "v1.0.0");
    assert!(orchestration.report.failed_units[0].reason.starts_with("build failed"));
    assert!(!orchestration.report.is_success(false));
    assert!(out.path().join("v2.0.0").join("index.html").exists());
}

#[test]
fn test_stuck_checkout_does_not_stop_the_merge() {
    let out = tempfile::tempdir().unwrap();
    let mut source = FakeSource::new(&["v1.0.0", "v2.0.0", "v3.0.0"]);
    source.stuck = Some("v2.0.0");
    let orchestration = Orchestrator::new(SelectionPolicy::default())
        .run(&source, &FakeBuilder { broken: None }, out.path())
        .unwrap();

    let merged: Vec<&str> = orchestration.merged().map(|r| r.label.as_str()).collect();
    assert_eq!(merged, vec!["v3.0.0", "v2.0.0", "v1.0.0"]);
    let released = source.released.lock().unwrap();
    assert_eq!(released.len(), 2);
    assert!(released.iter().any(|d| d.ends_with("v1.0.0")));
    assert!(orchestration
        .report
        .diagnostics
        .iter()
        .any(|d| d.subject == "v2.0.0" && d.message.contains("could not release")));
    assert!(out.path().join(DESCRIPTOR_FILE).exists());
    assert!(orchestration.report.is_success(false));
}

#[test]
fn test_strict_mode_fails_on_any_revision() {
    let out = tempfile::tempdir().unwrap();
    let source = FakeSource::new(&["v1.0.0", "v2.0.0"]);
    let err = Orchestrator::new(SelectionPolicy::default())
        .strict(true)
        .run(&source, &FakeBuilder { broken: Some("v1.0.0") }, out.path())
        .unwrap_err();
    match err {
        OrchestratorError::Strict { labels } => assert_eq!(labels, vec!["v1.0.0"]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!out.path().join(DESCRIPTOR_FILE).exists());
}

#[test]
fn test_nothing_selected() {
    let out = tempfile::tempdir().unwrap();
    let source = FakeSource::new(&["nightly"]);
    let err = Orchestrator::new(SelectionPolicy::default())
        .run(&source, &FakeBuilder { broken: None }, out.path())
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NoRevisions));
}
