//! Linking built revisions together.
//!
//! Every page of every built revision gets a version switcher listing the
//! same page in the other revisions (falling back to their `index.html`),
//! and the output root gets a `versions.json` descriptor.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use cxxdoc_core::markup::entities::{escape_attr, escape_text};
use cxxdoc_core::markup::{Document, NodeData, NodeId};
use cxxdoc_core::{Diagnostic, Report};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::OrchestratorError;
use crate::revision::{Revision, RevisionState};

/// Descriptor written at the root of the merged output
pub const DESCRIPTOR_FILE: &str = "versions.json";

/// Class marking the switcher placeholder (and the finished switcher)
pub const SWITCHER_CLASS: &str = "version-selector";

/// One built revision as listed in the descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionEntry {
    pub label: String,
    /// Directory relative to the output root
    pub path: String,
}

impl VersionEntry {
    pub fn for_revision(revision: &Revision) -> Self {
        Self {
            label: revision.label.clone(),
            path: revision.dir_name(),
        }
    }
}

fn member_anchor() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]?[0-9a-f]{16,}$").expect("member anchor pattern is valid"))
}

/// Link every built revision and move it to `Merged`.
///
/// Revisions in any other state are left alone. The returned report carries
/// scheme warnings.
pub fn merge(output: &Path, revisions: &mut [Revision]) -> Result<Report, OrchestratorError> {
    let entries: Vec<VersionEntry> = revisions
        .iter()
        .filter(|r| r.state() == RevisionState::Built)
        .map(VersionEntry::for_revision)
        .collect();

    let mut report = Report::new();
    for entry in &entries {
        let changed = inject_switcher(output, &entries, entry)?;
        report.pages_changed += changed;
        debug!(revision = %entry.label, pages = changed, "switcher injected");
    }
    write_descriptor(output, &entries)?;
    report.extend(validate_schemes(output, &entries)?);

    for revision in revisions.iter_mut().filter(|r| r.state() == RevisionState::Built) {
        revision.advance(RevisionState::Merged)?;
    }
    info!(revisions = entries.len(), "merged versions");
    Ok(report)
}

/// Write the ordered `{label, path}` list
pub fn write_descriptor(output: &Path, entries: &[VersionEntry]) -> Result<(), OrchestratorError> {
    let path = output.join(DESCRIPTOR_FILE);
    let json = serde_json::to_string_pretty(entries).map_err(|source| OrchestratorError::Descriptor {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, json).map_err(|e| OrchestratorError::io(&path, e))
}

/// Replace switcher placeholders in every page of `current`, returning how
/// many pages changed
pub fn inject_switcher(
    output: &Path,
    entries: &[VersionEntry],
    current: &VersionEntry,
) -> Result<usize, OrchestratorError> {
    let root = output.join(&current.path);
    let mut changed = 0;
    for name in html_files(&root)? {
        let path = root.join(&name);
        let html = std::fs::read_to_string(&path).map_err(|e| OrchestratorError::io(&path, e))?;
        let mut doc = Document::parse(&html);
        let placeholders = placeholders(&doc);
        if placeholders.is_empty() {
            continue;
        }
        let switcher = render_switcher(output, entries, current, &name);
        for node in placeholders {
            for fragment in doc.parse_fragment(&switcher) {
                doc.insert_before(node, fragment);
            }
            doc.detach(node);
        }
        let new_html = doc.to_html();
        if new_html != html {
            std::fs::write(&path, new_html).map_err(|e| OrchestratorError::io(&path, e))?;
            changed += 1;
        }
    }
    Ok(changed)
}

/// Outermost elements to replace: the placeholder itself, or the `li`
/// wrapping nothing but the placeholder
fn placeholders(doc: &Document) -> Vec<NodeId> {
    let mut found: Vec<NodeId> = Vec::new();
    for node in doc.descendants(doc.root()) {
        if !doc.has_class(node, SWITCHER_CLASS) {
            continue;
        }
        if found.iter().any(|&f| doc.ancestors(node).any(|a| a == f)) {
            continue;
        }
        let target = match doc.parent(node) {
            Some(parent) if doc.is_element(parent, "li") && is_sole_child(doc, parent, node) => parent,
            _ => node,
        };
        found.push(target);
    }
    found
}

fn is_sole_child(doc: &Document, parent: NodeId, child: NodeId) -> bool {
    doc.children(parent).iter().all(|&c| {
        c == child || matches!(doc.data(c), NodeData::Text(t) if t.trim().is_empty())
    })
}

fn render_switcher(
    output: &Path,
    entries: &[VersionEntry],
    current: &VersionEntry,
    page: &str,
) -> String {
    let file_name = page.rsplit('/').next().unwrap_or(page);
    let up = "../".repeat(page.matches('/').count() + 1);
    let mut html = format!(
        r#"<li class="{SWITCHER_CLASS}"><a href="{}">Version: {}</a><ol>"#,
        escape_attr(file_name),
        escape_text(&current.label)
    );
    for entry in entries {
        let href = if entry == current {
            file_name.to_string()
        } else if output.join(&entry.path).join(page).is_file() {
            format!("{up}{}/{page}", entry.path)
        } else {
            format!("{up}{}/index.html", entry.path)
        };
        html.push_str(&format!(
            r#"<li><a href="{}">{}</a></li>"#,
            escape_attr(&href),
            escape_text(&entry.label)
        ));
    }
    html.push_str("</ol></li>");
    html
}

/// Shape of the links a revision's pages expose
#[derive(Debug, Default, PartialEq, Eq)]
struct LinkScheme {
    /// Lengths of extractor member anchors
    anchor_lengths: BTreeSet<usize>,
    /// Whether compound pages nest namespaces as `_1_1`
    nested_pages: bool,
}

/// Warn about revisions whose page or anchor naming differs from the newest
pub fn validate_schemes(
    output: &Path,
    entries: &[VersionEntry],
) -> Result<Vec<Diagnostic>, OrchestratorError> {
    let mut schemes: BTreeMap<&str, LinkScheme> = BTreeMap::new();
    for entry in entries {
        schemes.insert(entry.label.as_str(), link_scheme(&output.join(&entry.path))?);
    }

    let mut diagnostics = Vec::new();
    let Some(reference) = entries.first() else {
        return Ok(diagnostics);
    };
    let expected = &schemes[reference.label.as_str()];
    for entry in &entries[1..] {
        let scheme = &schemes[entry.label.as_str()];
        let anchors_differ = !expected.anchor_lengths.is_empty()
            && !scheme.anchor_lengths.is_empty()
            && expected.anchor_lengths != scheme.anchor_lengths;
        if anchors_differ {
            diagnostics.push(Diagnostic::warning(
                entry.label.as_str(),
                format!(
                    "member anchors have lengths {:?}, {} uses {:?}; links between versions may miss",
                    scheme.anchor_lengths, reference.label, expected.anchor_lengths
                ),
            ));
        }
        if scheme.nested_pages != expected.nested_pages {
            diagnostics.push(Diagnostic::warning(
                entry.label.as_str(),
                format!("page naming differs from {}", reference.label),
            ));
        }
    }
    Ok(diagnostics)
}

fn link_scheme(root: &Path) -> Result<LinkScheme, OrchestratorError> {
    let mut scheme = LinkScheme::default();
    for name in html_files(root)? {
        if name.contains("_1_1") {
            scheme.nested_pages = true;
        }
        let path = root.join(&name);
        let html = std::fs::read_to_string(&path).map_err(|e| OrchestratorError::io(&path, e))?;
        let doc = Document::parse(&html);
        for a in doc.elements_named(doc.root(), "a") {
            let Some((_, fragment)) = doc.attr(a, "href").and_then(|h| h.split_once('#')) else {
                continue;
            };
            if member_anchor().is_match(fragment) {
                scheme.anchor_lengths.insert(fragment.len());
            }
        }
    }
    Ok(scheme)
}

/// `.html` files below `root`, as sorted `/`-separated relative names
fn html_files(root: &Path) -> Result<Vec<String>, OrchestratorError> {
    let mut out = Vec::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| OrchestratorError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| OrchestratorError::io(&dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|e| e == "html") {
                if let Ok(relative) = path.strip_prefix(root) {
                    let segments: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    out.push(segments.join("/"));
                }
            }
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<nav><ul><li><span class="version-selector">FIXME</span></li><li>x</li></ul></nav>"#;

    fn built(label: &str) -> Revision {
        let mut revision = Revision::discovered(label);
        revision.advance(RevisionState::Filtered).unwrap();
        revision.advance(RevisionState::Selected).unwrap();
        revision.advance(RevisionState::Built).unwrap();
        revision
    }

    #[test]
    fn test_merge_links_versions() {
        let out = tempfile::tempdir().unwrap();
        for dir in ["v2.0.0", "v1.0.0"] {
            std::fs::create_dir(out.path().join(dir)).unwrap();
            std::fs::write(out.path().join(dir).join("index.html"), PAGE).unwrap();
        }
        std::fs::write(out.path().join("v2.0.0").join("classfoo.html"), PAGE).unwrap();

        let mut revisions = vec![built("v2.0.0"), built("v1.0.0")];
        let report = merge(out.path(), &mut revisions).unwrap();
        assert_eq!(report.pages_changed, 3);
        assert!(revisions.iter().all(|r| r.state() == RevisionState::Merged));

        let page = std::fs::read_to_string(out.path().join("v2.0.0").join("classfoo.html")).unwrap();
        assert_eq!(
            page,
            concat!(
                r#"<nav><ul><li class="version-selector"><a href="classfoo.html">Version: v2.0.0</a><ol>"#,
                r#"<li><a href="classfoo.html">v2.0.0</a></li>"#,
                r#"<li><a href="../v1.0.0/index.html">v1.0.0</a></li></ol></li><li>x</li></ul></nav>"#
            )
        );

        let descriptor = std::fs::read_to_string(out.path().join(DESCRIPTOR_FILE)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&descriptor).unwrap();
        assert_eq!(parsed[0]["label"], "v2.0.0");
        assert_eq!(parsed[1]["path"], "v1.0.0");

        // running the merge again regenerates the same switcher
        let entries: Vec<VersionEntry> = revisions.iter().map(VersionEntry::for_revision).collect();
        assert_eq!(inject_switcher(out.path(), &entries, &entries[0]).unwrap(), 0);
    }

    #[test]
    fn test_scheme_mismatch_is_reported() {
        let out = tempfile::tempdir().unwrap();
        std::fs::create_dir(out.path().join("new")).unwrap();
        std::fs::create_dir(out.path().join("old")).unwrap();
        std::fs::write(
            out.path().join("new").join("index.html"),
            r##"<a href="classfoo.html#a0123456789abcdef0123456789abcdef0">f</a>"##,
        )
        .unwrap();
        std::fs::write(
            out.path().join("old").join("index.html"),
            r##"<a href="classfoo.html#a0123456789abcdef0123456789abcdef">f</a><a href="#intro">i</a>"##,
        )
        .unwrap();

        let entries = vec![
            VersionEntry { label: String::from("new"), path: String::from("new") },
            VersionEntry { label: String::from("old"), path: String::from("old") },
        ];
        let diagnostics = validate_schemes(out.path(), &entries).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].subject, "old");
    }
}
