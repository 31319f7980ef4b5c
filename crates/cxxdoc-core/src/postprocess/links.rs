//! Anchor repairs

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use super::{Page, PageContext, PageError, PageFix};
use crate::markup::NodeId;

/// Attributes that only make sense on a working link
const LINK_ATTRIBUTES: &[&str] = &[
    "download",
    "href",
    "hreflang",
    "media",
    "ping",
    "referrerpolicy",
    "rel",
    "target",
    "type",
];

fn external_href() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:https?|s?ftp|mailto):.+$").expect("external href pattern is valid")
    })
}

fn local_href() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([-/_a-zA-Z0-9.]+\.[a-zA-Z]+)(?:#(.*))?$").expect("local href pattern is valid")
    })
}

fn extractor_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-fA-F0-9]+$").expect("extractor id pattern is valid"))
}

/// Same-page, external, dead-file and dead-anchor link repairs
pub struct Links;

impl PageFix for Links {
    fn name(&self) -> &'static str {
        "links"
    }

    fn apply(&self, page: &mut Page, ctx: &PageContext<'_>) -> Result<bool, PageError> {
        let mut ids: BTreeSet<String> = page
            .doc
            .descendants(page.doc.root())
            .into_iter()
            .filter_map(|id| page.doc.attr(id, "id"))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        let anchors: Vec<NodeId> = page
            .doc
            .elements_named(page.doc.root(), "a")
            .into_iter()
            .filter(|&a| page.doc.attr(a, "href").is_some())
            .collect();
        let page_dir = ctx.page_dir(page);
        let self_prefix = format!("{}#", page.file_name());
        let mut changed = false;

        for a in anchors {
            let mut href = page.doc.attr(a, "href").unwrap_or_default().to_string();

            if let Some(fragment) = href.strip_prefix(&self_prefix) {
                href = format!("#{fragment}");
                page.doc.set_attr(a, "href", href.clone());
                changed = true;
            }

            if external_href().is_match(&href) {
                if page.doc.attr(a, "target") != Some("_blank") {
                    page.doc.set_attr(a, "target", "_blank");
                    changed = true;
                }
                if !page.doc.has_class(a, "external") {
                    page.doc.add_class(a, "external");
                    changed = true;
                }
                continue;
            }

            let is_doc_link = page.doc.has_class(a, "m-doc") || page.doc.has_class(a, "m-doc-self");

            if let Some(file) = local_href().captures(&href).and_then(|c| c.get(1)) {
                let file = file.as_str().to_string();
                if !page_dir.join(&file).exists() {
                    changed = true;
                    if page.doc.has_class(a, "m-doc") {
                        href = String::from("#");
                        page.doc.set_attr(a, "href", href.clone());
                        page.warn(format!("link to missing page {file}"));
                    } else {
                        make_dead(page, a);
                        page.warn(format!("link to missing file {file} turned into plain text"));
                        continue;
                    }
                }
            }

            if is_doc_link {
                if let Some(target) = href.strip_prefix('#') {
                    let dead = if target.is_empty() {
                        page.doc.has_class(a, "m-doc")
                    } else {
                        !ids.contains(target)
                    };
                    if dead {
                        let repaired = repoint(page, a, &mut ids);
                        page.warn(format!("dead anchor {href} re-pointed to #{repaired}"));
                        changed = true;
                    }
                }
            }
        }
        Ok(changed)
    }
}

/// Turn a link to nothing into a plain span
fn make_dead(page: &mut Page, a: NodeId) {
    if let Some(element) = page.doc.element_mut(a) {
        element.name = String::from("span");
        for attr in LINK_ATTRIBUTES {
            element.remove_attr(attr);
        }
        element.add_class("dead-link");
    }
}

/// Point a dead documentation link at the nearest sensible ancestor
fn repoint(page: &mut Page, a: NodeId, ids: &mut BTreeSet<String>) -> String {
    page.doc.add_class(a, "m-doc-self");
    page.doc.remove_class(a, "m-doc");

    let ancestors: Vec<NodeId> = page.doc.ancestors(a).collect();
    let target = if let Some(id) = ancestor_id(page, &ancestors, |id| extractor_id().is_match(id)) {
        id
    } else if let Some(row) = ancestors.iter().copied().find(|&p| {
        (page.doc.is_element(p, "dt") || page.doc.is_element(p, "tr"))
            && page.doc.attr(p, "id").is_none()
    }) {
        let id = sha256_hex(&page.doc.text_content(row));
        page.doc.set_attr(row, "id", id.clone());
        ids.insert(id.clone());
        id
    } else {
        ancestor_id(page, &ancestors, |_| true).unwrap_or_default()
    };

    page.doc.set_attr(a, "href", format!("#{target}"));
    target
}

fn ancestor_id(page: &Page, ancestors: &[NodeId], accept: impl Fn(&str) -> bool) -> Option<String> {
    ancestors
        .iter()
        .find_map(|&p| page.doc.attr(p, "id").filter(|id| !id.is_empty() && accept(id)))
        .map(str::to_string)
}

fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
