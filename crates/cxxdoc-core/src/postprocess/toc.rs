//! Table of contents

use std::collections::BTreeSet;

use super::{Page, PageContext, PageError, PageFix};
use crate::markup::entities::{escape_attr, escape_text};
use crate::markup::{Document, NodeId};

/// Heading text of the contents block
const CONTENTS_TITLE: &str = "Contents";

/// Assigns stable heading anchors and rebuilds (or synthesizes) the
/// contents block
pub struct TableOfContents;

struct Entry {
    level: u8,
    id: String,
    text: String,
}

impl PageFix for TableOfContents {
    fn name(&self) -> &'static str {
        "toc"
    }

    fn apply(&self, page: &mut Page, ctx: &PageContext<'_>) -> Result<bool, PageError> {
        let settings = &ctx.config.toc;
        let container = find_container(&page.doc);
        let headings = collect_headings(
            &page.doc,
            container,
            settings.min_level,
            settings.max_level,
            &settings.exclude_class,
        );
        if container.is_none() && headings.len() < settings.min_headings {
            return Ok(false);
        }

        let mut changed = false;
        let mut entries = Vec::with_capacity(headings.len());
        let mut taken = existing_ids(&page.doc);
        let mut claimed = BTreeSet::new();
        for (heading, level) in headings {
            let current = page.doc.attr(heading, "id").unwrap_or_default().to_string();
            let text = page.doc.text_content(heading).trim().to_string();
            let id = if !current.is_empty() && claimed.insert(current.clone()) {
                current
            } else {
                let fresh = unique_slug(&text, |s| taken.contains(s) || claimed.contains(s));
                taken.insert(fresh.clone());
                claimed.insert(fresh.clone());
                page.doc.set_attr(heading, "id", fresh.clone());
                changed = true;
                fresh
            };
            entries.push(Entry { level, id, text });
        }

        let list = render_list(&entries);
        match container {
            Some(container) => {
                let existing = page
                    .doc
                    .children(container)
                    .iter()
                    .copied()
                    .find(|&c| page.doc.is_element(c, "ul"));
                let current = existing.map(|ul| page.doc.outer_html(ul));
                if current.as_deref() != Some(list.as_str()) {
                    let nodes = page.doc.parse_fragment(&list);
                    match existing {
                        Some(ul) => {
                            for node in nodes {
                                page.doc.insert_before(ul, node);
                            }
                            page.doc.detach(ul);
                        }
                        None => {
                            for node in nodes {
                                page.doc.append_child(container, node);
                            }
                        }
                    }
                    changed = true;
                }
            }
            None => {
                let Some(first) = entries
                    .first()
                    .and_then(|e| element_with_id(&page.doc, &e.id))
                else {
                    return Ok(changed);
                };
                let html = format!(
                    r#"<div class="m-block m-default toc"><h3 class="{}">{CONTENTS_TITLE}</h3>{list}</div>"#,
                    escape_attr(&settings.exclude_class)
                );
                for node in page.doc.parse_fragment(&html) {
                    page.doc.insert_before(first, node);
                }
                page.note(format!("synthesized table of contents with {} entries", entries.len()));
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// An `m-block m-default` block titled "Contents"
fn find_container(doc: &Document) -> Option<NodeId> {
    doc.descendants(doc.root()).into_iter().find(|&id| {
        doc.has_class(id, "m-block")
            && doc.has_class(id, "m-default")
            && doc
                .children(id)
                .iter()
                .find(|&&c| doc.is_element(c, "h3"))
                .is_some_and(|&h3| doc.text_content(h3).trim() == CONTENTS_TITLE)
    })
}

fn heading_level(doc: &Document, id: NodeId) -> Option<u8> {
    let name = &doc.element(id)?.name;
    let mut chars = name.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some('h' | 'H'), Some(d @ '1'..='6'), None) => {
            d.to_digit(10).and_then(|d| u8::try_from(d).ok())
        }
        _ => None,
    }
}

fn collect_headings(
    doc: &Document,
    container: Option<NodeId>,
    min_level: u8,
    max_level: u8,
    exclude_class: &str,
) -> Vec<(NodeId, u8)> {
    doc.descendants(doc.root())
        .into_iter()
        .filter_map(|id| Some((id, heading_level(doc, id)?)))
        .filter(|&(id, level)| {
            (min_level..=max_level).contains(&level)
                && !doc.has_class(id, exclude_class)
                && !container.is_some_and(|c| doc.ancestors(id).any(|a| a == c))
                && !doc.has_ancestor(id, "nav")
        })
        .collect()
}

/// Every id in use on the page
fn existing_ids(doc: &Document) -> BTreeSet<String> {
    doc.descendants(doc.root())
        .into_iter()
        .filter_map(|id| doc.attr(id, "id"))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn element_with_id(doc: &Document, value: &str) -> Option<NodeId> {
    doc.descendants(doc.root())
        .into_iter()
        .find(|&id| doc.attr(id, "id") == Some(value))
}

/// Lowercase alphanumerics joined by single dashes
pub(crate) fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("section");
    }
    slug
}

fn unique_slug(text: &str, is_taken: impl Fn(&str) -> bool) -> String {
    let base = slugify(text);
    if !is_taken(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or(base)
}

/// Nested list; entries deeper than the first level nest under the
/// preceding shallower entry
fn render_list(entries: &[Entry]) -> String {
    let mut out = String::from("<ul>");
    let base = entries.iter().map(|e| e.level).min().unwrap_or(0);
    let mut i = 0;
    while i < entries.len() {
        let mut j = i + 1;
        while j < entries.len() && entries[j].level > base {
            j += 1;
        }
        let entry = &entries[i];
        out.push_str(&format!(
            r##"<li><a href="#{}">{}</a>"##,
            escape_attr(&entry.id),
            escape_text(&entry.text)
        ));
        if j > i + 1 {
            out.push_str(&render_list(&entries[i + 1..j]));
        }
        out.push_str("</li>");
        i = j;
    }
    out.push_str("</ul>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::postprocess::testing::run_fix;
    use crate::symbols::SymbolTable;
    use std::path::Path;

    fn run(html: &str) -> (bool, String) {
        let table = SymbolTable::new();
        let config = Config::default();
        let (changed, page) = run_fix(&TableOfContents, html, &table, &config, Path::new("."), "p.html");
        (changed, page.to_html())
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Getting Started!"), "getting-started");
        assert_eq!(slugify("  std::vector<T> "), "std-vector-t");
        assert_eq!(slugify("???"), "section");
    }

    #[test]
    fn test_synthesizes_toc() {
        let html = concat!(
            "<main><h2>Intro</h2><p>a</p><h3>Detail</h3>",
            "<h2 id=\"usage\">Usage</h2><h2>Intro</h2>",
            "<h2 class=\"no-toc\">Hidden</h2></main>"
        );
        let (changed, out) = run(html);
        assert!(changed);
        assert!(out.starts_with(
            "<main><div class=\"m-block m-default toc\"><h3 class=\"no-toc\">Contents</h3><ul>\
             <li><a href=\"#intro\">Intro</a><ul><li><a href=\"#detail\">Detail</a></li></ul></li>\
             <li><a href=\"#usage\">Usage</a></li>\
             <li><a href=\"#intro-2\">Intro</a></li></ul></div><h2 id=\"intro\">Intro</h2>"
        ));
        assert!(out.contains("<h2 class=\"no-toc\">Hidden</h2>"));

        let (changed, again) = run(&out);
        assert!(!changed);
        assert_eq!(out, again);
    }

    #[test]
    fn test_below_threshold_is_untouched() {
        let (changed, _) = run("<h2>Only</h2><h2>Two</h2>");
        assert!(!changed);
    }

    #[test]
    fn test_rebuilds_existing_container_and_fixes_duplicate_ids() {
        let html = concat!(
            "<div class=\"m-block m-default\"><h3>Contents</h3><ul><li>stale</li></ul></div>",
            "<h2 id=\"x\">First</h2><h2 id=\"x\">Second</h2>"
        );
        let (changed, out) = run(html);
        assert!(changed);
        assert!(out.contains(
            "<ul><li><a href=\"#x\">First</a></li><li><a href=\"#second\">Second</a></li></ul>"
        ));
        assert!(out.contains("<h2 id=\"second\">Second</h2>"));
    }
}
