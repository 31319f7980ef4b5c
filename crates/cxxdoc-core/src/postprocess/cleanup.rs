//! Small prose clean-ups
//!
//! These fixes tidy the generator's output around the cross-referenced
//! code: placeholder markers left by the normalizer, template noise in
//! detail prefixes, include paths, configured autolinks and the empty
//! elements other fixes leave behind.

use std::sync::OnceLock;

use regex::Regex;

use super::{is_uri, Page, PageContext, PageError, PageFix};
use crate::markup::entities::escape_attr;
use crate::markup::{NodeData, NodeId};
use crate::normalize::{DEDUCED_RETURN_MARKER, IMPLEMENTATION_DETAIL_MARKER};

const IMPL_NOTE: &str = r#"<code class="m-note m-dim impl-detail">/* ... */</code>"#;

/// Parents whose prose may receive autolinks
const AUTOLINK_PARENTS: &[&str] = &["dd", "p", "dt", "h3", "td", "div", "figcaption", "li"];

/// Autolinks never land below these
const AUTOLINK_FORBIDDEN: &[&str] = &["a", "code", "pre", "script", "style"];

fn template_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([a-zA-Z_][a-zA-Z_0-9:]*)<.+?>::$").expect("template prefix pattern is valid")
    })
}

fn deduced_arrow() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"\)\s*-&gt;\s*{}", regex::escape(DEDUCED_RETURN_MARKER)))
            .expect("deduced return pattern is valid")
    })
}

/// `ns::foo<T, U>::` in detail prefixes becomes `ns::foo::`
pub struct TemplateNoise;

impl PageFix for TemplateNoise {
    fn name(&self) -> &'static str {
        "template-noise"
    }

    fn apply(&self, page: &mut Page, _ctx: &PageContext<'_>) -> Result<bool, PageError> {
        let prefixes = page.elements_with_class(&["span"], &[String::from("m-doc-details-prefix")]);
        let mut changed = false;
        for span in prefixes {
            let text = page.doc.text_content(span);
            let Some(caps) = template_prefix().captures(text.trim()) else {
                continue;
            };
            let replacement = format!("{}::", &caps[1]);
            page.doc.remove_children(span);
            let node = page.doc.create_text(&replacement);
            page.doc.append_child(span, node);
            changed = true;
        }
        Ok(changed)
    }
}

/// Strips configured prefixes from `#include <...>` paths
pub struct StripIncludes;

impl PageFix for StripIncludes {
    fn name(&self) -> &'static str {
        "strip-includes"
    }

    fn apply(&self, page: &mut Page, ctx: &PageContext<'_>) -> Result<bool, PageError> {
        let prefixes = &ctx.config.sources.strip_includes;
        if prefixes.is_empty() {
            return Ok(false);
        }
        let includes = page.elements_with_class(&["div"], &[String::from("m-doc-include")]);
        let mut changed = false;
        for div in includes {
            let Some(anchor) = page
                .doc
                .elements_named(div, "a")
                .into_iter()
                .find(|&a| page.doc.has_class(a, "cpf") && page.doc.attr(a, "href").is_some())
            else {
                continue;
            };
            let text = page.doc.text_content(anchor);
            let Some(path) = text.strip_prefix('<').and_then(|t| t.strip_suffix('>')) else {
                continue;
            };
            let path = path.trim();
            let Some(rest) = prefixes.iter().find_map(|p| path.strip_prefix(p.as_str())) else {
                continue;
            };
            if rest.is_empty() {
                page.doc.detach(div);
            } else {
                page.doc.remove_children(anchor);
                let node = page.doc.create_text(&format!("<{rest}>"));
                page.doc.append_child(anchor, node);
            }
            changed = true;
        }
        Ok(changed)
    }
}

/// Renders the normalizer's placeholder markers outside code regions
pub struct Placeholders;

impl PageFix for Placeholders {
    fn name(&self) -> &'static str {
        "placeholders"
    }

    fn apply(&self, page: &mut Page, _ctx: &PageContext<'_>) -> Result<bool, PageError> {
        let mut changed = join_broken_markers(page);

        for a in page.doc.elements_named(page.doc.root(), "a") {
            if page.doc.text_content(a).trim() == IMPLEMENTATION_DETAIL_MARKER {
                for node in page.doc.parse_fragment(IMPL_NOTE) {
                    page.doc.insert_before(a, node);
                }
                page.doc.detach(a);
                changed = true;
            }
        }

        let texts: Vec<NodeId> = page
            .doc
            .descendants(page.doc.root())
            .into_iter()
            .filter(|&n| {
                page.doc
                    .raw_text(n)
                    .is_some_and(|t| t.contains(DEDUCED_RETURN_MARKER) || t.contains(IMPLEMENTATION_DETAIL_MARKER))
            })
            .collect();
        for node in texts {
            let raw = page.doc.raw_text(node).unwrap_or_default();
            let rewritten = deduced_arrow().replace_all(raw, ")");
            let rewritten = rewritten
                .replace(DEDUCED_RETURN_MARKER, "auto")
                .replace(IMPLEMENTATION_DETAIL_MARKER, IMPL_NOTE);
            for fragment in page.doc.parse_fragment(&rewritten) {
                page.doc.insert_before(node, fragment);
            }
            page.doc.detach(node);
            changed = true;
        }
        Ok(changed)
    }
}

/// Merge runs of text and `<wbr>` that spell out a marker into one text node
fn join_broken_markers(page: &mut Page) -> bool {
    let parents: Vec<NodeId> = page
        .doc
        .descendants(page.doc.root())
        .into_iter()
        .filter(|&n| page.doc.children(n).iter().any(|&c| page.doc.is_element(c, "wbr")))
        .collect();

    let mut changed = false;
    for parent in parents {
        let children = page.doc.children(parent).to_vec();
        let mut run: Vec<NodeId> = Vec::new();
        // a trailing None flushes the last run
        for child in children.into_iter().map(Some).chain([None]) {
            let joinable = child.is_some_and(|c| page.doc.raw_text(c).is_some() || page.doc.is_element(c, "wbr"));
            if let (true, Some(c)) = (joinable, child) {
                run.push(c);
                continue;
            }
            let joined: String = run.iter().filter_map(|&n| page.doc.raw_text(n)).collect();
            let spans_marker = run.len() > 1
                && (joined.contains(DEDUCED_RETURN_MARKER) || joined.contains(IMPLEMENTATION_DETAIL_MARKER));
            if spans_marker {
                let node = page.doc.create_raw_text(&joined);
                page.doc.insert_before(run[0], node);
                for &n in &run {
                    page.doc.detach(n);
                }
                changed = true;
            }
            run.clear();
        }
    }
    changed
}

/// Links configured terms in prose
pub struct AutoLinks;

impl PageFix for AutoLinks {
    fn name(&self) -> &'static str {
        "autolinks"
    }

    fn apply(&self, page: &mut Page, ctx: &PageContext<'_>) -> Result<bool, PageError> {
        let Some(index) = ctx.autolinks() else {
            return Ok(false);
        };
        let texts: Vec<NodeId> = page
            .doc
            .descendants(page.doc.root())
            .into_iter()
            .filter(|&n| {
                page.doc.raw_text(n).is_some_and(|t| !t.trim().is_empty())
                    && page.doc.ancestors(n).any(|a| AUTOLINK_PARENTS.iter().any(|p| page.doc.is_element(a, p)))
                    && !AUTOLINK_FORBIDDEN.iter().any(|f| page.doc.has_ancestor(n, f))
            })
            .collect();

        let mut changed = false;
        for node in texts {
            let raw = page.doc.raw_text(node).unwrap_or_default().to_string();
            let mut out = String::with_capacity(raw.len());
            let mut last = 0;
            for m in index.pattern().find_iter(&raw) {
                let Some(url) = index.target(m.as_str()) else {
                    continue;
                };
                let target_file = url.split('#').next().unwrap_or_default();
                if target_file == page.file_name() || target_file == page.name() {
                    continue;
                }
                out.push_str(&raw[last..m.start()]);
                let attrs = if is_uri(url) {
                    r#"class="m-doc autolink external" target="_blank""#
                } else {
                    r#"class="m-doc autolink""#
                };
                out.push_str(&format!(r#"<a href="{}" {attrs}>{}</a>"#, escape_attr(url), m.as_str()));
                last = m.end();
            }
            if last == 0 {
                continue;
            }
            out.push_str(&raw[last..]);
            for fragment in page.doc.parse_fragment(&out) {
                page.doc.insert_before(node, fragment);
            }
            page.doc.detach(node);
            changed = true;
        }
        Ok(changed)
    }
}

/// Removes `p` and `span` elements left empty by other fixes
pub struct EmptyTags;

impl PageFix for EmptyTags {
    fn name(&self) -> &'static str {
        "empty-tags"
    }

    fn apply(&self, page: &mut Page, _ctx: &PageContext<'_>) -> Result<bool, PageError> {
        let mut candidates: Vec<NodeId> = page
            .doc
            .descendants(page.doc.root())
            .into_iter()
            .filter(|&n| page.doc.is_element(n, "p") || page.doc.is_element(n, "span"))
            .collect();
        // innermost first, so emptied parents go too
        candidates.reverse();

        let mut changed = false;
        for node in candidates {
            if page.doc.attr(node, "id").is_some() {
                continue;
            }
            let empty = match page.doc.children(node) {
                [] => true,
                [only] => matches!(page.doc.data(*only), NodeData::Text(t) if t.is_empty()),
                _ => false,
            };
            if empty {
                page.doc.detach(node);
                changed = true;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::postprocess::testing::run_fix;
    use crate::symbols::SymbolTable;
    use std::path::Path;

    fn run(fix: &dyn PageFix, html: &str, config: &Config) -> (bool, String) {
        let table = SymbolTable::new();
        let (changed, page) = run_fix(fix, html, &table, config, Path::new("."), "page.html");
        (changed, page.to_html())
    }

    #[test]
    fn test_template_noise() {
        let html = r#"<span class="m-doc-details-prefix">ns::foo&lt;T, U&gt;::</span><span class="m-doc-details-prefix">ns::</span>"#;
        let (changed, out) = run(&TemplateNoise, html, &Config::default());
        assert!(changed);
        assert_eq!(
            out,
            r#"<span class="m-doc-details-prefix">ns::foo::</span><span class="m-doc-details-prefix">ns::</span>"#
        );
    }

    #[test]
    fn test_strip_includes() {
        let mut config = Config::default();
        config.sources.strip_includes = vec![String::from("include/")];
        let html = concat!(
            r#"<div class="m-doc-include"><a href="a_8h.html" class="cpf">&lt;include/lib/a.h&gt;</a></div>"#,
            r#"<div class="m-doc-include"><a href="b.html" class="cpf">&lt;include/&gt;</a></div>"#,
            r#"<div class="m-doc-include"><a href="c.html" class="cpf">&lt;other/c.h&gt;</a></div>"#
        );
        let (changed, out) = run(&StripIncludes, html, &config);
        assert!(changed);
        assert_eq!(
            out,
            concat!(
                r#"<div class="m-doc-include"><a href="a_8h.html" class="cpf">&lt;lib/a.h&gt;</a></div>"#,
                r#"<div class="m-doc-include"><a href="c.html" class="cpf">&lt;other/c.h&gt;</a></div>"#
            )
        );

        let (changed, _) = run(&StripIncludes, html, &Config::default());
        assert!(!changed);
    }

    #[test]
    fn test_placeholders() {
        let html = format!(
            "<p>auto f() -&gt; {DEDUCED_RETURN_MARKER}</p><p>{DEDUCED_RETURN_MARKER} x</p>\
             <dt><a class=\"m-doc\" href=\"#d\">{IMPLEMENTATION_DETAIL_MARKER}</a> y</dt>\
             <p>__cxxdoc_<wbr/>implementation_<wbr/>detail z</p>"
        );
        let (changed, out) = run(&Placeholders, &html, &Config::default());
        assert!(changed);
        assert_eq!(
            out,
            format!(
                "<p>auto f()</p><p>auto x</p><dt>{IMPL_NOTE} y</dt><p>{IMPL_NOTE} z</p>"
            )
        );
        let (changed, _) = run(&Placeholders, &out, &Config::default());
        assert!(!changed);
    }

    #[test]
    fn test_autolinks() {
        let mut config = Config::default();
        config.autolinks.insert(String::from("std::vector"), String::from("https://en.cppreference.com/w/cpp/container/vector"));
        config.autolinks.insert(String::from("Widget"), String::from("classwidget.html"));
        config.autolinks.insert(String::from("Self"), String::from("page.html#top"));
        let html = concat!(
            "<p>A std::vector of Widget and Self.</p>",
            "<p><a href=\"x.html\">Widget</a> <code>Widget</code></p>",
            "<h1>Widget</h1>"
        );
        let (changed, out) = run(&AutoLinks, html, &config);
        assert!(changed);
        let doc = crate::markup::Document::parse(&out);
        let external = doc.elements_named(doc.root(), "a")[0];
        assert_eq!(doc.attr(external, "target"), Some("_blank"));
        assert_eq!(doc.text_content(external), "std::vector");
        assert_eq!(
            out,
            concat!(
                "<p>A <a href=\"https://en.cppreference.com/w/cpp/container/vector\" ",
                "class=\"m-doc autolink external\" target=\"_blank\">std::vector</a> of ",
                "<a href=\"classwidget.html\" class=\"m-doc autolink\">Widget</a> and Self.</p>",
                "<p><a href=\"x.html\">Widget</a> <code>Widget</code></p>",
                "<h1>Widget</h1>"
            )
        );
        let (changed, _) = run(&AutoLinks, &out, &config);
        assert!(!changed);
    }

    #[test]
    fn test_empty_tags() {
        let html = r#"<div><p><span></span></p><p id="keep"></p><span>x</span><p> </p></div>"#;
        let (changed, out) = run(&EmptyTags, html, &Config::default());
        assert!(changed);
        assert_eq!(out, r#"<div><p id="keep"></p><span>x</span><p> </p></div>"#);
    }
}
