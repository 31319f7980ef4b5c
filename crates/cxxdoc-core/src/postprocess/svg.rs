//! Inline SVG images

use std::sync::OnceLock;

use regex::Regex;
use tracing::trace;

use super::{is_uri, Page, PageContext, PageError, PageFix};
use crate::markup::{NodeData, NodeId};

/// Larger images stay external
pub const MAX_INLINE_SVG_BYTES: u64 = 16 * 1024;

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

fn url_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)url\s*\(\s*(["']?)\s*#"#).expect("url reference pattern is valid")
    })
}

/// Replaces `<img src="local.svg">` with the image's own markup
pub struct InlineSvgs;

impl PageFix for InlineSvgs {
    fn name(&self) -> &'static str {
        "inline-svgs"
    }

    fn apply(&self, page: &mut Page, ctx: &PageContext<'_>) -> Result<bool, PageError> {
        let images: Vec<(NodeId, String)> = page
            .doc
            .elements_named(page.doc.root(), "img")
            .into_iter()
            .filter_map(|img| {
                let src = page.doc.attr(img, "src")?.trim();
                let local_svg = !src.is_empty() && !is_uri(src) && src.to_ascii_lowercase().ends_with(".svg");
                local_svg.then(|| (img, src.to_string()))
            })
            .collect();

        let dir = ctx.page_dir(page);
        let mut count = 0usize;
        for (img, src) in images {
            let path = dir.join(&src);
            let fits = std::fs::metadata(&path).is_ok_and(|m| m.is_file() && m.len() <= MAX_INLINE_SVG_BYTES);
            if !fits {
                trace!(src = %src, "svg left as an image");
                continue;
            }
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    page.warn(format!("could not read {src}: {e}"));
                    continue;
                }
            };
            let Some(svg) = inline(page, img, &text, count) else {
                page.warn(format!("{src} has no <svg> root element"));
                continue;
            };
            page.doc.replace(img, svg);
            count += 1;
        }
        Ok(count > 0)
    }
}

/// Parse `text` and prepare its root for the place of `img`
fn inline(page: &mut Page, img: NodeId, text: &str, count: usize) -> Option<NodeId> {
    let nodes = page.doc.parse_fragment(text);
    let svg = nodes.into_iter().find(|&n| page.doc.is_element(n, "svg"))?;

    let root_id = page
        .doc
        .attr(img, "id")
        .filter(|id| !id.is_empty())
        .map_or_else(|| format!("inline-svg-{count}"), str::to_string);

    let mut comments = Vec::new();
    for node in page.doc.descendants(svg) {
        match page.doc.data(node) {
            NodeData::Comment(_) => comments.push(node),
            NodeData::Element(_) => namespace_ids(page, node, &root_id),
            _ => {}
        }
    }
    for comment in comments {
        page.doc.detach(comment);
    }

    let img_classes: Vec<String> = page
        .doc
        .element(img)
        .map(|e| e.classes().map(str::to_string).collect())
        .unwrap_or_default();
    let style = page.doc.attr(img, "style").map(str::to_string);
    let size: Vec<(&str, String)> = ["width", "height"]
        .into_iter()
        .filter_map(|a| Some((a, page.doc.attr(img, a)?.to_string())))
        .collect();

    let element = page.doc.element_mut(svg)?;
    if element.attr("xmlns").is_none() {
        element.set_attr("xmlns", SVG_NAMESPACE);
    }
    if element.attr("version").is_none() {
        element.set_attr("version", "1.1");
    }
    element.remove_attr("content");
    element.set_attr("id", root_id);
    element.remove_attr("class");
    for class in img_classes.iter().map(String::as_str).chain(["inline-svg"]) {
        element.add_class(class);
    }
    if let Some(style) = style {
        element.set_attr("style", style);
    }
    for (name, value) in size {
        element.set_attr(name, value);
    }
    Some(svg)
}

/// Prefix ids and same-document references below the root
fn namespace_ids(page: &mut Page, node: NodeId, prefix: &str) {
    let Some(element) = page.doc.element_mut(node) else {
        return;
    };
    let rewritten: Vec<(String, String)> = element
        .attrs()
        .filter_map(|(name, value)| {
            let value = value?;
            let new = if name.eq_ignore_ascii_case("id") {
                format!("{prefix}-{value}")
            } else if (name.eq_ignore_ascii_case("href") || name.eq_ignore_ascii_case("xlink:href"))
                && value.trim_start().starts_with('#')
            {
                format!("#{prefix}-{}", value.trim_start().trim_start_matches('#'))
            } else if url_reference().is_match(value) {
                url_reference()
                    .replace_all(value, format!("url(${{1}}#{prefix}-"))
                    .into_owned()
            } else {
                return None;
            };
            Some((name.to_string(), new))
        })
        .collect();
    for (name, value) in rewritten {
        element.set_attr(&name, value);
    }
}
