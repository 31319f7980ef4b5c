//! Shorthand bracket tags in prose
//!
//! `[b]bold[/b]` and friends become real elements; single tags such as
//! `[br]`, `[entity mdash]` and `[emoji smile]` become markup or character
//! references; `[set_class x]`-style tags edit the enclosing element and
//! disappear.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::{Page, PageContext, PageError, PageFix};
use crate::markup::NodeId;

/// Elements whose text may carry shorthand tags
const TAG_PARENTS: &[&str] = &[
    "dd", "dt", "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "aside", "td", "div", "span", "i",
    "u", "b", "em", "strong",
];

/// Tags are never expanded below these
const FORBIDDEN_ANCESTORS: &[&str] = &["a", "code", "pre", "script", "style"];

fn paired_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*(aside|b|center|code|div|em|h[1-6]|i|li|ol|p|pre|span|strong|sub|sup|u|ul)\b\s*([^\]]*?)\s*\]",
        )
        .expect("paired tag pattern is valid")
    })
}

fn single_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*(br|hr|entity|htmlentity|emoji|(?:parent_)*(?:add_class|remove_class|set_class|set_id|set_name))\b\s*([^\]]*?)\s*\]",
        )
        .expect("single tag pattern is valid")
    })
}

fn hex_entity() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[0#]?[xX])?([a-fA-F0-9]+)$").expect("hex entity pattern is valid")
    })
}

/// An edit to an enclosing element requested by a single tag
#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    /// How many levels above the text's own parent
    up: usize,
    action: EditAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EditAction {
    AddClass(Vec<String>),
    RemoveClass(Vec<String>),
    SetClass(String),
    SetId(String),
    SetName(String),
}

/// Expands shorthand bracket tags
pub struct ShorthandTags;

impl PageFix for ShorthandTags {
    fn name(&self) -> &'static str {
        "shorthand-tags"
    }

    fn apply(&self, page: &mut Page, ctx: &PageContext<'_>) -> Result<bool, PageError> {
        let texts: Vec<NodeId> = page
            .doc
            .descendants(page.doc.root())
            .into_iter()
            .filter(|&n| is_candidate(page, n))
            .collect();

        let mut changed = false;
        for node in texts {
            let Some(raw) = page.doc.raw_text(node).map(str::to_string) else {
                continue;
            };
            if !raw.contains('[') {
                continue;
            }
            let mut unknown = Vec::new();
            let mut edits = Vec::new();
            let expanded = expand_paired(&raw);
            let expanded = expand_single(&expanded, ctx, &mut edits, &mut unknown);
            for name in unknown {
                page.warn(format!("unknown emoji '{name}'"));
            }
            if expanded == raw {
                continue;
            }

            let Some(parent) = page.doc.parent(node) else {
                continue;
            };
            for fragment in page.doc.parse_fragment(&expanded) {
                page.doc.insert_before(node, fragment);
            }
            page.doc.detach(node);
            for edit in edits {
                apply_edit(page, parent, &edit);
            }
            changed = true;
        }
        Ok(changed)
    }
}

fn is_candidate(page: &Page, node: NodeId) -> bool {
    let doc = &page.doc;
    if doc.raw_text(node).is_none() {
        return false;
    }
    let Some(parent) = doc.parent(node) else {
        return false;
    };
    TAG_PARENTS.iter().any(|t| doc.is_element(parent, t))
        && !FORBIDDEN_ANCESTORS.iter().any(|t| doc.has_ancestor(node, t))
}

/// Expand `[name attrs]content[/name]`, innermost last
fn expand_paired(raw: &str) -> String {
    let mut text = raw.to_string();
    let mut from = 0;
    while let Some(caps) = paired_open().captures_at(&text, from) {
        let Some(open) = caps.get(0) else {
            break;
        };
        let name = caps[1].to_ascii_lowercase();
        let attrs = caps[2].trim().to_string();
        let (start, end) = (open.start(), open.end());
        match find_closer(&text, end, &name) {
            Some((close_start, close_end)) => {
                let content = text[end..close_start].trim();
                let attrs = if attrs.is_empty() { String::new() } else { format!(" {attrs}") };
                let replacement = if content.is_empty() {
                    format!("<{name}{attrs}/>")
                } else {
                    format!("<{name}{attrs}>{content}</{name}>")
                };
                text.replace_range(start..close_end, &replacement);
                // rescan the replacement for nested tags
                from = start + 1;
            }
            None => from = end,
        }
    }
    text
}

/// Byte range of the first `[/name]` at or after `from`
fn find_closer(text: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let skip_ws = |mut k: usize| {
        while k < bytes.len() && bytes[k].is_ascii_whitespace() {
            k += 1;
        }
        k
    };
    let mut i = from;
    while let Some(offset) = text[i..].find('[') {
        let start = i + offset;
        let mut j = skip_ws(start + 1);
        if bytes.get(j) == Some(&b'/') {
            j = skip_ws(j + 1);
            let end = j + name.len();
            if end <= bytes.len() && bytes[j..end].eq_ignore_ascii_case(name.as_bytes()) {
                let k = skip_ws(end);
                if bytes.get(k) == Some(&b']') {
                    return Some((start, k + 1));
                }
            }
        }
        i = start + 1;
    }
    None
}

fn expand_single(
    text: &str,
    ctx: &PageContext<'_>,
    edits: &mut Vec<Edit>,
    unknown: &mut Vec<String>,
) -> String {
    single_tag()
        .replace_all(text, |caps: &Captures<'_>| {
            let name = caps[1].to_ascii_lowercase();
            let arg = caps[2].trim();
            match name.as_str() {
                "br" | "hr" => format!("<{name}/>"),
                "entity" | "htmlentity" => entity(arg),
                "emoji" => match emoji(arg, ctx) {
                    Some(reference) => reference,
                    None => {
                        if !arg.is_empty() {
                            unknown.push(arg.to_string());
                        }
                        String::new()
                    }
                },
                _ => {
                    if let Some(edit) = parse_edit(&name, arg) {
                        edits.push(edit);
                    }
                    String::new()
                }
            }
        })
        .into_owned()
}

fn entity(arg: &str) -> String {
    if arg.is_empty() {
        return String::new();
    }
    if let Some(hex) = hex_entity().captures(arg).and_then(|c| c.get(1)) {
        let valid = u32::from_str_radix(hex.as_str(), 16)
            .ok()
            .and_then(char::from_u32)
            .is_some();
        if valid {
            return format!("&#x{};", hex.as_str());
        }
    }
    if arg.chars().all(|c| c.is_ascii_alphanumeric()) {
        format!("&{arg};")
    } else {
        String::new()
    }
}

fn emoji(arg: &str, ctx: &PageContext<'_>) -> Option<String> {
    let name = arg.trim_matches(':').to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    let code = match ctx.config.emoji.get(&name) {
        Some(&code) => code,
        None => {
            let digits = name.trim_start_matches("u+").trim_start_matches("0x");
            u32::from_str_radix(digits, 16).ok()?
        }
    };
    char::from_u32(code).map(|_| format!("&#x{code:x};"))
}

fn parse_edit(name: &str, arg: &str) -> Option<Edit> {
    if arg.is_empty() {
        return None;
    }
    let mut rest = name;
    let mut up = 0;
    while let Some(stripped) = rest.strip_prefix("parent_") {
        up += 1;
        rest = stripped;
    }
    let classes = || arg.split_whitespace().map(str::to_string).collect::<Vec<_>>();
    let action = match rest {
        "add_class" => EditAction::AddClass(classes()),
        "remove_class" => EditAction::RemoveClass(classes()),
        "set_class" => EditAction::SetClass(classes().join(" ")),
        "set_id" => EditAction::SetId(arg.to_string()),
        "set_name" => EditAction::SetName(arg.to_ascii_lowercase()),
        _ => return None,
    };
    Some(Edit { up, action })
}

fn apply_edit(page: &mut Page, parent: NodeId, edit: &Edit) {
    let mut target = Some(parent);
    for _ in 0..edit.up {
        target = target.and_then(|t| page.doc.parent(t));
    }
    let Some(target) = target.filter(|&t| page.doc.element(t).is_some()) else {
        return;
    };
    match &edit.action {
        EditAction::AddClass(classes) => {
            for class in classes {
                page.doc.add_class(target, class);
            }
        }
        EditAction::RemoveClass(classes) => {
            for class in classes {
                page.doc.remove_class(target, class);
            }
        }
        EditAction::SetClass(class) => page.doc.set_attr(target, "class", class.clone()),
        EditAction::SetId(id) => page.doc.set_attr(target, "id", id.clone()),
        EditAction::SetName(name) => {
            let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric());
            if let Some(element) = page.doc.element_mut(target).filter(|_| valid) {
                element.name = name.clone();
            }
        }
    }
}
