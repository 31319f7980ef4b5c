//! Tolerant HTML reader
//!
//! logos splits the input into tags, text and comments; a stack of open
//! elements turns them into a tree. Malformed markup never fails: a stray
//! `<` is text, an unmatched end tag is dropped, and elements still open at
//! the end are closed implicitly.

use logos::{Lexer, Logos};

use super::{Document, Element, NodeData, NodeId};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum Piece {
    #[token("<!--", comment_end)]
    Comment,

    #[regex(r"<![^-][^>]*>")]
    Declaration,

    #[regex(r"<\?[^>]*>")]
    Instruction,

    #[regex(r"</[a-zA-Z][^>]*>")]
    EndTag,

    #[regex(r#"<[a-zA-Z]([^>"']|"[^"]*"|'[^']*')*>"#)]
    StartTag,

    #[regex(r"[^<]+")]
    Text,
}

fn comment_end(lex: &mut Lexer<Piece>) -> bool {
    let rest = lex.remainder();
    let len = rest.find("-->").map_or(rest.len(), |i| i + 3);
    lex.bump(len);
    true
}

/// Elements that never have children
pub(super) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose content is taken verbatim up to the end tag
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Parse `html` and append the result under `parent`
pub(super) fn parse_into(doc: &mut Document, parent: NodeId, html: &str) {
    let mut stack: Vec<NodeId> = vec![parent];
    let mut lexer = Piece::lexer(html);

    while let Some(piece) = lexer.next() {
        let slice = lexer.slice();
        let top = stack.last().copied().unwrap_or(parent);
        match piece {
            Ok(Piece::Text) | Err(()) => doc.append_raw_text(top, slice),
            Ok(Piece::Comment) => {
                let id = doc.alloc(NodeData::Comment(slice.to_string()));
                doc.append_child(top, id);
            }
            Ok(Piece::Declaration | Piece::Instruction) => {
                let id = doc.alloc(NodeData::Directive(slice.to_string()));
                doc.append_child(top, id);
            }
            Ok(Piece::EndTag) => {
                let name = slice[2..slice.len() - 1].trim();
                let open = stack[1..]
                    .iter()
                    .rposition(|&id| doc.element(id).is_some_and(|e| e.is(name)));
                if let Some(pos) = open {
                    stack.truncate(pos + 1);
                }
            }
            Ok(Piece::StartTag) => {
                let element = parse_start_tag(slice);
                close_implied(doc, &mut stack, &element.name);
                let top = stack.last().copied().unwrap_or(parent);
                let name = element.name.to_ascii_lowercase();
                let self_closing = element.self_closing;
                let id = doc.alloc(NodeData::Element(element));
                doc.append_child(top, id);

                if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                    let rest = lexer.remainder();
                    let len = find_ignore_case(rest, &format!("</{name}")).unwrap_or(rest.len());
                    if len > 0 {
                        doc.append_raw_text(id, &rest[..len]);
                    }
                    lexer.bump(len);
                } else if !self_closing && !VOID_ELEMENTS.contains(&name.as_str()) {
                    stack.push(id);
                }
            }
        }
    }
}

/// Close elements that a new start tag implicitly ends
fn close_implied(doc: &Document, stack: &mut Vec<NodeId>, name: &str) {
    let closes: &[&str] = match name.to_ascii_lowercase().as_str() {
        "li" => &["li"],
        "dt" | "dd" => &["dt", "dd"],
        "tr" => &["tr", "td", "th"],
        "td" | "th" => &["td", "th"],
        "option" => &["option"],
        "p" | "div" | "ul" | "ol" | "dl" | "pre" | "table" | "h1" | "h2" | "h3" | "h4" | "h5"
        | "h6" | "section" => &["p"],
        _ => return,
    };
    if let Some(&top) = stack.last().filter(|_| stack.len() > 1) {
        if doc.element(top).is_some_and(|e| closes.iter().any(|c| e.is(c))) {
            stack.pop();
        }
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Name, attributes and self-closing flag of `<name a="b" c>`
pub(super) fn parse_start_tag(tag: &str) -> Element {
    let inner = tag.trim_start_matches('<').trim_end_matches('>');
    let (inner, self_closing) = match inner.strip_suffix('/') {
        Some(rest) => (rest, true),
        None => (inner, false),
    };
    let name_end = inner
        .find(|c: char| c.is_whitespace() || c == '/')
        .unwrap_or(inner.len());
    let mut element = Element::new(&inner[..name_end]);
    element.self_closing = self_closing;

    let bytes = inner.as_bytes();
    let mut i = name_end;
    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' {
            i += 1;
        }
        if start == i {
            break;
        }
        let name = &inner[start..i];
        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j < bytes.len() && bytes[j] == b'=' {
            j += 1;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            let (value, next) = match bytes.get(j) {
                Some(&q @ (b'"' | b'\'')) => {
                    let close = inner[j + 1..].find(q as char).map_or(inner.len(), |c| j + 1 + c);
                    (&inner[j + 1..close], (close + 1).min(inner.len()))
                }
                _ => {
                    let end = inner[j..]
                        .find(char::is_whitespace)
                        .map_or(inner.len(), |c| j + c);
                    (&inner[j..end], end)
                }
            };
            element.push_attr(name, Some(super::entities::decode(value)));
            i = next;
        } else {
            element.push_attr(name, None);
        }
    }
    element
}
