//! Code regions and signature headers

use std::collections::BTreeSet;

use super::{Page, PageContext, PageError, PageFix};
use crate::lexer::{Token, TokenKind};
use crate::markup::entities::{decode, escape_attr, escape_text};
use crate::markup::NodeId;
use crate::normalize::{DEDUCED_RETURN_MARKER, IMPLEMENTATION_DETAIL_MARKER};
use crate::symbols::{ScopeStack, SymbolTable};
use crate::xref::{RegionContext, Resolver};

/// Classes this fix puts on token spans
const TOKEN_CLASSES: &[&str] = &[
    "k", "kt", "kc", "nc", "nn", "nf", "nv", "no", "nd", "n", "mi", "mf", "mh", "mb", "mo", "s",
    "sc", "cpf", "o", "p", "c1", "cm", "cp",
];

/// Re-tokenizes code regions and signature headers into classified,
/// cross-linked spans
pub struct CodeRegions;

impl PageFix for CodeRegions {
    fn name(&self) -> &'static str {
        "code-regions"
    }

    fn apply(&self, page: &mut Page, ctx: &PageContext<'_>) -> Result<bool, PageError> {
        let resolver = Resolver::new(ctx.table);
        let base = page_context(ctx.table, &page.name);
        let mut changed = false;

        for region in outermost_regions(page, &ctx.config.code.region_classes) {
            changed |= render_region(page, &resolver, &base, region)?;
        }

        for (heading, anchor) in signature_headers(page, &ctx.config.code.details_classes) {
            let symbol = match &anchor {
                Some(anchor) => ctx.table.symbol_at(&page.name, anchor),
                None => ctx.table.compound_for_page(&page.name),
            };
            let mut params = base.template_params.clone();
            if let Some(sym) = symbol.and_then(|id| ctx.table.get(id)) {
                params.extend(sym.template_params.iter().cloned());
            }
            let region = base
                .clone()
                .with_self_symbol(symbol)
                .with_template_params(params);
            changed |= render_header(page, &resolver, &region, heading)?;
        }
        Ok(changed)
    }
}

/// Scope and template parameters of the compound a page documents
fn page_context(table: &SymbolTable, page: &str) -> RegionContext {
    let ctx = RegionContext::new(page);
    let Some(compound) = table.compound_for_page(page).and_then(|id| table.get(id)) else {
        return ctx;
    };
    let scope = if compound.kind.is_scope() {
        ScopeStack::within(&compound.name)
    } else {
        ScopeStack::within(&compound.name.parent())
    };
    ctx.with_scope(scope)
        .with_template_params(compound.template_params.clone())
}

fn outermost_regions(page: &Page, classes: &[String]) -> Vec<NodeId> {
    let all = page.elements_with_class(&["pre", "code"], classes);
    let set: BTreeSet<NodeId> = all.iter().copied().collect();
    all.into_iter()
        .filter(|&id| !page.doc.ancestors(id).any(|a| set.contains(&a)))
        .collect()
}

/// First heading of each anchored details block, then the page title
fn signature_headers(page: &Page, details_classes: &[String]) -> Vec<(NodeId, Option<String>)> {
    let doc = &page.doc;
    let mut headers = Vec::new();
    for block in page.elements_with_class(&["section", "div"], details_classes) {
        let Some(id) = doc.attr(block, "id").filter(|id| !id.is_empty()) else {
            continue;
        };
        let heading = doc.descendants(block).into_iter().find(|&n| is_heading(page, n));
        if let Some(heading) = heading {
            headers.push((heading, Some(id.to_string())));
        }
    }
    if let Some(&h1) = doc.elements_named(doc.root(), "h1").first() {
        headers.push((h1, None));
    }
    headers
}

fn is_heading(page: &Page, id: NodeId) -> bool {
    ["h1", "h2", "h3", "h4", "h5", "h6"]
        .iter()
        .any(|h| page.doc.is_element(id, h))
}

fn tokenize(page: &mut Page, text: &str) -> Result<Vec<Token>, PageError> {
    let outcome = page.tokenizer.tokenize(text);
    let name = page.name.clone();
    page.diagnostics
        .extend(outcome.diagnostics.into_iter().map(|d| d.with_subject(name.clone())));
    let tokens = outcome.value;

    let rebuilt: String = tokens.iter().map(|t| t.text.as_str()).collect();
    if rebuilt != text {
        return Err(PageError::Fix {
            fix: "code-regions",
            message: String::from("tokens do not reproduce the code text"),
        });
    }
    Ok(tokens)
}

fn render_region(
    page: &mut Page,
    resolver: &Resolver<'_>,
    ctx: &RegionContext,
    region: NodeId,
) -> Result<bool, PageError> {
    let text = page.doc.text_content(region);
    if text.trim().is_empty() {
        return Ok(false);
    }
    let mut tokens = tokenize(page, &text)?;
    resolver.resolve(&mut tokens, ctx);
    let html = render_tokens(&rewrite_placeholders(tokens));

    if page.doc.inner_html(region) == html {
        return Ok(false);
    }
    page.doc.remove_children(region);
    for node in page.doc.parse_fragment(&html) {
        page.doc.append_child(region, node);
    }
    Ok(true)
}

fn render_header(
    page: &mut Page,
    resolver: &Resolver<'_>,
    ctx: &RegionContext,
    heading: NodeId,
) -> Result<bool, PageError> {
    let texts: Vec<NodeId> = page
        .doc
        .descendants(heading)
        .into_iter()
        .filter(|&n| page.doc.raw_text(n).is_some() && !already_rendered(page, n, heading))
        .collect();

    let mut changed = false;
    for node in texts {
        let raw = page.doc.raw_text(node).unwrap_or_default().to_string();
        let text = decode(&raw);
        if text.trim().is_empty() {
            continue;
        }
        let mut tokens = tokenize(page, &text)?;
        resolver.resolve(&mut tokens, ctx);
        let html = render_tokens(&rewrite_placeholders(tokens));
        if html == raw {
            continue;
        }
        for fragment in page.doc.parse_fragment(&html) {
            page.doc.insert_before(node, fragment);
        }
        page.doc.detach(node);
        changed = true;
    }
    Ok(changed)
}

/// Text already inside a link, a code element or a token span
fn already_rendered(page: &Page, text: NodeId, heading: NodeId) -> bool {
    let doc = &page.doc;
    doc.ancestors(text).take_while(|&a| a != heading).any(|a| {
        doc.element(a).is_some_and(|e| {
            e.is("a")
                || e.is("code")
                || e.is("pre")
                || (e.is("span") && e.classes().any(|c| TOKEN_CLASSES.contains(&c)))
        })
    })
}

/// Render the extractor's placeholders: a deduced return type becomes
/// `auto` and loses its trailing arrow
pub(crate) fn rewrite_placeholders(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.text != DEDUCED_RETURN_MARKER {
            out.push(token);
            continue;
        }
        let before_arrow = skip_whitespace(&out, out.len());
        if before_arrow > 0 && out[before_arrow - 1].text == "->" {
            let before_paren = skip_whitespace(&out, before_arrow - 1);
            if before_paren > 0 && out[before_paren - 1].text == ")" {
                out.truncate(before_paren);
                continue;
            }
        }
        out.push(Token::new(TokenKind::Keyword, token.span, "auto"));
    }
    out
}

fn skip_whitespace(tokens: &[Token], mut end: usize) -> usize {
    while end > 0 && tokens[end - 1].kind == TokenKind::Whitespace {
        end -= 1;
    }
    end
}

/// Tokens as spans and links
pub(crate) fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        if token.text == IMPLEMENTATION_DETAIL_MARKER {
            out.push_str(r#"<span class="cm impl-detail">/* ... */</span>"#);
            continue;
        }
        let text = escape_text(&token.text);
        let class = token.css_class();
        match &token.resolved {
            Some(link) => {
                let class = if class.is_empty() {
                    String::from("m-doc")
                } else {
                    format!("{class} m-doc")
                };
                if link.external {
                    out.push_str(&format!(
                        r#"<a href="{}" class="{class} external" target="_blank">{text}</a>"#,
                        escape_attr(&link.href)
                    ));
                } else {
                    out.push_str(&format!(r#"<a href="{}" class="{class}">{text}</a>"#, escape_attr(&link.href)));
                }
            }
            None if class.is_empty() => out.push_str(&text),
            None => {
                out.push_str(&format!(r#"<span class="{class}">{text}</span>"#));
            }
        }
    }
    out
}
