//! Cross-reference resolution
//!
//! Walks a classified token stream and links name chains (`a::b::c`) to
//! symbols in the table. The walk tracks just enough structure to get lookup
//! right: braces opened by `namespace X` and `struct X` push scope, and
//! `template <...>` headers shadow outer names until their declaration ends.

use crate::lexer::{Token, TokenKind};
use crate::symbols::{QualifiedName, ScopeStack, SymbolId, SymbolKind, SymbolTable};

/// A link attached to a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub symbol: SymbolId,
    /// Link target relative to the page the token is on
    pub href: String,
    pub external: bool,
}

/// Where a code region sits
#[derive(Debug, Clone, Default)]
pub struct RegionContext {
    /// Page file name, for page-relative links
    pub page: String,
    pub scope: ScopeStack,
    /// Symbol the region documents; links to it are suppressed
    pub self_symbol: Option<SymbolId>,
    /// Template parameters in effect for the whole region
    pub template_params: Vec<String>,
}

impl RegionContext {
    #[must_use]
    pub fn new(page: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: ScopeStack) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn with_self_symbol(mut self, symbol: Option<SymbolId>) -> Self {
        self.self_symbol = symbol;
        self
    }

    #[must_use]
    pub fn with_template_params(mut self, params: Vec<String>) -> Self {
        self.template_params = params;
        self
    }
}

/// Which kind of symbol a name most likely refers to, from its syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Preference {
    /// A qualifier before `::`; only scopes qualify
    Scope,
    Function,
    Macro,
    Type,
}

impl Preference {
    fn accepts(self, kind: SymbolKind) -> bool {
        match self {
            Self::Scope => kind.is_scope(),
            Self::Function => kind == SymbolKind::Function,
            Self::Macro => kind == SymbolKind::Macro,
            Self::Type => kind.is_type() || kind == SymbolKind::Namespace,
        }
    }
}

/// Template parameter names visible until their declaration ends
#[derive(Debug)]
struct Shadow {
    names: Vec<String>,
    /// Brace depth the template header appeared at
    depth: usize,
    body_open: bool,
}

#[derive(Debug)]
struct Walk {
    scope: ScopeStack,
    /// Scope segments pushed by each open brace
    braces: Vec<usize>,
    /// Scope a following `{` opens, with the position of its name
    pending: Option<(QualifiedName, usize)>,
    shadows: Vec<Shadow>,
    /// First position after the template header being read
    header_end: usize,
}

impl Walk {
    fn is_shadowed(&self, name: &str, ctx: &RegionContext) -> bool {
        ctx.template_params.iter().any(|p| p == name)
            || self.shadows.iter().any(|s| s.names.iter().any(|n| n == name))
    }

    fn open_brace(&mut self) {
        let depth = self.braces.len();
        let pushed = self
            .pending
            .take()
            .map_or(0, |(name, _)| self.scope.push_name(&name));
        self.braces.push(pushed);
        if let Some(top) = self.shadows.last_mut() {
            if top.depth == depth && !top.body_open {
                top.body_open = true;
            }
        }
    }

    fn close_brace(&mut self) {
        if let Some(pushed) = self.braces.pop() {
            let depth = self.scope.depth();
            self.scope.truncate(depth.saturating_sub(pushed));
        }
        let depth = self.braces.len();
        while self.shadows.last().is_some_and(|s| s.body_open && s.depth == depth) {
            self.shadows.pop();
        }
    }

    fn end_statement(&mut self) {
        self.pending = None;
        let depth = self.braces.len();
        while self.shadows.last().is_some_and(|s| !s.body_open && s.depth == depth) {
            self.shadows.pop();
        }
    }
}

/// Links tokens against one immutable symbol table
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'t> {
    table: &'t SymbolTable,
}

impl<'t> Resolver<'t> {
    #[must_use]
    pub fn new(table: &'t SymbolTable) -> Self {
        Self { table }
    }

    #[must_use]
    pub fn table(&self) -> &'t SymbolTable {
        self.table
    }

    /// Attach resolutions to the name tokens of one region
    ///
    /// Returns how many links were attached. Names that resolve are
    /// reclassified to their symbol's kind even when the link itself is
    /// suppressed.
    pub fn resolve(&self, tokens: &mut [Token], ctx: &RegionContext) -> usize {
        let sig: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.kind.is_trivia())
            .map(|(i, _)| i)
            .collect();
        let mut walk = Walk {
            scope: ctx.scope.clone(),
            braces: Vec::new(),
            pending: None,
            shadows: Vec::new(),
            header_end: 0,
        };
        let mut linked = 0;
        let mut k = 0;

        while k < sig.len() {
            let i = sig[k];
            let kind = tokens[i].kind;
            let text = tokens[i].text.clone();
            match (kind, text.as_str()) {
                (TokenKind::Keyword, "template")
                    if sig.get(k + 1).is_some_and(|&j| tokens[j].is(TokenKind::Operator, "<")) =>
                {
                    let (names, end) = template_header(tokens, &sig, k + 1);
                    walk.shadows.push(Shadow {
                        names,
                        depth: walk.braces.len(),
                        body_open: false,
                    });
                    walk.header_end = end;
                }
                (TokenKind::Keyword, "namespace") => {
                    let (name, at) = namespace_name(tokens, &sig, k + 1);
                    walk.pending = Some((name, at));
                }
                (TokenKind::Keyword, "class" | "struct" | "union" | "enum") if k >= walk.header_end => {
                    if let Some(at) = declared_name(tokens, &sig, k + 1) {
                        let name = QualifiedName::new(vec![tokens[sig[at]].text.clone()]);
                        walk.pending = Some((name, at));
                    }
                }
                (TokenKind::Punctuation, "{") => walk.open_brace(),
                (TokenKind::Punctuation, "}") => walk.close_brace(),
                (TokenKind::Punctuation, ";") => walk.end_statement(),
                (TokenKind::Punctuation, "(" | ")") => {
                    if walk.pending.as_ref().is_some_and(|(_, at)| k > *at) {
                        walk.pending = None;
                    }
                }
                _ if kind.is_name() => {
                    let (end, count) = self.resolve_chain(tokens, &sig, k, &walk, ctx);
                    linked += count;
                    k = end;
                    continue;
                }
                _ => {}
            }
            k += 1;
        }
        linked
    }

    /// Resolve the chain starting at significant position `k`
    ///
    /// Returns the position after the chain and the number of links attached.
    fn resolve_chain(
        &self,
        tokens: &mut [Token],
        sig: &[usize],
        k: usize,
        walk: &Walk,
        ctx: &RegionContext,
    ) -> (usize, usize) {
        let mut segments = vec![k];
        let mut last = k;
        while sig.get(last + 1).is_some_and(|&j| tokens[j].is(TokenKind::Operator, "::"))
            && sig.get(last + 2).is_some_and(|&j| tokens[j].kind.is_name())
        {
            last += 2;
            segments.push(last);
        }
        let end = last + 1;

        let before = |back: usize| k.checked_sub(back).map(|p| &tokens[sig[p]]);
        if before(1).is_some_and(is_member_access) {
            return (end, 0);
        }
        let mut global = false;
        if before(1).is_some_and(|t| t.is(TokenKind::Operator, "::")) {
            // qualified by something that is not a plain name chain (`a<b>::c`)
            if before(2).is_some_and(|t| t.kind.is_name() || t.is(TokenKind::Operator, ">")) {
                return (end, 0);
            }
            global = true;
        }

        let first = sig[k];
        if !global && walk.is_shadowed(&tokens[first].text, ctx) {
            tokens[first].kind = TokenKind::TypeName;
            return (end, 0);
        }

        let calls = sig.get(end).is_some_and(|&j| tokens[j].is(TokenKind::Punctuation, "("));
        let mut path = String::from(if global { "::" } else { "" });
        let mut linked = 0;
        for (n, &pos) in segments.iter().enumerate() {
            let j = sig[pos];
            if n > 0 {
                path.push_str("::");
            }
            path.push_str(&tokens[j].text);

            let preference = if n + 1 < segments.len() {
                Preference::Scope
            } else if calls || tokens[j].kind == TokenKind::Function {
                Preference::Function
            } else if tokens[j].kind == TokenKind::Macro {
                Preference::Macro
            } else {
                Preference::Type
            };
            // an unknown qualifier may still be part of a known path (`std::vector`)
            let Some(id) = self.pick(&path, &walk.scope, preference) else {
                continue;
            };
            let Some(symbol) = self.table.get(id) else { break };
            tokens[j].kind = token_kind_for(symbol.kind);
            if ctx.self_symbol == Some(id) {
                continue;
            }
            tokens[j].resolved = Some(Resolution {
                symbol: id,
                href: symbol.location.href(&ctx.page),
                external: !symbol.is_local(),
            });
            linked += 1;
        }
        (end, linked)
    }

    /// Best candidate: local before external, then the syntactic preference
    fn pick(&self, path: &str, scope: &ScopeStack, preference: Preference) -> Option<SymbolId> {
        let mut candidates = self.table.candidates(path, scope);
        if preference == Preference::Scope {
            candidates.retain(|&id| self.table.get(id).is_some_and(|s| s.kind.is_scope()));
        }
        // candidates arrive ordered by locality and rank; keep that order within ties
        candidates.sort_by_key(|&id| {
            self.table
                .get(id)
                .map_or((true, true), |s| (!s.is_local(), !preference.accepts(s.kind)))
        });
        candidates.first().copied()
    }
}

fn is_member_access(token: &Token) -> bool {
    token.kind == TokenKind::Operator && matches!(token.text.as_str(), "." | "->" | ".*" | "->*")
}

/// Token class for a resolved symbol
#[must_use]
pub fn token_kind_for(kind: SymbolKind) -> TokenKind {
    match kind {
        SymbolKind::Namespace => TokenKind::Namespace,
        SymbolKind::Class
        | SymbolKind::Struct
        | SymbolKind::Union
        | SymbolKind::Enum
        | SymbolKind::Typedef
        | SymbolKind::Concept => TokenKind::TypeName,
        SymbolKind::Function => TokenKind::Function,
        SymbolKind::Variable => TokenKind::Variable,
        SymbolKind::EnumValue => TokenKind::EnumValue,
        SymbolKind::Macro => TokenKind::Macro,
    }
}

/// Parameter names of the header whose `<` is at significant position `k`
///
/// Returns the names and the position after the closing `>`.
fn template_header(tokens: &[Token], sig: &[usize], k: usize) -> (Vec<String>, usize) {
    let mut names = Vec::new();
    let mut depth = 0i32;
    let mut parens = 0i32;
    let mut candidate: Option<usize> = None;
    let mut in_default = false;
    let mut pos = k;
    while let Some(&j) = sig.get(pos) {
        let t = &tokens[j];
        pos += 1;
        match (t.kind, t.text.as_str()) {
            (TokenKind::Punctuation, "(") => parens += 1,
            (TokenKind::Punctuation, ")") => parens -= 1,
            (TokenKind::Operator, "<") if parens == 0 => depth += 1,
            (TokenKind::Operator, ">" | ">>") if parens == 0 => {
                depth -= if t.text == ">>" { 2 } else { 1 };
                if depth <= 0 {
                    names.extend(candidate.take().map(|c| tokens[c].text.clone()));
                    break;
                }
            }
            (TokenKind::Punctuation, ",") if depth == 1 && parens == 0 => {
                names.extend(candidate.take().map(|c| tokens[c].text.clone()));
                in_default = false;
            }
            (TokenKind::Operator, "=") if depth == 1 && parens == 0 => in_default = true,
            (kind, _) if depth == 1 && parens == 0 && !in_default && kind.is_name() => {
                candidate = Some(j);
            }
            _ => {}
        }
    }
    (names, pos)
}

/// Name declared after `namespace`, and the position of its last segment
fn namespace_name(tokens: &[Token], sig: &[usize], k: usize) -> (QualifiedName, usize) {
    let mut segments = Vec::new();
    let mut pos = k;
    let mut at = k;
    while let Some(&j) = sig.get(pos) {
        let t = &tokens[j];
        if t.kind.is_name() {
            segments.push(t.text.clone());
            at = pos;
        } else if !(t.is(TokenKind::Operator, "::") || t.is(TokenKind::Keyword, "inline")) {
            break;
        }
        pos += 1;
    }
    (QualifiedName::new(segments), at)
}

/// Position of the name after `class`/`struct`/`union`/`enum`
fn declared_name(tokens: &[Token], sig: &[usize], k: usize) -> Option<usize> {
    let mut pos = k;
    loop {
        let &j = sig.get(pos)?;
        let t = &tokens[j];
        if t.is(TokenKind::Keyword, "class") || t.is(TokenKind::Keyword, "struct") {
            pos += 1;
        } else if t.is(TokenKind::Keyword, "alignas") {
            pos = skip_group(tokens, sig, pos + 1, "(", ")");
        } else if t.is(TokenKind::Punctuation, "[") {
            pos = skip_group(tokens, sig, pos, "[", "]");
        } else if t.kind.is_name() {
            return Some(pos);
        } else {
            return None;
        }
    }
}

fn skip_group(tokens: &[Token], sig: &[usize], k: usize, open: &str, close: &str) -> usize {
    let mut depth = 0i32;
    let mut pos = k;
    while let Some(&j) = sig.get(pos) {
        pos += 1;
        if tokens[j].kind != TokenKind::Punctuation {
            if depth == 0 {
                return pos - 1;
            }
            continue;
        }
        if tokens[j].text == open {
            depth += 1;
        } else if tokens[j].text == close {
            depth -= 1;
            if depth <= 0 {
                return pos;
            }
        } else if depth == 0 {
            return pos - 1;
        }
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{tokenize, Language};
    use crate::symbols::{Location, Symbol};

    fn table() -> (SymbolTable, SymbolId) {
        let mut table = SymbolTable::new();
        let local = |name: &str, kind, page: &str, anchor: &str| {
            Symbol::new(QualifiedName::parse(name), kind, Location::local(page, anchor))
        };
        table.insert(local("ns", SymbolKind::Namespace, "namespacens.html", "")).unwrap();
        let widget = table
            .insert(local("ns::widget", SymbolKind::Class, "classns_1_1widget.html", ""))
            .unwrap();
        table
            .insert(local("ns::widget::size", SymbolKind::Function, "classns_1_1widget.html", "a1"))
            .unwrap();
        table.insert(local("ns::make", SymbolKind::Function, "namespacens.html", "a2")).unwrap();
        table.insert(local("T", SymbolKind::Class, "classT.html", "")).unwrap();
        table.insert(local("CHECK", SymbolKind::Macro, "check_8h.html", "a3")).unwrap();
        table
            .insert(Symbol::new(
                QualifiedName::parse("std::vector"),
                SymbolKind::Class,
                Location::External {
                    url: String::from("https://en.cppreference.com/w/cpp/container/vector"),
                },
            ))
            .unwrap();
        (table, widget)
    }

    fn resolve(table: &SymbolTable, code: &str, ctx: &RegionContext) -> (Vec<Token>, usize) {
        let mut tokens = tokenize(code, Language::default()).value;
        let count = Resolver::new(table).resolve(&mut tokens, ctx);
        (tokens, count)
    }

    fn link<'a>(tokens: &'a [Token], text: &str) -> Option<&'a Resolution> {
        tokens.iter().find(|t| t.text == text).and_then(|t| t.resolved.as_ref())
    }

    fn ns_context(page: &str) -> RegionContext {
        RegionContext::new(page).with_scope(ScopeStack::within(&QualifiedName::parse("ns")))
    }

    #[test]
    fn test_links_in_scope() {
        let (table, _) = table();
        let (tokens, count) = resolve(&table, "widget w; w.size(); make();", &ns_context("other.html"));
        assert_eq!(link(&tokens, "widget").unwrap().href, "classns_1_1widget.html");
        assert_eq!(link(&tokens, "make").unwrap().href, "namespacens.html#a2");
        // member access is never linked
        assert!(link(&tokens, "size").is_none());
        assert_eq!(count, 2);
    }

    #[test]
    fn test_same_page_links_are_fragments() {
        let (table, _) = table();
        let (tokens, _) = resolve(&table, "make();", &ns_context("namespacens.html"));
        assert_eq!(link(&tokens, "make").unwrap().href, "#a2");
    }

    #[test]
    fn test_qualified_chain() {
        let (table, _) = table();
        let (tokens, count) = resolve(&table, "ns::widget x; ::ns::make();", &RegionContext::new("x.html"));
        assert_eq!(count, 4);
        let ns = tokens.iter().find(|t| t.text == "ns").unwrap();
        assert_eq!(ns.kind, TokenKind::Namespace);
        assert_eq!(link(&tokens, "widget").unwrap().href, "classns_1_1widget.html");
    }

    #[test]
    fn test_self_reference_suppressed() {
        let (table, widget) = table();
        let ctx = ns_context("classns_1_1widget.html").with_self_symbol(Some(widget));
        let (tokens, count) = resolve(&table, "class widget", &ctx);
        assert_eq!(count, 0);
        let name = tokens.iter().find(|t| t.text == "widget").unwrap();
        assert_eq!(name.kind, TokenKind::TypeName);
        assert!(name.resolved.is_none());
    }

    #[test]
    fn test_template_params_shadow() {
        let (table, _) = table();
        let (tokens, _) = resolve(
            &table,
            "template <typename T> T get(T v); T after;",
            &RegionContext::new("x.html"),
        );
        let ts: Vec<&Token> = tokens.iter().filter(|t| t.text == "T").collect();
        assert_eq!(ts.len(), 4);
        assert!(ts[..3].iter().all(|t| t.resolved.is_none()));
        assert_eq!(ts[3].resolved.as_ref().unwrap().href, "classT.html");

        let ctx = RegionContext::new("x.html").with_template_params(vec![String::from("T")]);
        let (tokens, count) = resolve(&table, "T value;", &ctx);
        assert_eq!(count, 0);
        assert_eq!(tokens[0].kind, TokenKind::TypeName);
    }

    #[test]
    fn test_template_body_shadow_ends_at_brace() {
        let (table, _) = table();
        let (tokens, _) = resolve(
            &table,
            "template <class T> struct box { T v; }; T other;",
            &RegionContext::new("x.html"),
        );
        let ts: Vec<&Token> = tokens.iter().filter(|t| t.text == "T").collect();
        assert!(ts[1].resolved.is_none());
        assert!(ts[2].resolved.is_some());
    }

    #[test]
    fn test_namespace_and_class_bodies_push_scope() {
        let (table, _) = table();
        let (tokens, _) = resolve(
            &table,
            "namespace ns { widget a; } widget b;",
            &RegionContext::new("x.html"),
        );
        let widgets: Vec<&Token> = tokens.iter().filter(|t| t.text == "widget").collect();
        assert!(widgets[0].resolved.is_some());
        assert!(widgets[1].resolved.is_none());

        let (tokens, _) = resolve(
            &table,
            "struct widget { void f() { size(); } };",
            &ns_context("x.html"),
        );
        assert_eq!(link(&tokens, "size").unwrap().href, "classns_1_1widget.html#a1");
    }

    #[test]
    fn test_unresolved_and_external() {
        let (table, _) = table();
        let (tokens, count) = resolve(&table, "mystery m; std::vector<int> v; CHECK(v);", &RegionContext::new("x.html"));
        assert!(link(&tokens, "mystery").is_none());
        let vector = link(&tokens, "vector").unwrap();
        assert!(vector.external);
        assert_eq!(vector.href, "https://en.cppreference.com/w/cpp/container/vector");
        assert_eq!(link(&tokens, "CHECK").unwrap().href, "check_8h.html#a3");
        assert_eq!(count, 2);
    }
}
