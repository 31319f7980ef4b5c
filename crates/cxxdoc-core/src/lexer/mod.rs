//! C++ tokenizer and classifier
//!
//! Code text is split in three steps:
//! - logos produces context-free shapes (see `raw`)
//! - preprocessor lines and literal suffixes are merged into single tokens
//! - names are classified from the surrounding tokens and the page's alias table
//!
//! Nothing here fails. Text that is not understood becomes [`TokenKind::Unknown`]
//! and unterminated comments or literals produce warnings. Concatenating the
//! text of all tokens always reproduces the input.

mod keywords;
mod raw;
mod span;
mod token;

pub use keywords::{Language, Standard};
pub use span::Span;
pub use token::{Category, Token, TokenKind};

use std::collections::BTreeSet;

use logos::Logos;

use crate::diagnostics::{Diagnostic, Outcome};
use raw::Raw;

/// Subject used for diagnostics until the caller re-targets them
const CODE_SUBJECT: &str = "<code>";

/// Names declared as types earlier on the same page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    names: BTreeSet<String>,
}

impl AliasTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Tokenize a standalone piece of code
///
/// Pure: uses a fresh alias table each time.
pub fn tokenize(text: &str, language: Language) -> Outcome<Vec<Token>> {
    Tokenizer::new(language).tokenize(text)
}

/// Tokenizer for one page
///
/// Regions must be fed in document order: type names declared by an
/// earlier region classify as types in later ones.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    language: Language,
    aliases: AliasTable,
}

impl Tokenizer {
    #[must_use]
    pub fn new(language: Language) -> Self {
        Self {
            language,
            aliases: AliasTable::new(),
        }
    }

    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    #[must_use]
    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Record a type name that is known from outside the code text
    pub fn declare_type(&mut self, name: &str) {
        self.aliases.insert(name);
    }

    pub fn tokenize(&mut self, text: &str) -> Outcome<Vec<Token>> {
        let mut diagnostics = Vec::new();
        let tokens = lex_raw(text, self.language, &mut diagnostics);
        let tokens = merge_directives(tokens);
        let mut tokens = merge_literal_suffixes(tokens);
        self.classify_names(&mut tokens);
        Outcome::with_diagnostics(tokens, diagnostics)
    }

    /// Contextual classification of identifiers
    fn classify_names(&mut self, tokens: &mut [Token]) {
        let sig: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.kind.is_trivia())
            .map(|(i, _)| i)
            .collect();
        let at = |k: usize| sig.get(k).copied();

        let mut template_params: BTreeSet<String> = BTreeSet::new();
        // Angle depth while inside `template < ... >`
        let mut param_depth = 0i32;

        for k in 0..sig.len() {
            let i = sig[k];
            let text = tokens[i].text.clone();
            let kind = tokens[i].kind;

            if param_depth > 0 && kind == TokenKind::Operator {
                match text.as_str() {
                    "<" => param_depth += 1,
                    ">" => param_depth -= 1,
                    ">>" => param_depth -= 2,
                    _ => {}
                }
                continue;
            }

            match (kind, text.as_str()) {
                (TokenKind::Operator, "<")
                    if k > 0 && tokens[sig[k - 1]].is(TokenKind::Keyword, "template") =>
                {
                    param_depth = 1;
                }
                (TokenKind::Keyword, "typename" | "class") if param_depth > 0 => {
                    let mut next = k + 1;
                    if at(next).is_some_and(|j| tokens[j].is(TokenKind::Operator, "...")) {
                        next += 1;
                    }
                    if let Some(j) = at(next).filter(|&j| tokens[j].kind == TokenKind::Identifier) {
                        tokens[j].kind = TokenKind::TypeName;
                        template_params.insert(tokens[j].text.clone());
                    }
                }
                (TokenKind::Keyword, "class" | "struct" | "union" | "concept") => {
                    self.declare_next(tokens, &sig, k + 1);
                }
                (TokenKind::Keyword, "enum") => {
                    let mut next = k + 1;
                    if at(next).is_some_and(|j| {
                        tokens[j].kind == TokenKind::Keyword
                            && matches!(tokens[j].text.as_str(), "class" | "struct")
                    }) {
                        next += 1;
                    }
                    self.declare_next(tokens, &sig, next);
                }
                (TokenKind::Keyword, "namespace") => {
                    let after = mark_namespace_chain(tokens, &sig, k + 1);
                    // namespace alias: `namespace fs = std::filesystem;`
                    if at(after).is_some_and(|j| tokens[j].is(TokenKind::Operator, "=")) {
                        mark_namespace_chain(tokens, &sig, after + 1);
                    }
                }
                (TokenKind::Keyword, "using") => {
                    let is_alias = at(k + 1)
                        .is_some_and(|j| tokens[j].kind == TokenKind::Identifier)
                        && at(k + 2).is_some_and(|j| tokens[j].is(TokenKind::Operator, "="));
                    if is_alias {
                        self.declare_next(tokens, &sig, k + 1);
                    }
                }
                (TokenKind::Keyword, "typedef") => {
                    for j in typedef_names(tokens, &sig, k + 1) {
                        tokens[j].kind = TokenKind::TypeName;
                        self.aliases.insert(&tokens[j].text);
                    }
                }
                (TokenKind::Identifier, name) => {
                    if self.aliases.contains(name) || template_params.contains(name) {
                        tokens[i].kind = TokenKind::TypeName;
                    } else if at(k + 1).is_some_and(|j| tokens[j].is(TokenKind::Punctuation, "(")) {
                        tokens[i].kind = TokenKind::Function;
                    }
                }
                _ => {}
            }
        }
    }

    /// Mark the identifier at significant position `k` as a declared type
    fn declare_next(&mut self, tokens: &mut [Token], sig: &[usize], k: usize) {
        let mut k = k;
        // skip attributes: `struct [[nodiscard]] X`, `class alignas(8) X`
        while let Some(&j) = sig.get(k) {
            if tokens[j].is(TokenKind::Punctuation, "[") {
                k = skip_balanced(tokens, sig, k, "[", "]");
            } else if tokens[j].is(TokenKind::Keyword, "alignas") {
                k = skip_balanced(tokens, sig, k + 1, "(", ")");
            } else {
                break;
            }
        }
        if let Some(&j) = sig.get(k) {
            if matches!(tokens[j].kind, TokenKind::Identifier | TokenKind::TypeName) {
                tokens[j].kind = TokenKind::TypeName;
                self.aliases.insert(&tokens[j].text);
            }
        }
    }
}

/// Index just past a balanced group starting at significant position `k`
fn skip_balanced(tokens: &[Token], sig: &[usize], k: usize, open: &str, close: &str) -> usize {
    let mut depth = 0i32;
    let mut k = k;
    while let Some(&j) = sig.get(k) {
        if tokens[j].kind == TokenKind::Punctuation {
            if tokens[j].text == open {
                depth += 1;
            } else if tokens[j].text == close {
                depth -= 1;
                if depth <= 0 {
                    return k + 1;
                }
            }
        }
        if depth == 0 {
            return k;
        }
        k += 1;
    }
    k
}

/// Mark `A::B::C` as namespaces; returns the position after the chain
fn mark_namespace_chain(tokens: &mut [Token], sig: &[usize], k: usize) -> usize {
    let mut k = k;
    if sig
        .get(k)
        .is_some_and(|&j| tokens[j].is(TokenKind::Operator, "::"))
    {
        k += 1;
    }
    while let Some(&j) = sig.get(k) {
        if !matches!(
            tokens[j].kind,
            TokenKind::Identifier | TokenKind::TypeName | TokenKind::Namespace
        ) {
            break;
        }
        tokens[j].kind = TokenKind::Namespace;
        k += 1;
        match sig.get(k) {
            Some(&s) if tokens[s].is(TokenKind::Operator, "::") => k += 1,
            _ => break,
        }
    }
    k
}

/// Declarator names of a `typedef`, found up to its terminating `;`
fn typedef_names(tokens: &[Token], sig: &[usize], start: usize) -> Vec<usize> {
    let mut names = Vec::new();
    let mut parens = 0i32;
    let mut braces = 0i32;
    let mut k = start;
    while let Some(&j) = sig.get(k) {
        let t = &tokens[j];
        match (t.kind, t.text.as_str()) {
            (TokenKind::Punctuation, ";") if braces == 0 => break,
            (TokenKind::Punctuation, "{") => braces += 1,
            (TokenKind::Punctuation, "}") => braces -= 1,
            (TokenKind::Punctuation, "(") => parens += 1,
            (TokenKind::Punctuation, ")") => parens -= 1,
            (TokenKind::Identifier | TokenKind::TypeName, _) if braces == 0 => {
                let prev = k.checked_sub(1).and_then(|p| sig.get(p)).map(|&p| &tokens[p]);
                let next = sig.get(k + 1).map(|&n| &tokens[n]);
                // `(*name)` and `(&name)`
                let pointer_declarator = parens > 0
                    && prev.is_some_and(|p| {
                        p.kind == TokenKind::Operator && matches!(p.text.as_str(), "*" | "&")
                    })
                    && next.is_some_and(|n| n.is(TokenKind::Punctuation, ")"));
                let plain_declarator = parens == 0
                    && next.is_some_and(|n| {
                        n.kind == TokenKind::Punctuation && matches!(n.text.as_str(), ";" | "," | "[")
                    });
                if pointer_declarator || plain_declarator {
                    names.push(j);
                }
            }
            _ => {}
        }
        k += 1;
    }
    names
}

fn lex_raw(text: &str, language: Language, diagnostics: &mut Vec<Diagnostic>) -> Vec<Token> {
    let mut lexer = Raw::lexer(text);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let slice = lexer.slice();
        let mut unterminated = |what: &str| {
            diagnostics.push(Diagnostic::warning(
                CODE_SUBJECT,
                format!("unterminated {what} at byte {}", range.start),
            ));
        };
        let kind = match result {
            Ok(Raw::Whitespace | Raw::Continuation) => TokenKind::Whitespace,
            Ok(Raw::LineComment) => TokenKind::Comment,
            Ok(Raw::BlockComment(closed)) => {
                if !closed {
                    unterminated("block comment");
                }
                TokenKind::Comment
            }
            Ok(Raw::String(closed) | Raw::RawString(closed)) => {
                if !closed {
                    unterminated("string literal");
                }
                TokenKind::String
            }
            Ok(Raw::Char(closed)) => {
                if !closed {
                    unterminated("character literal");
                }
                TokenKind::Char
            }
            Ok(Raw::Number) => TokenKind::Number,
            Ok(Raw::Ident) => language
                .keyword_kind(slice)
                .unwrap_or(TokenKind::Identifier),
            Ok(Raw::Hash | Raw::Operator) => TokenKind::Operator,
            Ok(Raw::Punctuation) => TokenKind::Punctuation,
            Err(()) => TokenKind::Unknown,
        };
        tokens.push(Token::new(kind, Span::from_range(range.clone()), slice));
    }
    tokens
}

fn is_word(token: &Token) -> bool {
    matches!(
        token.kind,
        TokenKind::Identifier | TokenKind::Keyword | TokenKind::KeywordType | TokenKind::KeywordConstant
    )
}

fn is_line_break(token: &Token) -> bool {
    token.kind == TokenKind::Whitespace && token.text.contains('\n') && !token.text.starts_with('\\')
}

fn merged(tokens: &[Token], kind: TokenKind) -> Token {
    let text: String = tokens.iter().map(|t| t.text.as_str()).collect();
    let span = match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => first.span.to(last.span),
        _ => Span::default(),
    };
    Token::new(kind, span, text)
}

/// Fold `#` + directive name into one token and classify the directive's operands
fn merge_directives(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut at_line_start = true;
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if at_line_start && token.is(TokenKind::Operator, "#") {
            let mut j = i + 1;
            if tokens
                .get(j)
                .is_some_and(|t| t.kind == TokenKind::Whitespace && !t.text.contains('\n'))
            {
                j += 1;
            }
            let (end, name) = match tokens.get(j).filter(|t| is_word(t)) {
                Some(t) => (j + 1, t.text.clone()),
                None => (i + 1, String::new()),
            };
            out.push(merged(&tokens[i..end], TokenKind::Preprocessor));
            i = directive_operands(&name, &tokens, end, &mut out);
            at_line_start = false;
            continue;
        }
        if is_line_break(token) {
            at_line_start = true;
        } else if !token.kind.is_trivia() {
            at_line_start = false;
        }
        out.push(token.clone());
        i += 1;
    }
    out
}

/// Copy the rest of a directive line to `out`, returning the index after it
fn directive_operands(name: &str, tokens: &[Token], start: usize, out: &mut Vec<Token>) -> usize {
    let mut i = start;
    // leading horizontal whitespace
    while let Some(t) = tokens.get(i) {
        if t.kind != TokenKind::Whitespace || is_line_break(t) {
            break;
        }
        out.push(t.clone());
        i += 1;
    }

    match name {
        "include" | "include_next" | "import" => {
            if let Some(t) = tokens.get(i) {
                if t.kind == TokenKind::String {
                    let mut header = t.clone();
                    header.kind = TokenKind::Header;
                    out.push(header);
                    return i + 1;
                }
                if t.is(TokenKind::Operator, "<") {
                    let close = tokens[i..]
                        .iter()
                        .take_while(|t| !is_line_break(t))
                        .position(|t| t.is(TokenKind::Operator, ">"));
                    if let Some(offset) = close {
                        out.push(merged(&tokens[i..=i + offset], TokenKind::Header));
                        return i + offset + 1;
                    }
                }
            }
            i
        }
        "define" | "undef" | "ifdef" | "ifndef" | "elifdef" | "elifndef" => {
            if let Some(t) = tokens.get(i).filter(|t| is_word(t)) {
                let mut name = t.clone();
                name.kind = TokenKind::Macro;
                out.push(name);
                return i + 1;
            }
            i
        }
        "if" | "elif" => {
            let mut expect_macro = false;
            while let Some(t) = tokens.get(i) {
                if is_line_break(t) {
                    break;
                }
                let mut t = t.clone();
                if t.is(TokenKind::Identifier, "defined") {
                    t.kind = TokenKind::Keyword;
                    expect_macro = true;
                } else if expect_macro && is_word(&t) {
                    t.kind = TokenKind::Macro;
                    expect_macro = false;
                } else if !t.kind.is_trivia() && !t.is(TokenKind::Punctuation, "(") {
                    expect_macro = false;
                }
                out.push(t);
                i += 1;
            }
            i
        }
        _ => i,
    }
}

/// Attach user-defined literal suffixes (`"abc"_s`, `'x'_c`) to their literal
fn merge_literal_suffixes(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.kind == TokenKind::Identifier {
            if let Some(last) = out.last_mut() {
                if matches!(last.kind, TokenKind::String | TokenKind::Char)
                    && last.span.end == token.span.start
                    && last.text.ends_with(['"', '\''])
                {
                    last.text.push_str(&token.text);
                    last.span = last.span.to(token.span);
                    continue;
                }
            }
        }
        out.push(token);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lang() -> Language {
        Language::Cpp(Standard::Cpp20)
    }

    fn kind_of(tokens: &[Token], text: &str) -> TokenKind {
        tokens
            .iter()
            .find(|t| t.text == text)
            .map(|t| t.kind)
            .unwrap_or_else(|| panic!("no token {text:?}"))
    }

    #[test]
    fn test_concatenation_reproduces_input() {
        let source = "#include <vector>\n\
                      template <typename T, int N = 3>\n\
                      constexpr auto f(T x) -> decltype(x + 1) { return R\"(raw)\"s + u8'c' + 0x1'F; } // c\n\
                      /* open @ `";
        let outcome = tokenize(source, lang());
        let rebuilt: String = outcome.value.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(rebuilt, source);
        for window in outcome.value.windows(2) {
            assert_eq!(window[0].span.end, window[1].span.start);
        }
    }

    #[test]
    fn test_keywords_and_literals() {
        let tokens = tokenize("static const int x = 42; bool b = nullptr;", lang()).value;
        assert_eq!(kind_of(&tokens, "static"), TokenKind::Keyword);
        assert_eq!(kind_of(&tokens, "int"), TokenKind::KeywordType);
        assert_eq!(kind_of(&tokens, "42"), TokenKind::Number);
        assert_eq!(kind_of(&tokens, "nullptr"), TokenKind::KeywordConstant);
        assert_eq!(kind_of(&tokens, "x"), TokenKind::Identifier);
        assert_eq!(kind_of(&tokens, ";"), TokenKind::Punctuation);
    }

    #[test]
    fn test_function_call_syntax() {
        let tokens = tokenize("auto y = compute(1);", lang()).value;
        assert_eq!(kind_of(&tokens, "compute"), TokenKind::Function);
    }

    #[test]
    fn test_preprocessor_lines() {
        let tokens = tokenize("#include <foo/bar.h>\n#  define MAX_SIZE 4\n#if defined(USE_X)\n#endif", lang()).value;
        assert_eq!(kind_of(&tokens, "#include"), TokenKind::Preprocessor);
        assert_eq!(kind_of(&tokens, "<foo/bar.h>"), TokenKind::Header);
        assert_eq!(kind_of(&tokens, "#  define"), TokenKind::Preprocessor);
        assert_eq!(kind_of(&tokens, "MAX_SIZE"), TokenKind::Macro);
        assert_eq!(kind_of(&tokens, "USE_X"), TokenKind::Macro);
        assert_eq!(kind_of(&tokens, "#endif"), TokenKind::Preprocessor);
    }

    #[test]
    fn test_hash_mid_line_is_operator() {
        let tokens = tokenize("x # y", lang()).value;
        assert_eq!(kind_of(&tokens, "#"), TokenKind::Operator);
    }

    #[test]
    fn test_string_udl_suffix() {
        let tokens = tokenize("auto s = \"abc\"_sv;", lang()).value;
        assert_eq!(kind_of(&tokens, "\"abc\"_sv"), TokenKind::String);
    }

    #[test]
    fn test_alias_table_persists_across_regions() {
        let mut tokenizer = Tokenizer::new(lang());
        tokenizer.tokenize("using size_type = unsigned long;");
        let later = tokenizer.tokenize("size_type n;").value;
        assert_eq!(kind_of(&later, "size_type"), TokenKind::TypeName);

        // a fresh tokenizer knows nothing
        let fresh = tokenize("size_type n;", lang()).value;
        assert_eq!(kind_of(&fresh, "size_type"), TokenKind::Identifier);
    }

    #[test]
    fn test_declarations_feed_alias_table() {
        let mut tokenizer = Tokenizer::new(lang());
        tokenizer.tokenize("struct [[nodiscard]] widget; enum class color { red };");
        tokenizer.tokenize("typedef void (*callback)(int); typedef int handle, *handle_ptr;");
        let aliases: Vec<_> = tokenizer.aliases().iter().collect();
        assert_eq!(aliases, vec!["callback", "color", "handle", "handle_ptr", "widget"]);
    }

    #[test]
    fn test_template_params_are_region_local() {
        let mut tokenizer = Tokenizer::new(lang());
        let tokens = tokenizer.tokenize("template <typename T> T max(T a, T b);").value;
        assert!(tokens
            .iter()
            .filter(|t| t.text == "T")
            .all(|t| t.kind == TokenKind::TypeName));
        assert_eq!(kind_of(&tokens, "max"), TokenKind::Function);
        let next = tokenizer.tokenize("T value;").value;
        assert_eq!(kind_of(&next, "T"), TokenKind::Identifier);
    }

    #[test]
    fn test_namespaces() {
        let tokens = tokenize("namespace fs = std::filesystem; using namespace a::b;", lang()).value;
        for name in ["fs", "std", "filesystem", "a", "b"] {
            assert_eq!(kind_of(&tokens, name), TokenKind::Namespace, "{name}");
        }
    }

    #[test]
    fn test_unterminated_and_unknown() {
        let outcome = tokenize("int a; /* never closed", lang());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].message.contains("block comment"));

        let tokens = tokenize("a @ b", lang()).value;
        assert_eq!(kind_of(&tokens, "@"), TokenKind::Unknown);
    }
}
