//! Declaration text repair
//!
//! The extractor serializes declarations almost correctly. The rules here fix
//! the known ways it goes wrong, using token-level and surface-level rewrites
//! only. Every rule reports whether it changed anything, and [`normalize`]
//! repeats the whole set until none does.

mod tree;

pub use tree::normalize_tree;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::diagnostics::Diagnostic;
use crate::lexer::{tokenize, Language, TokenKind};

/// Return type written in place of a bare `auto` with no trailing return
pub const DEDUCED_RETURN_MARKER: &str = "__cxxdoc_deduced_auto_return_type";

/// Stands in for anonymous entities the extractor names `@0`, `@1`, ...
pub const IMPLEMENTATION_DETAIL_MARKER: &str = "__cxxdoc_implementation_detail";

/// Passes before [`normalize`] gives up on reaching a fixpoint
const MAX_PASSES: usize = 16;

const STORAGE_KEYWORDS: &[&str] = &[
    "static",
    "extern",
    "inline",
    "thread_local",
    "mutable",
    "constexpr",
    "constinit",
    "consteval",
    "register",
];

/// Member kinds that carry declaration text worth repairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Function,
    Friend,
    Variable,
    Other,
}

impl DeclKind {
    #[must_use]
    pub fn from_extractor(kind: &str) -> Self {
        match kind {
            "function" => Self::Function,
            "friend" => Self::Friend,
            "variable" => Self::Variable,
            _ => Self::Other,
        }
    }

    const fn is_callable(self) -> bool {
        matches!(self, Self::Function | Self::Friend)
    }
}

/// A keyword that belongs on the declaration rather than inside its type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Qualifier {
    Constexpr,
    Constinit,
    Consteval,
    Explicit,
    Static,
    Friend,
    Extern,
    Inline,
    Virtual,
}

impl Qualifier {
    pub const ALL: [Self; 9] = [
        Self::Constexpr,
        Self::Constinit,
        Self::Consteval,
        Self::Explicit,
        Self::Static,
        Self::Friend,
        Self::Extern,
        Self::Inline,
        Self::Virtual,
    ];

    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Constexpr => "constexpr",
            Self::Constinit => "constinit",
            Self::Consteval => "consteval",
            Self::Explicit => "explicit",
            Self::Static => "static",
            Self::Friend => "friend",
            Self::Extern => "extern",
            Self::Inline => "inline",
            Self::Virtual => "virtual",
        }
    }

    /// Member attribute (name, value) recording this qualifier in the XML
    #[must_use]
    pub const fn attribute(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Constexpr => Some(("constexpr", "yes")),
            Self::Constinit => Some(("constinit", "yes")),
            Self::Consteval => Some(("consteval", "yes")),
            Self::Explicit => Some(("explicit", "yes")),
            Self::Static => Some(("static", "yes")),
            Self::Inline => Some(("inline", "yes")),
            Self::Virtual => Some(("virt", "virtual")),
            Self::Friend | Self::Extern => None,
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Declaration text of one member
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Declaration {
    /// Extractor id, used as the diagnostic subject
    pub id: String,
    pub kind: Option<DeclKind>,
    /// Type, or return type for functions
    pub type_text: String,
    /// Argument list and anything after it (`(int a) const`)
    pub args: String,
    pub name: String,
    /// The member's own template parameters (`typename T`)
    pub template_params: Vec<String>,
    /// Template parameters of the enclosing compound
    pub enclosing_template_params: Vec<String>,
    /// Qualifiers moved out of the type text
    pub qualifiers: BTreeSet<Qualifier>,
}

impl Declaration {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: DeclKind) -> Self {
        Self {
            id: id.into(),
            kind: Some(kind),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_type(mut self, text: impl Into<String>) -> Self {
        self.type_text = text.into();
        self
    }

    #[must_use]
    pub fn with_args(mut self, text: impl Into<String>) -> Self {
        self.args = text.into();
        self
    }

    #[must_use]
    pub fn with_name(mut self, text: impl Into<String>) -> Self {
        self.name = text.into();
        self
    }

    fn decl_kind(&self) -> DeclKind {
        self.kind.unwrap_or(DeclKind::Other)
    }

    /// Approximate source form, used in messages and tests
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.template_params.is_empty() {
            out.push_str("template <");
            out.push_str(&self.template_params.join(", "));
            out.push_str("> ");
        }
        for q in &self.qualifiers {
            out.push_str(q.keyword());
            out.push(' ');
        }
        if !self.type_text.is_empty() {
            out.push_str(&self.type_text);
            out.push(' ');
        }
        out.push_str(&self.name);
        out.push_str(&self.args);
        out
    }
}

/// Repair one declaration in place
///
/// Rules run in a fixed order and repeat until a pass changes nothing, so
/// running this twice gives the same result as running it once.
pub fn normalize(decl: &mut Declaration) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut converged = false;
    for _ in 0..MAX_PASSES {
        let mut changed = false;
        changed |= dedupe_storage_qualifiers(decl);
        changed |= relocate_leaked_qualifiers(decl);
        changed |= reconstruct_trailing_return(decl);
        changed |= collapse_template_noise(decl);
        changed |= guard_unsupported_constructs(decl, &mut diagnostics);
        if !changed {
            converged = true;
            break;
        }
    }
    if !converged {
        diagnostics.push(Diagnostic::warning(
            decl.id.as_str(),
            format!("declaration `{}` did not settle; left as is", decl.render()),
        ));
    }
    for (field, text) in [("type", &decl.type_text), ("arguments", &decl.args)] {
        if !is_balanced(text) {
            diagnostics.push(Diagnostic::info(
                decl.id.as_str(),
                format!("unbalanced brackets in {field} `{text}`"),
            ));
        }
    }
    diagnostics
}

/// Drop repeated storage and linkage keywords, keeping the first
pub fn dedupe_storage_qualifiers(decl: &mut Declaration) -> bool {
    if decl.type_text.is_empty() {
        return false;
    }
    let tokens = tokenize(&decl.type_text, Language::default()).value;
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut out = String::with_capacity(decl.type_text.len());
    let mut dropping_space = false;
    let mut changed = false;
    for token in &tokens {
        if token.kind == TokenKind::Keyword && STORAGE_KEYWORDS.contains(&token.text.as_str()) {
            if !seen.insert(token.text.as_str()) {
                changed = true;
                dropping_space = true;
                continue;
            }
        } else if token.kind == TokenKind::Whitespace && dropping_space {
            continue;
        }
        dropping_space = false;
        out.push_str(&token.text);
    }
    if changed {
        decl.type_text = out.trim_end().to_string();
    }
    changed
}

/// Move qualifier keywords out of the ends of the type text
pub fn relocate_leaked_qualifiers(decl: &mut Declaration) -> bool {
    let kind = decl.decl_kind();
    if !matches!(kind, DeclKind::Function | DeclKind::Friend | DeclKind::Variable) {
        return false;
    }
    let mut changed = false;
    let mut matched = true;
    while matched {
        matched = false;
        for qualifier in Qualifier::ALL {
            let kw = qualifier.keyword();
            let text = decl.type_text.as_str();
            if qualifier == Qualifier::Friend && kind == DeclKind::Variable && text == kw {
                // a friend declaration with nothing else in its type keeps the keyword
                changed |= decl.qualifiers.insert(qualifier);
                continue;
            }
            let stripped = if text == kw {
                Some("")
            } else if let Some(rest) = text.strip_prefix(kw).filter(|r| r.starts_with(' ')) {
                Some(rest.trim())
            } else if let Some(rest) = text.strip_suffix(kw).filter(|r| r.ends_with(' ')) {
                Some(rest.trim())
            } else {
                None
            };
            let Some(stripped) = stripped else { continue };
            let stripped = stripped.to_string();
            decl.qualifiers.insert(qualifier);
            if qualifier == Qualifier::Friend && kind == DeclKind::Variable && stripped.is_empty() {
                decl.type_text = String::from(kw);
            } else {
                decl.type_text = stripped;
            }
            matched = true;
            changed = true;
        }
    }
    changed
}

fn trailing_return_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*?)\s*->\s*([a-zA-Z_][a-zA-Z0-9_:*&<>,\s]*?)\s*$")
            .expect("trailing return pattern is valid")
    })
}

/// Turn `auto f(args) -> T` into return type `T`
pub fn reconstruct_trailing_return(decl: &mut Declaration) -> bool {
    if !decl.decl_kind().is_callable() || decl.type_text != "auto" {
        return false;
    }
    if decl.args.is_empty() || decl.args.contains("decltype") {
        return false;
    }
    if let Some(caps) = trailing_return_regex().captures(&decl.args) {
        let args = caps.get(1).map_or("", |m| m.as_str()).to_string();
        let ret = canonical_type_spacing(caps.get(2).map_or("", |m| m.as_str()));
        if ret.is_empty() {
            return false;
        }
        decl.args = args;
        decl.type_text = ret;
        return true;
    }
    if decl.args == "()" {
        decl.type_text = String::from(DEDUCED_RETURN_MARKER);
        return true;
    }
    false
}

/// Collapse whitespace in a type and remove it around `::`, `<`, `>`, `*`, `&`
#[must_use]
pub fn canonical_type_spacing(text: &str) -> String {
    static AFTER: OnceLock<Regex> = OnceLock::new();
    static BEFORE: OnceLock<Regex> = OnceLock::new();
    let after = AFTER.get_or_init(|| {
        Regex::new(r"(::|[<>*&])\s+").expect("spacing pattern is valid")
    });
    let before = BEFORE.get_or_init(|| {
        Regex::new(r"\s+(::|[<>*&])").expect("spacing pattern is valid")
    });
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let collapsed = after.replace_all(&collapsed, "$1");
    before.replace_all(&collapsed, "$1").into_owned()
}

/// Drop template parameter lists and arguments that only repeat context
pub fn collapse_template_noise(decl: &mut Declaration) -> bool {
    let mut changed = false;
    if !decl.template_params.is_empty() && decl.template_params == decl.enclosing_template_params {
        decl.template_params.clear();
        changed = true;
    }
    if !decl.name.starts_with("operator") {
        let name = strip_scope_template_args(&decl.name);
        if name != decl.name {
            decl.name = name;
            changed = true;
        }
    }
    let type_text = collapse_template_headers(&decl.type_text);
    if type_text != decl.type_text {
        decl.type_text = type_text;
        changed = true;
    }
    changed
}

/// Remove template arguments from scope prefixes: `Foo<T>::bar` becomes `Foo::bar`
#[must_use]
pub fn strip_scope_template_args(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        let preceded_by_ident = i > 0 && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_');
        if bytes[i] == b'<' && preceded_by_ident {
            if let Some(close) = matching_angle(bytes, i) {
                let rest = text[close + 1..].trim_start();
                if rest.starts_with("::") {
                    i = close + 1;
                    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    continue;
                }
            }
        }
        let ch_len = text[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&text[i..i + ch_len]);
        i += ch_len;
    }
    out
}

fn matching_angle(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, &b) in bytes[open..].iter().enumerate() {
        match b {
            b'<' => depth += 1,
            b'>' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            b';' | b'{' | b'}' => return None,
            _ => {}
        }
    }
    None
}

/// Collapse consecutive identical `template<...>` headers
#[must_use]
pub fn collapse_template_headers(text: &str) -> String {
    let mut headers: Vec<(usize, usize)> = Vec::new();
    let mut search = 0;
    while let Some(found) = text[search..].find("template") {
        let start = search + found;
        let after = start + "template".len();
        let open = text[after..]
            .find(|c: char| !c.is_whitespace())
            .map(|o| after + o)
            .filter(|&o| text.as_bytes()[o] == b'<');
        match open.and_then(|o| matching_angle(text.as_bytes(), o)) {
            Some(close) => {
                headers.push((start, close + 1));
                search = close + 1;
            }
            None => search = after,
        }
    }
    if headers.len() < 2 {
        return text.to_string();
    }

    let normalized = |(s, e): (usize, usize)| -> String { text[s..e].split_whitespace().collect() };
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for pair in headers.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        let gap = &text[prev.1..next.0];
        if gap.trim().is_empty() && normalized(prev) == normalized(next) {
            out.push_str(&text[cursor..prev.0]);
            cursor = next.0;
        }
    }
    out.push_str(&text[cursor..]);
    out
}

fn anonymous_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@\d+").expect("anonymous pattern is valid"))
}

/// Replace anonymous entity markers; `requires` and `decltype(auto)` pass through
pub fn guard_unsupported_constructs(
    decl: &mut Declaration,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let re = anonymous_regex();
    let mut changed = false;
    for field in [&mut decl.type_text, &mut decl.args, &mut decl.name] {
        if re.is_match(field) {
            *field = re.replace_all(field, IMPLEMENTATION_DETAIL_MARKER).into_owned();
            changed = true;
        }
    }
    if changed {
        diagnostics.push(Diagnostic::warning(
            decl.id.as_str(),
            "anonymous entity in declaration replaced by an implementation detail note",
        ));
    }
    changed
}

fn is_balanced(text: &str) -> bool {
    let mut stack = Vec::new();
    let mut chars = text.chars().peekable();
    let mut in_string = None;
    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            if c == '\\' {
                chars.next();
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}
