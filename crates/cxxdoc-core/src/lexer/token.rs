//! Classified tokens

use std::fmt;

use super::Span;
use crate::xref::Resolution;

/// Classification of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Keyword,
    /// Built-in type keyword (`int`, `char8_t`, ...)
    KeywordType,
    /// `true`, `false`, `nullptr`
    KeywordConstant,
    /// Class, struct, union, enum, alias or concept name
    TypeName,
    Namespace,
    Function,
    Variable,
    EnumValue,
    Macro,
    Identifier,
    Number,
    String,
    Char,
    /// Header name after `#include`
    Header,
    Operator,
    Punctuation,
    Comment,
    Preprocessor,
    Whitespace,
    Unknown,
}

/// The coarse categories every token falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Keyword,
    TypeName,
    Identifier,
    Literal,
    Operator,
    Punctuation,
    Comment,
    String,
}

impl TokenKind {
    /// Coarse category; `None` for whitespace and unrecognised text
    #[must_use]
    pub const fn category(self) -> Option<Category> {
        match self {
            Self::Keyword | Self::KeywordConstant | Self::Preprocessor => Some(Category::Keyword),
            Self::KeywordType | Self::TypeName | Self::Namespace => Some(Category::TypeName),
            Self::Function
            | Self::Variable
            | Self::EnumValue
            | Self::Macro
            | Self::Identifier => Some(Category::Identifier),
            Self::Number | Self::Char => Some(Category::Literal),
            Self::String | Self::Header => Some(Category::String),
            Self::Operator => Some(Category::Operator),
            Self::Punctuation => Some(Category::Punctuation),
            Self::Comment => Some(Category::Comment),
            Self::Whitespace | Self::Unknown => None,
        }
    }

    /// Whether the token is a name the resolver may link
    #[must_use]
    pub const fn is_name(self) -> bool {
        matches!(
            self,
            Self::TypeName
                | Self::Namespace
                | Self::Function
                | Self::Variable
                | Self::EnumValue
                | Self::Macro
                | Self::Identifier
        )
    }

    #[must_use]
    pub const fn is_trivia(self) -> bool {
        matches!(self, Self::Whitespace | Self::Comment)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Keyword => "keyword",
            Self::KeywordType => "type keyword",
            Self::KeywordConstant => "constant",
            Self::TypeName => "type name",
            Self::Namespace => "namespace",
            Self::Function => "function",
            Self::Variable => "variable",
            Self::EnumValue => "enumerator",
            Self::Macro => "macro",
            Self::Identifier => "identifier",
            Self::Number => "number",
            Self::String => "string",
            Self::Char => "character",
            Self::Header => "header name",
            Self::Operator => "operator",
            Self::Punctuation => "punctuation",
            Self::Comment => "comment",
            Self::Preprocessor => "directive",
            Self::Whitespace => "whitespace",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A classified slice of code text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: String,
    /// Set by the resolver when the name maps to a symbol
    pub resolved: Option<Resolution>,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, span: Span, text: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            text: text.into(),
            resolved: None,
        }
    }

    #[must_use]
    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }

    /// Short highlighter class used when rendering, empty for bare text
    #[must_use]
    pub fn css_class(&self) -> &'static str {
        match self.kind {
            TokenKind::Keyword => "k",
            TokenKind::KeywordType => "kt",
            TokenKind::KeywordConstant => "kc",
            TokenKind::TypeName => "nc",
            TokenKind::Namespace => "nn",
            TokenKind::Function => "nf",
            TokenKind::Variable => "nv",
            TokenKind::EnumValue => "no",
            TokenKind::Macro => "nd",
            TokenKind::Identifier => "n",
            TokenKind::Number => number_class(&self.text),
            TokenKind::String => "s",
            TokenKind::Char => "sc",
            TokenKind::Header => "cpf",
            TokenKind::Operator => "o",
            TokenKind::Punctuation => "p",
            TokenKind::Comment => {
                if self.text.starts_with("//") {
                    "c1"
                } else {
                    "cm"
                }
            }
            TokenKind::Preprocessor => "cp",
            TokenKind::Whitespace | TokenKind::Unknown => "",
        }
    }
}

fn number_class(text: &str) -> &'static str {
    let lower = text.to_ascii_lowercase();
    if lower.starts_with("0x") {
        if lower.contains('.') || lower.contains('p') {
            "mf"
        } else {
            "mh"
        }
    } else if lower.starts_with("0b") {
        "mb"
    } else if lower.contains('.')
        || (lower.contains('e') && !lower.contains('_'))
        || (lower.ends_with('f') && !lower.ends_with("_f"))
    {
        "mf"
    } else if lower.len() > 1 && lower.starts_with('0') && lower.as_bytes()[1].is_ascii_digit() {
        "mo"
    } else {
        "mi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(text: &str) -> &'static str {
        Token::new(TokenKind::Number, Span::default(), text).css_class()
    }

    #[test]
    fn test_number_classes() {
        assert_eq!(number("42"), "mi");
        assert_eq!(number("42ull"), "mi");
        assert_eq!(number("0x2A"), "mh");
        assert_eq!(number("0b1010"), "mb");
        assert_eq!(number("017"), "mo");
        assert_eq!(number("1.5f"), "mf");
        assert_eq!(number("1e10"), "mf");
        assert_eq!(number("10_km"), "mi");
    }

    #[test]
    fn test_categories() {
        assert_eq!(TokenKind::KeywordType.category(), Some(Category::TypeName));
        assert_eq!(TokenKind::Macro.category(), Some(Category::Identifier));
        assert_eq!(TokenKind::Header.category(), Some(Category::String));
        assert_eq!(TokenKind::Whitespace.category(), None);
    }
}
