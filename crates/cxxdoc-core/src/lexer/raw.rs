//! Context-free token shapes, produced by logos
//!
//! Everything here is decided by the characters alone. Keyword lookup,
//! preprocessor handling and name classification happen afterwards in
//! [`super::Tokenizer`], which needs context the regexes cannot see.

use logos::{Lexer, Logos};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Raw {
    #[regex(r"[ \t\r\n\x0B\x0C]+")]
    Whitespace,

    /// Backslash-newline continuation
    #[regex(r"\\\r?\n")]
    Continuation,

    #[regex(r"//[^\n]*")]
    LineComment,

    /// Carries whether the closing `*/` was found
    #[token("/*", |lex| Some(block_comment(lex)))]
    BlockComment(bool),

    #[regex(r#"(u8|u|U|L)?""#, |lex| Some(quoted(lex, b'"')))]
    String(bool),

    #[regex(r#"(u8|u|U|L)?'"#, |lex| Some(quoted(lex, b'\'')))]
    Char(bool),

    #[regex(r#"(u8|u|U|L)?R""#, |lex| Some(raw_string(lex)))]
    RawString(bool),

    /// A pp-number: covers every numeric form plus digit separators and suffixes
    #[regex(r"\.?[0-9]([0-9a-zA-Z_.]|'[0-9a-zA-Z_]|[eEpP][+-])*")]
    Number,

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", priority = 3)]
    #[regex(r"[\p{XID_Start}][\p{XID_Continue}]*", priority = 2)]
    Ident,

    #[token("#")]
    Hash,

    #[token("##")]
    #[token("::")]
    #[token("->*")]
    #[token("->")]
    #[token(".*")]
    #[token("...")]
    #[token("<=>")]
    #[token("<<=")]
    #[token(">>=")]
    #[token("<<")]
    #[token(">>")]
    #[token("<=")]
    #[token(">=")]
    #[token("==")]
    #[token("!=")]
    #[token("&&")]
    #[token("||")]
    #[token("++")]
    #[token("--")]
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("%=")]
    #[token("&=")]
    #[token("|=")]
    #[token("^=")]
    #[token("<")]
    #[token(">")]
    #[token("=")]
    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    #[token("%")]
    #[token("&")]
    #[token("|")]
    #[token("^")]
    #[token("~")]
    #[token("!")]
    #[token("?")]
    #[token(":")]
    #[token(".")]
    Operator,

    #[token("(")]
    #[token(")")]
    #[token("[")]
    #[token("]")]
    #[token("{")]
    #[token("}")]
    #[token(";")]
    #[token(",")]
    Punctuation,
}

fn block_comment(lex: &mut Lexer<Raw>) -> bool {
    let rest = lex.remainder();
    match rest.find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => {
            lex.bump(rest.len());
            false
        }
    }
}

/// Scan to the closing quote, honoring escapes; stops before a bare newline
fn quoted(lex: &mut Lexer<Raw>, quote: u8) -> bool {
    let bytes = lex.remainder().as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                // An escaped newline is a continuation, anything else is one escape
                i += 2;
            }
            b'\n' => {
                lex.bump(i);
                return false;
            }
            b if b == quote => {
                lex.bump(i + 1);
                return true;
            }
            _ => i += 1,
        }
    }
    lex.bump(bytes.len());
    false
}

/// `R"delim( ... )delim"`; the delimiter is at most 16 characters
fn raw_string(lex: &mut Lexer<Raw>) -> bool {
    let rest = lex.remainder();
    let open = match rest.find('(') {
        Some(open) if open <= 16 => open,
        _ => return false,
    };
    let delimiter = &rest[..open];
    if delimiter
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ')' | '\\' | '"'))
    {
        return false;
    }
    let closing = format!("){delimiter}\"");
    match rest[open..].find(&closing) {
        Some(end) => {
            lex.bump(open + end + closing.len());
            true
        }
        None => {
            lex.bump(rest.len());
            false
        }
    }
}
