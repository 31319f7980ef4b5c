//! Keyword tables per language revision

use std::fmt;
use std::str::FromStr;

use super::TokenKind;

/// C++ language revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Standard {
    Cpp98,
    Cpp11,
    Cpp14,
    Cpp17,
    Cpp20,
    Cpp23,
}

/// Language hint passed to the tokenizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cpp(Standard),
}

impl Default for Language {
    fn default() -> Self {
        Self::Cpp(Standard::Cpp20)
    }
}

impl FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "c" || (s.starts_with('c') && s[1..].chars().all(|c| c.is_ascii_digit()) && s.len() > 1) {
            return Ok(Self::C);
        }
        let rest = ["c++", "cpp", "cxx"]
            .iter()
            .find_map(|prefix| s.strip_prefix(prefix))
            .ok_or(())?;
        let standard = match rest {
            "" | "20" | "2a" => Standard::Cpp20,
            "98" | "03" => Standard::Cpp98,
            "11" | "0x" => Standard::Cpp11,
            "14" | "1y" => Standard::Cpp14,
            "17" | "1z" => Standard::Cpp17,
            "23" | "2b" | "26" | "2c" => Standard::Cpp23,
            _ => return Err(()),
        };
        Ok(Self::Cpp(standard))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::C => write!(f, "c"),
            Self::Cpp(Standard::Cpp98) => write!(f, "c++98"),
            Self::Cpp(Standard::Cpp11) => write!(f, "c++11"),
            Self::Cpp(Standard::Cpp14) => write!(f, "c++14"),
            Self::Cpp(Standard::Cpp17) => write!(f, "c++17"),
            Self::Cpp(Standard::Cpp20) => write!(f, "c++20"),
            Self::Cpp(Standard::Cpp23) => write!(f, "c++23"),
        }
    }
}

const CPP98_KEYWORDS: &[&str] = &[
    "and", "and_eq", "asm", "auto", "bitand", "bitor", "break", "case", "catch", "class",
    "compl", "const", "const_cast", "continue", "default", "delete", "do", "dynamic_cast",
    "else", "enum", "explicit", "export", "extern", "for", "friend", "goto", "if", "inline",
    "mutable", "namespace", "new", "not", "not_eq", "operator", "or", "or_eq", "private",
    "protected", "public", "register", "reinterpret_cast", "return", "sizeof", "static",
    "static_cast", "struct", "switch", "template", "this", "throw", "try", "typedef", "typeid",
    "typename", "union", "using", "virtual", "volatile", "while", "xor", "xor_eq",
];

const CPP98_TYPES: &[&str] = &[
    "bool", "char", "double", "float", "int", "long", "short", "signed", "unsigned", "void",
    "wchar_t",
];

const CPP11_KEYWORDS: &[&str] = &[
    "alignas", "alignof", "constexpr", "decltype", "final", "noexcept", "override",
    "static_assert", "thread_local",
];

const CPP11_TYPES: &[&str] = &["char16_t", "char32_t"];

const CPP20_KEYWORDS: &[&str] = &[
    "co_await", "co_return", "co_yield", "concept", "consteval", "constinit", "requires",
];

const CPP20_TYPES: &[&str] = &["char8_t"];

const C_KEYWORDS: &[&str] = &[
    "_Alignas", "_Alignof", "_Atomic", "_Generic", "_Noreturn", "_Static_assert",
    "_Thread_local", "auto", "break", "case", "const", "continue", "default", "do", "else",
    "enum", "extern", "for", "goto", "if", "inline", "register", "restrict", "return",
    "sizeof", "static", "struct", "switch", "typedef", "union", "volatile", "while",
];

const C_TYPES: &[&str] = &[
    "_Bool", "_Complex", "_Imaginary", "char", "double", "float", "int", "long", "short",
    "signed", "unsigned", "void",
];

impl Language {
    /// Classify a word as a keyword of this language, if it is one
    #[must_use]
    pub fn keyword_kind(self, word: &str) -> Option<TokenKind> {
        match self {
            Self::C => {
                if C_TYPES.contains(&word) {
                    Some(TokenKind::KeywordType)
                } else if C_KEYWORDS.contains(&word) {
                    Some(TokenKind::Keyword)
                } else if matches!(word, "true" | "false") {
                    Some(TokenKind::KeywordConstant)
                } else {
                    None
                }
            }
            Self::Cpp(standard) => {
                if matches!(word, "true" | "false")
                    || (standard >= Standard::Cpp11 && word == "nullptr")
                {
                    return Some(TokenKind::KeywordConstant);
                }
                let is_type = CPP98_TYPES.contains(&word)
                    || (standard >= Standard::Cpp11 && CPP11_TYPES.contains(&word))
                    || (standard >= Standard::Cpp20 && CPP20_TYPES.contains(&word));
                if is_type {
                    return Some(TokenKind::KeywordType);
                }
                let is_keyword = CPP98_KEYWORDS.contains(&word)
                    || (standard >= Standard::Cpp11 && CPP11_KEYWORDS.contains(&word))
                    || (standard >= Standard::Cpp20 && CPP20_KEYWORDS.contains(&word));
                is_keyword.then_some(TokenKind::Keyword)
            }
        }
    }

    #[must_use]
    pub fn is_cpp(self) -> bool {
        matches!(self, Self::Cpp(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_language() {
        assert_eq!("c++17".parse(), Ok(Language::Cpp(Standard::Cpp17)));
        assert_eq!("C++2a".parse(), Ok(Language::Cpp(Standard::Cpp20)));
        assert_eq!("cpp".parse(), Ok(Language::Cpp(Standard::Cpp20)));
        assert_eq!("c11".parse(), Ok(Language::C));
        assert_eq!("c".parse(), Ok(Language::C));
        assert!("rust".parse::<Language>().is_err());
        assert!("c++42".parse::<Language>().is_err());
    }

    #[test]
    fn test_keywords_depend_on_revision() {
        let old = Language::Cpp(Standard::Cpp98);
        let new = Language::Cpp(Standard::Cpp20);
        assert_eq!(old.keyword_kind("constexpr"), None);
        assert_eq!(new.keyword_kind("constexpr"), Some(TokenKind::Keyword));
        assert_eq!(old.keyword_kind("nullptr"), None);
        assert_eq!(new.keyword_kind("nullptr"), Some(TokenKind::KeywordConstant));
        assert_eq!(new.keyword_kind("char8_t"), Some(TokenKind::KeywordType));
        assert_eq!(Language::C.keyword_kind("class"), None);
        assert_eq!(Language::C.keyword_kind("_Bool"), Some(TokenKind::KeywordType));
    }
}
