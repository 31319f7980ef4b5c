//! Project-wide symbol table
//!
//! Every documented entity (and every entity imported from a tagfile) becomes
//! a [`Symbol`] stored in an arena and addressed by [`SymbolId`]. Relations
//! between symbols (base classes) are id lists, so the table has no ownership
//! cycles. The table is built once per run and is read-only afterwards.

mod ingest;
mod table;

pub use ingest::{import_tagfile, import_tagfile_str, ingest_xml_dir, Ingested};
pub use table::{DuplicateSymbolError, ScopeStack, SymbolTable};

use std::fmt;

/// Stable index of a symbol in its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub(crate) u32);

impl SymbolId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of documented entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymbolKind {
    Namespace,
    Class,
    Struct,
    Union,
    Enum,
    EnumValue,
    Function,
    Variable,
    Typedef,
    Macro,
    Concept,
}

impl SymbolKind {
    /// Map an extractor kind attribute (compound or member) to a symbol kind
    #[must_use]
    pub fn from_extractor(kind: &str) -> Option<Self> {
        match kind {
            "namespace" => Some(Self::Namespace),
            "class" | "interface" => Some(Self::Class),
            "struct" => Some(Self::Struct),
            "union" => Some(Self::Union),
            "enum" | "enumeration" => Some(Self::Enum),
            "enumvalue" => Some(Self::EnumValue),
            "function" | "signal" | "slot" | "prototype" => Some(Self::Function),
            "variable" | "property" => Some(Self::Variable),
            "typedef" => Some(Self::Typedef),
            "define" => Some(Self::Macro),
            "concept" => Some(Self::Concept),
            _ => None,
        }
    }

    /// Names a type (usable where a type is expected)
    #[must_use]
    pub const fn is_type(self) -> bool {
        matches!(
            self,
            Self::Class | Self::Struct | Self::Union | Self::Enum | Self::Typedef | Self::Concept
        )
    }

    /// Introduces a scope that names can be qualified with
    #[must_use]
    pub const fn is_scope(self) -> bool {
        matches!(
            self,
            Self::Namespace | Self::Class | Self::Struct | Self::Union | Self::Enum
        )
    }

    #[must_use]
    pub const fn is_class_like(self) -> bool {
        matches!(self, Self::Class | Self::Struct | Self::Union)
    }

    /// Default preference when several kinds share a name at one scope level
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Class | Self::Struct | Self::Union | Self::Enum | Self::Typedef | Self::Concept => 0,
            Self::Namespace => 1,
            Self::Function => 2,
            Self::Variable => 3,
            Self::EnumValue => 4,
            Self::Macro => 5,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Union => "union",
            Self::Enum => "enum",
            Self::EnumValue => "enumerator",
            Self::Function => "function",
            Self::Variable => "variable",
            Self::Typedef => "typedef",
            Self::Macro => "macro",
            Self::Concept => "concept",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully qualified name as scope segments; the empty name is the global scope
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName(Vec<String>);

impl QualifiedName {
    #[must_use]
    pub fn global() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Parse `a::b::c`; a leading `::` is accepted and dropped
    ///
    /// Separators inside template argument lists do not split
    /// (`a<b::c>::d` has two segments).
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim().trim_start_matches("::");
        let mut segments = Vec::new();
        let mut depth = 0i32;
        let mut start = 0;
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'<' | b'(' => depth += 1,
                b'>' | b')' => depth -= 1,
                b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                    segments.push(text[start..i].trim().to_string());
                    i += 2;
                    start = i;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
        segments.push(text[start..].trim().to_string());
        segments.retain(|s| !s.is_empty());
        Self(segments)
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment, empty for the global scope
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.last().map_or("", String::as_str)
    }

    #[must_use]
    pub fn parent(&self) -> Self {
        let mut segments = self.0.clone();
        segments.pop();
        Self(segments)
    }

    #[must_use]
    pub fn join(&self, other: &QualifiedName) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    #[must_use]
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("::"))
    }
}

/// Access level of a class member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Visibility {
    #[must_use]
    pub fn from_extractor(prot: &str) -> Option<Self> {
        match prot {
            "public" => Some(Self::Public),
            "protected" => Some(Self::Protected),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

/// Where a symbol is documented
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// A page of this project; an empty anchor is the page's own compound
    Local { page: String, anchor: String },
    /// A page of another project, from a tagfile
    External { url: String },
}

impl Location {
    #[must_use]
    pub fn local(page: impl Into<String>, anchor: impl Into<String>) -> Self {
        Self::Local {
            page: page.into(),
            anchor: anchor.into(),
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }

    /// Link target as seen from `from_page`
    #[must_use]
    pub fn href(&self, from_page: &str) -> String {
        match self {
            Self::Local { page, anchor } if anchor.is_empty() => page.clone(),
            Self::Local { page, anchor } if page == from_page => format!("#{anchor}"),
            Self::Local { page, anchor } => format!("{page}#{anchor}"),
            Self::External { url } => url.clone(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { page, anchor } if anchor.is_empty() => f.write_str(page),
            Self::Local { page, anchor } => write!(f, "{page}#{anchor}"),
            Self::External { url } => f.write_str(url),
        }
    }
}

/// A documented or externally referenced entity
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: QualifiedName,
    pub kind: SymbolKind,
    pub template_params: Vec<String>,
    pub location: Location,
    pub visibility: Option<Visibility>,
    /// Extractor id of the compound or member
    pub refid: Option<String>,
    /// Resolved base classes
    pub bases: Vec<SymbolId>,
}

impl Symbol {
    #[must_use]
    pub fn new(name: QualifiedName, kind: SymbolKind, location: Location) -> Self {
        Self {
            name,
            kind,
            template_params: Vec::new(),
            location,
            visibility: None,
            refid: None,
            bases: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_template_params(mut self, params: Vec<String>) -> Self {
        self.template_params = params;
        self
    }

    #[must_use]
    pub fn with_visibility(mut self, visibility: Option<Visibility>) -> Self {
        self.visibility = visibility;
        self
    }

    #[must_use]
    pub fn with_refid(mut self, refid: impl Into<String>) -> Self {
        self.refid = Some(refid.into());
        self
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.location.is_local()
    }
}

/// Page file name for an extractor compound id
#[must_use]
pub fn page_for_compound(compound_id: &str) -> String {
    if compound_id == "indexpage" {
        String::from("index.html")
    } else {
        format!("{compound_id}.html")
    }
}

/// Split a member id (`classfoo_1a0b1c...`) into its page and anchor
#[must_use]
pub fn member_location(member_id: &str) -> Option<Location> {
    let (compound, anchor) = member_id.rsplit_once("_1")?;
    if compound.is_empty() || anchor.is_empty() {
        return None;
    }
    Some(Location::local(page_for_compound(compound), anchor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_parse() {
        let name = QualifiedName::parse("::ns::foo :: bar");
        assert_eq!(name.segments(), ["ns", "foo", "bar"]);
        assert_eq!(name.name(), "bar");
        assert_eq!(name.parent().to_string(), "ns::foo");
        assert!(QualifiedName::parse("").is_global());
        let specialization = QualifiedName::parse("ns::box< a::b >::value");
        assert_eq!(specialization.segments(), ["ns", "box< a::b >", "value"]);
    }

    #[test]
    fn test_member_location() {
        assert_eq!(
            member_location("classns_1_1foo_1a9f8e"),
            Some(Location::local("classns_1_1foo.html", "a9f8e"))
        );
        assert_eq!(member_location("nounderscore"), None);
        assert_eq!(page_for_compound("indexpage"), "index.html");
    }

    #[test]
    fn test_href_relative_to_page() {
        let loc = Location::local("a.html", "x1");
        assert_eq!(loc.href("a.html"), "#x1");
        assert_eq!(loc.href("b.html"), "a.html#x1");
        assert_eq!(Location::local("a.html", "").href("a.html"), "a.html");
        let ext = Location::External {
            url: String::from("https://example.com/x"),
        };
        assert_eq!(ext.href("a.html"), "https://example.com/x");
    }
}
