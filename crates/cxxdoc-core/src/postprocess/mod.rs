//! Per-page HTML fixes
//!
//! A page is parsed into a [`Document`], handed to each [`PageFix`] in turn
//! and written back only when some fix reports a change. Fixes only see
//! their own page plus the read-only [`PageContext`], so pages can be
//! processed on any worker in any order.

mod cleanup;
mod code;
mod links;
mod nav;
mod svg;
mod tags;
mod toc;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, debug_span};

use crate::config::{Config, ConfigError};
use crate::diagnostics::Diagnostic;
use crate::lexer::{Language, Tokenizer};
use crate::markup::{entities, Document, NodeId};
use crate::symbols::SymbolTable;

pub use cleanup::{AutoLinks, EmptyTags, Placeholders, StripIncludes, TemplateNoise};
pub use code::CodeRegions;
pub use links::Links;
pub use nav::Navigation;
pub use svg::InlineSvgs;
pub use tags::ShorthandTags;
pub use toc::TableOfContents;

/// Errors that stop processing of a single page
#[derive(Error, Debug)]
pub enum PageError {
    #[error("failed to read page: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write page: {0}")]
    Write(#[source] std::io::Error),

    #[error("page is not valid UTF-8")]
    Encoding,

    #[error("{fix}: {message}")]
    Fix { fix: &'static str, message: String },
}

/// One repair applied to a page
pub trait PageFix: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Apply the fix, returning whether the page changed
    fn apply(&self, page: &mut Page, ctx: &PageContext<'_>) -> Result<bool, PageError>;
}

/// Read-only inputs shared by every page of a run
pub struct PageContext<'a> {
    pub table: &'a SymbolTable,
    pub config: &'a Config,
    /// Directory the page names are relative to
    pub html_dir: &'a Path,
    language: Language,
    autolinks: Option<AutoLinkIndex>,
}

/// Configured autolink terms compiled into one pattern
pub(crate) struct AutoLinkIndex {
    pattern: Regex,
    /// Escaped term -> target
    targets: BTreeMap<String, String>,
}

impl<'a> PageContext<'a> {
    pub fn new(
        table: &'a SymbolTable,
        config: &'a Config,
        html_dir: &'a Path,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            table,
            config,
            html_dir,
            language: config.language()?,
            autolinks: AutoLinkIndex::compile(&config.autolinks)?,
        })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub(crate) fn autolinks(&self) -> Option<&AutoLinkIndex> {
        self.autolinks.as_ref()
    }

    /// Directory containing `page`
    pub fn page_dir(&self, page: &Page) -> PathBuf {
        match page.name.rsplit_once('/') {
            Some((dir, _)) => self.html_dir.join(dir),
            None => self.html_dir.to_path_buf(),
        }
    }
}

impl AutoLinkIndex {
    fn compile(terms: &BTreeMap<String, String>) -> Result<Option<Self>, ConfigError> {
        let mut escaped: Vec<(String, String)> = terms
            .iter()
            .filter(|(term, _)| !term.trim().is_empty())
            .map(|(term, url)| (entities::escape_text(term.trim()), url.clone()))
            .collect();
        if escaped.is_empty() {
            return Ok(None);
        }
        // Longest first so `std::vector` wins over `std`
        escaped.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let alternatives: Vec<String> = escaped
            .iter()
            .map(|(term, _)| {
                let head = if term.starts_with(is_word_char) { r"\b" } else { "" };
                let tail = if term.ends_with(is_word_char) { r"\b" } else { "" };
                format!("{head}{}{tail}", regex::escape(term))
            })
            .collect();
        let pattern = Regex::new(&format!("(?:{})", alternatives.join("|"))).map_err(|e| {
            ConfigError::Invalid {
                field: "autolinks",
                reason: e.to_string(),
            }
        })?;
        Ok(Some(Self {
            pattern,
            targets: escaped.into_iter().collect(),
        }))
    }

    pub(crate) fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub(crate) fn target(&self, term: &str) -> Option<&str> {
        self.targets.get(term).map(String::as_str)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A page being processed
pub struct Page {
    /// File name relative to the HTML directory, `/`-separated
    pub(crate) name: String,
    pub(crate) doc: Document,
    /// Alias table carried from region to region in document order
    pub(crate) tokenizer: Tokenizer,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl Page {
    pub fn parse(name: impl Into<String>, html: &str, language: Language) -> Self {
        Self {
            name: name.into(),
            doc: Document::parse(html),
            tokenizer: Tokenizer::new(language),
            diagnostics: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last path segment of the page name
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn to_html(&self) -> String {
        self.doc.to_html()
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let diagnostic = Diagnostic::warning(self.name.clone(), message);
        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn note(&mut self, message: impl Into<String>) {
        let diagnostic = Diagnostic::info(self.name.clone(), message);
        self.diagnostics.push(diagnostic);
    }

    /// Elements of the page carrying any of `classes`, in document order
    pub(crate) fn elements_with_class(&self, names: &[&str], classes: &[String]) -> Vec<NodeId> {
        self.doc
            .descendants(self.doc.root())
            .into_iter()
            .filter(|&id| {
                self.doc.element(id).is_some_and(|e| {
                    names.iter().any(|n| e.is(n)) && classes.iter().any(|c| e.has_class(c))
                })
            })
            .collect()
    }
}

/// Result of processing one page file
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub changed: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// The ordered set of fixes applied to every page
pub struct Postprocessor {
    fixes: Vec<Box<dyn PageFix>>,
}

impl Default for Postprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Postprocessor {
    /// All fixes in their standard order
    pub fn new() -> Self {
        Self::with_fixes(vec![
            Box::new(TemplateNoise),
            Box::new(StripIncludes),
            Box::new(CodeRegions),
            Box::new(Placeholders),
            Box::new(ShorthandTags),
            Box::new(AutoLinks),
            Box::new(TableOfContents),
            Box::new(Links),
            Box::new(InlineSvgs),
            Box::new(Navigation),
            Box::new(EmptyTags),
        ])
    }

    pub fn with_fixes(fixes: Vec<Box<dyn PageFix>>) -> Self {
        Self { fixes }
    }

    pub fn fix_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fixes.iter().map(|f| f.name())
    }

    /// Run every fix over an already parsed page
    pub fn process(&self, page: &mut Page, ctx: &PageContext<'_>) -> Result<bool, PageError> {
        let mut changed = false;
        for fix in &self.fixes {
            if fix.apply(page, ctx)? {
                debug!(page = %page.name, fix = fix.name(), "page changed");
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Read, fix and (if changed) rewrite the page `name` under the HTML directory
    pub fn process_file(
        &self,
        name: &str,
        ctx: &PageContext<'_>,
    ) -> Result<PageOutcome, PageError> {
        let span = debug_span!("page", name = %name);
        let _guard = span.enter();

        let path = ctx.html_dir.join(name);
        let bytes = std::fs::read(&path).map_err(PageError::Read)?;
        let html = String::from_utf8(bytes).map_err(|_| PageError::Encoding)?;

        let mut page = Page::parse(name, &html, ctx.language());
        let changed = self.process(&mut page, ctx)?;
        if changed {
            std::fs::write(&path, page.to_html()).map_err(PageError::Write)?;
        }
        Ok(PageOutcome {
            changed,
            diagnostics: page.diagnostics,
        })
    }
}

/// Whether `href` names something outside the documentation
pub(crate) fn is_uri(href: &str) -> bool {
    static URI: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    URI.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").expect("uri pattern is valid"))
        .is_match(href)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Run a single fix over `html` with the given table and config
    pub fn run_fix(
        fix: &dyn PageFix,
        html: &str,
        table: &SymbolTable,
        config: &Config,
        html_dir: &Path,
        name: &str,
    ) -> (bool, Page) {
        let ctx = PageContext::new(table, config, html_dir).unwrap();
        let mut page = Page::parse(name, html, ctx.language());
        let changed = fix.apply(&mut page, &ctx).unwrap();
        (changed, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autolink_index_prefers_longest_term() {
        let mut terms = BTreeMap::new();
        terms.insert(String::from("std"), String::from("std.html"));
        terms.insert(String::from("std::vector"), String::from("https://x/vector"));
        let index = AutoLinkIndex::compile(&terms).unwrap().unwrap();
        let m = index.pattern().find("use std::vector here").unwrap();
        assert_eq!(m.as_str(), "std::vector");
        assert_eq!(index.target(m.as_str()), Some("https://x/vector"));
        assert!(index.pattern().find("stdio").is_none());
    }

    #[test]
    fn test_is_uri() {
        assert!(is_uri("https://example.com"));
        assert!(is_uri("mailto:a@b"));
        assert!(!is_uri("classfoo.html#a1"));
        assert!(!is_uri("img/logo.svg"));
    }

    #[test]
    fn test_process_file_writes_only_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let table = SymbolTable::new();
        let config = Config::default();
        let ctx = PageContext::new(&table, &config, dir.path()).unwrap();

        let clean = "<html><body><p>nothing to do</p></body></html>";
        std::fs::write(dir.path().join("clean.html"), clean).unwrap();
        let outcome = Postprocessor::new().process_file("clean.html", &ctx).unwrap();
        assert!(!outcome.changed);

        let dirty = "<html><body><p><a href=\"dirty.html#x\">x</a></p><h2 id=\"x\">X</h2></body></html>";
        std::fs::write(dir.path().join("dirty.html"), dirty).unwrap();
        let outcome = Postprocessor::new().process_file("dirty.html", &ctx).unwrap();
        assert!(outcome.changed);
        let written = std::fs::read_to_string(dir.path().join("dirty.html")).unwrap();
        assert!(written.contains("<a href=\"#x\">x</a>"));
    }

    #[test]
    fn test_process_file_missing_page() {
        let dir = tempfile::tempdir().unwrap();
        let table = SymbolTable::new();
        let config = Config::default();
        let ctx = PageContext::new(&table, &config, dir.path()).unwrap();
        assert!(matches!(
            Postprocessor::new().process_file("nope.html", &ctx),
            Err(PageError::Read(_))
        ));
    }
}
