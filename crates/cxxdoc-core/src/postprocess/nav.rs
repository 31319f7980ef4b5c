//! Navigation bar cleanup

use std::collections::BTreeSet;

use super::{is_uri, Page, PageContext, PageError, PageFix};
use crate::markup::NodeId;

/// Drops duplicate navigation entries and entries pointing at pages that
/// were never generated
pub struct Navigation;

impl PageFix for Navigation {
    fn name(&self) -> &'static str {
        "navigation"
    }

    fn apply(&self, page: &mut Page, ctx: &PageContext<'_>) -> Result<bool, PageError> {
        let navs = page.doc.elements_named(page.doc.root(), "nav");
        let page_dir = ctx.page_dir(page);
        let mut changed = false;

        for nav in navs {
            let mut seen = BTreeSet::new();
            for li in page.doc.elements_named(nav, "li") {
                // an earlier removal may have taken this entry with it
                if !page.doc.ancestors(li).any(|a| a == nav) {
                    continue;
                }
                let Some(href) = entry_href(page, li) else {
                    continue;
                };
                if !seen.insert(href.clone()) {
                    page.doc.detach(li);
                    changed = true;
                    continue;
                }
                let file = href.split('#').next().unwrap_or_default();
                if file.is_empty() || href.starts_with('#') || is_uri(&href) {
                    continue;
                }
                let present = std::fs::metadata(page_dir.join(file)).is_ok_and(|m| m.is_file() && m.len() > 0);
                if !present {
                    page.doc.detach(li);
                    page.note(format!("removed navigation entry for missing page {file}"));
                    changed = true;
                }
            }
        }
        Ok(changed)
    }
}

/// Target of the link directly inside `li`
fn entry_href(page: &Page, li: NodeId) -> Option<String> {
    page.doc
        .children(li)
        .iter()
        .find(|&&c| page.doc.is_element(c, "a"))
        .and_then(|&a| page.doc.attr(a, "href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::postprocess::testing::run_fix;
    use crate::symbols::SymbolTable;

    #[test]
    fn test_prunes_navigation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("classes.html"), "<html/>").unwrap();
        std::fs::write(dir.path().join("empty.html"), "").unwrap();

        let html = concat!(
            r#"<nav><ul><li><a href="classes.html">Classes</a></li>"#,
            r#"<li><a href="files.html">Files</a></li>"#,
            r#"<li><a href="empty.html">Empty</a></li>"#,
            r#"<li><a href="classes.html">Classes</a></li>"#,
            r#"<li><a href="https://github.com/x">Repo</a></li></ul></nav>"#,
            r#"<ul><li><a href="files.html">outside</a></li></ul>"#
        );
        let table = SymbolTable::new();
        let config = Config::default();
        let (changed, page) = run_fix(&Navigation, html, &table, &config, dir.path(), "index.html");
        assert!(changed);
        assert_eq!(
            page.to_html(),
            concat!(
                r#"<nav><ul><li><a href="classes.html">Classes</a></li>"#,
                r#"<li><a href="https://github.com/x">Repo</a></li></ul></nav>"#,
                r#"<ul><li><a href="files.html">outside</a></li></ul>"#
            )
        );
        assert_eq!(page.diagnostics().len(), 2);

        let (changed, _) = run_fix(&Navigation, &page.to_html(), &table, &config, dir.path(), "index.html");
        assert!(!changed);
    }
}
