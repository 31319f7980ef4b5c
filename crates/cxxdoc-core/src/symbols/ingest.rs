//! Building the table from the extractor's XML tree and from tagfiles
//!
//! Compound files are parsed in parallel into plain candidate lists, then
//! merged on one thread in file name order, so the resulting ids do not depend on
//! scheduling. Tagfiles are imported after all local symbols, and base class
//! references are linked last.

use std::path::Path;

use rayon::prelude::*;
use rayon::ThreadPool;
use sxd_document::dom::Element;
use tracing::{debug, info, trace, warn};

use super::{
    member_location, page_for_compound, Location, QualifiedName, ScopeStack, Symbol, SymbolId,
    SymbolKind, SymbolTable, Visibility,
};
use crate::config::TagfileSpec;
use crate::diagnostics::{Diagnostic, Report};
use crate::error::{Error, Result};
use crate::xml;

/// A freshly built table plus what went wrong while building it
#[derive(Debug)]
pub struct Ingested {
    pub table: SymbolTable,
    pub report: Report,
}

#[derive(Debug)]
struct BaseRef {
    refid: Option<String>,
    name: String,
}

#[derive(Debug)]
struct Candidate {
    symbol: Symbol,
    bases: Vec<BaseRef>,
}

impl Candidate {
    fn plain(symbol: Symbol) -> Self {
        Self {
            symbol,
            bases: Vec::new(),
        }
    }
}

/// Build the symbol table from an extractor XML directory and tagfiles
pub fn ingest_xml_dir(dir: &Path, tagfiles: &[TagfileSpec], pool: &ThreadPool) -> Result<Ingested> {
    if !dir.is_dir() {
        return Err(Error::MissingInput(dir.to_path_buf()));
    }
    let index_path = dir.join("index.xml");
    if !index_path.is_file() {
        return Err(Error::MissingInput(index_path));
    }
    let compounds = read_index(&index_path)?;
    debug!(compounds = compounds.len(), "read extractor index");

    let parsed: Vec<(String, Result<Vec<Candidate>>)> = pool.install(|| {
        compounds
            .par_iter()
            .map(|refid| {
                let path = dir.join(format!("{refid}.xml"));
                (refid.clone(), parse_compound(&path))
            })
            .collect()
    });

    let mut table = SymbolTable::new();
    let mut report = Report::new();
    let mut pending_bases: Vec<(SymbolId, Vec<BaseRef>)> = Vec::new();
    let mut overloads = 0usize;

    for (refid, result) in parsed {
        let candidates = match result {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(compound = %refid, error = %e, "skipping unreadable compound");
                report.fail_unit(format!("{refid}.xml"), e.to_string());
                continue;
            }
        };
        for candidate in candidates {
            match table.insert(candidate.symbol) {
                Ok(id) => {
                    if !candidate.bases.is_empty() {
                        pending_bases.push((id, candidate.bases));
                    }
                }
                Err(dup) if dup.kind == SymbolKind::Function => {
                    // overloads share a name; the first one documented is the link target
                    trace!(name = %dup.name, "overload");
                    overloads += 1;
                }
                Err(dup) => {
                    report.push(Diagnostic::warning(refid.as_str(), dup.to_string()));
                }
            }
        }
    }

    for tagfile in tagfiles {
        let imported = import_tagfile(&mut table, &tagfile.path, &tagfile.url)?;
        info!(tagfile = %tagfile.path.display(), imported, "imported tagfile");
    }

    link_bases(&mut table, pending_bases);

    info!(symbols = table.len(), overloads, "symbol table built");
    Ok(Ingested { table, report })
}

fn read_index(path: &Path) -> Result<Vec<String>> {
    let package = xml::read(path)?;
    let doc = package.as_document();
    let root = xml::root_element(&doc).ok_or_else(|| Error::Xml {
        path: path.to_path_buf(),
        message: String::from("empty document"),
    })?;
    let mut refids: Vec<String> = Vec::new();
    for compound in xml::elements_named(root, "compound") {
        if matches!(xml::attr(compound, "kind"), Some("dir" | "page" | "example")) {
            continue;
        }
        if let Some(refid) = xml::attr(compound, "refid") {
            refids.push(refid.to_string());
        }
    }
    refids.sort();
    refids.dedup();
    Ok(refids)
}

fn parse_compound(path: &Path) -> Result<Vec<Candidate>> {
    let package = xml::read(path)?;
    let doc = package.as_document();
    let root = xml::root_element(&doc).ok_or_else(|| Error::Xml {
        path: path.to_path_buf(),
        message: String::from("empty document"),
    })?;
    let mut out = Vec::new();
    for def in xml::elements_named(root, "compounddef") {
        compound_candidates(def, &mut out);
    }
    Ok(out)
}

/// Names the table never holds: anonymous entities and operators
fn is_unlinkable(name: &str) -> bool {
    if name.is_empty() || name.contains('@') {
        return true;
    }
    name.strip_prefix("operator").is_some_and(|rest| {
        !rest
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
    })
}

fn compound_candidates(def: Element<'_>, out: &mut Vec<Candidate>) {
    let Some(id) = xml::attr(def, "id") else { return };
    let kind_attr = xml::attr(def, "kind").unwrap_or("");
    let name = xml::child_text(def, "compoundname").unwrap_or_default();
    let kind = SymbolKind::from_extractor(kind_attr)
        .filter(|k| k.is_scope() || *k == SymbolKind::Concept);

    let scope = match kind {
        Some(SymbolKind::Concept) | None => QualifiedName::global(),
        Some(_) => QualifiedName::parse(&name),
    };

    if let Some(kind) = kind {
        if !is_unlinkable(&name) {
            let symbol = Symbol::new(
                QualifiedName::parse(&name),
                kind,
                Location::local(page_for_compound(id), ""),
            )
            .with_refid(id)
            .with_template_params(template_params(def))
            .with_visibility(xml::attr(def, "prot").and_then(Visibility::from_extractor));
            let bases = xml::elements_named(def, "basecompoundref")
                .map(|b| BaseRef {
                    refid: xml::attr(b, "refid").map(String::from),
                    name: xml::text(b).trim().to_string(),
                })
                .collect();
            out.push(Candidate { symbol, bases });
        }
    }

    if scope.segments().iter().any(|s| s.contains('@')) {
        return;
    }
    for section in xml::elements_named(def, "sectiondef") {
        for member in xml::elements_named(section, "memberdef") {
            member_candidates(member, &scope, out);
        }
    }
}

fn member_candidates(member: Element<'_>, scope: &QualifiedName, out: &mut Vec<Candidate>) {
    let Some(kind) = xml::attr(member, "kind").and_then(SymbolKind::from_extractor) else {
        return;
    };
    let Some(location) = xml::attr(member, "id").and_then(member_location) else {
        return;
    };
    let name = xml::child_text(member, "name").unwrap_or_default();
    let name = name.trim();
    let visibility = xml::attr(member, "prot").and_then(Visibility::from_extractor);

    let qualified = if kind == SymbolKind::Macro {
        QualifiedName::parse(name)
    } else {
        match xml::child_text(member, "qualifiedname").filter(|q| !q.trim().is_empty()) {
            Some(q) => QualifiedName::parse(&q),
            None => scope.child(name),
        }
    };

    if kind == SymbolKind::Enum {
        let scoped = xml::attr(member, "strong") == Some("yes");
        let anonymous = is_unlinkable(name);
        for value in xml::elements_named(member, "enumvalue") {
            let Some(value_location) = xml::attr(value, "id").and_then(member_location) else {
                continue;
            };
            let value_name = xml::child_text(value, "name").unwrap_or_default();
            let value_name = value_name.trim();
            if is_unlinkable(value_name) {
                continue;
            }
            if !anonymous {
                out.push(Candidate::plain(
                    Symbol::new(qualified.child(value_name), SymbolKind::EnumValue, value_location.clone())
                        .with_visibility(visibility),
                ));
            }
            // unscoped enumerators are also visible in the enclosing scope
            if !scoped || anonymous {
                out.push(Candidate::plain(
                    Symbol::new(qualified.parent().child(value_name), SymbolKind::EnumValue, value_location)
                        .with_visibility(visibility),
                ));
            }
        }
        if anonymous {
            return;
        }
    }

    if is_unlinkable(name) {
        return;
    }
    let refid = xml::attr(member, "id").unwrap_or_default();
    out.push(Candidate::plain(
        Symbol::new(qualified, kind, location)
            .with_refid(refid)
            .with_template_params(template_params(member))
            .with_visibility(visibility),
    ));
}

/// Names declared by a `templateparamlist` child
fn template_params(owner: Element<'_>) -> Vec<String> {
    let Some(list) = xml::child(owner, "templateparamlist") else {
        return Vec::new();
    };
    xml::elements_named(list, "param")
        .filter_map(|param| {
            if let Some(name) = xml::child_text(param, "declname").filter(|n| !n.trim().is_empty()) {
                return Some(name.trim().to_string());
            }
            xml::child_text(param, "type").and_then(|ty| last_identifier(&ty))
        })
        .collect()
}

fn last_identifier(text: &str) -> Option<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty() && !matches!(*w, "typename" | "class"))
        .filter(|w| !w.starts_with(|c: char| c.is_ascii_digit()))
        .last()
        .map(String::from)
}

fn link_bases(table: &mut SymbolTable, pending: Vec<(SymbolId, Vec<BaseRef>)>) {
    for (id, bases) in pending {
        let Some(symbol) = table.get(id) else { continue };
        let scope = ScopeStack::within(&symbol.name.parent());
        let resolved: Vec<SymbolId> = bases
            .iter()
            .filter_map(|base| {
                if let Some(found) = base.refid.as_deref().and_then(|r| table.by_refid(r)) {
                    return Some(found);
                }
                let name = strip_template_args(&base.name);
                table
                    .candidates(&name, &scope)
                    .into_iter()
                    .find(|&c| table.get(c).is_some_and(|s| s.kind.is_class_like()))
            })
            .collect();
        table.set_bases(id, resolved);
    }
}

fn strip_template_args(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth = 0i32;
    for c in name.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Import an external reference index from disk
pub fn import_tagfile(table: &mut SymbolTable, path: &Path, base_url: &str) -> Result<usize> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    import_tagfile_str(table, path, &text, base_url)
}

/// Import an external reference index; returns how many symbols were added
///
/// Every entry is external, so nothing already documented locally changes.
pub fn import_tagfile_str(
    table: &mut SymbolTable,
    origin: &Path,
    text: &str,
    base_url: &str,
) -> Result<usize> {
    let package = xml::parse(origin, text)?;
    let doc = package.as_document();
    let Some(root) = xml::root_element(&doc) else {
        return Ok(0);
    };
    let before = table.len();

    for compound in xml::elements_named(root, "compound") {
        let name = xml::child_text(compound, "name").unwrap_or_default();
        let filename = xml::child_text(compound, "filename").unwrap_or_default();
        let kind = xml::attr(compound, "kind")
            .and_then(SymbolKind::from_extractor)
            .filter(|k| k.is_scope() || *k == SymbolKind::Concept);
        let scope = match kind {
            Some(_) => QualifiedName::parse(&name),
            None => QualifiedName::global(),
        };

        if let Some(kind) = kind {
            if !filename.trim().is_empty() && !is_unlinkable(&name) {
                let url = external_url(base_url, filename.trim(), "");
                // externals never conflict
                let _ = table.insert(Symbol::new(scope.clone(), kind, Location::External { url }));
            }
        }

        for member in xml::elements_named(compound, "member") {
            let Some(kind) = xml::attr(member, "kind").and_then(SymbolKind::from_extractor) else {
                continue;
            };
            let member_name = xml::child_text(member, "name").unwrap_or_default();
            let member_name = member_name.trim();
            if is_unlinkable(member_name) {
                continue;
            }
            let file = xml::child_text(member, "anchorfile")
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| filename.clone());
            let anchor = xml::child_text(member, "anchor").unwrap_or_default();
            let url = external_url(base_url, file.trim(), anchor.trim());
            let qualified = if kind == SymbolKind::Macro {
                QualifiedName::parse(member_name)
            } else {
                scope.join(&QualifiedName::parse(member_name))
            };
            let _ = table.insert(Symbol::new(qualified, kind, Location::External { url }));
        }
    }

    Ok(table.len() - before)
}

fn external_url(base: &str, file: &str, anchor: &str) -> String {
    let mut url = base.to_string();
    if !url.is_empty() && !url.ends_with('/') {
        url.push('/');
    }
    url.push_str(file.trim_start_matches('/'));
    if !anchor.is_empty() {
        url.push('#');
        url.push_str(anchor);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const TAGFILE: &str = r#"<?xml version="1.0"?>
<tagfile>
  <compound kind="namespace">
    <name>std</name>
    <filename>cpp</filename>
    <member kind="function">
      <name>swap</name>
      <anchorfile>cpp/algorithm/swap</anchorfile>
      <anchor></anchor>
    </member>
  </compound>
  <compound kind="class">
    <name>std::vector</name>
    <filename>cpp/container/vector</filename>
    <member kind="function">
      <name>push_back</name>
      <anchorfile>cpp/container/vector/push_back</anchorfile>
      <anchor>ab12</anchor>
    </member>
  </compound>
  <compound kind="file">
    <name>assert.h</name>
    <filename>assert_8h</filename>
    <member kind="define">
      <name>assert</name>
      <anchorfile>assert_8h</anchorfile>
      <anchor>a0</anchor>
    </member>
  </compound>
</tagfile>"#;

    #[test]
    fn test_import_tagfile() {
        let mut table = SymbolTable::new();
        let count = import_tagfile_str(
            &mut table,
            &PathBuf::from("std.tag"),
            TAGFILE,
            "https://en.cppreference.com/w",
        )
        .unwrap();
        assert_eq!(count, 5);

        let scope = ScopeStack::new();
        let vector = table.lookup("std::vector", &scope).unwrap();
        assert_eq!(
            vector.location,
            Location::External {
                url: String::from("https://en.cppreference.com/w/cpp/container/vector")
            }
        );
        let push_back = table.lookup("std::vector::push_back", &scope).unwrap();
        assert_eq!(
            push_back.location.href("x.html"),
            "https://en.cppreference.com/w/cpp/container/vector/push_back#ab12"
        );
        let assert_macro = table.lookup("assert", &scope).unwrap();
        assert_eq!(assert_macro.kind, SymbolKind::Macro);
    }

    #[test]
    fn test_is_unlinkable() {
        assert!(is_unlinkable("@0"));
        assert!(is_unlinkable("ns::@1"));
        assert!(is_unlinkable("operator=="));
        assert!(is_unlinkable("operator bool"));
        assert!(!is_unlinkable("operatorname"));
        assert!(!is_unlinkable("foo"));
    }

    #[test]
    fn test_last_identifier() {
        assert_eq!(last_identifier("typename T"), Some(String::from("T")));
        assert_eq!(last_identifier("class... Ts"), Some(String::from("Ts")));
        assert_eq!(last_identifier("typename"), None);
        assert_eq!(strip_template_args("ns::base< T, a<b> >"), "ns::base");
    }
}
