//! Repairing the extractor's XML directory in place

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::ThreadPool;
use sxd_document::dom::{ChildOfElement, Document, Element, Text};
use tracing::{debug, info, warn};

use super::{normalize, DeclKind, Declaration};
use crate::diagnostics::{Diagnostic, Report};
use crate::error::{Error, Result};
use crate::xml;

const SKIPPED_FILES: &[&str] = &["index.xml", "Doxyfile.xml"];

#[derive(Debug, Default)]
struct FileOutcome {
    changed: bool,
    diagnostics: Vec<Diagnostic>,
}

/// Normalize every compound file under `dir`, rewriting the ones that change
///
/// Files that fail to parse become failed units; a file that cannot be
/// written back aborts the run.
pub fn normalize_tree(dir: &Path, pool: &ThreadPool) -> Result<Report> {
    if !dir.is_dir() {
        return Err(Error::MissingInput(dir.to_path_buf()));
    }
    let pattern = dir.join("*.xml");
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
        .filter_map(std::result::Result::ok)
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |n| !SKIPPED_FILES.contains(&n))
        })
        .collect();
    files.sort();

    let outcomes: Vec<(PathBuf, Result<FileOutcome>)> = pool.install(|| {
        files
            .par_iter()
            .map(|path| (path.clone(), normalize_file(path)))
            .collect()
    });

    let mut report = Report::new();
    let mut rewritten = 0usize;
    for (path, outcome) in outcomes {
        let unit = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        match outcome {
            Ok(outcome) => {
                if outcome.changed {
                    rewritten += 1;
                }
                report.extend(outcome.diagnostics);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(file = %unit, error = %e, "could not normalize");
                report.fail_unit(unit, e.to_string());
            }
        }
    }
    report.sort();
    info!(files = files.len(), rewritten, "normalized XML tree");
    Ok(report)
}

fn normalize_file(path: &Path) -> Result<FileOutcome> {
    let package = xml::read(path)?;
    let doc = package.as_document();
    let mut outcome = FileOutcome::default();
    let Some(root) = xml::root_element(&doc) else {
        return Ok(outcome);
    };
    for def in xml::elements_named(root, "compounddef") {
        outcome.changed |= clean_compound(def, &mut outcome.diagnostics);
    }
    if outcome.changed {
        debug!(file = %path.display(), "rewriting");
        write_document(path, &doc)?;
    }
    Ok(outcome)
}

fn write_document(path: &Path, doc: &Document<'_>) -> Result<()> {
    let mut buffer = Vec::new();
    sxd_document::writer::format_document(doc, &mut buffer).map_err(|e| Error::write(path, e))?;
    std::fs::write(path, buffer).map_err(|e| Error::write(path, e))
}

fn clean_compound(def: Element<'_>, diagnostics: &mut Vec<Diagnostic>) -> bool {
    let mut changed = merge_user_sections(def);
    let enclosing = template_param_texts(def);

    for section in xml::elements_named(def, "sectiondef") {
        changed |= dedupe_members(section);
        for member in xml::elements_named(section, "memberdef") {
            changed |= repair_member(member, &enclosing, diagnostics);
        }
    }
    for listing in descendants_named(def, "programlisting") {
        changed |= strip_zero_width_joiners(listing);
        changed |= drop_empty_highlights(listing);
    }
    changed |= unwrap_nested_tocs(def);
    changed
}

/// Fold user-defined sections that share a header into the first of them
fn merge_user_sections(def: Element<'_>) -> bool {
    let mut firsts: Vec<(String, Element<'_>)> = Vec::new();
    let mut changed = false;
    let sections: Vec<Element<'_>> = xml::elements_named(def, "sectiondef")
        .filter(|s| xml::attr(*s, "kind") == Some("user-defined"))
        .collect();
    for section in sections {
        let Some(header) = xml::child_text(section, "header")
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
        else {
            continue;
        };
        match firsts.iter().find(|(h, _)| *h == header) {
            Some((_, first)) => {
                let members: Vec<Element<'_>> = xml::elements_named(section, "memberdef").collect();
                for member in members {
                    member.remove_from_parent();
                    first.append_child(member);
                }
                section.remove_from_parent();
                changed = true;
            }
            None => firsts.push((header, section)),
        }
    }
    changed
}

/// Remove members listed more than once in a section
fn dedupe_members(section: Element<'_>) -> bool {
    let mut seen = HashSet::new();
    let mut changed = false;
    let members: Vec<Element<'_>> = xml::elements_named(section, "memberdef").collect();
    for member in members {
        let Some(id) = xml::attr(member, "id") else { continue };
        if !seen.insert(id.to_string()) {
            member.remove_from_parent();
            changed = true;
        }
    }
    changed
}

fn repair_member(
    member: Element<'_>,
    enclosing: &[String],
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let kind = DeclKind::from_extractor(xml::attr(member, "kind").unwrap_or(""));
    if kind == DeclKind::Other {
        return false;
    }
    let type_el = xml::child(member, "type");
    let args_el = xml::child(member, "argsstring");
    let name_el = xml::child(member, "name");

    let mut decl = Declaration::new(xml::attr(member, "id").unwrap_or_default(), kind);
    decl.type_text = type_el.map(xml::text).unwrap_or_default().trim().to_string();
    decl.args = args_el.map(xml::text).unwrap_or_default();
    decl.name = name_el.map(xml::text).unwrap_or_default();
    decl.template_params = template_param_texts(member);
    decl.enclosing_template_params = enclosing.to_vec();

    let before = decl.clone();
    diagnostics.extend(normalize(&mut decl));
    if decl == before {
        return false;
    }

    if let Some(el) = type_el.filter(|_| decl.type_text != before.type_text) {
        replace_text(el, &before.type_text, &decl.type_text);
    }
    if let Some(el) = args_el.filter(|_| decl.args != before.args) {
        el.set_text(&decl.args);
    }
    if let Some(el) = name_el.filter(|_| decl.name != before.name) {
        el.set_text(&decl.name);
    }
    if decl.template_params.is_empty() && !before.template_params.is_empty() {
        if let Some(list) = xml::child(member, "templateparamlist") {
            list.remove_from_parent();
        }
    }
    for qualifier in decl.qualifiers.difference(&before.qualifiers) {
        if let Some((name, value)) = qualifier.attribute() {
            member.set_attribute_value(name, value);
        }
    }
    true
}

/// Replace an element's text, keeping `<ref>` children when the new text is
/// a trimmed slice of the old one
fn replace_text(el: Element<'_>, old: &str, new: &str) {
    let has_elements = xml::elements(el).next().is_some();
    let full = xml::text(el);
    let lead = full.len() - full.trim_start().len();
    match old.find(new).filter(|_| has_elements && !new.is_empty()) {
        Some(offset) => keep_range(el, lead + offset, lead + offset + new.len()),
        None => {
            el.set_text(new);
        }
    }
}

fn keep_range(el: Element<'_>, start: usize, end: usize) {
    let mut pos = 0usize;
    for child in el.children() {
        match child {
            ChildOfElement::Text(t) => {
                let text = t.text();
                let (from, to) = (pos, pos + text.len());
                let keep_from = start.clamp(from, to) - from;
                let keep_to = end.clamp(from, to) - from;
                if keep_from != 0 || keep_to != text.len() {
                    let kept = text.get(keep_from..keep_to).unwrap_or("").to_string();
                    t.set_text(&kept);
                }
                pos = to;
            }
            ChildOfElement::Element(e) => {
                let len = xml::text(e).len();
                if pos + len <= start || pos >= end {
                    e.remove_from_parent();
                }
                pos += len;
            }
            _ => {}
        }
    }
}

fn template_param_texts(owner: Element<'_>) -> Vec<String> {
    let Some(list) = xml::child(owner, "templateparamlist") else {
        return Vec::new();
    };
    xml::elements_named(list, "param")
        .map(|param| {
            ["type", "declname", "defval"]
                .iter()
                .filter_map(|part| xml::child_text(param, part))
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn descendants_named<'d>(root: Element<'d>, name: &str) -> Vec<Element<'d>> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(e) = stack.pop() {
        for child in xml::elements(e) {
            if child.name().local_part() == name {
                out.push(child);
            }
            stack.push(child);
        }
    }
    out
}

/// Zero-width joiners in listings are extractor artifacts
///
/// The parser splits `&zwj;` across several text nodes, so each run of
/// adjacent text is joined before it is searched.
fn strip_zero_width_joiners(el: Element<'_>) -> bool {
    let mut changed = false;
    let mut run: Vec<Text<'_>> = Vec::new();
    for child in el.children().into_iter().map(Some).chain([None]) {
        if let Some(ChildOfElement::Text(t)) = child {
            run.push(t);
            continue;
        }
        changed |= strip_joiners_in_run(&run);
        run.clear();
        if let Some(ChildOfElement::Element(e)) = child {
            changed |= strip_zero_width_joiners(e);
        }
    }
    changed
}

/// Rewrite one run of sibling text nodes as a single cleaned node
fn strip_joiners_in_run(run: &[Text<'_>]) -> bool {
    let Some((first, rest)) = run.split_first() else {
        return false;
    };
    let joined: String = run.iter().map(Text::text).collect();
    if !joined.contains("&zwj;") && !joined.contains('\u{200d}') {
        return false;
    }
    first.set_text(&joined.replace("&zwj;", "").replace('\u{200d}', ""));
    for t in rest {
        t.remove_from_parent();
    }
    true
}

fn drop_empty_highlights(el: Element<'_>) -> bool {
    let mut changed = false;
    let children: Vec<Element<'_>> = xml::elements(el).collect();
    for child in children {
        if child.name().local_part() == "highlight" && child.children().is_empty() {
            child.remove_from_parent();
            changed = true;
        } else {
            changed |= drop_empty_highlights(child);
        }
    }
    changed
}

/// `<tableofcontents><tableofcontents>..</tableofcontents></tableofcontents>`
/// becomes a single level
fn unwrap_nested_tocs(def: Element<'_>) -> bool {
    let mut changed = false;
    loop {
        let nested = descendants_named(def, "tableofcontents").into_iter().find_map(|outer| {
            let inner: Vec<Element<'_>> = xml::elements(outer).collect();
            let only_whitespace = outer.children().iter().all(|c| match c {
                ChildOfElement::Text(t) => t.text().trim().is_empty(),
                ChildOfElement::Element(_) => true,
                _ => false,
            });
            match inner.as_slice() {
                [single] if only_whitespace && single.name().local_part() == "tableofcontents" => {
                    Some((outer, *single))
                }
                _ => None,
            }
        });
        let Some((outer, inner)) = nested else { break };
        inner.remove_from_parent();
        for child in inner.children() {
            outer.append_child(child);
        }
        changed = true;
    }
    changed
}
