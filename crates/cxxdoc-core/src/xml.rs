//! Small helpers over sxd-document for reading extractor XML

use std::path::Path;

use sxd_document::dom::{ChildOfElement, ChildOfRoot, Document, Element};
use sxd_document::{parser, Package};

use crate::error::{Error, Result};

pub(crate) fn parse(path: &Path, text: &str) -> Result<Package> {
    parser::parse(text).map_err(|e| Error::Xml {
        path: path.to_path_buf(),
        message: format!("{e:?}"),
    })
}

pub(crate) fn read(path: &Path) -> Result<Package> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    parse(path, &text)
}

pub(crate) fn root_element<'d>(doc: &Document<'d>) -> Option<Element<'d>> {
    doc.root().children().into_iter().find_map(|child| match child {
        ChildOfRoot::Element(e) => Some(e),
        _ => None,
    })
}

pub(crate) fn elements<'d>(parent: Element<'d>) -> impl Iterator<Item = Element<'d>> {
    parent.children().into_iter().filter_map(|child| match child {
        ChildOfElement::Element(e) => Some(e),
        _ => None,
    })
}

pub(crate) fn elements_named<'d>(
    parent: Element<'d>,
    name: &'static str,
) -> impl Iterator<Item = Element<'d>> {
    elements(parent).filter(move |e| e.name().local_part() == name)
}

pub(crate) fn child<'d>(parent: Element<'d>, name: &str) -> Option<Element<'d>> {
    elements(parent).find(|e| e.name().local_part() == name)
}

/// Concatenated text of all descendants
pub(crate) fn text(element: Element<'_>) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn collect_text(element: Element<'_>, out: &mut String) {
    for child in element.children() {
        match child {
            ChildOfElement::Text(t) => out.push_str(t.text()),
            ChildOfElement::Element(e) => collect_text(e, out),
            _ => {}
        }
    }
}

pub(crate) fn child_text(parent: Element<'_>, name: &str) -> Option<String> {
    child(parent, name).map(text)
}

pub(crate) fn attr<'d>(element: Element<'d>, name: &str) -> Option<&'d str> {
    element.attribute_value(name)
}
