//! HTML element tree
//!
//! An arena of nodes addressed by [`NodeId`]. Nodes are never freed;
//! detaching only unlinks them from their parent, so ids stay valid for
//! the lifetime of the document. Text nodes hold markup exactly as it
//! appeared in the input and are serialized back unchanged.

pub mod entities;
mod parse;

use entities::{decode, escape_attr, escape_text};

/// Index of a node in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// An element's tag and attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Tag name as written
    pub name: String,
    attrs: Vec<(String, Option<String>)>,
    /// Written as `<name/>`
    pub self_closing: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            self_closing: false,
        }
    }

    /// Case-insensitive tag name comparison
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Set an attribute, keeping its position if it already exists
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = Some(value.into());
        match self.attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        self.attrs.remove(pos).1
    }

    pub(crate) fn push_attr(&mut self, name: &str, value: Option<String>) {
        if !self.has_attr(name) {
            self.attrs.push((name.to_string(), value));
        }
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) {
            return;
        }
        let joined = match self.attr("class").map(str::trim) {
            Some(existing) if !existing.is_empty() => format!("{existing} {class}"),
            _ => class.to_string(),
        };
        self.set_attr("class", joined);
    }

    pub fn remove_class(&mut self, class: &str) {
        if !self.has_class(class) {
            return;
        }
        let kept: Vec<&str> = self.classes().filter(|c| *c != class).collect();
        if kept.is_empty() {
            self.remove_attr("class");
        } else {
            let kept = kept.join(" ");
            self.set_attr("class", kept);
        }
    }
}

/// What a node is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Element(Element),
    /// Markup-escaped text
    Text(String),
    /// `<!-- ... -->` including delimiters
    Comment(String),
    /// `<!DOCTYPE ...>` or `<?...?>` including delimiters
    Directive(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed HTML page
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parse a whole page. Never fails; malformed markup is repaired.
    pub fn parse(html: &str) -> Self {
        let mut doc = Self::new();
        let root = doc.root();
        parse::parse_into(&mut doc, root, html);
        doc
    }

    /// Parse a fragment into detached nodes owned by this document
    pub fn parse_fragment(&mut self, html: &str) -> Vec<NodeId> {
        let holder = self.alloc(NodeData::Document);
        parse::parse_into(self, holder, html);
        let nodes = self.nodes[holder.index()].children.clone();
        for &id in &nodes {
            self.detach(id);
        }
        nodes
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub(crate) fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()].data
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.index()].data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.index()].data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Whether `id` is an element named `name`
    pub fn is_element(&self, id: NodeId, name: &str) -> bool {
        self.element(id).is_some_and(|e| e.is(name))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attr(name))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(e) = self.element_mut(id) {
            e.set_attr(name, value);
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.element_mut(id).and_then(|e| e.remove_attr(name))
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|e| e.has_class(class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if let Some(e) = self.element_mut(id) {
            e.add_class(class);
        }
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        if let Some(e) = self.element_mut(id) {
            e.remove_class(class);
        }
    }

    /// Raw markup of a text node
    pub fn raw_text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.index()].data {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.alloc(NodeData::Element(Element::new(name)))
    }

    /// A text node holding `text`, escaped
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(escape_text(text)))
    }

    /// A text node holding `html` verbatim
    pub fn create_raw_text(&mut self, html: &str) -> NodeId {
        self.alloc(NodeData::Text(html.to_string()))
    }

    /// Append raw text, merging with a trailing text child
    pub(crate) fn append_raw_text(&mut self, parent: NodeId, html: &str) {
        if let Some(&last) = self.nodes[parent.index()].children.last() {
            if let NodeData::Text(t) = &mut self.nodes[last.index()].data {
                t.push_str(html);
                return;
            }
        }
        let id = self.create_raw_text(html);
        self.append_child(parent, id);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    /// Insert `node` as the sibling just before `reference`
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        let Some(parent) = self.parent(reference) else {
            return;
        };
        self.detach(node);
        let siblings = &mut self.nodes[parent.index()].children;
        let pos = siblings.iter().position(|&c| c == reference).unwrap_or(siblings.len());
        siblings.insert(pos, node);
        self.nodes[node.index()].parent = Some(parent);
    }

    /// Insert `node` as the sibling just after `reference`
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        let Some(parent) = self.parent(reference) else {
            return;
        };
        self.detach(node);
        let siblings = &mut self.nodes[parent.index()].children;
        let pos = siblings
            .iter()
            .position(|&c| c == reference)
            .map_or(siblings.len(), |p| p + 1);
        siblings.insert(pos, node);
        self.nodes[node.index()].parent = Some(parent);
    }

    /// Unlink `id` from its parent
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|&c| c != id);
        }
    }

    /// Put `new` where `old` is
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        self.insert_before(old, new);
        self.detach(old);
    }

    /// Replace `id` by its own children
    pub fn unwrap(&mut self, id: NodeId) {
        for child in self.children(id).to_vec() {
            self.insert_before(id, child);
        }
        self.detach(id);
    }

    pub fn remove_children(&mut self, id: NodeId) {
        for child in std::mem::take(&mut self.nodes[id.index()].children) {
            self.nodes[child.index()].parent = None;
        }
    }

    /// Next sibling of `id`, if any
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == id)?;
        siblings.get(pos + 1).copied()
    }

    /// All nodes below `id` in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Elements named `name` below `id` in document order
    pub fn elements_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_element(n, name))
            .collect()
    }

    /// Ancestors of `id`, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    /// Whether `id` sits inside an element named `name`
    pub fn has_ancestor(&self, id: NodeId, name: &str) -> bool {
        self.ancestors(id).any(|a| self.is_element(a, name))
    }

    /// Decoded text of `id` and everything below it
    pub fn text_content(&self, id: NodeId) -> String {
        let mut raw = String::new();
        self.collect_raw_text(id, &mut raw);
        decode(&raw)
    }

    fn collect_raw_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.index()].data {
            NodeData::Text(t) => out.push_str(t),
            NodeData::Element(_) | NodeData::Document => {
                for &child in self.children(id) {
                    self.collect_raw_text(child, out);
                }
            }
            NodeData::Comment(_) | NodeData::Directive(_) => {}
        }
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_node(child, &mut out);
        }
        out
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    /// Serialize the whole document
    pub fn to_html(&self) -> String {
        self.inner_html(self.root())
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.index()].data {
            NodeData::Document => {
                for &child in self.children(id) {
                    self.write_node(child, out);
                }
            }
            NodeData::Text(t) | NodeData::Comment(t) | NodeData::Directive(t) => out.push_str(t),
            NodeData::Element(e) => {
                out.push('<');
                out.push_str(&e.name);
                for (k, v) in &e.attrs {
                    match v {
                        Some(v) => {
                            out.push(' ');
                            out.push_str(k);
                            out.push_str("=\"");
                            out.push_str(&escape_attr(v));
                            out.push('"');
                        }
                        None => {
                            out.push(' ');
                            out.push_str(k);
                        }
                    }
                }
                let children = self.children(id);
                if e.self_closing && children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                let void = parse::VOID_ELEMENTS
                    .iter()
                    .any(|v| e.name.eq_ignore_ascii_case(v));
                if void && children.is_empty() {
                    return;
                }
                for &child in children {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&e.name);
                out.push('>');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_markup() {
        let html = "<!DOCTYPE html>\n<html><head><meta charset=\"UTF-8\"/><!-- hi --></head>\
                    <body class=\"m-doc\"><p>a &amp; b<br></p><img src=\"x.svg\"></body></html>";
        assert_eq!(Document::parse(html).to_html(), html);
    }

    #[test]
    fn test_tree_edits() {
        let mut doc = Document::parse("<div><span>a</span><span>b</span></div>");
        let div = doc.elements_named(doc.root(), "div")[0];
        let spans = doc.elements_named(div, "span");
        assert_eq!(spans.len(), 2);

        let em = doc.create_element("em");
        let text = doc.create_text("x < y");
        doc.append_child(em, text);
        doc.replace(spans[0], em);
        assert_eq!(doc.to_html(), "<div><em>x &lt; y</em><span>b</span></div>");

        doc.unwrap(em);
        assert_eq!(doc.to_html(), "<div>x &lt; y<span>b</span></div>");
        assert_eq!(doc.text_content(div), "x < yb");

        let nodes = doc.parse_fragment("<b>c</b>d");
        assert_eq!(nodes.len(), 2);
        for n in nodes {
            doc.insert_before(spans[1], n);
        }
        assert_eq!(doc.inner_html(div), "x &lt; y<b>c</b>d<span>b</span>");
        assert!(doc.has_ancestor(spans[1], "div"));
        assert_eq!(doc.next_sibling(spans[1]), None);
    }

    #[test]
    fn test_classes() {
        let mut doc = Document::parse("<a class=\"m-doc\">x</a>");
        let a = doc.elements_named(doc.root(), "a")[0];
        doc.add_class(a, "m-doc-external");
        doc.add_class(a, "m-doc");
        assert_eq!(doc.attr(a, "class"), Some("m-doc m-doc-external"));
        doc.remove_class(a, "m-doc");
        doc.remove_class(a, "m-doc-external");
        assert_eq!(doc.attr(a, "class"), None);
        assert_eq!(doc.to_html(), "<a>x</a>");
    }
}
