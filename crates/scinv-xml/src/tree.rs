//! Element tree types and the writer that turns them back into text.

use std::cmp::Ordering;

use quick_xml::escape::{escape, partial_escape, unescape};

use crate::XmlError;

const DEFAULT_INDENT: &str = "  ";

/// A parsed XML document: prolog, single root element and trailing nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    bom: bool,
    prolog: Vec<Node>,
    root: Element,
    epilog: Vec<Node>,
    hints: FormatHints,
}

impl Document {
    pub(crate) fn new(bom: bool, prolog: Vec<Node>, root: Element, epilog: Vec<Node>) -> Self {
        let hints = FormatHints::detect(&prolog, &root);
        Self {
            bom,
            prolog,
            root,
            epilog,
            hints,
        }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Formatting conventions detected when the document was parsed.
    pub fn hints(&self) -> &FormatHints {
        &self.hints
    }

    /// Render the document, reusing the recorded formatting wherever the tree
    /// was not edited.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        if self.bom {
            out.push('\u{feff}');
        }
        for node in &self.prolog {
            node.write_to(&mut out);
        }
        self.root.write_to(&mut out);
        for node in &self.epilog {
            node.write_to(&mut out);
        }
        out
    }
}

/// Indentation unit and line terminator used by the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatHints {
    indent: String,
    newline: String,
}

impl Default for FormatHints {
    fn default() -> Self {
        Self {
            indent: DEFAULT_INDENT.to_string(),
            newline: "\n".to_string(),
        }
    }
}

impl FormatHints {
    pub fn indent(&self) -> &str {
        &self.indent
    }

    pub fn newline(&self) -> &str {
        &self.newline
    }

    /// Whitespace placed before a child element at `depth` (root children are
    /// at depth 1).
    pub fn line_prefix(&self, depth: usize) -> String {
        let mut prefix = self.newline.clone();
        for _ in 0..depth {
            prefix.push_str(&self.indent);
        }
        prefix
    }

    fn detect(prolog: &[Node], root: &Element) -> Self {
        let mut hints = FormatHints::default();
        let crlf = prolog.iter().chain(root.children.iter()).any(|node| match node {
            Node::Text(text) => text.raw.contains("\r\n"),
            _ => false,
        });
        if crlf {
            hints.newline = "\r\n".to_string();
        }
        if let Some(indent) = detect_indent(root, 1) {
            hints.indent = indent;
        }
        hints
    }
}

/// Find the first newline-led whitespace run in front of a child element and
/// divide it by the nesting depth.
fn detect_indent(element: &Element, depth: usize) -> Option<String> {
    for (idx, node) in element.children.iter().enumerate() {
        let Node::Element(child) = node else {
            continue;
        };
        if let Some(Node::Text(text)) = idx.checked_sub(1).and_then(|prev| element.children.get(prev)) {
            if let Some(pos) = text.raw.rfind('\n') {
                let run = &text.raw[pos + 1..];
                if !run.is_empty() && run.len() % depth == 0 && text.is_whitespace() {
                    return Some(run[..run.len() / depth].to_string());
                }
            }
        }
        if depth < 3 {
            if let Some(found) = detect_indent(child, depth + 1) {
                return Some(found);
            }
        }
    }
    None
}

/// Any node that can appear in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(Text),
    /// Raw CDATA content without the `<![CDATA[`/`]]>` markers.
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    /// Declaration content between `<?` and `?>`.
    Declaration(String),
    DocType(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    fn is_whitespace(&self) -> bool {
        matches!(self, Node::Text(text) if text.is_whitespace())
    }

    fn write_to(&self, out: &mut String) {
        match self {
            Node::Element(element) => element.write_to(out),
            Node::Text(text) => out.push_str(&text.raw),
            Node::CData(data) => {
                out.push_str("<![CDATA[");
                out.push_str(data);
                out.push_str("]]>");
            }
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Node::ProcessingInstruction(content) | Node::Declaration(content) => {
                out.push_str("<?");
                out.push_str(content);
                out.push_str("?>");
            }
            Node::DocType(content) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(content);
                out.push('>');
            }
        }
    }
}

/// Character data kept both as written in the source and unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    raw: String,
    value: String,
}

impl Text {
    pub fn new(value: &str) -> Self {
        Self {
            raw: partial_escape(value).into_owned(),
            value: value.to_string(),
        }
    }

    pub(crate) fn from_raw(raw: String) -> Result<Self, XmlError> {
        let value = unescape(&raw)
            .map_err(|err| XmlError::Escape {
                context: format!("text {:?}", raw.trim()),
                message: err.to_string(),
            })?
            .into_owned();
        Ok(Self { raw, value })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_whitespace(&self) -> bool {
        self.raw
            .chars()
            .all(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
    }
}

/// Attribute with its raw (escaped) and decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    raw: String,
    value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: &str) -> Self {
        Self {
            name: name.into(),
            raw: escape(value).into_owned(),
            value: value.to_string(),
        }
    }

    pub(crate) fn from_raw(name: String, raw: String) -> Result<Self, XmlError> {
        let value = unescape(&raw)
            .map_err(|err| XmlError::Escape {
                context: format!("attribute {name}"),
                message: err.to_string(),
            })?
            .into_owned();
        Ok(Self { name, raw, value })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn write_to(&self, out: &mut String) {
        // Values read from single-quoted attributes may carry a literal `"`.
        let quote = if self.raw.contains('"') { '\'' } else { '"' };
        out.push(' ');
        out.push_str(&self.name);
        out.push('=');
        out.push(quote);
        out.push_str(&self.raw);
        out.push(quote);
    }
}

/// XML element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
    /// Start-tag text between `<` and `>` (or `/>`) as read; dropped once the
    /// attributes change.
    raw_tag: Option<String>,
    self_closing: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            raw_tag: None,
            self_closing: true,
        }
    }

    /// Build a leaf element holding a single text value.
    pub fn with_text(name: impl Into<String>, value: &str) -> Self {
        let mut element = Element::new(name);
        element.set_text(value);
        element
    }

    pub(crate) fn from_parts(
        name: String,
        attributes: Vec<Attribute>,
        raw_tag: String,
        self_closing: bool,
    ) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
            raw_tag: Some(raw_tag),
            self_closing,
        }
    }

    pub(crate) fn push_node(&mut self, node: Node) {
        self.children.push(node);
    }

    /// Qualified name as written in the source, e.g. `sc3:station`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without any namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .rsplit_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Set an attribute value, appending it when it does not exist yet.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let replacement = Attribute::new(name, value);
        match self.attributes.iter_mut().find(|attr| attr.name == name) {
            Some(existing) => *existing = replacement,
            None => self.attributes.push(replacement),
        }
        self.raw_tag = None;
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        let idx = self.attributes.iter().position(|attr| attr.name == name)?;
        self.raw_tag = None;
        Some(self.attributes.remove(idx))
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> + '_ {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Child elements paired with their index in [`Element::children`].
    pub fn indexed_child_elements(&self) -> impl Iterator<Item = (usize, &Element)> + '_ {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(idx, node)| node.as_element().map(|element| (idx, element)))
    }

    pub fn child_element(&self, index: usize) -> Option<&Element> {
        self.children.get(index).and_then(Node::as_element)
    }

    pub fn child_element_mut(&mut self, index: usize) -> Option<&mut Element> {
        match self.children.get_mut(index) {
            Some(Node::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn first_child_element(&self, local_name: &str) -> Option<&Element> {
        self.child_elements()
            .find(|child| child.local_name() == local_name)
    }

    pub fn first_child_element_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(element) if element.local_name() == local_name => Some(element),
            _ => None,
        })
    }

    /// True when the element carries no attributes and no child elements.
    /// Comments and processing instructions may sit between the character data.
    pub fn is_leaf(&self) -> bool {
        self.attributes.is_empty()
            && self.children.iter().all(|node| {
                matches!(
                    node,
                    Node::Text(_) | Node::CData(_) | Node::Comment(_) | Node::ProcessingInstruction(_)
                )
            })
    }

    /// Concatenated character data of a leaf element.
    pub fn text(&self) -> Option<String> {
        if !self.is_leaf() {
            return None;
        }
        let mut value = String::new();
        for node in &self.children {
            match node {
                Node::Text(text) => value.push_str(&text.value),
                Node::CData(data) => value.push_str(data),
                _ => {}
            }
        }
        Some(value)
    }

    /// Replace the character data with a single text node. Comments and
    /// processing instructions stay; the text takes the place of the first
    /// character data that was there.
    pub fn set_text(&mut self, value: &str) {
        let is_data = |node: &Node| matches!(node, Node::Text(_) | Node::CData(_));
        let at = self.children.iter().position(is_data).unwrap_or(0);
        self.children.retain(|node| !is_data(node));
        self.children.insert(at, Node::Text(Text::new(value)));
        self.self_closing = false;
    }

    /// Insert `child` after the last child element, copying the whitespace
    /// that precedes its siblings. `depth` is the depth of `self` (root = 0)
    /// and is used when there is no sibling to copy from. Returns the index of
    /// the inserted child.
    pub fn insert_element(&mut self, child: Element, hints: &FormatHints, depth: usize) -> usize {
        let last = self
            .children
            .iter()
            .rposition(|node| matches!(node, Node::Element(_)));
        match last {
            Some(last) => {
                let separator = match last.checked_sub(1).map(|prev| &self.children[prev]) {
                    Some(Node::Text(text)) if text.is_whitespace() => text.clone(),
                    _ => Text::new(&hints.line_prefix(depth + 1)),
                };
                self.children.insert(last + 1, Node::Text(separator));
                self.children.insert(last + 2, Node::Element(child));
                last + 2
            }
            None => {
                if self.children.iter().all(Node::is_whitespace) {
                    self.children = vec![
                        Node::Text(Text::new(&hints.line_prefix(depth + 1))),
                        Node::Element(child),
                        Node::Text(Text::new(&hints.line_prefix(depth))),
                    ];
                    self.self_closing = false;
                    1
                } else {
                    self.children.push(Node::Element(child));
                    self.self_closing = false;
                    self.children.len() - 1
                }
            }
        }
    }

    /// Insert `child` in front of the node at `index`, repeating the whitespace
    /// that precedes it so both lines keep their indentation.
    pub fn insert_element_before(&mut self, index: usize, child: Element) -> usize {
        let index = index.min(self.children.len());
        let separator = match index.checked_sub(1).map(|prev| &self.children[prev]) {
            Some(Node::Text(text)) if text.is_whitespace() => Some(text.clone()),
            _ => None,
        };
        self.children.insert(index, Node::Element(child));
        if let Some(separator) = separator {
            self.children.insert(index + 1, Node::Text(separator));
        }
        self.self_closing = false;
        index
    }

    /// Remove the child at `index` together with the whitespace in front of it.
    pub fn remove_child(&mut self, index: usize) -> Option<Node> {
        if index >= self.children.len() {
            return None;
        }
        let removed = self.children.remove(index);
        if let Some(prev) = index.checked_sub(1) {
            if self.children[prev].is_whitespace() {
                self.children.remove(prev);
            }
        }
        Some(removed)
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        match &self.raw_tag {
            Some(raw) => out.push_str(raw),
            None => {
                out.push_str(&self.name);
                for attr in &self.attributes {
                    attr.write_to(out);
                }
            }
        }
        if self.self_closing && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Compare two element trees ignoring formatting: names, attribute sets,
/// element order and non-whitespace character data must match. Comments and
/// processing instructions are not significant.
pub fn structurally_equal(left: &Element, right: &Element) -> bool {
    if left.name != right.name {
        return false;
    }
    if sorted_attributes(left) != sorted_attributes(right) {
        return false;
    }
    let left_children = significant_children(left);
    let right_children = significant_children(right);
    left_children.len() == right_children.len()
        && left_children
            .iter()
            .zip(&right_children)
            .all(|pair| match pair {
                (Significant::Element(a), Significant::Element(b)) => structurally_equal(a, b),
                (Significant::Text(a), Significant::Text(b)) => a == b,
                _ => false,
            })
}

enum Significant<'a> {
    Element(&'a Element),
    Text(&'a str),
}

fn significant_children(element: &Element) -> Vec<Significant<'_>> {
    element
        .children
        .iter()
        .filter_map(|node| match node {
            Node::Element(child) => Some(Significant::Element(child)),
            Node::Text(text) if !text.is_whitespace() => Some(Significant::Text(text.value.trim())),
            Node::CData(data) => Some(Significant::Text(data.as_str())),
            _ => None,
        })
        .collect()
}

fn sorted_attributes(element: &Element) -> Vec<(&str, &str)> {
    let mut attrs: Vec<(&str, &str)> = element
        .attributes
        .iter()
        .map(|attr| (attr.name.as_str(), attr.value.as_str()))
        .collect();
    attrs.sort_by(|a, b| match a.0.cmp(b.0) {
        Ordering::Equal => a.1.cmp(b.1),
        other => other,
    });
    attrs
}
