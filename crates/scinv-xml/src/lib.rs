//! Load SeisComP inventory XML into a formatting-preserving tree using quick-xml.
//!
//! The tree keeps everything needed to write the document back the way it was
//! read: the prolog, comments, whitespace between elements, attribute order and
//! the raw start-tag text of every element that has not been edited.
//!
//! ```
//! let xml = "<seiscomp>\n  <Inventory/>\n</seiscomp>\n";
//! let doc = scinv_xml::parse(xml).expect("parse");
//! assert_eq!(doc.root().local_name(), "seiscomp");
//! assert_eq!(doc.to_xml(), xml);
//! ```

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::debug;

mod tree;

pub use tree::{structurally_equal, Attribute, Document, Element, FormatHints, Node, Text};

const BOM: char = '\u{feff}';

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("invalid UTF-8: {0}")]
    Encoding(String),
    #[error("invalid escape sequence in {context}: {message}")]
    Escape { context: String, message: String },
}

/// Parse an XML document into a [`Document`] that can be written back with
/// [`Document::to_xml`].
pub fn parse(xml: &str) -> Result<Document, XmlError> {
    let (bom, body) = match xml.strip_prefix(BOM) {
        Some(rest) => (true, rest),
        None => (false, xml),
    };

    let mut reader = Reader::from_str(body);
    reader.trim_text(false);
    reader.expand_empty_elements(false);
    reader.check_end_names(true);

    let mut builder = TreeBuilder::default();
    loop {
        let event = reader
            .read_event()
            .map_err(|err| syntax_error(body, reader.buffer_position(), err.to_string()))?;
        let node = match event {
            Event::Start(start) => {
                builder.open(element_from_start(&start, false)?);
                continue;
            }
            Event::Empty(start) => Node::Element(element_from_start(&start, true)?),
            Event::End(end) => {
                let element = builder.close().ok_or_else(|| {
                    let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    syntax_error(
                        body,
                        reader.buffer_position(),
                        format!("unexpected end tag </{name}>"),
                    )
                })?;
                Node::Element(element)
            }
            Event::Text(text) => {
                let raw = decode(text.into_inner())?;
                if raw.is_empty() {
                    continue;
                }
                Node::Text(Text::from_raw(raw)?)
            }
            Event::CData(data) => Node::CData(decode(data.into_inner())?),
            Event::Comment(text) => Node::Comment(decode(text.into_inner())?),
            Event::Decl(decl) => Node::Declaration(decode(Cow::Borrowed(&*decl))?),
            Event::PI(text) => Node::ProcessingInstruction(decode(text.into_inner())?),
            Event::DocType(text) => Node::DocType(decode(text.into_inner())?),
            Event::Eof => break,
        };
        builder
            .attach(node)
            .map_err(|message| syntax_error(body, reader.buffer_position(), message))?;
    }

    let document = builder.finish(bom)?;
    debug!(
        root = document.root().name(),
        indent = ?document.hints().indent(),
        "parsed xml document"
    );
    Ok(document)
}

#[derive(Default)]
struct TreeBuilder {
    prolog: Vec<Node>,
    epilog: Vec<Node>,
    root: Option<Element>,
    stack: Vec<Element>,
}

impl TreeBuilder {
    fn open(&mut self, element: Element) {
        self.stack.push(element);
    }

    fn close(&mut self) -> Option<Element> {
        self.stack.pop()
    }

    fn attach(&mut self, node: Node) -> Result<(), String> {
        if let Some(parent) = self.stack.last_mut() {
            parent.push_node(node);
            return Ok(());
        }
        match node {
            Node::Element(element) => {
                if let Some(existing) = &self.root {
                    return Err(format!(
                        "second root element <{}> after <{}>",
                        element.name(),
                        existing.name()
                    ));
                }
                self.root = Some(element);
            }
            Node::Text(ref text) if !text.is_whitespace() => {
                return Err(format!(
                    "text outside of the root element: {:?}",
                    text.value().trim()
                ));
            }
            Node::CData(_) => return Err("CDATA outside of the root element".into()),
            other => {
                if self.root.is_some() {
                    self.epilog.push(other);
                } else {
                    self.prolog.push(other);
                }
            }
        }
        Ok(())
    }

    fn finish(self, bom: bool) -> Result<Document, XmlError> {
        if let Some(open) = self.stack.last() {
            return Err(XmlError::Malformed(format!(
                "unclosed element <{}>",
                open.name()
            )));
        }
        let root = self
            .root
            .ok_or_else(|| XmlError::Malformed("document has no root element".into()))?;
        Ok(Document::new(bom, self.prolog, root, self.epilog))
    }
}

fn element_from_start(start: &BytesStart<'_>, self_closing: bool) -> Result<Element, XmlError> {
    let name = decode(Cow::Borrowed(start.name().as_ref()))?;
    let raw_tag = decode(Cow::Borrowed(&**start))?;
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|err| XmlError::Malformed(format!("<{name}>: {err}")))?;
        let key = decode(Cow::Borrowed(attr.key.as_ref()))?;
        let raw = decode(attr.value)?;
        attributes.push(Attribute::from_raw(key, raw)?);
    }
    Ok(Element::from_parts(name, attributes, raw_tag, self_closing))
}

fn decode(bytes: Cow<'_, [u8]>) -> Result<String, XmlError> {
    String::from_utf8(bytes.into_owned()).map_err(|err| XmlError::Encoding(err.to_string()))
}

fn syntax_error(source: &str, offset: usize, message: String) -> XmlError {
    let (line, column) = line_column(source, offset);
    XmlError::Syntax {
        line,
        column,
        message,
    }
}

/// Translate a byte offset into a 1-based line and column.
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let bytes = source.as_bytes();
    let prefix = &bytes[..offset.min(bytes.len())];
    let line = prefix.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = prefix
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    (line, prefix.len() - line_start + 1)
}
