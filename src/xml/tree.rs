//! Owned XML tree.
//!
//! Every document parsed here owns all of its nodes, so copying a subtree from
//! one document into another is a plain `clone()` and can never alias the
//! source. Whitespace-only text between elements is dropped on parse; all other
//! text, including whitespace-only leaf content, is kept verbatim and only
//! trimmed at field-extraction time.

use crate::error::{EngineError, Result};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written in the source, prefix included
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Element name without its namespace prefix
    pub fn local_name(&self) -> &str {
        match self.name.rsplit_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn push_element(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First text (or CDATA) child, untrimmed
    pub fn first_text(&self) -> Option<&str> {
        self.children.iter().find_map(|node| match node {
            Node::Text(text) | Node::CData(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// This element and all its descendants with the given local name, in
    /// document order.
    pub fn find_all<'a>(&'a self, local_name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_named(local_name, &mut found);
        found
    }

    /// First element (self included) with the given local name, in document
    /// order, and its ancestors from the outermost down
    pub fn find_with_ancestors<'a>(
        &'a self,
        local_name: &str,
    ) -> Option<(Vec<&'a Element>, &'a Element)> {
        if self.local_name() == local_name {
            return Some((Vec::new(), self));
        }
        self.child_elements().find_map(|child| {
            child
                .find_with_ancestors(local_name)
                .map(|(mut ancestors, found)| {
                    ancestors.insert(0, self);
                    (ancestors, found)
                })
        })
    }

    /// Deep copy that is namespace-well-formed on its own.
    ///
    /// `xmlns` declarations in scope from `ancestors` (outermost first) are
    /// added to the copy unless it declares the same prefix itself.
    pub fn detached_copy(&self, ancestors: &[&Element]) -> Element {
        let mut copy = self.clone();
        for ancestor in ancestors.iter().rev() {
            for (key, value) in &ancestor.attributes {
                if is_namespace_declaration(key) && copy.attribute(key).is_none() {
                    copy.attributes.push((key.clone(), value.clone()));
                }
            }
        }
        copy
    }

    fn collect_named<'a>(&'a self, local_name: &str, found: &mut Vec<&'a Element>) {
        if self.local_name() == local_name {
            found.push(self);
        }
        for child in self.child_elements() {
            child.collect_named(local_name, found);
        }
    }
}

fn is_namespace_declaration(key: &str) -> bool {
    key == "xmlns" || key.starts_with("xmlns:")
}

/// A parsed document with exactly one root element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub root: Element,
}

impl XmlDocument {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    /// Parse raw bytes claiming to be UTF-8 XML.
    ///
    /// Never panics on malformed input; every failure becomes
    /// [`EngineError::Parse`] with the underlying reader message.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let source = std::str::from_utf8(bytes)
            .map_err(|err| EngineError::parse(format!("Input is not proper UTF-8: {err}")))?;
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);

        let mut reader = Reader::from_str(source);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader.read_event().map_err(|err| {
                EngineError::parse(format!("{err} (at byte {})", reader.buffer_position()))
            })?;

            match event {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| EngineError::parse("Closing tag without opening tag"))?;
                    drop_layout_whitespace(&mut element);
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(parse_error)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Text(text.into_owned())),
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(EngineError::parse(
                                "Content is not allowed outside the root element",
                            ))
                        }
                    }
                }
                Event::CData(cdata) => {
                    let text = String::from_utf8(cdata.into_inner().into_owned())
                        .map_err(parse_error)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::CData(text)),
                        None => {
                            return Err(EngineError::parse(
                                "CDATA is not allowed outside the root element",
                            ))
                        }
                    }
                }
                Event::Comment(comment) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&comment).into_owned();
                        parent.children.push(Node::Comment(text));
                    }
                }
                Event::Eof => break,
                // Declarations, processing instructions, doctype
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(EngineError::parse(format!(
                "Premature end of data: element <{}> is not closed",
                open.name
            )));
        }

        root.map(Self::new)
            .ok_or_else(|| EngineError::parse("Document is empty"))
    }

    /// Serialize as indented UTF-8 with an XML declaration.
    ///
    /// Output depends only on the tree, so equal trees give equal bytes.
    pub fn to_pretty_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(serialize_error)?;
        write_element(&mut writer, &self.root)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(parse_error)?
        .to_string();
    let mut element = Element::new(name);

    for attribute in start.attributes() {
        let attribute = attribute.map_err(parse_error)?;
        let key = std::str::from_utf8(attribute.key.as_ref())
            .map_err(parse_error)?
            .to_string();
        let value = attribute.unescape_value().map_err(parse_error)?.into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

/// Whitespace-only text next to child elements is indentation, not content
fn drop_layout_whitespace(element: &mut Element) {
    if element.child_elements().next().is_some() {
        element
            .children
            .retain(|node| !matches!(node, Node::Text(text) if text.trim().is_empty()));
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push_element(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(EngineError::parse("Extra content at the end of the document"));
    }
    *root = Some(element);
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(serialize_error)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(serialize_error)?;
    for child in &element.children {
        match child {
            Node::Element(inner) => write_element(writer, inner)?,
            Node::Text(text) => writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(serialize_error)?,
            Node::CData(text) => writer
                .write_event(Event::CData(BytesCData::new(text.as_str())))
                .map_err(serialize_error)?,
            Node::Comment(text) => writer
                .write_event(Event::Comment(BytesText::from_escaped(text.as_str())))
                .map_err(serialize_error)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(serialize_error)?;
    Ok(())
}

fn parse_error(err: impl Display) -> EngineError {
    EngineError::parse(err.to_string())
}

fn serialize_error(err: impl Display) -> EngineError {
    EngineError::Serialize(err.to_string())
}
