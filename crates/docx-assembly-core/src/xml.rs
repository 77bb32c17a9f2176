//! Owned, mutable XML tree for WordprocessingML parts.
//!
//! Qualified names (`w:p`, `r:embed`, ...) are kept verbatim so a part can be
//! parsed, edited and written back without touching namespace declarations.

use std::borrow::Cow;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{AssemblyError, Result};

pub const XML_DECLARATION: &str =
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
    Instruction(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style child appender.
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Part of the name after the namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) {
        self.attributes.retain(|(k, _)| k != key);
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.is(name))
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.is(name))
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|el| el.is(name))
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    pub fn remove_children_named(&mut self, name: &str) {
        self.children
            .retain(|node| !matches!(node, XmlNode::Element(el) if el.is(name)));
    }

    /// Returns the child `name`, creating it at the position dictated by
    /// `order` (schema sequence of sibling names) when absent.
    pub fn ensure_child_ordered(&mut self, name: &str, order: &[&str]) -> &mut XmlElement {
        let existing = self
            .children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(el) if el.is(name)));
        let index = match existing {
            Some(index) => index,
            None => {
                let rank = order.iter().position(|n| *n == name).unwrap_or(order.len());
                let insert_at = self
                    .children
                    .iter()
                    .position(|node| match node {
                        XmlNode::Element(el) => {
                            order.iter().position(|n| *n == el.name).unwrap_or(order.len()) > rank
                        }
                        _ => false,
                    })
                    .unwrap_or(self.children.len());
                self.children
                    .insert(insert_at, XmlNode::Element(XmlElement::new(name)));
                insert_at
            }
        };
        match &mut self.children[index] {
            XmlNode::Element(el) => el,
            _ => unreachable!("index always points at an element"),
        }
    }

    /// Concatenated text of direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) | XmlNode::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Visits this element and every descendant element, depth first.
    pub fn walk<F: FnMut(&XmlElement)>(&self, f: &mut F) {
        f(self);
        for child in self.elements() {
            child.walk(f);
        }
    }

    pub fn walk_mut<F: FnMut(&mut XmlElement)>(&mut self, f: &mut F) {
        f(self);
        for child in self.elements_mut() {
            child.walk_mut(f);
        }
    }

    pub fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Element(el) => el.write_to(out),
                XmlNode::Text(t) => out.push_str(&escape_text(t)),
                XmlNode::CData(t) => {
                    out.push_str("<![CDATA[");
                    out.push_str(t);
                    out.push_str("]]>");
                }
                XmlNode::Comment(t) => {
                    out.push_str("<!--");
                    out.push_str(t);
                    out.push_str("-->");
                }
                XmlNode::Instruction(t) => {
                    out.push_str("<?");
                    out.push_str(t);
                    out.push_str("?>");
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// A parsed XML part: its root element plus the part name for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlPart {
    pub name: String,
    pub root: XmlElement,
}

impl XmlPart {
    pub fn parse(name: &str, bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| AssemblyError::xml(name, e))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Ok(Self {
            name: name.to_string(),
            root: parse_element_tree(name, text)?,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::with_capacity(4096);
        out.push_str(XML_DECLARATION);
        self.root.write_to(&mut out);
        out.into_bytes()
    }
}

fn parse_element_tree(part: &str, xml: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| AssemblyError::xml(part, format!("at byte {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(start) => stack.push(element_from_start(part, &start)?),
            Event::Empty(start) => {
                let element = element_from_start(part, &start)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| AssemblyError::xml(part, "unbalanced end tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    let value = text.unescape().map_err(|e| AssemblyError::xml(part, e))?;
                    if !value.is_empty() {
                        parent.children.push(XmlNode::Text(value.into_owned()));
                    }
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    parent.children.push(XmlNode::CData(value));
                }
            }
            Event::Comment(comment) => {
                if let Some(parent) = stack.last_mut() {
                    let value = String::from_utf8_lossy(&comment).into_owned();
                    parent.children.push(XmlNode::Comment(value));
                }
            }
            Event::PI(instruction) => {
                if let Some(parent) = stack.last_mut() {
                    let value = String::from_utf8_lossy(&instruction).into_owned();
                    parent.children.push(XmlNode::Instruction(value));
                }
            }
            Event::Decl(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(AssemblyError::xml(part, "unexpected end of document"));
    }
    root.ok_or_else(|| AssemblyError::xml(part, "document has no root element"))
}

fn element_from_start(part: &str, start: &BytesStart) -> Result<XmlElement> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| AssemblyError::xml(part, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| AssemblyError::xml(part, e))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None => *root = Some(element),
    }
}

pub fn escape_text(value: &str) -> Cow<'_, str> {
    partial_escape(value)
}

/// Attribute values also keep literal tabs and line breaks, which readers
/// would otherwise normalize to spaces.
pub fn escape_attr(value: &str) -> Cow<'_, str> {
    let escaped = escape(value);
    if !escaped.contains(['\n', '\r', '\t']) {
        return escaped;
    }
    Cow::Owned(
        escaped
            .replace('\n', "&#10;")
            .replace('\r', "&#13;")
            .replace('\t', "&#9;"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip_preserves_names_and_text() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t xml:space="preserve"> a &amp; b </w:t></w:r></w:p></w:body></w:document>"#;
        let part = XmlPart::parse("word/document.xml", xml.as_bytes()).unwrap();
        assert_eq!(String::from_utf8(part.serialize()).unwrap(), xml);
    }

    #[test]
    fn test_parse_keeps_comments_and_cdata() {
        let xml = "<root><!-- note --><![CDATA[x < y]]></root>";
        let part = XmlPart::parse("p.xml", xml.as_bytes()).unwrap();
        assert_eq!(part.root.children.len(), 2);
        assert_eq!(part.root.text(), "x < y");
    }

    #[test]
    fn test_rejects_unbalanced_markup() {
        let err = XmlPart::parse("bad.xml", b"<a><b></a>").unwrap_err();
        assert!(err.to_string().contains("bad.xml"));
    }

    #[test]
    fn test_ensure_child_ordered_respects_sequence() {
        let order = ["w:rFonts", "w:b", "w:i", "w:sz"];
        let mut rpr = XmlElement::new("w:rPr").with_child(XmlElement::new("w:sz"));
        rpr.ensure_child_ordered("w:b", &order);
        rpr.ensure_child_ordered("w:rFonts", &order);
        let names: Vec<&str> = rpr.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["w:rFonts", "w:b", "w:sz"]);
    }

    #[test]
    fn test_attribute_escaping() {
        let el = XmlElement::new("a").with_attr("v", "x\"<y>&");
        let mut out = String::new();
        el.write_to(&mut out);
        assert_eq!(out, r#"<a v="x&quot;&lt;y&gt;&amp;"/>"#);
    }

    #[test]
    fn test_attribute_whitespace_survives_round_trip() {
        let el = XmlElement::new("a").with_attr("v", "it's\ta\nb");
        let mut out = String::new();
        el.write_to(&mut out);
        assert_eq!(out, r#"<a v="it&apos;s&#9;a&#10;b"/>"#);

        let part = XmlPart::parse("p.xml", out.as_bytes()).unwrap();
        assert_eq!(part.root.attr("v"), Some("it's\ta\nb"));
    }
}
