//! XML response parsing.
//!
//! Turns a SOAP response string into the schema-less [`XmlNode`] tree the
//! extractors and the feature projector walk. Namespace prefixes are dropped
//! (`gml:posList` becomes `posList`) because EDI-Crop reuses the same local
//! names across namespaces only where the meaning is identical.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::error::{Error, Result};
use crate::tree::{XmlNode, ATTRIBUTE_PREFIX, TEXT_KEY};

/// Parses `xml` into a tree rooted at a mapping that holds the document
/// element, e.g. `{"Envelope": {...}}`.
///
/// Failures are reported as [`Error::XmlParse`], never as a missing node.
pub fn parse_xml_tree(xml: &str) -> Result<XmlNode> {
    debug!("Parsing XML response of {} bytes", xml.len());
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack = vec![ElementBuilder::new(String::new())];

    loop {
        let position = reader.buffer_position() as u64;
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(ElementBuilder::open(&start, position)?);
            }
            Ok(Event::Empty(start)) => {
                let (name, node) = ElementBuilder::open(&start, position)?.finish();
                current(&mut stack).push_child(name, node);
            }
            Ok(Event::End(_)) => {
                let element = match stack.pop() {
                    Some(element) if !stack.is_empty() => element,
                    _ => return Err(parse_error(position, "closing tag without opening tag")),
                };
                let (name, node) = element.finish();
                current(&mut stack).push_child(name, node);
            }
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|err| parse_error(position, err.to_string()))?;
                current(&mut stack).text.push_str(&text);
            }
            Ok(Event::CData(cdata)) => {
                current(&mut stack)
                    .text
                    .push_str(&String::from_utf8_lossy(&cdata));
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(parse_error(
                    reader.buffer_position() as u64,
                    err.to_string(),
                ))
            }
            _ => (),
        }
    }

    if stack.len() != 1 {
        let unclosed = stack.last().map(|e| e.name.clone()).unwrap_or_default();
        return Err(parse_error(
            xml.len() as u64,
            format!("unexpected end of document inside <{unclosed}>"),
        ));
    }

    let root = stack.remove(0);
    if root.children.is_empty() {
        return Err(parse_error(0, "document has no root element"));
    }
    Ok(XmlNode::Mapping(root.children))
}

fn parse_error(position: u64, message: impl Into<String>) -> Error {
    Error::XmlParse {
        position,
        message: message.into(),
    }
}

fn current(stack: &mut [ElementBuilder]) -> &mut ElementBuilder {
    // The virtual root is never popped while events remain.
    let last = stack.len() - 1;
    &mut stack[last]
}

struct ElementBuilder {
    name: String,
    attributes: Vec<(String, XmlNode)>,
    children: Vec<(String, XmlNode)>,
    text: String,
}

impl ElementBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
            text: String::new(),
        }
    }

    fn open(start: &BytesStart<'_>, position: u64) -> Result<Self> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut element = Self::new(name);

        for attr in start.attributes() {
            let attr = attr.map_err(|err| parse_error(position, err.to_string()))?;
            let raw_key = attr.key.as_ref();
            if raw_key == b"xmlns" || raw_key.starts_with(b"xmlns:") {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| parse_error(position, err.to_string()))?;
            element.attributes.push((
                format!("{ATTRIBUTE_PREFIX}{key}"),
                XmlNode::Scalar(value.into_owned()),
            ));
        }

        Ok(element)
    }

    /// Adds a child, folding repeated tags into one `Sequence` that keeps the
    /// position of the first occurrence.
    fn push_child(&mut self, name: String, node: XmlNode) {
        match self.children.iter_mut().find(|(key, _)| *key == name) {
            Some((_, XmlNode::Sequence(items))) => items.push(node),
            Some((_, existing)) => {
                let first = std::mem::replace(existing, XmlNode::Sequence(Vec::new()));
                *existing = XmlNode::Sequence(vec![first, node]);
            }
            None => self.children.push((name, node)),
        }
    }

    fn finish(self) -> (String, XmlNode) {
        let Self {
            name,
            mut attributes,
            children,
            text,
        } = self;

        let node = if children.is_empty() && attributes.is_empty() {
            XmlNode::Scalar(text)
        } else if children.is_empty() {
            attributes.insert(0, (TEXT_KEY.to_string(), XmlNode::Scalar(text)));
            XmlNode::Mapping(attributes)
        } else {
            let mut entries = attributes;
            entries.extend(children);
            if !text.trim().is_empty() {
                entries.push((TEXT_KEY.to_string(), XmlNode::Scalar(text)));
            }
            XmlNode::Mapping(entries)
        };

        (name, node)
    }
}
