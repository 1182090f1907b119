//! Generic response tree.
//!
//! [`crate::parser::parse_xml_tree`] turns a SOAP response into an [`XmlNode`].
//! The tree has no schema: every element becomes a scalar, an ordered mapping
//! of child names to nodes, or a sequence when a sibling tag repeats. All
//! lookups return `Option` because absent nodes are an everyday outcome in
//! EDI-Crop responses (optional fields, farms without crop fields).

use serde_json::{Map, Value};

/// Key under which a compound element stores its text content.
pub const TEXT_KEY: &str = "#text";

/// Prefix marking attribute entries inside a compound element.
pub const ATTRIBUTE_PREFIX: char = '@';

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Scalar(String),
    Mapping(Vec<(String, XmlNode)>),
    Sequence(Vec<XmlNode>),
}

/// Text content of an element, with or without attributes.
///
/// Resolved once via [`XmlNode::text_value`]; call sites that only need the
/// value use [`TextValue::value`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextValue<'a> {
    Plain(&'a str),
    Attributed {
        value: &'a str,
        attributes: &'a [(String, XmlNode)],
    },
}

impl<'a> TextValue<'a> {
    pub fn value(&self) -> &'a str {
        match self {
            Self::Plain(value) => value,
            Self::Attributed { value, .. } => value,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        match self {
            Self::Plain(_) => None,
            Self::Attributed { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| attribute_name(key) == Some(name))
                .and_then(|(_, node)| node.as_scalar()),
        }
    }
}

fn attribute_name(key: &str) -> Option<&str> {
    key.strip_prefix(ATTRIBUTE_PREFIX)
}

impl XmlNode {
    pub fn empty() -> Self {
        Self::Scalar(String::new())
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn entries(&self) -> &[(String, XmlNode)] {
        match self {
            Self::Mapping(entries) => entries,
            _ => &[],
        }
    }

    /// Child lookup by element name. A `Sequence` has no named children, so
    /// this returns `None` there instead of guessing which item was meant.
    pub fn get(&self, key: &str) -> Option<&XmlNode> {
        self.entries()
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, node)| node)
    }

    pub fn path(&self, keys: &[&str]) -> Option<&XmlNode> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    /// All occurrences of `key` as an ordered list: none, one or many,
    /// regardless of how the parser represented a single occurrence.
    pub fn list(&self, key: &str) -> Vec<&XmlNode> {
        self.get(key).map(XmlNode::items).unwrap_or_default()
    }

    /// This node viewed as a sequence of items.
    pub fn items(&self) -> Vec<&XmlNode> {
        match self {
            Self::Sequence(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    pub fn text_value(&self) -> Option<TextValue<'_>> {
        match self {
            Self::Scalar(value) => Some(TextValue::Plain(value)),
            Self::Mapping(entries) if is_compound(entries) => {
                let value = entries
                    .iter()
                    .find(|(key, _)| key == TEXT_KEY)
                    .and_then(|(_, node)| node.as_scalar())
                    .unwrap_or("");
                Some(TextValue::Attributed {
                    value,
                    attributes: entries,
                })
            }
            _ => None,
        }
    }

    /// Text content with attributes unwrapped, trimmed.
    pub fn text(&self) -> Option<&str> {
        self.text_value().map(|text| text.value().trim())
    }

    /// Text of a named child.
    pub fn child_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(XmlNode::text)
    }

    /// Attribute value of a compound element (or of a mapping that carries
    /// attribute entries next to its children).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.entries()
            .iter()
            .find(|(key, _)| attribute_name(key) == Some(name))
            .and_then(|(_, node)| node.as_scalar())
    }

    /// Convert to JSON, replacing every text-with-attributes element by its
    /// bare value. Attribute entries of structured elements are dropped.
    pub fn simplify(&self) -> Value {
        match self {
            Self::Scalar(value) => Value::String(value.clone()),
            Self::Sequence(items) => Value::Array(items.iter().map(XmlNode::simplify).collect()),
            Self::Mapping(entries) => match self.text_value() {
                Some(text) => Value::String(text.value().to_string()),
                None => Value::Object(simplify_entries(entries)),
            },
        }
    }
}

fn simplify_entries(entries: &[(String, XmlNode)]) -> Map<String, Value> {
    entries
        .iter()
        .filter(|(key, _)| attribute_name(key).is_none())
        .map(|(key, node)| (key.clone(), node.simplify()))
        .collect()
}

/// A mapping is a compound text node when it only holds `#text` and
/// attribute entries.
fn is_compound(entries: &[(String, XmlNode)]) -> bool {
    !entries.is_empty()
        && entries
            .iter()
            .all(|(key, _)| key == TEXT_KEY || attribute_name(key).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scalar(value: &str) -> XmlNode {
        XmlNode::Scalar(value.to_string())
    }

    fn mapping(entries: Vec<(&str, XmlNode)>) -> XmlNode {
        XmlNode::Mapping(
            entries
                .into_iter()
                .map(|(key, node)| (key.to_string(), node))
                .collect(),
        )
    }

    #[test]
    fn test_list_normalizes_single_and_repeated_children() {
        let single = mapping(vec![("Field", scalar("a"))]);
        let repeated = mapping(vec![(
            "Field",
            XmlNode::Sequence(vec![scalar("a"), scalar("b")]),
        )]);
        let absent = mapping(vec![]);

        assert_eq!(single.list("Field").len(), 1);
        assert_eq!(repeated.list("Field").len(), 2);
        assert!(absent.list("Field").is_empty());
    }

    #[test]
    fn test_text_value_distinguishes_plain_and_attributed() {
        let plain = scalar(" 42 ");
        let attributed = mapping(vec![
            ("#text", scalar("100 200")),
            ("@srsName", scalar("EPSG:28992")),
        ]);

        assert_eq!(plain.text(), Some("42"));
        match attributed.text_value() {
            Some(text @ TextValue::Attributed { .. }) => {
                assert_eq!(text.value(), "100 200");
                assert_eq!(text.attribute("srsName"), Some("EPSG:28992"));
            }
            other => panic!("expected attributed text, got {other:?}"),
        }
        assert_eq!(attributed.attribute("srsName"), Some("EPSG:28992"));
    }

    #[test]
    fn test_structured_mapping_has_no_text() {
        let node = mapping(vec![("Code", scalar("x")), ("@id", scalar("1"))]);
        assert!(node.text_value().is_none());
        assert_eq!(node.child_text("Code"), Some("x"));
    }

    #[test]
    fn test_path_lookup_returns_none_on_missing_key() {
        let root = mapping(vec![(
            "Envelope",
            mapping(vec![("Body", mapping(vec![("Ok", scalar("1"))]))]),
        )]);

        assert_eq!(
            root.path(&["Envelope", "Body", "Ok"]).and_then(XmlNode::text),
            Some("1")
        );
        assert!(root.path(&["Envelope", "Header"]).is_none());
    }

    #[test]
    fn test_simplify_unwraps_nested_attributed_values() {
        let node = mapping(vec![
            (
                "CropTypeCode",
                mapping(vec![("#text", scalar("233")), ("@codeSpace", scalar("RVO"))]),
            ),
            ("@xsi", scalar("ignored")),
            (
                "Period",
                mapping(vec![("BeginDate", scalar("2024-01-01"))]),
            ),
        ]);

        assert_eq!(
            node.simplify(),
            json!({"CropTypeCode": "233", "Period": {"BeginDate": "2024-01-01"}})
        );
    }
}
