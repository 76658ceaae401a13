// src/ingest/xml.rs
//! Generic XML tree + the two schema views (QuakeML event list, Atom-geo feed).
//!
//! Element and attribute names are stored by local name, so `q:quakeml`,
//! `geo:lat` and a default-namespaced `event` are all addressed without prefixes.
//! Accessors return `None` for anything that is not there; nothing indexes blindly.

use metrics::histogram;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::XmlParseError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow first-child links, e.g. `["latitude", "value"]`.
    pub fn path(&self, path: &[&str]) -> Option<&XmlNode> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Trimmed text content; `None` when empty.
    pub fn text(&self) -> Option<&str> {
        let t = self.text.trim();
        (!t.is_empty()).then_some(t)
    }

    pub fn text_at(&self, path: &[&str]) -> Option<&str> {
        self.path(path).and_then(XmlNode::text)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// FDSN event service response (`q:quakeml/eventParameters/event`)
    CatalogEvents,
    /// Atom syndication feed with `geo:Point` entries
    AtomGeoFeed,
}

impl Schema {
    fn root_name(self) -> &'static str {
        match self {
            Schema::CatalogEvents => "quakeml",
            Schema::AtomGeoFeed => "feed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentTree {
    pub schema: Schema,
    pub root: XmlNode,
}

impl DocumentTree {
    /// Event nodes (catalog) or entry nodes (feed), in document order.
    pub fn records(&self) -> Vec<&XmlNode> {
        match self.schema {
            Schema::CatalogEvents => self
                .root
                .child("eventParameters")
                .map(|p| p.children_named("event").collect())
                .unwrap_or_default(),
            Schema::AtomGeoFeed => self.root.children_named("entry").collect(),
        }
    }
}

/// Parse `xml` and check that its root matches `schema`.
pub fn decode(xml: &str, schema: Schema) -> Result<DocumentTree, XmlParseError> {
    let t0 = std::time::Instant::now();
    let root = parse_tree(xml)?;
    if root.name != schema.root_name() {
        return Err(XmlParseError::UnexpectedRoot {
            expected: schema.root_name(),
            found: root.name,
        });
    }
    histogram!("ingest_decode_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(DocumentTree { schema, root })
}

/// Build the generic tree. Mismatched or unclosed tags are errors.
pub fn parse_tree(xml: &str) -> Result<XmlNode, XmlParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let position = reader.buffer_position() as u64;
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(open_node(&e, position)?),
            Ok(Event::Empty(e)) => {
                let node = open_node(&e, position)?;
                attach(&mut stack, &mut root, node, position)?;
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| malformed(position, "unmatched end tag"))?;
                attach(&mut stack, &mut root, node, position)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let s = t.unescape().map_err(|e| malformed(position, e))?;
                    top.text.push_str(&s);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            // declaration, comments, processing instructions, doctype
            Ok(_) => {}
            Err(e) => return Err(malformed(reader.buffer_position() as u64, e)),
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(
            reader.buffer_position() as u64,
            format!("unclosed element <{}>", open.name),
        ));
    }
    root.ok_or(XmlParseError::MissingRoot)
}

fn open_node(e: &BytesStart<'_>, position: u64) -> Result<XmlNode, XmlParseError> {
    let mut node = XmlNode {
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        ..XmlNode::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|err| malformed(position, err))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| malformed(position, err))?
            .into_owned();
        node.attributes.push((key, value));
    }
    Ok(node)
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
    position: u64,
) -> Result<(), XmlParseError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    if root.is_some() {
        return Err(malformed(position, "more than one root element"));
    }
    *root = Some(node);
    Ok(())
}

fn malformed(position: u64, message: impl ToString) -> XmlParseError {
    XmlParseError::Malformed {
        position,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_stripped_and_attributes_kept() {
        let xml = r#"<feed xmlns:geo="http://www.w3.org/2003/01/geo/wgs84_pos#">
            <entry id="a"><geo:Point><geo:lat>42.1</geo:lat><geo:long>13.2</geo:long></geo:Point></entry>
        </feed>"#;
        let root = parse_tree(xml).unwrap();
        let entry = root.child("entry").unwrap();
        assert_eq!(entry.attr("id"), Some("a"));
        assert_eq!(entry.text_at(&["Point", "lat"]), Some("42.1"));
        assert_eq!(entry.text_at(&["Point", "alt"]), None);
    }

    #[test]
    fn entities_and_cdata_are_decoded() {
        let root = parse_tree("<a><b>x &amp; y</b><c><![CDATA[<raw>]]></c></a>").unwrap();
        assert_eq!(root.text_at(&["b"]), Some("x & y"));
        assert_eq!(root.text_at(&["c"]), Some("<raw>"));
    }

    #[test]
    fn unclosed_and_mismatched_are_errors() {
        assert!(matches!(
            parse_tree("<a><b></a>"),
            Err(XmlParseError::Malformed { .. })
        ));
        assert!(matches!(
            parse_tree("<a><b>"),
            Err(XmlParseError::Malformed { .. })
        ));
    }

    #[test]
    fn no_root_is_reported() {
        assert_eq!(parse_tree(""), Err(XmlParseError::MissingRoot));
        assert_eq!(
            parse_tree("<?xml version=\"1.0\"?><!-- nothing -->"),
            Err(XmlParseError::MissingRoot)
        );
    }

    #[test]
    fn wrong_root_for_schema() {
        let err = decode("<feed/>", Schema::CatalogEvents).unwrap_err();
        assert!(matches!(
            err,
            XmlParseError::UnexpectedRoot {
                expected: "quakeml",
                ..
            }
        ));
    }

    #[test]
    fn catalog_without_event_parameters_has_no_records() {
        let tree = decode("<q:quakeml xmlns:q=\"x\"/>", Schema::CatalogEvents).unwrap();
        assert!(tree.records().is_empty());
    }
}
