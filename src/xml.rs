//! Minimal XML tree for carrier payloads.
//!
//! [`Element`] builds outgoing requests, [`Node`] is the parsed reply. Node
//! names are stored by local name, so a query for `Body/Fault` matches
//! `soapenv:Body/soapenv:Fault` whatever prefix the carrier chose.

use std::io::Cursor;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use crate::error::DecodeError;

/// An element of an outgoing request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// `prefix:name`
    pub fn ns(prefix: &str, name: &str) -> Self {
        Self::new(format!("{prefix}:{name}"))
    }

    /// Element holding only text.
    pub fn leaf(name: impl Into<String>, text: impl ToString) -> Self {
        Self::new(name).with_text(text)
    }

    pub fn with_text(mut self, text: impl ToString) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First direct child with the given (qualified) name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Serialize without an XML declaration.
    pub fn to_xml(&self) -> Result<String, DecodeError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        self.write(&mut writer)?;
        into_string(writer)
    }

    /// Serialize with a leading `<?xml version="1.0" encoding="UTF-8"?>`.
    pub fn to_document(&self) -> Result<String, DecodeError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.write(&mut writer)?;
        into_string(writer)
    }

    fn write(&self, writer: &mut Writer<Cursor<Vec<u8>>>) -> Result<(), DecodeError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.text.is_none() && self.children.is_empty() {
            return emit(writer, Event::Empty(start));
        }
        emit(writer, Event::Start(start))?;
        if let Some(text) = &self.text {
            emit(writer, Event::Text(BytesText::new(text)))?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        emit(writer, Event::End(BytesEnd::new(self.name.as_str())))
    }
}

fn emit(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), DecodeError> {
    writer.write_event(event).map_err(|e| DecodeError::Xml(e.to_string()))
}

fn into_string(writer: Writer<Cursor<Vec<u8>>>) -> Result<String, DecodeError> {
    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| DecodeError::Xml(e.to_string()))
}

/// An element of a parsed reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    /// Parse a whole document and return its root element.
    pub fn parse(xml: &str) -> Result<Self, DecodeError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Node> = Vec::new();
        let mut root = None;
        loop {
            let event = reader.read_event().map_err(|e| {
                DecodeError::Xml(format!("at position {}: {}", reader.error_position(), e))
            })?;
            match event {
                Event::Start(ref e) => stack.push(Self::from_start(e)?),
                Event::Empty(ref e) => {
                    let node = Self::from_start(e)?;
                    attach(&mut stack, &mut root, node);
                }
                Event::End(_) => {
                    let node = stack.pop().ok_or_else(|| DecodeError::Xml("unbalanced end tag".into()))?;
                    attach(&mut stack, &mut root, node);
                }
                Event::Text(ref t) => {
                    if let Some(top) = stack.last_mut() {
                        let text = t.unescape().map_err(|e| DecodeError::Xml(e.to_string()))?;
                        top.text.push_str(&text);
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if !stack.is_empty() {
            return Err(DecodeError::Xml("unexpected end of document".into()));
        }
        root.ok_or_else(|| DecodeError::Xml("document has no root element".into()))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, DecodeError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| DecodeError::Xml(e.to_string()))?;
            // namespace declarations are not data
            if attr.key.as_ref().starts_with(b"xmlns") {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_err(|e| DecodeError::Xml(e.to_string()))?;
            attributes.push((key, value.into_owned()));
        }
        Ok(Self {
            name,
            attributes,
            ..Default::default()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own text content, trimmed.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follow a `/`-separated path of local names, taking the first match at each step.
    pub fn find(&self, path: &str) -> Option<&Node> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, step| node.child(step))
    }

    /// Every node matching the path; all matches are followed at each step.
    pub fn find_all<'a>(&'a self, path: &str) -> Vec<&'a Node> {
        let mut current = vec![self];
        for step in path.split('/').filter(|s| !s.is_empty()) {
            current = current.into_iter()
                .flat_map(|node| node.children.iter().filter(move |c| c.name == step))
                .collect();
        }
        current
    }

    pub fn has(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    /// Text at `path`, `None` when the node is missing.
    pub fn text_at(&self, path: &str) -> Option<&str> {
        self.find(path).map(Node::text)
    }

    /// Text at `path`, empty when missing.
    pub fn text_or_empty(&self, path: &str) -> String {
        self.text_at(path).unwrap_or_default().to_string()
    }

    pub fn require(&self, path: &str) -> Result<&Node, DecodeError> {
        self.find(path).ok_or_else(|| DecodeError::MissingNode(self.qualify(path)))
    }

    pub fn require_text(&self, path: &str) -> Result<String, DecodeError> {
        self.require(path).map(|n| n.text().to_string())
    }

    pub fn require_f64(&self, path: &str) -> Result<f64, DecodeError> {
        let text = self.require_text(path)?;
        parse_f64(&self.qualify(path), &text)
    }

    pub fn require_attr(&self, key: &str) -> Result<&str, DecodeError> {
        self.attr(key).ok_or_else(|| DecodeError::MissingNode(format!("{}/@{}", self.name, key)))
    }

    fn qualify(&self, path: &str) -> String {
        format!("{}/{}", self.name, path)
    }
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if root.is_none() {
        *root = Some(node);
    }
}

/// Parse a carrier money or number string, `$` and thousands separators allowed.
pub fn parse_f64(path: &str, text: &str) -> Result<f64, DecodeError> {
    let cleaned: String = text.trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    cleaned.parse().map_err(|_| DecodeError::InvalidValue {
        path: path.to_string(),
        value: text.to_string(),
    })
}

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_elements_with_escaping() {
        let root = Element::new("LabelRequest")
            .with_attr("Test", "YES")
            .with_child(Element::leaf("FromName", "Smith & Sons <Ltd>"))
            .with_child(Element::new("Services").with_attr("InsuredMail", "OFF"));
        assert_eq!(
            root.to_xml().unwrap(),
            r#"<LabelRequest Test="YES"><FromName>Smith &amp; Sons &lt;Ltd&gt;</FromName><Services InsuredMail="OFF"/></LabelRequest>"#
        );
    }

    #[test]
    fn document_has_declaration() {
        let xml = Element::leaf("A", 1).to_document().unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.ends_with("<A>1</A>"));
    }

    #[test]
    fn empty_text_is_written_as_open_close_pair() {
        let xml = Element::leaf("Address2", "").to_xml().unwrap();
        assert_eq!(xml, "<Address2></Address2>");
    }

    #[test]
    fn parse_ignores_namespace_prefixes() {
        let xml = r#"<?xml version="1.0"?>
            <soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
              <soapenv:Body>
                <rate:RateResponse xmlns:rate="urn:rate">
                  <rate:RatedShipment><rate:Service><rate:Code>03</rate:Code></rate:Service></rate:RatedShipment>
                  <rate:RatedShipment><rate:Service><rate:Code>12</rate:Code></rate:Service></rate:RatedShipment>
                </rate:RateResponse>
              </soapenv:Body>
            </soapenv:Envelope>"#;
        let root = Node::parse(xml).unwrap();
        assert_eq!(root.name(), "Envelope");
        let codes: Vec<_> = root.find_all("Body/RateResponse/RatedShipment/Service/Code")
            .into_iter()
            .map(Node::text)
            .collect();
        assert_eq!(codes, vec!["03", "12"]);
    }

    #[test]
    fn attributes_and_entities_are_decoded() {
        let root = Node::parse(r#"<R xmlns="urn:x"><P TotalAmount="1.23">A &amp; B</P></R>"#).unwrap();
        let price = root.require("P").unwrap();
        assert_eq!(price.attr("TotalAmount"), Some("1.23"));
        assert_eq!(price.text(), "A & B");
        assert!(root.attr("xmlns").is_none());
    }

    #[test]
    fn missing_nodes_are_reported_with_their_path() {
        let root = Node::parse("<Reply><Status>0</Status></Reply>").unwrap();
        assert_eq!(
            root.require_text("TrackingNumber"),
            Err(DecodeError::MissingNode("Reply/TrackingNumber".into()))
        );
        assert_eq!(root.require_f64("Status"), Ok(0.0));
    }

    #[test]
    fn malformed_documents_fail() {
        assert!(Node::parse("<a><b></a>").is_err());
        assert!(Node::parse("").is_err());
        assert!(Node::parse("<a><b></b>").is_err());
    }

    #[test]
    fn money_parsing() {
        assert_eq!(parse_f64("x", "$1,234.50"), Ok(1234.5));
        assert!(parse_f64("x", "n/a").is_err());
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("Zürich Hauptbahnhof", 6), "Zürich");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
