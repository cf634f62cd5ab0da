//! Minimal owned XML tree on top of `quick-xml` events.
//!
//! Only what a feed needs survives a parse: elements, attributes, text, CDATA
//! and comments. The XML declaration, processing instructions and DOCTYPE
//! are dropped; a fresh UTF-8 declaration is written on output.

use std::borrow::Cow;
use std::io::Cursor;

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::document::DocumentError;

/// Maximum element nesting accepted by [`parse`].
const MAX_DEPTH: usize = 128;

/// An element with its attributes and children, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    /// Unescaped character data
    Text(String),
    CData(String),
    Comment(String),
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    /// Concatenated text and CDATA content.
    ///
    /// Returns `None` when the element has child elements, i.e. is not a
    /// text-only element. Comments are ignored.
    pub fn text(&self) -> Option<String> {
        let mut text = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(t) | XmlNode::CData(t) => text.push_str(t),
                XmlNode::Comment(_) => {}
                XmlNode::Element(_) => return None,
            }
        }
        Some(text)
    }
}

/// Parses a complete document and returns its root element.
///
/// # Errors
///
/// [`DocumentError::MalformedXml`] for anything that is not well-formed:
/// mismatched or unclosed tags, unknown entities, a missing or duplicated
/// root element, or nesting deeper than the supported limit.
///
/// # Security
///
/// `quick-xml` never expands `<!ENTITY>` declarations from a DOCTYPE; only
/// the five predefined entities and character references are resolved, so
/// external entities cannot be smuggled in.
pub fn parse(xml: &str) -> Result<XmlElement, DocumentError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| malformed(&reader, e))?;

        match event {
            Event::Start(e) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(DocumentError::MalformedXml(format!(
                        "nesting depth exceeds maximum of {MAX_DEPTH} levels"
                    )));
                }
                stack.push(start_element(&e, &reader)?);
            }
            Event::Empty(e) => {
                let element = start_element(&e, &reader)?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::End(e) => {
                let qname = e.name();
                let name = utf8(qname.as_ref())?;
                let element = match stack.pop() {
                    Some(open) if open.name == name => open,
                    Some(open) => {
                        return Err(DocumentError::MalformedXml(format!(
                            "expected </{}>, found </{}>",
                            open.name, name
                        )))
                    }
                    None => {
                        return Err(DocumentError::MalformedXml(format!(
                            "unexpected </{name}>"
                        )))
                    }
                };
                close_element(element, &mut stack, &mut root)?;
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| malformed(&reader, e))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Text(text.into_owned()));
                } else if !text.trim().is_empty() {
                    return Err(DocumentError::MalformedXml(
                        "text outside of the root element".to_string(),
                    ));
                }
            }
            Event::CData(c) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::CData(utf8(&c)?.to_string()));
                }
            }
            Event::Comment(c) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Comment(utf8(&c)?.to_string()));
                }
            }
            Event::Eof => break,
            // Declaration, processing instructions and DOCTYPE
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(DocumentError::MalformedXml(format!(
            "unclosed element <{}>",
            open.name
        )));
    }
    root.ok_or_else(|| DocumentError::MalformedXml("document has no root element".to_string()))
}

/// Serializes `root` with an XML declaration and 2-space indentation.
///
/// CDATA content containing `]]>` is split across consecutive sections.
pub fn write(root: &XmlElement) -> Result<String, DocumentError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(serialize)?;
    write_element(&mut writer, root)?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(serialize)
}

fn write_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    element: &XmlElement,
) -> Result<(), DocumentError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), &*xml_chars(value)));
    }

    if element.children.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(serialize);
    }

    writer.write_event(Event::Start(start)).map_err(serialize)?;
    for child in &element.children {
        match child {
            XmlNode::Element(el) => write_element(writer, el)?,
            XmlNode::Text(text) => writer
                .write_event(Event::Text(BytesText::new(&xml_chars(text))))
                .map_err(serialize)?,
            XmlNode::CData(text) => {
                let text = xml_chars(text);
                for section in cdata_sections(&text) {
                    writer
                        .write_event(Event::CData(BytesCData::new(section)))
                        .map_err(serialize)?;
                }
            }
            XmlNode::Comment(text) => writer
                .write_event(Event::Comment(BytesText::from_escaped(xml_chars(text))))
                .map_err(serialize)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(serialize)
}

/// Splits text so that no section contains the `]]>` terminator.
fn cdata_sections(text: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut rest = text;
    while let Some(idx) = rest.find("]]>") {
        // Keep "]]" in this section and start the next one at ">"
        sections.push(&rest[..idx + 2]);
        rest = &rest[idx + 2..];
    }
    sections.push(rest);
    sections
}

/// Drops characters outside the XML 1.0 `Char` production (C0 controls other
/// than tab, newline and carriage return, plus U+FFFE and U+FFFF). Such
/// characters cannot appear in a well-formed document, even inside CDATA.
fn xml_chars(text: &str) -> Cow<'_, str> {
    fn allowed(c: char) -> bool {
        matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}')
            || c >= '\u{10000}'
    }

    if text.chars().all(allowed) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| allowed(c)).collect())
    }
}

fn start_element(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<XmlElement, DocumentError> {
    let mut element = XmlElement::new(utf8(e.name().as_ref())?);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| malformed(reader, err))?;
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| malformed(reader, err))?;
        element
            .attributes
            .push((utf8(attr.key.as_ref())?.to_string(), value.into_owned()));
    }
    Ok(element)
}

/// Attaches a finished element to its parent, or makes it the root.
fn close_element(
    element: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<(), DocumentError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(DocumentError::MalformedXml(format!(
            "second root element <{}>",
            element.name
        )));
    }
    *root = Some(element);
    Ok(())
}

fn utf8(bytes: &[u8]) -> Result<&str, DocumentError> {
    std::str::from_utf8(bytes).map_err(|e| DocumentError::MalformedXml(e.to_string()))
}

fn malformed(reader: &Reader<&[u8]>, e: impl std::fmt::Display) -> DocumentError {
    DocumentError::MalformedXml(format!("{e} (at byte {})", reader.buffer_position()))
}

fn serialize(e: impl std::fmt::Display) -> DocumentError {
    DocumentError::Serialize(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_keeps_structure_and_attributes() {
        let root = parse(
            r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <!-- generated -->
    <title>News &amp; Notes</title>
    <atom:link href="https://example.com/feed.xml" rel="self"/>
  </channel>
</rss>"#,
        )
        .unwrap();

        assert_eq!(root.name, "rss");
        assert_eq!(
            root.attributes,
            vec![
                ("version".to_string(), "2.0".to_string()),
                ("xmlns:atom".to_string(), "http://www.w3.org/2005/Atom".to_string()),
            ]
        );

        let channel = root.child_elements().next().unwrap();
        assert_eq!(channel.children.len(), 3);
        assert_eq!(channel.children[0], XmlNode::Comment(" generated ".to_string()));

        let title = channel.child_elements().next().unwrap();
        assert_eq!(title.text().as_deref(), Some("News & Notes"));

        let link = channel.child_elements().nth(1).unwrap();
        assert_eq!(link.name, "atom:link");
        assert!(link.children.is_empty());
    }

    #[test]
    fn test_text_and_cdata_concatenate() {
        // Surrounding whitespace of text runs is trimmed on parse
        let root = parse("<d>a &lt;b&gt; <![CDATA[<i>c</i>]]></d>").unwrap();
        assert_eq!(root.text().as_deref(), Some("a <b><i>c</i>"));
    }

    #[test]
    fn test_text_is_none_with_child_elements() {
        let root = parse("<d>text<b>bold</b></d>").unwrap();
        assert_eq!(root.text(), None);
    }

    #[test]
    fn test_malformed_documents_rejected() {
        for xml in [
            "<rss><channel></rss>",
            "<rss><channel>",
            "<rss></rss><rss></rss>",
            "",
            "<rss>&xxe;</rss>",
            "just text",
        ] {
            assert!(
                matches!(parse(xml), Err(DocumentError::MalformedXml(_))),
                "expected MalformedXml for {xml:?}"
            );
        }
    }

    #[test]
    fn test_entity_declarations_are_not_expanded() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE rss [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<rss>&xxe;</rss>"#;
        assert!(matches!(parse(xml), Err(DocumentError::MalformedXml(_))));
    }

    #[test]
    fn test_excessive_nesting_rejected() {
        let xml = format!("{}{}", "<a>".repeat(MAX_DEPTH + 1), "</a>".repeat(MAX_DEPTH + 1));
        assert!(matches!(parse(&xml), Err(DocumentError::MalformedXml(_))));
    }

    #[test]
    fn test_write_indents_and_declares_utf8() {
        let root = XmlElement::new("rss").with_child(XmlNode::Element(
            XmlElement::new("channel")
                .with_child(XmlNode::Element(
                    XmlElement::new("title").with_child(XmlNode::Text("A & B".to_string())),
                ))
                .with_child(XmlNode::Element(XmlElement::new("empty"))),
        ));

        let xml = write(&root).unwrap();

        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss>\n  <channel>\n    <title>A &amp; B</title>\n    <empty/>\n  </channel>\n</rss>"
        );
    }

    #[test]
    fn test_cdata_terminator_is_split() {
        assert_eq!(cdata_sections("plain"), vec!["plain"]);
        assert_eq!(cdata_sections("a]]>b"), vec!["a]]", ">b"]);
        assert_eq!(cdata_sections("]]>]]>"), vec!["]]", ">]]", ">"]);

        let root = XmlElement::new("d").with_child(XmlNode::CData("x ]]> y".to_string()));
        let xml = write(&root).unwrap();
        assert!(xml.contains("<![CDATA[x ]]]]><![CDATA[> y]]>"));

        let reparsed = parse(&xml).unwrap();
        assert_eq!(reparsed.text().as_deref(), Some("x ]]> y"));
    }

    #[test]
    fn test_characters_outside_xml_are_dropped_on_write() {
        let mut root = XmlElement::new("d")
            .with_child(XmlNode::CData("bell\u{7} back\u{8}space\ttab".to_string()))
            .with_child(XmlNode::Element(
                XmlElement::new("e").with_child(XmlNode::Text("form\u{c}feed \u{FFFE}".to_string())),
            ));
        root.attributes.push(("title".to_string(), "nul\u{0}".to_string()));

        let xml = write(&root).unwrap();

        assert!(!xml
            .chars()
            .any(|c| matches!(c, '\u{0}' | '\u{7}' | '\u{8}' | '\u{c}' | '\u{FFFE}')));
        assert!(xml.contains("<![CDATA[bell backspace\ttab]]>"));
        assert!(xml.contains("<e>formfeed </e>"));
        assert!(xml.contains(r#"title="nul""#));
    }

    #[test]
    fn test_xml_chars_borrows_clean_text() {
        assert!(matches!(xml_chars("caf\u{e9} \u{1F600}\r\n"), Cow::Borrowed(_)));
        assert_eq!(xml_chars("a\u{1b}[0mb"), "a[0mb");
    }
}
