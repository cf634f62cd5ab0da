//! Typed view of an RSS 2.0 document.
//!
//! Only the parts the enrichment pass touches are typed: the ordered items
//! with their `link` and `description`. Everything else (channel metadata,
//! namespaced extensions, other item fields) is carried through untouched as
//! generic [`XmlNode`]s so that a rewrite never loses feed data.

use thiserror::Error;

use super::tree::{self, XmlElement, XmlNode};

/// Marker embedded (as an HTML comment) in the description of enriched items.
pub const MARKER_TAG: &str = "hnss:readable-content";

#[derive(Debug, Error)]
pub enum DocumentError {
    /// The input is not well-formed XML
    #[error("Malformed XML: {0}")]
    MalformedXml(String),
    /// Well-formed XML that is not shaped like `rss.channel.item[]`
    #[error("Unexpected feed structure at {path}: {reason}")]
    SchemaMismatch { path: String, reason: String },
    /// Writing the document back out failed
    #[error("Failed to serialize feed: {0}")]
    Serialize(String),
}

/// A parsed feed: `rss` → `channel` → ordered items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    rss_attributes: Vec<(String, String)>,
    /// Children of `<rss>` other than the channel, written after it
    rss_extra: Vec<XmlNode>,
    channel_attributes: Vec<(String, String)>,
    /// Children of `<channel>` other than items, written before them
    channel_extra: Vec<XmlNode>,
    items: Vec<FeedItem>,
}

/// One `<item>` of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    link: String,
    description: String,
    /// Attributes of `<item>` itself
    attributes: Vec<(String, String)>,
    /// Children other than `link` and `description`, in document order
    extra: Vec<XmlNode>,
}

impl FeedDocument {
    /// Parses and validates an RSS document.
    ///
    /// # Errors
    ///
    /// - [`DocumentError::MalformedXml`] - not well-formed XML
    /// - [`DocumentError::SchemaMismatch`] - the root is not `rss`, there is
    ///   not exactly one `channel`, or an item lacks a text `link` or
    ///   `description`. The error names the offending path, e.g.
    ///   `rss.channel.item[2].link`.
    pub fn parse(xml: &str) -> Result<Self, DocumentError> {
        let root = tree::parse(xml)?;
        if root.name != "rss" {
            return Err(mismatch("rss", format!("root element is <{}>", root.name)));
        }

        let mut channel = None;
        let mut rss_extra = Vec::new();
        for node in root.children {
            match node {
                XmlNode::Element(el) if el.name == "channel" => {
                    if channel.is_some() {
                        return Err(mismatch("rss.channel", "more than one channel"));
                    }
                    channel = Some(el);
                }
                other => rss_extra.push(other),
            }
        }
        let channel = channel.ok_or_else(|| mismatch("rss.channel", "missing"))?;

        let mut items = Vec::new();
        let mut channel_extra = Vec::new();
        for node in channel.children {
            match node {
                XmlNode::Element(el) if el.name == "item" => {
                    let path = format!("rss.channel.item[{}]", items.len());
                    items.push(FeedItem::from_element(el, &path)?);
                }
                other => channel_extra.push(other),
            }
        }

        Ok(Self {
            rss_attributes: root.attributes,
            rss_extra,
            channel_attributes: channel.attributes,
            channel_extra,
            items,
        })
    }

    /// Serializes the document: XML declaration, 2-space indentation and
    /// every description as CDATA.
    ///
    /// Parsing the output yields an equal document; the text is not
    /// byte-identical to the original input.
    pub fn to_xml(&self) -> Result<String, DocumentError> {
        let mut channel = XmlElement::new("channel");
        channel.attributes = self.channel_attributes.clone();
        channel.children = self.channel_extra.clone();
        channel
            .children
            .extend(self.items.iter().map(|item| XmlNode::Element(item.to_element())));

        let mut rss = XmlElement::new("rss");
        rss.attributes = self.rss_attributes.clone();
        rss.children.push(XmlNode::Element(channel));
        rss.children.extend(self.rss_extra.iter().cloned());

        tree::write(&rss)
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    /// Same document with its items replaced.
    pub fn with_items(self, items: Vec<FeedItem>) -> Self {
        Self { items, ..self }
    }
}

impl FeedItem {
    pub fn new(link: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            description: description.into(),
            attributes: Vec::new(),
            extra: Vec::new(),
        }
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Same item with its description replaced.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..self
        }
    }

    /// Whether a previous pass already injected content into this item.
    pub fn is_enriched(&self) -> bool {
        self.description.contains(MARKER_TAG)
    }

    fn from_element(element: XmlElement, path: &str) -> Result<Self, DocumentError> {
        let mut link = None;
        let mut description = None;
        let mut extra = Vec::new();

        for node in element.children {
            match node {
                XmlNode::Element(el) if el.name == "link" => {
                    let field = format!("{path}.link");
                    if link.is_some() {
                        return Err(mismatch(field, "duplicate element"));
                    }
                    let text = el
                        .text()
                        .ok_or_else(|| mismatch(&field, "expected text content"))?;
                    link = Some(text.trim().to_string());
                }
                XmlNode::Element(el) if el.name == "description" => {
                    let field = format!("{path}.description");
                    if description.is_some() {
                        return Err(mismatch(field, "duplicate element"));
                    }
                    let text = el
                        .text()
                        .ok_or_else(|| mismatch(&field, "expected text content"))?;
                    description = Some(text);
                }
                other => extra.push(other),
            }
        }

        let link = match link {
            Some(link) if !link.is_empty() => link,
            Some(_) => return Err(mismatch(format!("{path}.link"), "empty")),
            None => return Err(mismatch(format!("{path}.link"), "missing")),
        };
        let description =
            description.ok_or_else(|| mismatch(format!("{path}.description"), "missing"))?;

        Ok(Self {
            link,
            description,
            attributes: element.attributes,
            extra,
        })
    }

    fn to_element(&self) -> XmlElement {
        let mut item = XmlElement::new("item");
        item.attributes = self.attributes.clone();
        item.children = self.extra.clone();
        item.children.push(XmlNode::Element(
            XmlElement::new("link").with_child(XmlNode::Text(self.link.clone())),
        ));
        item.children.push(XmlNode::Element(
            XmlElement::new("description").with_child(XmlNode::CData(self.description.clone())),
        ));
        item
    }
}

fn mismatch(path: impl AsRef<str>, reason: impl Into<String>) -> DocumentError {
    DocumentError::SchemaMismatch {
        path: path.as_ref().to_string(),
        reason: reason.into(),
    }
}
