//! RSS feed documents.
//!
//! - `document` - the typed `rss.channel.item[]` view used by the enricher
//! - `tree` - the generic XML tree it is built on, parsed and written with `quick-xml`
//!
//! # Example
//!
//! ```
//! use readable_feeds::feed::FeedDocument;
//!
//! let doc = FeedDocument::parse(
//!     "<rss><channel><item><link>https://example.com/a</link>\
//!      <description>Hi</description></item></channel></rss>",
//! )
//! .unwrap();
//! assert_eq!(doc.items()[0].link(), "https://example.com/a");
//! ```

mod document;
mod tree;

pub use document::{DocumentError, FeedDocument, FeedItem, MARKER_TAG};
pub use tree::{XmlElement, XmlNode};
