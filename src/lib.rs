//! Enriches RSS feed files with the readable content of each linked article.
//!
//! For every item that has not been enriched yet, the linked page is fetched
//! (bounded in size and time, through an optional on-disk cache), reduced to
//! its main content, and appended to the item's description behind a marker
//! comment so later runs skip it.

pub mod config;
pub mod content;
pub mod enrich;
pub mod feed;
pub mod run;
pub mod storage;
pub mod util;

pub use config::{Config, ConfigError};
pub use run::{run, RunError, RunSummary};
