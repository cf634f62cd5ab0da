//! Utility functions shared by the fetcher, the cache and the run driver.
//!
//! - **URL validation**: security-focused link checks to prevent SSRF
//! - **Atomic writes**: temp-file-then-rename persistence for feeds and cache entries
//!
//! # Examples
//!
//! ```
//! use readable_feeds::util::{validate_url, HostPolicy};
//!
//! let url = validate_url("https://example.com/article", HostPolicy::PublicOnly).unwrap();
//! assert_eq!(url.scheme(), "https");
//! ```

mod fs;
mod url_validator;

pub use fs::write_atomic;
pub use url_validator::{validate_url, HostPolicy, UrlValidationError};
