//! Client code for feedwatch.
//!
//! This crate provides the HTTP fetch pipeline, scoped-tag article
//! extraction and RSS feed parsing used by the change detection run.

pub mod extract;
pub mod feed;
pub mod fetch;

pub use extract::{ArticleExtractor, Extractor, extract_text};
pub use feed::{FeedItem, parse_feed, parse_pub_date};
pub use fetch::{FetchClient, FetchConfig, Fetcher};
