//! Program page acquisition: fetching, rendering, text extraction, caching.
//!
//! This crate provides:
//! - [`extract`] — HTML → normalized plain text, link discovery
//! - [`PageFetcher`] — static GET with a headless-render fallback
//! - [`ChromeRenderer`] — scoped headless browser render
//! - [`ContentCache`] — populate-once memoization and [`AggregateContext`]

pub mod cache;
pub mod extract;
pub mod fetch;
pub mod render;

pub use cache::{AggregateContext, ContentCache};
pub use extract::{extract_links, extract_text, has_body};
pub use fetch::{PageFetcher, PageSource, USER_AGENT, build_client};
pub use render::{ChromeRenderer, PageRenderer};
