//! Populate-once page cache and aggregate program context.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};
use url::Url;

use admitbot_shared::Program;

use crate::fetch::PageSource;

// ---------------------------------------------------------------------------
// AggregateContext
// ---------------------------------------------------------------------------

/// Labelled page text of every program whose fetch succeeded, in
/// declaration order. Immutable once built; clones share the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateContext(Arc<str>);

impl AggregateContext {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for AggregateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AggregateContext {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

// ---------------------------------------------------------------------------
// ContentCache
// ---------------------------------------------------------------------------

/// Memoizes page fetches for the lifetime of the process.
///
/// Failed fetches are stored too, so a URL is fetched at most once. There
/// is no invalidation; an entry, once present, is never overwritten.
/// Mutation goes through `&mut self`, so there is exactly one writer.
pub struct ContentCache {
    source: Box<dyn PageSource>,
    pages: HashMap<Url, Option<String>>,
}

impl ContentCache {
    pub fn new(source: Box<dyn PageSource>) -> Self {
        Self {
            source,
            pages: HashMap::new(),
        }
    }

    /// Return the cached text for `url`, fetching it on first access.
    pub async fn get(&mut self, url: &Url) -> Option<String> {
        if let Some(cached) = self.pages.get(url) {
            return cached.clone();
        }

        let fetched = self.source.fetch(url).await;
        self.pages.insert(url.clone(), fetched.clone());
        fetched
    }

    /// Whether `url` already has an entry (present or absent).
    pub fn contains(&self, url: &Url) -> bool {
        self.pages.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Fetch every program page and join the successful ones.
    ///
    /// Programs are visited in declaration order; absent pages are skipped.
    /// Each block is labelled with the program name and blocks are separated
    /// by a blank line.
    #[instrument(skip_all, fields(programs = programs.len()))]
    pub async fn collect_all(&mut self, programs: &[Program]) -> AggregateContext {
        let mut blocks = Vec::with_capacity(programs.len());

        for program in programs {
            match self.get(&program.url).await {
                Some(text) => blocks.push(context_block(&program.name, &text)),
                None => warn!(program = %program.name, url = %program.url, "no content for program"),
            }
        }

        info!(included = blocks.len(), "aggregate context built");
        AggregateContext::from(blocks.join("\n\n"))
    }
}

/// Label one program's page text.
fn context_block(name: &str, text: &str) -> String {
    format!("{name} program page:\n{text}")
}
