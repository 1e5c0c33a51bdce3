//! Plain-text extraction and link discovery for fetched HTML.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

/// Elements whose text never reaches the reader.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "meta", "link"];

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid selector"));

/// Extract the visible text of an HTML document.
///
/// Script, style, meta and link elements are dropped. Every text node is
/// split into lines, each line trimmed, empty lines removed, and the rest
/// joined with `\n`. This is the canonical representation of page content
/// everywhere downstream.
pub fn extract_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut lines: Vec<&str> = Vec::new();

    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }

        lines.extend(text.lines().map(str::trim).filter(|line| !line.is_empty()));
    }

    lines.join("\n")
}

/// Whether the document has a `<body>` element with any children.
pub fn has_body(html: &str) -> bool {
    let doc = Html::parse_document(html);
    doc.select(&BODY_SELECTOR)
        .next()
        .is_some_and(|body| body.children().next().is_some())
}

/// Extract all links from a document, resolved against the base URL.
///
/// Anchor-only, `javascript:` and `mailto:` links are skipped; fragments
/// are stripped from the result.
pub fn extract_links(html: &str, base_url: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);
    let mut links = Vec::new();

    for el in doc.select(&ANCHOR_SELECTOR) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };

        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:")
        {
            continue;
        }

        if let Ok(mut resolved) = base_url.join(href) {
            resolved.set_fragment(None);
            links.push(resolved);
        }
    }

    links
}
