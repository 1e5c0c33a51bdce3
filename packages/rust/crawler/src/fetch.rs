//! Page fetching: a lightweight HTTP GET with a headless-render fallback.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use admitbot_shared::{AdmitBotError, FetchConfig, Result};

use crate::extract::extract_text;
use crate::render::{ChromeRenderer, PageRenderer};

/// User-Agent string for fetch requests.
pub const USER_AGENT: &str = concat!("admitbot/", env!("CARGO_PKG_VERSION"));

/// Anything that can turn a URL into page text, or nothing.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Returns the normalized page text, or `None` if it could not be obtained.
    async fn fetch(&self, url: &Url) -> Option<String>;
}

/// Build the HTTP client shared by fetch and download requests.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
        .map_err(|e| AdmitBotError::Network(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// PageFetcher
// ---------------------------------------------------------------------------

/// Fetches page text, falling back to a browser render when the plain
/// request yields nothing usable. Does not cache.
pub struct PageFetcher {
    client: Client,
    renderer: Option<Box<dyn PageRenderer>>,
}

impl PageFetcher {
    /// Create a fetcher from the `[fetch]` config section.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = build_client(Duration::from_secs(config.timeout_secs))?;
        let renderer: Option<Box<dyn PageRenderer>> = if config.render_enabled {
            Some(Box::new(ChromeRenderer::from_config(config)))
        } else {
            None
        };
        Ok(Self::from_parts(client, renderer))
    }

    /// Assemble a fetcher from an existing client and renderer.
    pub fn from_parts(client: Client, renderer: Option<Box<dyn PageRenderer>>) -> Self {
        Self { client, renderer }
    }

    /// Attempt 1: plain GET, then text extraction.
    ///
    /// An HTTP error status or an empty extraction result is a failure.
    pub async fn fetch_static(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| AdmitBotError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdmitBotError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AdmitBotError::Network(format!("{url}: body read failed: {e}")))?;

        non_empty(url, extract_text(&body))
    }

    /// Attempt 2: headless render, then the same extraction.
    pub async fn fetch_rendered(&self, url: &Url) -> Result<String> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| AdmitBotError::Render("rendering disabled".into()))?;

        let html = renderer.render(url).await?;
        non_empty(url, extract_text(&html))
    }
}

#[async_trait]
impl PageSource for PageFetcher {
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &Url) -> Option<String> {
        match self.fetch_static(url).await {
            Ok(text) => {
                debug!(chars = text.len(), "static fetch succeeded");
                return Some(text);
            }
            Err(e) => warn!(error = %e, "static fetch failed, trying render"),
        }

        match self.fetch_rendered(url).await {
            Ok(text) => {
                info!(chars = text.len(), "render fallback succeeded");
                Some(text)
            }
            Err(e) => {
                warn!(error = %e, "render fallback failed");
                None
            }
        }
    }
}

fn non_empty(url: &Url, text: String) -> Result<String> {
    if text.is_empty() {
        Err(AdmitBotError::parse(format!("{url}: no visible text")))
    } else {
        Ok(text)
    }
}
