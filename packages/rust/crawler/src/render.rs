//! Headless browser rendering for pages whose content is built by scripts.
//!
//! The renderer shells out to a Chromium-family binary with `--dump-dom`.
//! Every browser resource (the child process and its throwaway profile
//! directory) is owned by a [`RenderSession`] scoped to one call, so it is
//! released on success, failure and timeout alike.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use admitbot_shared::{AdmitBotError, FetchConfig, Result};

use crate::extract::has_body;

/// Produces the rendered HTML of a page.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &Url) -> Result<String>;
}

/// Renders pages with a headless Chromium-family browser.
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    browser: String,
    wait: Duration,
}

impl ChromeRenderer {
    pub fn new(browser: impl Into<String>, wait: Duration) -> Self {
        Self {
            browser: browser.into(),
            wait,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            config.browser.clone(),
            Duration::from_secs(config.render_wait_secs),
        )
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    #[instrument(skip_all, fields(url = %url, browser = %self.browser))]
    async fn render(&self, url: &Url) -> Result<String> {
        let session = RenderSession::create()?;

        let child = Command::new(&self.browser)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg(format!("--user-data-dir={}", session.profile_dir.display()))
            .arg("--dump-dom")
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AdmitBotError::Render(format!(
                    "failed to launch browser: {e}. Is `{}` installed?",
                    self.browser
                ))
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(self.wait, child.wait_with_output())
            .await
            .map_err(|_| {
                AdmitBotError::Render(format!(
                    "{url}: document body not ready within {:?}",
                    self.wait
                ))
            })?
            .map_err(|e| AdmitBotError::Render(format!("{url}: browser wait failed: {e}")))?;

        if !output.status.success() {
            return Err(AdmitBotError::Render(format!(
                "{url}: browser exited with {}",
                output.status
            )));
        }

        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        if !has_body(&html) {
            return Err(AdmitBotError::Render(format!(
                "{url}: rendered document has no body"
            )));
        }

        debug!(bytes = html.len(), "page rendered");
        Ok(html)
    }
}

/// Browser profile directory owned by a single render call.
struct RenderSession {
    profile_dir: PathBuf,
}

impl RenderSession {
    fn create() -> Result<Self> {
        let profile_dir =
            std::env::temp_dir().join(format!("admitbot-render-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&profile_dir)
            .map_err(|e| AdmitBotError::io(&profile_dir, e))?;
        Ok(Self { profile_dir })
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.profile_dir) {
            debug!(path = ?self.profile_dir, error = %e, "failed to remove render profile");
        }
    }
}
