//! Document acquisition: getting each program's curriculum file into the
//! staging directory.
//!
//! Acquirers are best effort. Their `Result` is only used for logging; the
//! sync manager decides success by looking at the staging directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tokio::process::Command;
use tracing::{debug, info, instrument};
use url::Url;

use admitbot_crawler::{PageRenderer, extract_links};
use admitbot_shared::{AdmitBotError, DocumentsConfig, Program, Result};

/// Puts a program's curriculum document into a directory.
#[async_trait]
pub trait DocumentAcquirer: Send + Sync {
    async fn acquire(&self, program: &Program, dir: &Path) -> Result<()>;
}

/// Build the acquirer selected by `[documents] acquirer`.
///
/// `renderer` is used by the link acquirer for pages whose links only
/// exist after scripts run.
pub fn acquirer_from_config(
    config: &DocumentsConfig,
    client: Client,
    renderer: Option<Box<dyn PageRenderer>>,
) -> Result<Box<dyn DocumentAcquirer>> {
    match config.acquirer.as_str() {
        "links" => {
            let mut acquirer = LinkDocumentAcquirer::new(client, config.extension.clone());
            if let Some(renderer) = renderer {
                acquirer = acquirer.with_renderer(renderer);
            }
            Ok(Box::new(acquirer))
        }
        "command" => {
            if config.command.is_empty() {
                return Err(AdmitBotError::config(
                    "acquirer = \"command\" requires a non-empty `command` list",
                ));
            }
            Ok(Box::new(CommandDocumentAcquirer::new(
                config.command.clone(),
                Duration::from_secs(config.command_timeout_secs),
            )))
        }
        other => Err(AdmitBotError::config(format!(
            "unknown acquirer '{other}': expected 'links' or 'command'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Link acquirer
// ---------------------------------------------------------------------------

/// Downloads the first document linked from the program page.
///
/// The plain page is scanned first; with a renderer attached, the
/// rendered page is scanned when the plain one yields no link.
pub struct LinkDocumentAcquirer {
    client: Client,
    extension: String,
    renderer: Option<Box<dyn PageRenderer>>,
}

impl LinkDocumentAcquirer {
    pub fn new(client: Client, extension: impl Into<String>) -> Self {
        Self {
            client,
            extension: extension.into(),
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    fn document_link(&self, html: &str, base: &Url) -> Option<Url> {
        extract_links(html, base)
            .into_iter()
            .find(|link| has_extension(link.path(), &self.extension))
    }

    async fn find_document_link(&self, program: &Program) -> Result<Url> {
        let static_err = match self.get_bytes(&program.url).await {
            Ok(page) => {
                let html = String::from_utf8_lossy(&page);
                if let Some(link) = self.document_link(&html, &program.url) {
                    return Ok(link);
                }
                AdmitBotError::Acquisition(format!(
                    "{}: no .{} link on page",
                    program.url, self.extension
                ))
            }
            Err(e) => e,
        };

        let Some(renderer) = &self.renderer else {
            return Err(static_err);
        };

        debug!(error = %static_err, "scanning rendered page for document link");
        let html = renderer.render(&program.url).await?;
        self.document_link(&html, &program.url).ok_or_else(|| {
            AdmitBotError::Acquisition(format!(
                "{}: no .{} link on rendered page",
                program.url, self.extension
            ))
        })
    }

    async fn get_bytes(&self, url: &Url) -> Result<Vec<u8>> {
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

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AdmitBotError::Network(format!("{url}: body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DocumentAcquirer for LinkDocumentAcquirer {
    #[instrument(skip_all, fields(program = %program.name))]
    async fn acquire(&self, program: &Program, dir: &Path) -> Result<()> {
        let link = self.find_document_link(program).await?;

        debug!(%link, "downloading document");
        let bytes = self.get_bytes(&link).await?;

        let target = unique_path(dir, &file_name_for(&link, &program.name, &self.extension));
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| AdmitBotError::io(&target, e))?;

        info!(path = ?target, bytes = bytes.len(), "document downloaded");
        Ok(())
    }
}

/// Local file name for a downloaded document: the program slug joined
/// with the URL's last path segment, or the slug alone when the URL has
/// none. Programs linking to equally named files get distinct names.
fn file_name_for(link: &Url, program: &str, extension: &str) -> String {
    let slug = slugify(program);
    let segment = link
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty() && !s.contains(['/', '\\']) && *s != "..");

    match segment {
        Some(s) => format!("{slug}-{s}"),
        None => format!("{slug}.{extension}"),
    }
}

/// `dir/name`, or `dir/<stem>-N.<ext>` if that file already exists.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (name, String::new()),
    };
    (2..)
        .map(|n| dir.join(format!("{stem}-{n}{ext}")))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

// ---------------------------------------------------------------------------
// Command acquirer
// ---------------------------------------------------------------------------

/// Runs an external browser-automation command per program.
///
/// `{url}` and `{dir}` in the argv template are replaced with the program
/// URL and the staging directory.
pub struct CommandDocumentAcquirer {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandDocumentAcquirer {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }

    fn expand(&self, program: &Program, dir: &Path) -> Vec<String> {
        let dir = dir.display().to_string();
        self.argv
            .iter()
            .map(|arg| arg.replace("{url}", program.url.as_str()).replace("{dir}", &dir))
            .collect()
    }
}

#[async_trait]
impl DocumentAcquirer for CommandDocumentAcquirer {
    #[instrument(skip_all, fields(program = %program.name))]
    async fn acquire(&self, program: &Program, dir: &Path) -> Result<()> {
        let argv = self.expand(program, dir);
        let Some((cmd, args)) = argv.split_first() else {
            return Err(AdmitBotError::config("empty acquisition command"));
        };

        let child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AdmitBotError::Acquisition(format!("failed to spawn `{cmd}`: {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AdmitBotError::Acquisition(format!(
                    "`{cmd}` did not finish within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| AdmitBotError::Acquisition(format!("`{cmd}` wait failed: {e}")))?;

        if !output.status.success() {
            return Err(AdmitBotError::Acquisition(format!(
                "`{cmd}` exited with {}",
                output.status
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Staging directory polling
// ---------------------------------------------------------------------------

/// How long to wait for a download to appear, and how often to look.
#[derive(Debug, Clone, Copy)]
pub struct SettlePolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl SettlePolicy {
    pub fn from_config(config: &DocumentsConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.settle_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }
}

/// Files in `dir` with the tracked extension, sorted by path.
///
/// In-progress downloads (`plan.pdf.crdownload`, `plan.pdf.part`) do not
/// end in the tracked extension and are therefore not listed.
pub fn list_tracked(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| AdmitBotError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AdmitBotError::io(dir, e))?;
        let path = entry.path();
        let is_tracked = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| has_extension(n, extension));
        if is_tracked && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Poll `dir` until a tracked file not in `known` appears or the policy
/// times out. Returns the new files (empty on timeout).
pub async fn wait_for_new_documents(
    dir: &Path,
    extension: &str,
    known: &BTreeSet<PathBuf>,
    policy: SettlePolicy,
) -> Result<Vec<PathBuf>> {
    let deadline = Instant::now() + policy.timeout;

    loop {
        let fresh: Vec<PathBuf> = list_tracked(dir, extension)?
            .into_iter()
            .filter(|p| !known.contains(p))
            .collect();

        if !fresh.is_empty() || Instant::now() >= deadline {
            return Ok(fresh);
        }

        tokio::time::sleep(policy.poll_interval).await;
    }
}

/// Case-insensitive `.{extension}` suffix check.
fn has_extension(name: &str, extension: &str) -> bool {
    name.to_ascii_lowercase()
        .ends_with(&format!(".{}", extension.to_ascii_lowercase()))
}
