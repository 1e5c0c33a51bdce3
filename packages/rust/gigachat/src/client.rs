//! GigaChat REST client: chat completions and the file API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use admitbot_shared::{
    AdmitBotError, AttachmentId, CompletionClient, CompletionRequest, CompletionResponse,
    GigaChatConfig, RemoteDocumentStore, RemoteFile, Result,
};

use crate::auth::TokenProvider;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a CompletionRequest,
}

#[derive(Deserialize)]
struct FileList {
    data: Vec<RemoteFile>,
}

#[derive(Deserialize)]
struct UploadedFile {
    id: AttachmentId,
}

#[derive(Deserialize)]
struct DeletedFile {
    #[serde(default = "default_deleted")]
    deleted: bool,
}

fn default_deleted() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for the GigaChat completion and file APIs.
pub struct GigaChatClient {
    http: Client,
    tokens: TokenProvider,
    base_url: String,
    model: String,
}

impl GigaChatClient {
    /// Create a client from the `[gigachat]` config section and the
    /// authorization key.
    pub fn new(config: &GigaChatConfig, credentials: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| AdmitBotError::Network(format!("failed to build HTTP client: {e}")))?;

        if !config.verify_tls {
            warn!("TLS certificate verification disabled for GigaChat");
        }

        Ok(Self {
            http,
            tokens: TokenProvider::new(
                config.auth_url.clone(),
                credentials,
                config.scope.clone(),
            ),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send an authorized request and decode the JSON response.
    ///
    /// `build` is called again with a fresh token if the first attempt is
    /// rejected with 401. `fail` wraps error messages in the caller's
    /// error variant.
    async fn send<T, B>(&self, build: B, fail: fn(String) -> AdmitBotError) -> Result<T>
    where
        T: DeserializeOwned,
        B: Fn(&Client, &str) -> Result<RequestBuilder>,
    {
        let mut retried = false;

        loop {
            let token = self.tokens.token(&self.http).await?;
            let response = build(&self.http, &token)?
                .send()
                .await
                .map_err(|e| fail(format!("request failed: {e}")))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !retried {
                debug!("access token rejected, refreshing");
                self.tokens.invalidate().await;
                retried = true;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(fail(format!(
                    "HTTP {status}: {}",
                    body.chars().take(200).collect::<String>()
                )));
            }

            return response
                .json()
                .await
                .map_err(|e| fail(format!("invalid response body: {e}")));
        }
    }
}

fn mime_for(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        "application/pdf"
    } else if lower.ends_with(".txt") {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl CompletionClient for GigaChatClient {
    #[instrument(skip_all, fields(model = %self.model, messages = request.messages.len()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let url = self.url("/chat/completions");
        let body = ChatBody {
            model: &self.model,
            request,
        };

        self.send(
            |http, token| Ok(http.post(&url).bearer_auth(token).json(&body)),
            AdmitBotError::Completion,
        )
        .await
    }
}

#[async_trait]
impl RemoteDocumentStore for GigaChatClient {
    async fn list(&self) -> Result<Vec<RemoteFile>> {
        let url = self.url("/files");
        let list: FileList = self
            .send(
                |http, token| Ok(http.get(&url).bearer_auth(token)),
                AdmitBotError::RemoteStore,
            )
            .await?;
        Ok(list.data)
    }

    async fn delete(&self, id: &AttachmentId) -> Result<()> {
        let url = self.url(&format!("/files/{id}/delete"));
        let result: DeletedFile = self
            .send(
                |http, token| Ok(http.post(&url).bearer_auth(token)),
                AdmitBotError::RemoteStore,
            )
            .await?;

        if result.deleted {
            Ok(())
        } else {
            Err(AdmitBotError::RemoteStore(format!("file {id} was not deleted")))
        }
    }

    async fn upload(&self, filename: &str, bytes: Vec<u8>, purpose: &str) -> Result<AttachmentId> {
        let url = self.url("/files");
        let mime = mime_for(filename);

        let uploaded: UploadedFile = self
            .send(
                |http, token| {
                    let part = Part::bytes(bytes.clone())
                        .file_name(filename.to_string())
                        .mime_str(mime)
                        .map_err(|e| AdmitBotError::RemoteStore(format!("bad mime type: {e}")))?;
                    let form = Form::new().part("file", part).text("purpose", purpose.to_string());
                    Ok(http.post(&url).bearer_auth(token).multipart(form))
                },
                AdmitBotError::RemoteStore,
            )
            .await?;

        Ok(uploaded.id)
    }
}
