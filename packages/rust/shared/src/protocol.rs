//! Collaborator boundaries: the completion API and the remote document store.
//!
//! The request/response types mirror the chat-completions wire format, so a
//! concrete client can serialize them as-is.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::AttachmentId;

// ---------------------------------------------------------------------------
// Completion protocol
// ---------------------------------------------------------------------------

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: Role,
    pub content: String,
    /// Remote document identifiers the model may read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentId>,
}

impl CompletionMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments: Vec::new(),
        }
    }
}

/// A completion request. The model name is the client's concern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<CompletionMessage>,
    pub temperature: f32,
}

/// A single completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

/// Completion response; only the choices are consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

impl CompletionResponse {
    /// Content of the first choice, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Anything that can answer a [`CompletionRequest`].
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;
}

// ---------------------------------------------------------------------------
// Remote document store
// ---------------------------------------------------------------------------

/// A document as listed by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    pub id: AttachmentId,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
}

/// The completion service's file API.
///
/// No idempotency is assumed; callers that need a known state wipe and
/// re-upload.
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync {
    async fn list(&self) -> Result<Vec<RemoteFile>>;

    async fn delete(&self, id: &AttachmentId) -> Result<()>;

    async fn upload(&self, filename: &str, bytes: Vec<u8>, purpose: &str) -> Result<AttachmentId>;
}
