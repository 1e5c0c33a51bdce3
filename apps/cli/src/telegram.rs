//! Telegram Bot API transport: long polling in, `sendMessage` out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

use admitbot_core::{ChatId, ChatTransport, ConversationController, SentMessage};
use admitbot_shared::{AdmitBotError, Result, TelegramConfig};

/// Longest text a single `sendMessage` accepts.
pub(crate) const MESSAGE_LIMIT: usize = 4096;

/// Pause after a failed `getUpdates` before polling again.
const RETRY_DELAY: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Chat {
    pub id: i64,
}

// ---------------------------------------------------------------------------
// Bot
// ---------------------------------------------------------------------------

pub(crate) struct TelegramBot {
    http: Client,
    /// `<api_url>/bot<token>`
    endpoint: String,
    poll_timeout: u64,
}

impl TelegramBot {
    pub(crate) fn new(config: &TelegramConfig, token: &str) -> Result<Self> {
        // The HTTP timeout must outlast the long-poll timeout.
        let http = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()
            .map_err(|e| AdmitBotError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/bot{token}", config.api_url.trim_end_matches('/')),
            poll_timeout: config.poll_timeout_secs,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .http
            .post(format!("{}/{method}", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| AdmitBotError::Transport(format!("{method} failed: {}", e.without_url())))?;

        let status = response.status();
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| AdmitBotError::Transport(format!("{method}: invalid response ({status}): {e}")))?;

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(AdmitBotError::Transport(format!(
                "{method} rejected ({status}): {}",
                description.unwrap_or_else(|| "no description".into())
            ))),
        }
    }

    pub(crate) async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": self.poll_timeout,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    /// Fetch one batch of updates and hand each text message to the
    /// controller. Returns the next offset.
    pub(crate) async fn poll_once(
        &self,
        controller: &mut ConversationController,
        offset: i64,
    ) -> Result<i64> {
        let mut next = offset;

        for update in self.get_updates(offset).await? {
            next = next.max(update.update_id + 1);

            let Some(Message {
                chat,
                text: Some(text),
                ..
            }) = update.message
            else {
                continue;
            };

            if let Err(e) = controller.handle(self, chat.id, &text).await {
                warn!(chat = chat.id, error = %e, "failed to handle message");
            }
        }

        Ok(next)
    }

    /// Poll until Ctrl-C.
    pub(crate) async fn run(&self, controller: &mut ConversationController) -> Result<()> {
        info!("bot started, polling for updates");
        let mut offset = 0;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    return Ok(());
                }
                polled = self.poll_once(controller, offset) => match polled {
                    Ok(next) => offset = next,
                    Err(e) => {
                        warn!(error = %e, "polling failed, retrying");
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                },
            }
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramBot {
    async fn reply(&self, chat: ChatId, text: &str) -> Result<SentMessage> {
        let mut last = None;

        for chunk in split_message(text, MESSAGE_LIMIT) {
            let sent: Message = self
                .call("sendMessage", json!({ "chat_id": chat, "text": chunk }))
                .await?;
            last = Some(SentMessage {
                chat,
                message_id: sent.message_id,
            });
        }

        debug!(chat, chars = text.chars().count(), "reply sent");
        last.ok_or_else(|| AdmitBotError::Transport("refusing to send an empty message".into()))
    }

    async fn delete(&self, message: SentMessage) -> Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": message.chat, "message_id": message.message_id }),
            )
            .await?;
        Ok(())
    }
}

/// Split `text` into chunks of at most `limit` characters, breaking on
/// line boundaries where possible. Empty text yields no chunks.
pub(crate) fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > limit {
            // A single overlong line: hard-split it.
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                if piece.len() == limit {
                    chunks.push(piece.iter().collect());
                } else {
                    current = piece.iter().collect();
                    current_len = piece.len();
                }
            }
            continue;
        }

        current.push_str(line);
        current_len += line_len;
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}
