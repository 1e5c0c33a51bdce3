//! Local stdin/stdout chat for trying the bot without Telegram.

use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use admitbot_core::{ChatId, ChatTransport, ConversationController, SentMessage};
use admitbot_shared::{AdmitBotError, Result};

/// The single chat the console talks in.
pub(crate) const CONSOLE_CHAT: ChatId = 0;

/// Writes replies to an output stream. Acknowledgements cannot be
/// unprinted, so `delete` only marks them as done.
pub(crate) struct ConsoleTransport<W> {
    out: Mutex<W>,
    next_id: AtomicI64,
}

impl<W: Write + Send> ConsoleTransport<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            next_id: AtomicI64::new(1),
        }
    }

    fn write(&self, text: &str) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| AdmitBotError::Transport("console output poisoned".into()))?;
        writeln!(out, "{text}\n")
            .and_then(|()| out.flush())
            .map_err(|e| AdmitBotError::Transport(format!("failed to write reply: {e}")))
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send> ChatTransport for ConsoleTransport<W> {
    async fn reply(&self, chat: ChatId, text: &str) -> Result<SentMessage> {
        self.write(&format!("bot> {text}"))?;
        Ok(SentMessage {
            chat,
            message_id: self.next_id.fetch_add(1, Ordering::Relaxed),
        })
    }

    async fn delete(&self, _message: SentMessage) -> Result<()> {
        Ok(())
    }
}

/// Read lines from stdin until EOF, handling each as a message.
pub(crate) async fn run(controller: &mut ConversationController) -> Result<()> {
    let transport = ConsoleTransport::new(std::io::stdout());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Type a question, /help for commands, Ctrl-D to quit.\n");

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| AdmitBotError::Transport(format!("failed to read stdin: {e}")))?
    {
        if line.trim().is_empty() {
            continue;
        }
        controller.handle(&transport, CONSOLE_CHAT, &line).await?;
    }

    Ok(())
}
