//! Per-chat conversation state machine, independent of the chat transport.
//!
//! ```text
//!            /recommend                      free text
//!   Idle ───────────────▶ AwaitingBackground ─────────▶ Idle  (recommendation)
//!    ▲  ◀──────────────────────┘  /cancel
//!    └─ free text: answer with the aggregate context, stay Idle
//! ```
//!
//! `/start` and `/help` are answered in every state and never change it.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use admitbot_crawler::AggregateContext;
use admitbot_shared::Result;

use crate::answer::AnswerEngine;

// ---------------------------------------------------------------------------
// Transport boundary
// ---------------------------------------------------------------------------

/// Transport-level chat identifier.
pub type ChatId = i64;

/// Handle to a message the bot sent, used to delete it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SentMessage {
    pub chat: ChatId,
    pub message_id: i64,
}

/// Outbound side of a chat transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn reply(&self, chat: ChatId, text: &str) -> Result<SentMessage>;
    async fn delete(&self, message: SentMessage) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Start,
    Help,
    Recommend,
    Cancel,
    /// A command this bot does not know.
    Unknown(String),
    Text(String),
}

impl Inbound {
    /// Classify a message. Commands may carry a `@botname` suffix and
    /// trailing arguments, both ignored.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let Some(command) = trimmed.strip_prefix('/') else {
            return Self::Text(trimmed.to_string());
        };

        let word = command.split_whitespace().next().unwrap_or_default();
        let name = word.split('@').next().unwrap_or_default();

        match name.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "recommend" => Self::Recommend,
            "cancel" => Self::Cancel,
            _ => Self::Unknown(name.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

pub const BACKGROUND_PROMPT: &str = "To pick elective courses for you, tell me about yourself:\n\n\
- Your education (undergraduate major)\n\
- Work experience\n\
- Skills and technologies you know\n\
- What interests you in AI\n\n\
Send /cancel to stop.";

pub const CANCELLED: &str = "Recommendations cancelled.";

pub const PROCESSING: &str = "Processing your request, this may take a moment...";

pub const ANALYZING: &str = "Analyzing the curricula and picking courses for you...";

pub const RECOMMENDATION_PREFIX: &str = "Based on your profile, I recommend:\n\n";

/// The question sent to the model for a recommendation.
pub fn recommendation_question(background: &str) -> String {
    format!(
        "Based on my background ({background}), recommend 3-4 elective courses \
         from the curricula of the master's programs that suit me best. \
         For each course explain why it is a good fit."
    )
}

fn start_text(programs: &[String]) -> String {
    format!(
        "Hi! I'm the admissions consultant for the AI master's programs: {}.\n\n\
         Ask me anything about admission, curricula or courses, \
         or send /recommend to get elective course suggestions. \
         /help lists everything I can do.",
        programs.join(", ")
    )
}

fn help_text(programs: &[String]) -> String {
    let mut text = String::from("I can answer questions about these master's programs:\n");
    for name in programs {
        text.push_str("- ");
        text.push_str(name);
        text.push('\n');
    }
    text.push_str(
        "\nCommands:\n\
         /start - greeting\n\
         /help - this message\n\
         /recommend - elective course recommendations\n\
         /cancel - stop the recommendation dialogue\n\n\
         Or just ask a question, for example: \"Which entrance exams are required?\"",
    );
    text
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Conversation state of one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingBackground,
}

/// Routes inbound messages to the [`AnswerEngine`] according to each
/// chat's [`ConversationState`].
///
/// Only chats inside the recommendation dialogue have an entry; a chat
/// without one is idle.
pub struct ConversationController {
    engine: AnswerEngine,
    context: AggregateContext,
    programs: Vec<String>,
    sessions: HashMap<ChatId, ConversationState>,
}

impl ConversationController {
    pub fn new(engine: AnswerEngine, context: AggregateContext, programs: Vec<String>) -> Self {
        Self {
            engine,
            context,
            programs,
            sessions: HashMap::new(),
        }
    }

    pub fn state(&self, chat: ChatId) -> ConversationState {
        self.sessions.get(&chat).copied().unwrap_or_default()
    }

    /// Number of chats currently inside the recommendation dialogue.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn engine(&self) -> &AnswerEngine {
        &self.engine
    }

    /// Handle one inbound message. Only transport failures are returned.
    #[instrument(skip_all, fields(chat = chat))]
    pub async fn handle(
        &mut self,
        transport: &dyn ChatTransport,
        chat: ChatId,
        text: &str,
    ) -> Result<()> {
        let inbound = Inbound::parse(text);
        let state = self.state(chat);
        debug!(?state, ?inbound, "inbound message");

        match (state, inbound) {
            (_, Inbound::Start) => {
                transport.reply(chat, &start_text(&self.programs)).await?;
            }
            (_, Inbound::Help) => {
                transport.reply(chat, &help_text(&self.programs)).await?;
            }
            (_, Inbound::Recommend) => {
                self.sessions.insert(chat, ConversationState::AwaitingBackground);
                transport.reply(chat, BACKGROUND_PROMPT).await?;
            }
            (ConversationState::AwaitingBackground, Inbound::Cancel) => {
                self.sessions.remove(&chat);
                transport.reply(chat, CANCELLED).await?;
            }
            (ConversationState::Idle, Inbound::Cancel) => {}
            (_, Inbound::Unknown(command)) => {
                debug!(%command, "ignoring unknown command");
            }
            (ConversationState::AwaitingBackground, Inbound::Text(background)) => {
                // Leave the dialogue first so a transport failure cannot
                // strand the chat in it.
                self.sessions.remove(&chat);
                info!("producing recommendation");

                let question = recommendation_question(&background);
                let answer = self.answer_with_ack(transport, chat, ANALYZING, &question, "").await?;
                transport
                    .reply(chat, &format!("{RECOMMENDATION_PREFIX}{answer}"))
                    .await?;
            }
            (ConversationState::Idle, Inbound::Text(question)) => {
                if question.is_empty() {
                    return Ok(());
                }
                let context = self.context.clone();
                let answer = self
                    .answer_with_ack(transport, chat, PROCESSING, &question, context.as_str())
                    .await?;
                transport.reply(chat, &answer).await?;
            }
        }

        Ok(())
    }

    /// Send `ack`, ask the engine, then delete `ack` whatever the outcome.
    async fn answer_with_ack(
        &self,
        transport: &dyn ChatTransport,
        chat: ChatId,
        ack: &str,
        question: &str,
        context: &str,
    ) -> Result<String> {
        let sent = transport.reply(chat, ack).await?;
        let answer = self.engine.answer(question, context).await;

        if let Err(e) = transport.delete(sent).await {
            warn!(error = %e, message_id = sent.message_id, "failed to delete acknowledgement");
        }

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use admitbot_shared::{
        AdmitBotError, AttachmentId, CompletionChoice, CompletionClient, CompletionMessage,
        CompletionRequest, CompletionResponse, RemoteDocumentSet,
    };

    use super::*;

    // -- fakes --------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Reply(ChatId, String),
        Delete(i64),
    }

    #[derive(Default)]
    struct RecordingTransport {
        events: Mutex<Vec<Event>>,
        next_id: Mutex<i64>,
    }

    impl RecordingTransport {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn replies(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Reply(_, text) => Some(text),
                    Event::Delete(_) => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn reply(&self, chat: ChatId, text: &str) -> Result<SentMessage> {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            self.events
                .lock()
                .unwrap()
                .push(Event::Reply(chat, text.to_string()));
            Ok(SentMessage {
                chat,
                message_id: *next,
            })
        }

        async fn delete(&self, message: SentMessage) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push(Event::Delete(message.message_id));
            Ok(())
        }
    }

    struct RecordingClient {
        requests: Mutex<Vec<CompletionRequest>>,
        fail: bool,
    }

    impl RecordingClient {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn user_messages(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.messages[1].content.clone())
                .collect()
        }
    }

    #[async_trait]
    impl CompletionClient for RecordingClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(AdmitBotError::Completion("connection reset".into()));
            }
            Ok(CompletionResponse {
                choices: vec![CompletionChoice {
                    message: CompletionMessage::user("model answer"),
                }],
            })
        }
    }

    const CHAT: ChatId = 42;

    fn controller(client: Arc<RecordingClient>) -> ConversationController {
        let attachments: RemoteDocumentSet = [AttachmentId::from("file-1")].into_iter().collect();
        let engine = AnswerEngine::new(client, attachments, 0.1);
        ConversationController::new(
            engine,
            AggregateContext::from("AI program page:\nabout AI".to_string()),
            vec!["AI".into(), "AI Product".into()],
        )
    }

    // -- tests --------------------------------------------------------------

    #[test]
    fn parse_commands() {
        assert_eq!(Inbound::parse("/start"), Inbound::Start);
        assert_eq!(Inbound::parse("/help@admit_bot"), Inbound::Help);
        assert_eq!(Inbound::parse(" /Recommend now "), Inbound::Recommend);
        assert_eq!(Inbound::parse("/cancel"), Inbound::Cancel);
        assert_eq!(Inbound::parse("/weather"), Inbound::Unknown("weather".into()));
        assert_eq!(
            Inbound::parse("  What exams?  "),
            Inbound::Text("What exams?".into())
        );
    }

    #[tokio::test]
    async fn idle_question_uses_aggregate_context() {
        let client = RecordingClient::new(false);
        let mut controller = controller(client.clone());
        let transport = RecordingTransport::default();

        controller
            .handle(&transport, CHAT, "What exams are required?")
            .await
            .unwrap();

        let messages = client.user_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0],
            "Website context: AI program page:\nabout AI\n\nQuestion: What exams are required?"
        );
        assert_eq!(
            transport.events(),
            vec![
                Event::Reply(CHAT, PROCESSING.into()),
                Event::Delete(1),
                Event::Reply(CHAT, "model answer".into()),
            ]
        );
        assert_eq!(controller.state(CHAT), ConversationState::Idle);
    }

    #[tokio::test]
    async fn acknowledgement_deleted_on_failure() {
        let client = RecordingClient::new(true);
        let mut controller = controller(client.clone());
        let transport = RecordingTransport::default();

        controller.handle(&transport, CHAT, "Hello?").await.unwrap();

        let events = transport.events();
        assert_eq!(events[1], Event::Delete(1));
        match &events[2] {
            Event::Reply(_, text) => {
                assert!(text.starts_with("Sorry"));
                assert!(text.contains("connection reset"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn recommendation_flow() {
        let client = RecordingClient::new(false);
        let mut controller = controller(client.clone());
        let transport = RecordingTransport::default();

        controller.handle(&transport, CHAT, "/recommend").await.unwrap();
        assert_eq!(controller.state(CHAT), ConversationState::AwaitingBackground);
        assert_eq!(transport.replies(), vec![BACKGROUND_PROMPT.to_string()]);

        controller
            .handle(&transport, CHAT, "BSc in physics, Python, two years in ML")
            .await
            .unwrap();

        assert_eq!(controller.state(CHAT), ConversationState::Idle);
        assert_eq!(controller.active_sessions(), 0);

        let messages = client.user_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Website context: \n\nQuestion: "));
        assert!(messages[0].contains("(BSc in physics, Python, two years in ML)"));

        let replies = transport.replies();
        assert_eq!(replies[1], ANALYZING);
        assert_eq!(replies[2], format!("{RECOMMENDATION_PREFIX}model answer"));
        assert!(transport.events().contains(&Event::Delete(2)));

        // The dialogue is over, so a later cancel does nothing.
        controller.handle(&transport, CHAT, "/cancel").await.unwrap();
        assert_eq!(transport.replies().len(), 3);
    }

    #[tokio::test]
    async fn cancel_leaves_dialogue_without_answering() {
        let client = RecordingClient::new(false);
        let mut controller = controller(client.clone());
        let transport = RecordingTransport::default();

        controller.handle(&transport, CHAT, "/recommend").await.unwrap();
        controller.handle(&transport, CHAT, "/cancel").await.unwrap();

        assert_eq!(controller.state(CHAT), ConversationState::Idle);
        assert_eq!(transport.replies()[1], CANCELLED);
        assert!(client.user_messages().is_empty());
    }

    #[tokio::test]
    async fn idle_cancel_emits_nothing() {
        let client = RecordingClient::new(false);
        let mut controller = controller(client.clone());
        let transport = RecordingTransport::default();

        controller.handle(&transport, CHAT, "/cancel").await.unwrap();
        controller.handle(&transport, CHAT, "/unknown").await.unwrap();

        assert!(transport.events().is_empty());
        assert!(client.user_messages().is_empty());
    }

    #[tokio::test]
    async fn help_keeps_state() {
        let client = RecordingClient::new(false);
        let mut controller = controller(client.clone());
        let transport = RecordingTransport::default();

        controller.handle(&transport, CHAT, "/recommend").await.unwrap();
        controller.handle(&transport, CHAT, "/help").await.unwrap();
        controller.handle(&transport, CHAT, "/start").await.unwrap();

        assert_eq!(controller.state(CHAT), ConversationState::AwaitingBackground);
        let replies = transport.replies();
        assert!(replies[1].contains("- AI Product\n"));
        assert!(replies[2].contains("AI, AI Product"));
    }

    #[tokio::test]
    async fn chats_are_independent() {
        let client = RecordingClient::new(false);
        let mut controller = controller(client.clone());
        let transport = RecordingTransport::default();

        controller.handle(&transport, 1, "/recommend").await.unwrap();
        controller.handle(&transport, 2, "What is the tuition?").await.unwrap();

        assert_eq!(controller.state(1), ConversationState::AwaitingBackground);
        assert_eq!(controller.state(2), ConversationState::Idle);
        assert!(client.user_messages()[0].contains("AI program page"));
    }
}
