//! Core domain logic for admitbot.
//!
//! This crate ties page fetching and document sync together into the
//! startup [`pipeline`], and drives conversations through the
//! [`conversation`] state machine and the [`answer`] engine.

pub mod answer;
pub mod conversation;
pub mod pipeline;

pub use answer::{AnswerEngine, DEFAULT_TEMPERATURE, SYSTEM_PROMPT};
pub use conversation::{
    ChatId, ChatTransport, ConversationController, ConversationState, Inbound, SentMessage,
};
pub use pipeline::{Prepared, ProgressReporter, SilentProgress, prepare};
