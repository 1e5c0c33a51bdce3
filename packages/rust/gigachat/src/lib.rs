//! GigaChat API client.
//!
//! One [`GigaChatClient`] serves both collaborator boundaries: chat
//! completions ([`CompletionClient`](admitbot_shared::CompletionClient)) and
//! the file API ([`RemoteDocumentStore`](admitbot_shared::RemoteDocumentStore)).
//! Access tokens are obtained via OAuth and cached until shortly before
//! they expire.

mod auth;
mod client;

pub use client::GigaChatClient;
