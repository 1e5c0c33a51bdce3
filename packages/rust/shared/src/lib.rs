//! Shared types, error model, configuration, and collaborator boundaries
//! for admitbot.
//!
//! This crate is the foundation depended on by all other admitbot crates.
//! It provides:
//! - [`AdmitBotError`] — the unified error type
//! - Domain types ([`Program`], [`AttachmentId`], [`RemoteDocumentSet`])
//! - Configuration ([`AppConfig`], config loading, secret resolution)
//! - The completion and remote-store boundaries ([`CompletionClient`],
//!   [`RemoteDocumentStore`])

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DocumentsConfig, FetchConfig, GigaChatConfig, ProgramEntry, TelegramConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, resolve_secret,
};
pub use error::{AdmitBotError, Result};
pub use protocol::{
    CompletionChoice, CompletionClient, CompletionMessage, CompletionRequest, CompletionResponse,
    RemoteDocumentStore, RemoteFile, Role,
};
pub use types::{AttachmentId, Program, RemoteDocumentSet};
