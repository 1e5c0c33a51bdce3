//! Core domain types for tracked programs and remote documents.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

/// One tracked master's program.
///
/// The name and URL come from configuration and never change; `documents`
/// is filled in by document acquisition during sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Display name, used to label the program's context block.
    pub name: String,
    /// Program page URL.
    pub url: Url,
    /// Local curriculum documents acquired for this program.
    pub documents: Vec<PathBuf>,
}

impl Program {
    /// Create a program with no acquired documents yet.
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
            documents: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// AttachmentId
// ---------------------------------------------------------------------------

/// Identifier assigned by the remote store to an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(pub String);

impl AttachmentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttachmentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AttachmentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// RemoteDocumentSet
// ---------------------------------------------------------------------------

/// The attachment identifiers established by the last document sync.
///
/// Only the sync manager mutates this; everyone else gets a clone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteDocumentSet(Vec<AttachmentId>);

impl RemoteDocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[AttachmentId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &AttachmentId) -> bool {
        self.0.contains(id)
    }

    pub fn push(&mut self, id: AttachmentId) {
        self.0.push(id);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<AttachmentId> for RemoteDocumentSet {
    fn from_iter<I: IntoIterator<Item = AttachmentId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
