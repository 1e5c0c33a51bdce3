//! Curriculum document acquisition and remote store reconciliation.
//!
//! This crate provides:
//! - [`acquire`] — the [`DocumentAcquirer`] boundary, its link-following and
//!   external-command implementations, and staging-directory polling
//! - [`sync`] — [`DocumentSyncManager`], the full wipe-and-reupload sync

pub mod acquire;
pub mod sync;

pub use acquire::{
    CommandDocumentAcquirer, DocumentAcquirer, LinkDocumentAcquirer, SettlePolicy,
    acquirer_from_config, list_tracked, wait_for_new_documents,
};
pub use sync::{DocumentSyncManager, SyncReport, UPLOAD_PURPOSE};
