//! Full-replace reconciliation of the remote document store.
//!
//! A sync always runs the same sequence:
//!
//! 1. Wipe and recreate the local staging directory
//! 2. Acquire each program's document, waiting for it to land
//! 3. Delete every document the remote store lists
//! 4. Clear the in-memory [`RemoteDocumentSet`]
//! 5. Upload every tracked file in the staging directory
//!
//! A failure in steps 3–5 stops the remaining work of those steps, is
//! logged and recorded in the [`SyncReport`]; whatever was already uploaded
//! stays in the set. There is no rollback, so a failure between 3 and 5 can
//! leave the remote store empty.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use admitbot_shared::{
    AdmitBotError, DocumentsConfig, Program, RemoteDocumentSet, RemoteDocumentStore, Result,
};

use crate::acquire::{DocumentAcquirer, SettlePolicy, list_tracked, wait_for_new_documents};

/// Purpose tag sent with every upload.
pub const UPLOAD_PURPOSE: &str = "general";

/// Outcome of one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Tracked files present in the staging directory after acquisition.
    pub staged: Vec<PathBuf>,
    /// Remote documents deleted.
    pub deleted: usize,
    /// The attachment set after the run.
    pub remote: RemoteDocumentSet,
    /// The failure that stopped the remote steps, if any.
    pub error: Option<String>,
}

impl SyncReport {
    /// Whether every staged document made it to the remote store.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.remote.len() == self.staged.len()
    }
}

/// Owns the staging directory and the [`RemoteDocumentSet`].
pub struct DocumentSyncManager {
    staging_dir: PathBuf,
    extension: String,
    settle: SettlePolicy,
    acquirer: Box<dyn DocumentAcquirer>,
    store: Arc<dyn RemoteDocumentStore>,
    remote: RemoteDocumentSet,
}

impl DocumentSyncManager {
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        settle: SettlePolicy,
        acquirer: Box<dyn DocumentAcquirer>,
        store: Arc<dyn RemoteDocumentStore>,
    ) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            extension: extension.into(),
            settle,
            acquirer,
            store,
            remote: RemoteDocumentSet::new(),
        }
    }

    /// Create a manager from the `[documents]` config section.
    pub fn from_config(
        config: &DocumentsConfig,
        acquirer: Box<dyn DocumentAcquirer>,
        store: Arc<dyn RemoteDocumentStore>,
    ) -> Self {
        Self::new(
            &config.staging_dir,
            config.extension.clone(),
            SettlePolicy::from_config(config),
            acquirer,
            store,
        )
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// The attachment set established by the last sync.
    pub fn remote(&self) -> &RemoteDocumentSet {
        &self.remote
    }

    /// Run a full sync. Only a staging-directory failure is returned as an
    /// error; acquisition and remote-store failures end up in the report.
    #[instrument(skip_all, fields(staging_dir = ?self.staging_dir, programs = programs.len()))]
    pub async fn sync(&mut self, programs: &mut [Program]) -> Result<SyncReport> {
        // --- Step 1: fresh staging directory ---
        self.reset_staging_dir()?;

        // --- Step 2: acquire, one program at a time ---
        for program in programs.iter_mut() {
            program.documents = self.acquire_one(program).await?;
        }

        let mut report = SyncReport {
            staged: list_tracked(&self.staging_dir, &self.extension)?,
            ..Default::default()
        };
        info!(staged = report.staged.len(), "acquisition finished");

        // --- Steps 3–5: replace the remote documents ---
        if let Err(e) = self.replace_remote(&mut report).await {
            error!(error = %e, "document sync failed, keeping partial state");
            report.error = Some(e.to_string());
        }

        report.remote = self.remote.clone();
        info!(
            deleted = report.deleted,
            uploaded = report.remote.len(),
            complete = report.is_complete(),
            "document sync finished"
        );
        Ok(report)
    }

    fn reset_staging_dir(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.staging_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AdmitBotError::io(&self.staging_dir, e)),
        }
        std::fs::create_dir_all(&self.staging_dir)
            .map_err(|e| AdmitBotError::io(&self.staging_dir, e))
    }

    /// Acquire one program's document and return the files it produced.
    async fn acquire_one(&self, program: &Program) -> Result<Vec<PathBuf>> {
        let known: BTreeSet<PathBuf> = list_tracked(&self.staging_dir, &self.extension)?
            .into_iter()
            .collect();

        info!(program = %program.name, "acquiring curriculum document");
        let settle = match self.acquirer.acquire(program, &self.staging_dir).await {
            Ok(()) => self.settle,
            Err(e) => {
                warn!(program = %program.name, error = %e, "acquisition failed");
                // Still look once: the collaborator may have failed after the download.
                SettlePolicy {
                    timeout: std::time::Duration::ZERO,
                    ..self.settle
                }
            }
        };

        let fresh =
            wait_for_new_documents(&self.staging_dir, &self.extension, &known, settle).await?;
        if fresh.is_empty() {
            warn!(program = %program.name, "no document appeared, program gets no attachment");
        }
        Ok(fresh)
    }

    async fn replace_remote(&mut self, report: &mut SyncReport) -> Result<()> {
        // --- Step 3: full wipe ---
        let listed = self.store.list().await?;
        for file in &listed {
            self.store.delete(&file.id).await?;
            report.deleted += 1;
        }

        // --- Step 4 ---
        self.remote.clear();

        // --- Step 5: upload ---
        for path in &report.staged {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("document")
                .to_string();
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| AdmitBotError::io(path, e))?;

            let id = self.store.upload(&filename, bytes, UPLOAD_PURPOSE).await?;
            info!(file = %filename, %id, "uploaded document");
            self.remote.push(id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use admitbot_shared::{AttachmentId, RemoteFile};
    use async_trait::async_trait;
    use url::Url;

    use crate::acquire::LinkDocumentAcquirer;

    use super::*;

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    /// In-memory remote store with optional injected failures.
    #[derive(Default)]
    struct MemoryStore {
        files: Mutex<Vec<RemoteFile>>,
        counter: Mutex<usize>,
        fail_list: bool,
        fail_upload_after: Option<usize>,
    }

    impl MemoryStore {
        fn with_files(ids: &[&str]) -> Self {
            let files = ids
                .iter()
                .map(|id| RemoteFile {
                    id: AttachmentId::from(*id),
                    filename: Some(format!("{id}.pdf")),
                    purpose: Some(UPLOAD_PURPOSE.into()),
                })
                .collect();
            Self {
                files: Mutex::new(files),
                ..Default::default()
            }
        }

        fn ids(&self) -> Vec<AttachmentId> {
            self.files.lock().unwrap().iter().map(|f| f.id.clone()).collect()
        }
    }

    #[async_trait]
    impl RemoteDocumentStore for MemoryStore {
        async fn list(&self) -> Result<Vec<RemoteFile>> {
            if self.fail_list {
                return Err(AdmitBotError::RemoteStore("HTTP 500".into()));
            }
            Ok(self.files.lock().unwrap().clone())
        }

        async fn delete(&self, id: &AttachmentId) -> Result<()> {
            self.files.lock().unwrap().retain(|f| &f.id != id);
            Ok(())
        }

        async fn upload(
            &self,
            filename: &str,
            _bytes: Vec<u8>,
            purpose: &str,
        ) -> Result<AttachmentId> {
            let mut counter = self.counter.lock().unwrap();
            if self.fail_upload_after.is_some_and(|limit| *counter >= limit) {
                return Err(AdmitBotError::RemoteStore("quota exceeded".into()));
            }
            *counter += 1;
            let id = AttachmentId(format!("new-{}", *counter));
            self.files.lock().unwrap().push(RemoteFile {
                id: id.clone(),
                filename: Some(filename.into()),
                purpose: Some(purpose.into()),
            });
            Ok(id)
        }
    }

    /// Writes canned files for known programs; fails for the rest.
    struct FakeAcquirer {
        files: HashMap<String, Vec<&'static str>>,
    }

    #[async_trait]
    impl DocumentAcquirer for FakeAcquirer {
        async fn acquire(&self, program: &Program, dir: &Path) -> Result<()> {
            let names = self.files.get(&program.name).ok_or_else(|| {
                AdmitBotError::Acquisition(format!("button not found for {}", program.name))
            })?;
            for name in names {
                std::fs::write(dir.join(name), b"%PDF").map_err(|e| AdmitBotError::io(dir, e))?;
            }
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn staging_dir() -> PathBuf {
        std::env::temp_dir().join(format!("admitbot-sync-test-{}", uuid::Uuid::now_v7()))
    }

    fn programs() -> Vec<Program> {
        vec![
            Program::new("AI", Url::parse("https://example.edu/ai").unwrap()),
            Program::new("AI Product", Url::parse("https://example.edu/ai_product").unwrap()),
        ]
    }

    fn manager(
        dir: &Path,
        files: &[(&str, Vec<&'static str>)],
        store: Arc<MemoryStore>,
    ) -> DocumentSyncManager {
        let acquirer = FakeAcquirer {
            files: files
                .iter()
                .map(|(name, f)| (name.to_string(), f.clone()))
                .collect(),
        };
        let settle = SettlePolicy {
            timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
        };
        DocumentSyncManager::new(dir, "pdf", settle, Box::new(acquirer), store)
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn sync_replaces_all_remote_documents() {
        let dir = staging_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stale.pdf"), b"old").unwrap();

        let store = Arc::new(MemoryStore::with_files(&["old-1", "old-2", "old-3"]));
        let mut sync = manager(
            &dir,
            &[
                ("AI", vec!["ai-plan.pdf"]),
                ("AI Product", vec!["product-plan.pdf", "readme.txt"]),
            ],
            store.clone(),
        );
        let mut programs = programs();

        let report = sync.sync(&mut programs).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.deleted, 3);
        assert_eq!(report.staged.len(), 2);
        assert_eq!(sync.remote().len(), report.staged.len());
        assert_eq!(store.ids(), sync.remote().ids());
        assert!(!dir.join("stale.pdf").exists());
        assert_eq!(programs[0].documents, vec![dir.join("ai-plan.pdf")]);
        assert_eq!(programs[1].documents, vec![dir.join("product-plan.pdf")]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn acquisition_failure_is_tolerated_per_program() {
        let dir = staging_dir();
        let store = Arc::new(MemoryStore::default());
        let mut sync = manager(&dir, &[("AI Product", vec!["product-plan.pdf"])], store.clone());
        let mut programs = programs();

        let report = sync.sync(&mut programs).await.unwrap();

        assert!(report.error.is_none());
        assert_eq!(sync.remote().len(), 1);
        assert!(programs[0].documents.is_empty());
        assert_eq!(programs[1].documents.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn list_failure_leaves_remote_untouched() {
        let dir = staging_dir();
        let store = Arc::new(MemoryStore {
            fail_list: true,
            ..MemoryStore::with_files(&["old-1"])
        });
        let mut sync = manager(&dir, &[("AI", vec!["ai-plan.pdf"])], store.clone());

        let report = sync.sync(&mut programs()).await.unwrap();

        assert!(report.error.as_deref().is_some_and(|e| e.contains("HTTP 500")));
        assert!(sync.remote().is_empty());
        assert_eq!(store.ids(), vec![AttachmentId::from("old-1")]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn upload_failure_keeps_partial_set() {
        let dir = staging_dir();
        let store = Arc::new(MemoryStore {
            fail_upload_after: Some(1),
            ..MemoryStore::with_files(&["old-1"])
        });
        let mut sync = manager(
            &dir,
            &[("AI", vec!["ai-plan.pdf"]), ("AI Product", vec!["product-plan.pdf"])],
            store.clone(),
        );

        let report = sync.sync(&mut programs()).await.unwrap();

        assert!(!report.is_complete());
        assert!(report.error.as_deref().is_some_and(|e| e.contains("quota")));
        assert_eq!(sync.remote().ids(), &[AttachmentId::from("new-1")]);
        assert_eq!(store.ids(), sync.remote().ids());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn resync_drops_previous_attachments() {
        let dir = staging_dir();
        let store = Arc::new(MemoryStore::default());
        let mut sync = manager(&dir, &[("AI", vec!["ai-plan.pdf"])], store.clone());

        sync.sync(&mut programs()).await.unwrap();
        let first = sync.remote().clone();
        sync.sync(&mut programs()).await.unwrap();

        assert_eq!(sync.remote().len(), 1);
        assert!(!sync.remote().contains(&first.ids()[0]));
        assert_eq!(store.ids(), sync.remote().ids());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn equally_named_documents_stay_separate() {
        let server = wiremock::MockServer::start().await;
        for (page, doc, body) in [
            ("/ai", "/ai/files/plan.pdf", "AI-PLAN"),
            ("/prod", "/prod/files/plan.pdf", "PROD-PLAN"),
        ] {
            wiremock::Mock::given(wiremock::matchers::method("GET"))
                .and(wiremock::matchers::path(page))
                .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(format!(
                    r#"<html><body><a href="{doc}">Study plan</a></body></html>"#
                )))
                .mount(&server)
                .await;
            wiremock::Mock::given(wiremock::matchers::method("GET"))
                .and(wiremock::matchers::path(doc))
                .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(body))
                .mount(&server)
                .await;
        }

        let dir = staging_dir();
        let store = Arc::new(MemoryStore::default());
        let settle = SettlePolicy {
            timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
        };
        let acquirer = LinkDocumentAcquirer::new(reqwest::Client::new(), "pdf");
        let mut sync = DocumentSyncManager::new(&dir, "pdf", settle, Box::new(acquirer), store);
        let mut programs = vec![
            Program::new("AI", Url::parse(&format!("{}/ai", server.uri())).unwrap()),
            Program::new("AI Product", Url::parse(&format!("{}/prod", server.uri())).unwrap()),
        ];

        let report = sync.sync(&mut programs).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.staged.len(), 2);
        assert_eq!(sync.remote().len(), 2);
        assert_eq!(programs[0].documents.len(), 1);
        assert_eq!(programs[1].documents.len(), 1);
        assert_eq!(std::fs::read_to_string(&programs[0].documents[0]).unwrap(), "AI-PLAN");
        assert_eq!(std::fs::read_to_string(&programs[1].documents[0]).unwrap(), "PROD-PLAN");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
