//! Startup pipeline: program pages → aggregate context → document sync.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use admitbot_crawler::{AggregateContext, ContentCache};
use admitbot_documents::{DocumentSyncManager, SyncReport};
use admitbot_shared::{Program, Result};

/// What the bot needs to start answering.
#[derive(Debug)]
pub struct Prepared {
    /// Labelled page text of every program that could be fetched.
    pub context: AggregateContext,
    /// Outcome of the initial document sync.
    pub sync: SyncReport,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting startup status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each program page fetch.
    fn page_fetched(&self, program: &str, found: bool, current: usize, total: usize);
    /// Called when startup completes.
    fn done(&self, prepared: &Prepared);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_fetched(&self, _program: &str, _found: bool, _current: usize, _total: usize) {}
    fn done(&self, _prepared: &Prepared) {}
}

/// Fetch every program page, build the aggregate context, then run one
/// full document sync.
///
/// Page failures only shrink the context and sync failures only shrink
/// the attachment set. The one hard error is an unusable staging
/// directory.
#[instrument(skip_all, fields(programs = programs.len()))]
pub async fn prepare(
    programs: &mut [Program],
    cache: &mut ContentCache,
    sync: &mut DocumentSyncManager,
    progress: &dyn ProgressReporter,
) -> Result<Prepared> {
    let start = Instant::now();

    // --- Phase 1: program pages ---
    progress.phase("Fetching program pages");
    let total = programs.len();
    for (i, program) in programs.iter().enumerate() {
        let found = cache.get(&program.url).await.is_some();
        progress.page_fetched(&program.name, found, i + 1, total);
    }

    // Served from the cache filled above.
    let context = cache.collect_all(programs).await;
    if context.is_empty() {
        warn!("no program page could be fetched, answering from documents only");
    }

    // --- Phase 2: documents ---
    progress.phase("Synchronizing curriculum documents");
    let report = sync.sync(programs).await?;
    if let Some(error) = &report.error {
        warn!(%error, uploaded = report.remote.len(), "document sync incomplete");
    }

    let prepared = Prepared {
        context,
        sync: report,
        elapsed: start.elapsed(),
    };

    info!(
        context_chars = prepared.context.as_str().len(),
        attachments = prepared.sync.remote.len(),
        elapsed_ms = prepared.elapsed.as_millis() as u64,
        "startup complete"
    );
    progress.done(&prepared);

    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use admitbot_crawler::PageSource;
    use admitbot_documents::{DocumentAcquirer, SettlePolicy};
    use admitbot_shared::{AttachmentId, RemoteDocumentStore, RemoteFile};
    use async_trait::async_trait;
    use url::Url;

    use super::*;

    struct Pages(HashMap<String, String>);

    #[async_trait]
    impl PageSource for Pages {
        async fn fetch(&self, url: &Url) -> Option<String> {
            self.0.get(url.as_str()).cloned()
        }
    }

    /// Writes `<slug>.pdf` for every program.
    struct WritingAcquirer;

    #[async_trait]
    impl DocumentAcquirer for WritingAcquirer {
        async fn acquire(&self, program: &Program, dir: &Path) -> Result<()> {
            let name = format!("{}.pdf", program.name.to_lowercase().replace(' ', "-"));
            std::fs::write(dir.join(name), b"%PDF")
                .map_err(|e| admitbot_shared::AdmitBotError::io(dir, e))
        }
    }

    #[derive(Default)]
    struct Store {
        files: Mutex<Vec<AttachmentId>>,
    }

    #[async_trait]
    impl RemoteDocumentStore for Store {
        async fn list(&self) -> Result<Vec<RemoteFile>> {
            Ok(self
                .files
                .lock()
                .unwrap()
                .iter()
                .map(|id| RemoteFile {
                    id: id.clone(),
                    filename: None,
                    purpose: None,
                })
                .collect())
        }

        async fn delete(&self, id: &AttachmentId) -> Result<()> {
            self.files.lock().unwrap().retain(|f| f != id);
            Ok(())
        }

        async fn upload(
            &self,
            filename: &str,
            _bytes: Vec<u8>,
            _purpose: &str,
        ) -> Result<AttachmentId> {
            let id = AttachmentId::from(format!("remote-{filename}"));
            self.files.lock().unwrap().push(id.clone());
            Ok(id)
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for Recorder {
        fn phase(&self, name: &str) {
            self.events.lock().unwrap().push(format!("phase:{name}"));
        }
        fn page_fetched(&self, program: &str, found: bool, current: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("page:{program}:{found}:{current}/{total}"));
        }
        fn done(&self, _prepared: &Prepared) {
            self.events.lock().unwrap().push("done".into());
        }
    }

    fn staging_dir() -> PathBuf {
        std::env::temp_dir().join(format!("admitbot-pipeline-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn prepare_builds_context_and_syncs() {
        let mut programs = vec![
            Program::new("Alpha", Url::parse("https://example.edu/a").unwrap()),
            Program::new("Beta", Url::parse("https://example.edu/b").unwrap()),
        ];
        let mut cache = ContentCache::new(Box::new(Pages(HashMap::from([(
            "https://example.edu/a".to_string(),
            "Alpha text".to_string(),
        )]))));

        let store = Arc::new(Store::default());
        store.files.lock().unwrap().push(AttachmentId::from("stale"));

        let dir = staging_dir();
        let mut sync = DocumentSyncManager::new(
            &dir,
            "pdf",
            SettlePolicy {
                timeout: Duration::from_millis(200),
                poll_interval: Duration::from_millis(10),
            },
            Box::new(WritingAcquirer),
            store.clone(),
        );
        let progress = Recorder::default();

        let prepared = prepare(&mut programs, &mut cache, &mut sync, &progress)
            .await
            .unwrap();

        assert_eq!(prepared.context.as_str(), "Alpha program page:\nAlpha text");
        assert_eq!(prepared.sync.remote.len(), 2);
        assert!(prepared.sync.is_complete());
        assert!(!store.files.lock().unwrap().contains(&AttachmentId::from("stale")));
        assert_eq!(programs[1].documents.len(), 1);

        // Both pages were fetched exactly once.
        assert_eq!(cache.len(), 2);

        assert_eq!(
            *progress.events.lock().unwrap(),
            vec![
                "phase:Fetching program pages".to_string(),
                "page:Alpha:true:1/2".to_string(),
                "page:Beta:false:2/2".to_string(),
                "phase:Synchronizing curriculum documents".to_string(),
                "done".to_string(),
            ]
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
