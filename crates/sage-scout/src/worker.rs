//! The batch ingestion run.
//!
//! One invocation fetches catalog items newer than the watermark, filters
//! out already-processed ids, and pushes the remainder through download and
//! submission under bounded concurrency. The watermark only advances when
//! something was actually delivered, and state is persisted atomically at
//! the end of the run.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use sage::domain::ScoutItem;
use sage::error::{Error, Result};

use crate::config::ScoutConfig;
use crate::destination::BookDestination;
use crate::source::BookSource;
use crate::state::ScoutState;

/// Outcome counters for one run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub submitted: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Drives one batch ingestion cycle.
pub struct WorkerService {
    config: ScoutConfig,
    source: Arc<dyn BookSource>,
    destination: Arc<dyn BookDestination>,
    state: Arc<ScoutState>,
}

impl WorkerService {
    pub fn new(
        config: ScoutConfig,
        source: Arc<dyn BookSource>,
        destination: Arc<dyn BookDestination>,
        state: Arc<ScoutState>,
    ) -> Self {
        Self {
            config,
            source,
            destination,
            state,
        }
    }

    /// Execute one batch run.
    ///
    /// # Errors
    ///
    /// Fails on catalog fetch errors and on a failed state save; individual
    /// item failures are counted and logged, not propagated.
    pub async fn run(&self) -> Result<RunReport> {
        // The watermark floor is whichever is newer: configuration or the
        // persisted state.
        let since = self.config.since_timestamp.max(self.state.watermark());
        info!(since, "starting batch ingestion");

        let items = self.source.fetch_new_items(since).await?;
        let fetched = items.len();
        if items.is_empty() {
            info!("no new items found");
            return Ok(RunReport::default());
        }

        let mut actionable: Vec<ScoutItem> = Vec::new();
        let mut skipped = 0usize;
        for item in items {
            if self.state.is_processed(&item.id) {
                skipped += 1;
                continue;
            }
            actionable.push(item);
        }

        if self.config.batch_size > 0 && actionable.len() > self.config.batch_size {
            info!(
                batch_size = self.config.batch_size,
                available = actionable.len(),
                "limiting batch"
            );
            actionable.truncate(self.config.batch_size);
        }

        info!(count = actionable.len(), skipped, "processing items");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let delay = std::time::Duration::from_millis(self.config.delay_ms);

        let mut handles = Vec::with_capacity(actionable.len());
        for item in actionable {
            let semaphore = Arc::clone(&semaphore);
            let source = Arc::clone(&self.source);
            let destination = Arc::clone(&self.destination);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| Error::other("semaphore closed"))?;
                // Politeness delay before hitting the source.
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let content = source.download(&item).await?;
                destination.submit(&item, content).await?;
                Ok::<ScoutItem, Error>(item)
            }));
        }

        let mut report = RunReport {
            fetched,
            skipped,
            ..RunReport::default()
        };
        let mut max_timestamp = since;
        for handle in handles {
            match handle.await {
                Ok(Ok(item)) => {
                    report.submitted += 1;
                    self.state.mark_processed(&item.id);
                    max_timestamp = max_timestamp.max(item.added_at);
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "item processing failed");
                    report.failed += 1;
                }
                Err(err) => {
                    warn!(error = %err, "item task panicked");
                    report.failed += 1;
                }
            }
        }

        if max_timestamp > since {
            self.state.update_watermark(max_timestamp);
        }
        self.state.save()?;

        info!(
            submitted = report.submitted,
            failed = report.failed,
            watermark = self.state.watermark(),
            "batch complete, state saved"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct StaticSource {
        items: Vec<ScoutItem>,
        oversized_ids: Vec<String>,
        downloads: AtomicUsize,
    }

    #[async_trait]
    impl BookSource for StaticSource {
        async fn fetch_new_items(&self, since: i64) -> Result<Vec<ScoutItem>> {
            Ok(self
                .items
                .iter()
                .filter(|i| i.added_at > since)
                .cloned()
                .collect())
        }

        async fn download(&self, item: &ScoutItem) -> Result<Vec<u8>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if self.oversized_ids.contains(&item.id) {
                return Err(Error::invalid_input(format!("item {} exceeds max size", item.id)));
            }
            Ok(vec![1, 2, 3])
        }
    }

    #[derive(Default)]
    struct RecordingDestination {
        submitted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BookDestination for RecordingDestination {
        async fn submit(&self, item: &ScoutItem, _content: Vec<u8>) -> Result<()> {
            self.submitted
                .lock()
                .unwrap()
                .push(item.id.clone());
            Ok(())
        }
    }

    fn item(id: &str, added_at: i64) -> ScoutItem {
        ScoutItem {
            id: id.to_string(),
            title: id.to_string(),
            author: String::new(),
            download_url: format!("http://src/{id}"),
            added_at,
            mime_type: String::new(),
        }
    }

    fn config(state_file: &std::path::Path) -> ScoutConfig {
        ScoutConfig {
            opds_base_url: "http://catalog".into(),
            state_file: state_file.display().to_string(),
            concurrency: 2,
            ..ScoutConfig::default()
        }
    }

    #[tokio::test]
    async fn test_idempotent_poll() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let now = 1_700_000_000i64;

        let source = Arc::new(StaticSource {
            items: vec![item("b1", now - 600), item("b2", now - 300)],
            oversized_ids: vec![],
            downloads: AtomicUsize::new(0),
        });
        let destination = Arc::new(RecordingDestination::default());
        let state = Arc::new(ScoutState::load(&state_path).unwrap());

        let worker = WorkerService::new(
            config(&state_path),
            Arc::clone(&source) as _,
            Arc::clone(&destination) as _,
            Arc::clone(&state),
        );

        // First run: both items submitted, watermark at the newer item.
        let report = worker.run().await.unwrap();
        assert_eq!(report.submitted, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(state.watermark(), now - 300);
        assert!(state.is_processed("b1"));
        assert!(state.is_processed("b2"));

        // Second run against the unchanged feed: nothing new.
        let state = Arc::new(ScoutState::load(&state_path).unwrap());
        let worker = WorkerService::new(
            config(&state_path),
            source as _,
            destination as _,
            Arc::clone(&state),
        );
        let report = worker.run().await.unwrap();
        assert_eq!(report.submitted, 0);
        assert_eq!(state.watermark(), now - 300);
    }

    #[tokio::test]
    async fn test_failed_item_is_not_marked_processed() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let now = 1_700_000_000i64;

        let source = Arc::new(StaticSource {
            items: vec![item("ok", now - 100), item("big", now - 50)],
            oversized_ids: vec!["big".to_string()],
            downloads: AtomicUsize::new(0),
        });
        let destination = Arc::new(RecordingDestination::default());
        let state = Arc::new(ScoutState::load(&state_path).unwrap());

        let worker = WorkerService::new(
            config(&state_path),
            source as _,
            destination as _,
            Arc::clone(&state),
        );
        let report = worker.run().await.unwrap();

        assert_eq!(report.submitted, 1);
        assert_eq!(report.failed, 1);
        assert!(state.is_processed("ok"));
        assert!(!state.is_processed("big"));
        // The failed item does not advance the watermark past the
        // successful one.
        assert_eq!(state.watermark(), now - 100);
    }

    #[tokio::test]
    async fn test_batch_size_limits_run() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let now = 1_700_000_000i64;

        let source = Arc::new(StaticSource {
            items: (0..5).map(|i| item(&format!("b{i}"), now - 100 + i)).collect(),
            oversized_ids: vec![],
            downloads: AtomicUsize::new(0),
        });
        let destination = Arc::new(RecordingDestination::default());
        let state = Arc::new(ScoutState::load(&state_path).unwrap());

        let mut cfg = config(&state_path);
        cfg.batch_size = 2;
        let worker = WorkerService::new(cfg, Arc::clone(&source) as _, destination as _, state);
        let report = worker.run().await.unwrap();

        assert_eq!(report.submitted, 2);
        assert_eq!(source.downloads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_config_watermark_floor_applies() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let now = 1_700_000_000i64;

        let source = Arc::new(StaticSource {
            items: vec![item("old", now - 1000), item("new", now - 10)],
            oversized_ids: vec![],
            downloads: AtomicUsize::new(0),
        });
        let destination = Arc::new(RecordingDestination::default());
        let state = Arc::new(ScoutState::load(&state_path).unwrap());

        let mut cfg = config(&state_path);
        cfg.since_timestamp = now - 500;
        let worker = WorkerService::new(cfg, source as _, Arc::clone(&destination) as _, state);
        let report = worker.run().await.unwrap();

        // Only the item newer than the configured floor is processed.
        assert_eq!(report.submitted, 1);
        assert_eq!(destination.submitted.lock().unwrap().as_slice(), ["new"]);
    }
}
