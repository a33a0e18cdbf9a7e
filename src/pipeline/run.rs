//! One end-to-end scan: walk, diff, extract, write, finalize.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use super::diff::{decide, Decision};
use super::pool::{FatalSlot, ScanTask, WorkerContext, WorkerPool};
use super::queue::TaskQueue;
use super::state::RunState;
use crate::config::Config;
use crate::document::DocumentBuilder;
use crate::error::{Error, WalkError};
use crate::extract::{Dispatcher, ExtractorRegistry};
use crate::storage::{IndexWriter, PreviousSnapshot, RunSummary};
use crate::telemetry::spans;
use crate::walker::{EntryKey, TreeWalker};
use crate::Result;

/// A configured scan, ready to run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
    registry: ExtractorRegistry,
}

impl Pipeline {
    /// Create a pipeline with the built-in extractors.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry: ExtractorRegistry::with_defaults(),
        })
    }

    /// Replace the extractor registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Run the scan on the calling thread, blocking until finalized.
    ///
    /// Per-file failures end up as document statuses. Cancellation through
    /// `state` still produces a finalized, readable index.
    ///
    /// # Errors
    ///
    /// Returns an error if the previous index cannot be read, the output
    /// cannot be created, or an index write fails during the run.
    pub fn run(&self, state: &Arc<RunState>) -> Result<RunSummary> {
        let started = Instant::now();

        let previous = match self.config.previous_index() {
            Some(path) => PreviousSnapshot::load(path)?,
            None => PreviousSnapshot::empty(),
        };

        let writer = Arc::new(IndexWriter::create(
            &self.config.output,
            Uuid::new_v4(),
            &self.config.roots,
            self.config.overwrite,
        )?);
        let _span = spans::run_span(&writer.run_id().to_string()).entered();

        let queue = Arc::new(TaskQueue::new(self.config.queue_capacity()));
        let ctx = WorkerContext {
            dispatcher: Arc::new(Dispatcher::new(
                self.registry.clone(),
                self.config.dispatch_limits(),
            )),
            builder: DocumentBuilder::new(self.config.max_text_len),
            writer: Arc::clone(&writer),
            state: Arc::clone(state),
            fatal: FatalSlot::new(),
        };

        tracing::info!(
            run_id = %writer.run_id(),
            roots = ?self.config.roots,
            workers = self.config.workers,
            previous = previous.len(),
            "Starting scan"
        );

        let pool = match WorkerPool::spawn(self.config.workers, Arc::clone(&queue), &ctx) {
            Ok(pool) => pool,
            Err(e) => {
                state.cancel();
                queue.close();
                return Err(e);
            }
        };

        let produced = self.produce(&previous, &writer, &queue, &ctx);
        stop_workers(produced, &queue, pool, &ctx);

        let summary = writer.finalize(&state.snapshot(), started.elapsed());

        if let Some(fatal) = ctx.fatal.take() {
            if let Err(e) = &summary {
                tracing::error!(error = %e, "Finalize after fatal error also failed");
            }
            return Err(fatal);
        }
        summary
    }

    /// Run on a blocking thread of the tokio runtime.
    ///
    /// # Errors
    ///
    /// Same as [`Pipeline::run`], plus an internal error if the blocking
    /// task panics.
    pub async fn run_async(self, state: Arc<RunState>) -> Result<RunSummary> {
        tokio::task::spawn_blocking(move || self.run(&state))
            .await
            .map_err(|e| Error::internal(format!("scan task failed: {e}")))?
    }

    /// Walk every root and route each entry to the writer or the queue.
    fn produce(
        &self,
        previous: &PreviousSnapshot,
        writer: &IndexWriter,
        queue: &TaskQueue<ScanTask>,
        ctx: &WorkerContext,
    ) -> Result<()> {
        let state = &ctx.state;
        let rules = self.config.walk_rules();
        let budget = self.config.budget();
        let policy = self.config.reuse_policy();
        let mut seen: HashSet<EntryKey> = HashSet::new();

        for root in &self.config.roots {
            if state.is_cancelled() {
                break;
            }

            let walker = match TreeWalker::new(root, &rules, Arc::clone(state)) {
                Ok(walker) => walker,
                Err(Error::Walk(WalkError::RootNotFound { path, reason })) => {
                    tracing::warn!(root = %path, reason = %reason, "Scan root not found");
                    state.traversal_errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Err(e) => return Err(e),
            };

            for entry in walker {
                state.entries_seen.fetch_add(1, Ordering::Relaxed);

                let key = entry.key(self.config.key_mode);
                if !seen.insert(key.clone()) {
                    tracing::debug!(path = %entry.path.display(), key = %key, "Entry already seen this run");
                    continue;
                }

                match decide(&entry, &key, previous, policy) {
                    Decision::Reuse(doc) => {
                        writer.append(&doc)?;
                        state.record_status(doc.status);
                        state.reused.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(path = %doc.path, "Reused");
                    }
                    Decision::Rescan => {
                        let task = ScanTask { entry, key, budget };
                        if let Err(e) = queue.submit(task, state.cancel_flag()) {
                            tracing::debug!(reason = %e, "Stopped submitting tasks");
                            return Ok(());
                        }
                        state.tasks_queued.fetch_add(1, Ordering::Relaxed);
                    }
                }

                if ctx.fatal.is_set() {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

/// Close the queue and wait for the workers.
///
/// A producer error is recorded and the run cancelled before closing, so
/// workers stop claiming queued tasks instead of draining them.
fn stop_workers(
    produced: Result<()>,
    queue: &TaskQueue<ScanTask>,
    pool: WorkerPool,
    ctx: &WorkerContext,
) {
    if let Err(e) = produced {
        tracing::error!(error = %e, "Index write failed, aborting run");
        ctx.fatal.set(e);
        ctx.state.cancel();
    }
    queue.close();
    pool.join();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{
        Budget, CapabilityTag, DispatchLimits, Extraction, ExtractionResult, Extractor,
    };
    use crate::storage::IndexReader;
    use crate::walker::ScanEntry;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Slow(Duration);

    impl Extractor for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn extract(&self, _: &Path, _: CapabilityTag, _: &Budget) -> ExtractionResult {
            std::thread::sleep(self.0);
            ExtractionResult::Success(Extraction::new())
        }
    }

    /// Installs a trigger on the output index that rejects any document
    /// whose path mentions "poison", so the worker's append fails mid-run.
    struct RejectPoison {
        index: PathBuf,
    }

    impl Extractor for RejectPoison {
        fn name(&self) -> &'static str {
            "reject-poison"
        }

        fn extract(&self, _: &Path, _: CapabilityTag, _: &Budget) -> ExtractionResult {
            let conn = rusqlite::Connection::open(&self.index).unwrap();
            conn.busy_timeout(Duration::from_secs(5)).unwrap();
            conn.execute_batch(
                "CREATE TRIGGER IF NOT EXISTS reject_poison BEFORE INSERT ON documents
                 WHEN NEW.path LIKE '%poison%'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
            ExtractionResult::Success(Extraction::new())
        }
    }

    fn config(tmp: &TempDir, output: &str) -> Config {
        Config {
            roots: vec![tmp.path().join("a")],
            output: tmp.path().join(output),
            excludes: vec![".git".into()],
            workers: 2,
            ..Config::default()
        }
    }

    fn tree(tmp: &TempDir) {
        let a = tmp.path().join("a");
        fs::create_dir_all(a.join(".git")).unwrap();
        fs::write(a.join("1.txt"), "x".repeat(100)).unwrap();
        fs::write(a.join("2.bin"), [0u8, 1, 2, 3, 0, 255]).unwrap();
        fs::write(a.join(".git").join("HEAD"), "ref").unwrap();
    }

    #[test]
    fn test_run_writes_summary() {
        let tmp = TempDir::new().unwrap();
        tree(&tmp);

        let summary = Pipeline::new(config(&tmp, "out.db"))
            .unwrap()
            .run(&RunState::new())
            .unwrap();

        assert_eq!(summary.documents.indexed, 1);
        assert_eq!(summary.documents.skipped, 1);
        assert_eq!(summary.documents.errored, 0);
        assert!(!summary.cancelled);

        let reader = IndexReader::open(tmp.path().join("out.db")).unwrap();
        assert_eq!(reader.summary().unwrap(), Some(summary));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(Pipeline::new(Config::default()).is_err());
    }

    #[test]
    fn test_missing_root_is_soft() {
        let tmp = TempDir::new().unwrap();
        tree(&tmp);
        let mut config = config(&tmp, "out.db");
        config.roots.push(PathBuf::from("/definitely/not/here"));

        let summary = Pipeline::new(config).unwrap().run(&RunState::new()).unwrap();
        assert_eq!(summary.traversal_errors, 1);
        assert_eq!(summary.documents.total(), 2);
    }

    #[test]
    fn test_overlapping_roots_deduplicated() {
        let tmp = TempDir::new().unwrap();
        tree(&tmp);
        let mut config = config(&tmp, "out.db");
        config.roots.push(tmp.path().join("a"));

        let summary = Pipeline::new(config).unwrap().run(&RunState::new()).unwrap();
        assert_eq!(summary.documents.total(), 2);
        assert_eq!(summary.entries_seen, 4);
    }

    #[test]
    fn test_existing_output_is_fatal() {
        let tmp = TempDir::new().unwrap();
        tree(&tmp);
        fs::write(tmp.path().join("out.db"), "").unwrap();

        let err = Pipeline::new(config(&tmp, "out.db"))
            .unwrap()
            .run(&RunState::new())
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_producer_error_stops_queued_work() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir(&data).unwrap();

        let state = RunState::new();
        let writer = Arc::new(
            IndexWriter::create(tmp.path().join("out.db"), Uuid::new_v4(), &[data.clone()], false)
                .unwrap(),
        );
        let mut registry = ExtractorRegistry::new();
        registry.register(CapabilityTag::Text, Arc::new(Slow(Duration::from_millis(500))));
        let ctx = WorkerContext {
            dispatcher: Arc::new(Dispatcher::new(registry, DispatchLimits::default())),
            builder: DocumentBuilder::new(1000),
            writer: Arc::clone(&writer),
            state: Arc::clone(&state),
            fatal: FatalSlot::new(),
        };

        let queue = Arc::new(TaskQueue::new(8));
        let pool = WorkerPool::spawn(1, Arc::clone(&queue), &ctx).unwrap();
        let budget = Budget::new(1 << 20, Duration::from_secs(5));
        for i in 0..6 {
            let path = data.join(format!("{i}.txt"));
            fs::write(&path, "text\n").unwrap();
            let entry = ScanEntry::from_metadata(path.clone(), &fs::metadata(&path).unwrap());
            let key = EntryKey::for_path(&entry.path);
            queue
                .submit(ScanTask { entry, key, budget }, state.cancel_flag())
                .unwrap();
        }

        stop_workers(Err(Error::internal("write failed")), &queue, pool, &ctx);

        assert!(state.is_cancelled());
        // Only the task already in flight may finish.
        assert!(state.snapshot().tasks_completed <= 2);
        assert_eq!(
            ctx.fatal.take().unwrap().to_string(),
            "internal error: write failed"
        );
    }

    #[test]
    fn test_write_failure_mid_run_is_fatal() {
        let tmp = TempDir::new().unwrap();
        tree(&tmp);
        Pipeline::new(config(&tmp, "first.db"))
            .unwrap()
            .run(&RunState::new())
            .unwrap();
        fs::write(tmp.path().join("a").join("poison.txt"), "bad\n").unwrap();

        let output = tmp.path().join("second.db");
        let mut registry = ExtractorRegistry::with_defaults();
        registry.register(
            CapabilityTag::Text,
            Arc::new(RejectPoison {
                index: output.clone(),
            }),
        );
        let mut config = config(&tmp, "second.db");
        config.previous = Some(tmp.path().join("first.db"));

        let state = RunState::new();
        let err = Pipeline::new(config)
            .unwrap()
            .with_registry(registry)
            .run(&state)
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(state.is_cancelled());

        // Rows committed before the failure stay readable, and the run was
        // still finalized.
        let reader = IndexReader::open(&output).unwrap();
        let mut paths: Vec<String> = reader
            .documents()
            .unwrap()
            .into_iter()
            .map(|d| d.path)
            .collect();
        paths.sort();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("1.txt"));
        assert!(paths[1].ends_with("2.bin"));
        assert!(reader.summary().unwrap().unwrap().cancelled);
    }

    #[tokio::test]
    async fn test_run_async() {
        let tmp = TempDir::new().unwrap();
        tree(&tmp);

        let summary = Pipeline::new(config(&tmp, "out.db"))
            .unwrap()
            .run_async(RunState::new())
            .await
            .unwrap();
        assert_eq!(summary.documents.total(), 2);
    }
}
