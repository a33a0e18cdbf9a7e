//! Worker thread pool with per-task fault isolation.
//!
//! Each worker owns an [`Isolate`]: a helper thread that runs classification
//! and extraction. The worker waits on it with the task's wall-clock budget.
//! A panic in an extractor is caught on the helper and reported as a
//! [`FailureKind::Fault`]. A helper that overruns its budget is abandoned
//! and replaced, and the task is recorded as
//! [`FailureKind::ResourceExceeded`]. A worker keeps at most
//! [`MAX_ABANDONED_HELPERS`] abandoned helpers alive; past that, tasks fail
//! with `ResourceExceeded` until one of them exits.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::queue::TaskQueue;
use super::state::RunState;
use crate::document::{DocumentBuilder, Status};
use crate::error::Error;
use crate::extract::{panic_message, Budget, Dispatcher, ExtractionResult, FailureKind, Outcome};
use crate::storage::IndexWriter;
use crate::walker::{EntryKey, ScanEntry};
use crate::Result;

/// A unit of extraction work.
#[derive(Debug, Clone)]
pub struct ScanTask {
    pub entry: ScanEntry,
    pub key: EntryKey,
    pub budget: Budget,
}

/// Holds the first run-fatal error raised by any thread.
#[derive(Debug, Default)]
pub struct FatalSlot {
    error: Mutex<Option<Error>>,
}

impl FatalSlot {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record an error; later errors are logged and dropped.
    pub fn set(&self, error: Error) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(error);
        } else {
            tracing::debug!(error = %error, "Dropping secondary fatal error");
        }
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.error.lock().is_some()
    }

    pub fn take(&self) -> Option<Error> {
        self.error.lock().take()
    }
}

/// Shared handles every worker needs.
#[derive(Clone)]
pub struct WorkerContext {
    pub dispatcher: Arc<Dispatcher>,
    pub builder: DocumentBuilder,
    pub writer: Arc<IndexWriter>,
    pub state: Arc<RunState>,
    pub fatal: Arc<FatalSlot>,
}

/// Fixed-size pool of named worker threads draining a [`TaskQueue`].
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `n` workers (minimum 1).
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned. Workers started before
    /// the failure keep running until the queue is closed or the run is
    /// cancelled.
    pub fn spawn(n: usize, queue: Arc<TaskQueue<ScanTask>>, ctx: &WorkerContext) -> Result<Self> {
        let n = n.max(1);
        let mut workers = Vec::with_capacity(n);

        for i in 0..n {
            let queue = Arc::clone(&queue);
            let ctx = ctx.clone();
            let handle = thread::Builder::new()
                .name(format!("sifter-worker-{i}"))
                .spawn(move || run_worker(i, &queue, &ctx))?;
            workers.push(handle);
        }

        tracing::info!(workers = n, capacity = queue.capacity(), "Worker pool started");
        Ok(Self { workers })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to exit.
    pub fn join(self) {
        for handle in self.workers {
            let name = handle.thread().name().unwrap_or("worker").to_owned();
            if handle.join().is_err() {
                tracing::error!(worker = %name, "Worker thread panicked");
            }
        }
        tracing::debug!("Worker pool stopped");
    }
}

fn run_worker(id: usize, queue: &TaskQueue<ScanTask>, ctx: &WorkerContext) {
    let result = catch_unwind(AssertUnwindSafe(|| worker_loop(id, queue, ctx)));
    if let Err(payload) = result {
        let msg = panic_message(payload.as_ref());
        tracing::error!(worker = id, panic = %msg, "Worker crashed");
        ctx.fatal
            .set(Error::internal(format!("worker {id} panicked: {msg}")));
        ctx.state.cancel();
    }
}

fn worker_loop(id: usize, queue: &TaskQueue<ScanTask>, ctx: &WorkerContext) {
    let mut isolate = Isolate::new(id, Arc::clone(&ctx.dispatcher));

    while let Some(task) = queue.claim(ctx.state.cancel_flag()) {
        let outcome = isolate.run(&task.entry, task.budget);
        let doc = ctx.builder.build(&task.entry, task.key, outcome);

        match doc.status {
            Status::Errored => tracing::warn!(
                path = %doc.path,
                error = doc.error.as_deref().unwrap_or_default(),
                "Extraction failed"
            ),
            Status::Indexed | Status::Skipped => tracing::debug!(
                path = %doc.path,
                status = %doc.status,
                "Extracted"
            ),
        }

        if let Err(e) = ctx.writer.append(&doc) {
            tracing::error!(worker = id, path = %doc.path, error = %e, "Index write failed, aborting run");
            ctx.fatal.set(e);
            ctx.state.cancel();
            break;
        }
        ctx.state.record_status(doc.status);
        ctx.state.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    tracing::debug!(worker = id, "Worker exiting");
}

/// Abandoned helper threads a worker tolerates before refusing new work.
pub const MAX_ABANDONED_HELPERS: usize = 4;

struct Job {
    entry: ScanEntry,
    budget: Budget,
}

struct Helper {
    jobs: Sender<Job>,
    results: Receiver<Outcome>,
    handle: JoinHandle<()>,
}

/// Runs extraction on a helper thread the worker can walk away from.
struct Isolate {
    worker: usize,
    generation: usize,
    dispatcher: Arc<Dispatcher>,
    helper: Option<Helper>,
    // An abandoned helper exits once its extractor returns.
    abandoned: Vec<JoinHandle<()>>,
    max_abandoned: usize,
}

impl Isolate {
    const fn new(worker: usize, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            worker,
            generation: 0,
            dispatcher,
            helper: None,
            abandoned: Vec::new(),
            max_abandoned: MAX_ABANDONED_HELPERS,
        }
    }

    /// Abandoned helpers whose extractor is still running.
    fn hung(&mut self) -> usize {
        self.abandoned.retain(|handle| !handle.is_finished());
        self.abandoned.len()
    }

    fn spawn_helper(&mut self) -> std::io::Result<Helper> {
        let (jobs, job_rx) = bounded::<Job>(1);
        let (result_tx, results) = bounded::<Outcome>(1);
        let dispatcher = Arc::clone(&self.dispatcher);

        let handle = thread::Builder::new()
            .name(format!("sifter-extract-{}-{}", self.worker, self.generation))
            .spawn(move || {
                for job in job_rx {
                    let outcome = dispatcher.run(&job.entry, &job.budget);
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            })?;
        self.generation += 1;

        Ok(Helper {
            jobs,
            results,
            handle,
        })
    }

    /// Run one entry through the dispatcher within the budget's timeout.
    fn run(&mut self, entry: &ScanEntry, budget: Budget) -> Outcome {
        let helper = match self.helper.take() {
            Some(helper) => helper,
            None if self.hung() >= self.max_abandoned => {
                tracing::warn!(
                    path = %entry.path.display(),
                    worker = self.worker,
                    hung = self.abandoned.len(),
                    "Too many hung extraction threads, not starting another"
                );
                return failed(
                    FailureKind::ResourceExceeded,
                    format!("{} abandoned extractions still running", self.abandoned.len()),
                );
            }
            None => match self.spawn_helper() {
                Ok(helper) => helper,
                Err(e) => return failed(FailureKind::Fault, format!("cannot start extraction thread: {e}")),
            },
        };

        let job = Job {
            entry: entry.clone(),
            budget,
        };
        if helper.jobs.send(job).is_err() {
            return failed(FailureKind::Fault, "extraction thread exited unexpectedly");
        }

        match helper.results.recv_timeout(budget.timeout) {
            Ok(outcome) => {
                self.helper = Some(helper);
                outcome
            }
            Err(RecvTimeoutError::Timeout) => {
                self.abandoned.push(helper.handle);
                let hung = self.hung();
                tracing::warn!(
                    path = %entry.path.display(),
                    timeout = ?budget.timeout,
                    worker = self.worker,
                    hung,
                    "Extraction timed out, abandoning extraction thread"
                );
                failed(
                    FailureKind::ResourceExceeded,
                    format!("extraction exceeded {:?}", budget.timeout),
                )
            }
            Err(RecvTimeoutError::Disconnected) => {
                failed(FailureKind::Fault, "extraction thread exited unexpectedly")
            }
        }
    }
}

fn failed(kind: FailureKind, message: impl Into<String>) -> Outcome {
    Outcome {
        classification: None,
        result: ExtractionResult::hard(kind, message),
    }
}
