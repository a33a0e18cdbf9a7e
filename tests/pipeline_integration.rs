//! End-to-end tests for scan runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sifter::document::{Document, Status};
use sifter::extract::{
    Budget, CapabilityTag, ExtractionResult, Extractor, ExtractorRegistry, TextExtractor,
};
use sifter::pipeline::TaskQueue;
use sifter::storage::{IndexReader, RunSummary};
use sifter::{Config, Pipeline, RunState};
use tempfile::TempDir;

fn config(tmp: &TempDir, output: &str) -> Config {
    Config {
        roots: vec![tmp.path().join("a")],
        output: tmp.path().join(output),
        excludes: vec![".git".into()],
        workers: 2,
        ..Config::default()
    }
}

fn scenario_tree(tmp: &TempDir) -> PathBuf {
    let a = tmp.path().join("a");
    fs::create_dir_all(a.join(".git")).unwrap();
    fs::write(a.join("1.txt"), "x".repeat(100)).unwrap();
    fs::write(a.join("2.bin"), [0u8, 1, 2, 3, 0, 255, 7, 0]).unwrap();
    fs::write(a.join(".git").join("HEAD"), "ref: refs/heads/main").unwrap();
    a
}

fn run(config: Config) -> RunSummary {
    Pipeline::new(config).unwrap().run(&RunState::new()).unwrap()
}

fn documents(tmp: &TempDir, output: &str) -> Vec<Document> {
    IndexReader::open(tmp.path().join(output))
        .unwrap()
        .documents()
        .unwrap()
}

fn by_name<'a>(docs: &'a [Document], name: &str) -> &'a Document {
    docs.iter()
        .find(|d| Path::new(&d.path).file_name().and_then(|n| n.to_str()) == Some(name))
        .unwrap_or_else(|| panic!("no document for {name}"))
}

#[test]
fn test_first_scan_indexes_text_and_skips_binary() {
    let tmp = TempDir::new().unwrap();
    scenario_tree(&tmp);

    let summary = run(config(&tmp, "out1.db"));
    assert_eq!(summary.documents.indexed, 1);
    assert_eq!(summary.documents.skipped, 1);
    assert_eq!(summary.extracted, 2);
    assert_eq!(summary.reused, 0);

    let docs = documents(&tmp, "out1.db");
    assert_eq!(docs.len(), 2);
    assert_eq!(by_name(&docs, "1.txt").status, Status::Indexed);
    assert_eq!(by_name(&docs, "2.bin").status, Status::Skipped);
    assert!(docs.iter().all(|d| !d.path.contains(".git")));
}

#[test]
fn test_rerun_after_modification_rescans_only_changed_file() {
    let tmp = TempDir::new().unwrap();
    let a = scenario_tree(&tmp);

    run(config(&tmp, "out1.db"));
    let first = documents(&tmp, "out1.db");

    fs::write(a.join("1.txt"), "y".repeat(150)).unwrap();

    let mut second = config(&tmp, "out2.db");
    second.previous = Some(tmp.path().join("out1.db"));
    let summary = run(second);

    assert_eq!(summary.documents.total(), 2);
    assert_eq!(summary.reused, 1);
    assert_eq!(summary.extracted, 1);

    let docs = documents(&tmp, "out2.db");
    assert_ne!(by_name(&docs, "1.txt").id, by_name(&first, "1.txt").id);
    assert_eq!(by_name(&docs, "2.bin").id, by_name(&first, "2.bin").id);
}

#[test]
fn test_unchanged_rerun_reuses_everything() {
    let tmp = TempDir::new().unwrap();
    let a = scenario_tree(&tmp);
    fs::create_dir_all(a.join("nested")).unwrap();
    fs::write(a.join("nested").join("3.md"), "# three\n").unwrap();

    run(config(&tmp, "out1.db"));

    let mut second = config(&tmp, "out2.db");
    second.previous = Some(tmp.path().join("out1.db"));
    let summary = run(second);

    assert_eq!(summary.documents.total(), 3);
    assert_eq!(summary.reused, 3);
    assert_eq!(summary.extracted, 0);

    let mut before: Vec<_> = documents(&tmp, "out1.db")
        .into_iter()
        .map(|d| (d.path, d.id))
        .collect();
    let mut after: Vec<_> = documents(&tmp, "out2.db")
        .into_iter()
        .map(|d| (d.path, d.id))
        .collect();
    before.sort();
    after.sort();
    assert_eq!(before, after);
}

#[test]
fn test_full_scan_ignores_previous() {
    let tmp = TempDir::new().unwrap();
    scenario_tree(&tmp);
    run(config(&tmp, "out1.db"));

    let mut second = config(&tmp, "out2.db");
    second.previous = Some(tmp.path().join("out1.db"));
    second.incremental = false;
    let summary = run(second);

    assert_eq!(summary.reused, 0);
    assert_eq!(summary.extracted, 2);
}

#[test]
fn test_every_accepted_file_gets_one_document() {
    let tmp = TempDir::new().unwrap();
    let a = tmp.path().join("a");
    for dir in 0..5 {
        let d = a.join(format!("d{dir}"));
        fs::create_dir_all(&d).unwrap();
        for file in 0..8 {
            fs::write(d.join(format!("{file}.txt")), format!("{dir}-{file}")).unwrap();
        }
    }

    let summary = run(config(&tmp, "out.db"));
    assert_eq!(summary.entries_seen, 40);
    assert_eq!(summary.documents.total(), 40);

    let docs = documents(&tmp, "out.db");
    let mut keys: Vec<_> = docs.iter().map(|d| d.key.clone()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 40);
}

#[cfg(unix)]
#[test]
fn test_symlink_cycle_terminates() {
    let tmp = TempDir::new().unwrap();
    let a = scenario_tree(&tmp);
    fs::create_dir_all(a.join("sub")).unwrap();
    std::os::unix::fs::symlink(&a, a.join("sub").join("loop")).unwrap();

    let mut config = config(&tmp, "out.db");
    config.follow_symlinks = true;
    let summary = run(config);

    assert_eq!(summary.documents.total(), 2);
    assert!(!summary.cancelled);
}

/// Panics on files named `boom.txt`, hangs on `hang.txt`, and reads
/// everything else as plain text.
struct Unreliable;

impl Extractor for Unreliable {
    fn name(&self) -> &'static str {
        "unreliable"
    }

    fn extract(&self, path: &Path, tag: CapabilityTag, budget: &Budget) -> ExtractionResult {
        match path.file_name().and_then(|n| n.to_str()) {
            Some("boom.txt") => panic!("malformed input"),
            Some("hang.txt") => {
                thread::sleep(Duration::from_secs(5));
                TextExtractor.extract(path, tag, budget)
            }
            _ => TextExtractor.extract(path, tag, budget),
        }
    }
}

#[test]
fn test_failing_extractors_do_not_stop_the_run() {
    let tmp = TempDir::new().unwrap();
    let a = tmp.path().join("a");
    fs::create_dir_all(&a).unwrap();
    fs::write(a.join("boom.txt"), "boom").unwrap();
    fs::write(a.join("hang.txt"), "hang").unwrap();
    for i in 0..6 {
        fs::write(a.join(format!("ok{i}.txt")), format!("fine {i}")).unwrap();
    }

    let mut registry = ExtractorRegistry::with_defaults();
    registry.register(CapabilityTag::Text, Arc::new(Unreliable));

    let mut config = config(&tmp, "out.db");
    config.timeout = Duration::from_millis(300);

    let summary = Pipeline::new(config)
        .unwrap()
        .with_registry(registry)
        .run(&RunState::new())
        .unwrap();

    assert_eq!(summary.documents.indexed, 6);
    assert_eq!(summary.documents.errored, 2);

    let docs = documents(&tmp, "out.db");
    let boom = by_name(&docs, "boom.txt");
    assert_eq!(boom.status, Status::Errored);
    assert!(boom.error.as_deref().unwrap().contains("malformed input"));

    let hang = by_name(&docs, "hang.txt");
    assert_eq!(hang.status, Status::Errored);
    assert!(hang.error.as_deref().unwrap().starts_with("resource_exceeded"));
}

#[test]
fn test_errored_documents_are_retried() {
    let tmp = TempDir::new().unwrap();
    let a = tmp.path().join("a");
    fs::create_dir_all(&a).unwrap();
    fs::write(a.join("boom.txt"), "boom").unwrap();
    fs::write(a.join("ok.txt"), "ok").unwrap();

    let mut registry = ExtractorRegistry::with_defaults();
    registry.register(CapabilityTag::Text, Arc::new(Unreliable));
    Pipeline::new(config(&tmp, "out1.db"))
        .unwrap()
        .with_registry(registry)
        .run(&RunState::new())
        .unwrap();

    let mut second = config(&tmp, "out2.db");
    second.previous = Some(tmp.path().join("out1.db"));
    let summary = run(second);

    assert_eq!(summary.reused, 1);
    assert_eq!(summary.documents.indexed, 2);
    assert_eq!(by_name(&documents(&tmp, "out2.db"), "boom.txt").status, Status::Indexed);
}

#[test]
fn test_queue_never_exceeds_capacity() {
    let queue = Arc::new(TaskQueue::new(3));
    let cancel = Arc::new(AtomicBool::new(false));

    let producer = {
        let queue = Arc::clone(&queue);
        let cancel = Arc::clone(&cancel);
        thread::spawn(move || {
            for i in 0..50 {
                queue.submit(i, &cancel).unwrap();
                assert!(queue.len() <= 3);
            }
            queue.close();
        })
    };

    let mut received = Vec::new();
    while let Some(task) = queue.claim(&cancel) {
        assert!(queue.len() <= 3);
        received.push(task);
        thread::sleep(Duration::from_millis(1));
    }
    producer.join().unwrap();

    assert_eq!(received, (0..50).collect::<Vec<_>>());
}

/// Text extraction that takes a while, so a run can be cancelled mid-way.
struct Slow;

impl Extractor for Slow {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn extract(&self, path: &Path, tag: CapabilityTag, budget: &Budget) -> ExtractionResult {
        thread::sleep(Duration::from_millis(50));
        TextExtractor.extract(path, tag, budget)
    }
}

#[test]
fn test_cancelled_run_leaves_usable_index() {
    let tmp = TempDir::new().unwrap();
    let a = tmp.path().join("a");
    fs::create_dir_all(&a).unwrap();
    for i in 0..40 {
        fs::write(a.join(format!("{i:02}.txt")), format!("file {i}")).unwrap();
    }

    let mut registry = ExtractorRegistry::with_defaults();
    registry.register(CapabilityTag::Text, Arc::new(Slow));

    let mut first = config(&tmp, "out1.db");
    first.workers = 1;
    first.queue_capacity = Some(2);

    let state = RunState::new();
    let canceller = {
        let state = Arc::clone(&state);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            state.cancel();
        })
    };
    let summary = Pipeline::new(first)
        .unwrap()
        .with_registry(registry)
        .run(&state)
        .unwrap();
    canceller.join().unwrap();

    assert!(summary.cancelled);
    assert!(summary.documents.total() < 40);

    let reader = IndexReader::open(tmp.path().join("out1.db")).unwrap();
    assert_eq!(reader.summary().unwrap(), Some(summary.clone()));
    assert_eq!(reader.count().unwrap(), summary.documents.total());
    drop(reader);

    let mut second = config(&tmp, "out2.db");
    second.previous = Some(tmp.path().join("out1.db"));
    let resumed = run(second);

    assert!(!resumed.cancelled);
    assert_eq!(resumed.documents.total(), 40);
    assert_eq!(resumed.reused, summary.documents.indexed);
}

#[tokio::test]
async fn test_async_run_matches_blocking_run() {
    let tmp = TempDir::new().unwrap();
    scenario_tree(&tmp);

    let summary = Pipeline::new(config(&tmp, "out.db"))
        .unwrap()
        .run_async(RunState::new())
        .await
        .unwrap();

    assert_eq!(summary.documents.indexed, 1);
    assert_eq!(summary.documents.skipped, 1);
}
