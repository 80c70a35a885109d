// tests/run_e2e.rs
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use freightfeed::error::RunError;
use freightfeed::ingest::registry::SourceRegistry;
use freightfeed::ingest::types::{Cargo, Item, Source, SourceInfo};
use freightfeed::lock::format_marker;
use freightfeed::notify::ReportNotifier;
use freightfeed::store::{ItemStore, MemoryStore};
use freightfeed::{RunCoordinator, RunOptions, RunOutcome, RunSummary, Settings};

struct Fixed {
    info: SourceInfo,
    cargo: Vec<Cargo>,
}

#[async_trait]
impl Source for Fixed {
    fn info(&self) -> &SourceInfo {
        &self.info
    }
    async fn cargo(&self) -> Result<Vec<Cargo>> {
        Ok(self.cargo.clone())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    calls: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl ReportNotifier for RecordingNotifier {
    async fn send_report(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

fn cargo(guid: &str) -> Cargo {
    Cargo::new(&format!("Story {guid}"), &format!("https://a.test/{guid}"), guid)
        .with_description(&format!("About {guid}"))
}

fn register(reg: &mut SourceRegistry, class: &str, hidden: bool, items: Vec<Cargo>) {
    let info = SourceInfo {
        class_name: class.to_string(),
        name: format!("{class} display"),
        link: format!("https://{class}.test/"),
        description: format!("{class} description"),
        hidden,
    };
    reg.register(class, move || {
        Ok(Box::new(Fixed {
            info: info.clone(),
            cargo: items.clone(),
        }) as Box<dyn Source>)
    });
}

fn scenario_registry() -> SourceRegistry {
    let mut reg = SourceRegistry::new();
    register(&mut reg, "A", false, vec![cargo("g1"), cargo("g2"), cargo("g3")]);
    register(&mut reg, "B", false, vec![]);
    reg
}

fn settings(dir: &Path) -> Settings {
    Settings {
        output_dir: dir.join("out"),
        lock_path: dir.join("run.lock"),
        feed_base_url: "https://feeds.test/rss".into(),
        lock_minutes: 10,
        feed_limit: 2,
        ..Settings::default()
    }
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(&Item {
            title: "Story g1".into(),
            link: "https://a.test/g1".into(),
            guid: "g1".into(),
            description: None,
            image: None,
            seen_ms: 1_000,
            source: "A".into(),
        })
        .await
        .unwrap();
    store
}

fn completed(outcome: RunOutcome) -> RunSummary {
    match outcome {
        RunOutcome::Completed(s) => s,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_new_items_regenerate_only_dirty_feed() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let coordinator =
        RunCoordinator::new(settings(dir.path()), scenario_registry()).with_store(store.clone());

    let summary = completed(coordinator.run(&RunOptions::default()).await.unwrap());

    assert_eq!(store.len(), 3);
    assert_eq!(summary.dirty_sources(), vec!["A"]);
    assert_eq!(summary.feeds_written, vec!["A".to_string()]);
    assert!(summary.index_written);
    assert_eq!(summary.errors, vec!["no items from B".to_string()]);

    let out = dir.path().join("out");
    let feed = std::fs::read_to_string(out.join("A.xml")).unwrap();
    let g3 = feed.find("<guid>g3</guid>").unwrap();
    let g2 = feed.find("<guid>g2</guid>").unwrap();
    assert!(g3 < g2);
    assert!(!feed.contains("<guid>g1</guid>"));
    assert!(!out.join("B.xml").exists());

    let index = std::fs::read_to_string(out.join("index.html")).unwrap();
    assert!(index.contains("<a href=\"A.xml\">A display</a>"));
    assert!(index.contains("<a href=\"B.xml\">B display</a>"));

    // The lock taken by this run is gone afterwards.
    assert!(!dir.path().join("run.lock").exists());
}

#[tokio::test]
async fn clean_sources_are_not_rewritten_unless_forced() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let coordinator =
        RunCoordinator::new(settings(dir.path()), scenario_registry()).with_store(store.clone());

    completed(coordinator.run(&RunOptions::default()).await.unwrap());
    let feed_path = dir.path().join("out/A.xml");
    std::fs::remove_file(&feed_path).unwrap();

    let second = completed(coordinator.run(&RunOptions::default()).await.unwrap());
    assert!(second.dirty_sources().is_empty());
    assert!(second.feeds_written.is_empty());
    assert!(!feed_path.exists());

    let forced = completed(
        coordinator
            .run(&RunOptions {
                force_all: true,
                ..RunOptions::default()
            })
            .await
            .unwrap(),
    );
    // B has nothing stored, so even forced it is skipped.
    assert_eq!(forced.feeds_written, vec!["A".to_string()]);
    assert!(feed_path.exists());
    assert!(!dir.path().join("out/B.xml").exists());
}

#[tokio::test]
async fn fresh_lock_blocks_run_without_touching_store() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path = dir.path().join("run.lock");
    std::fs::write(&lock_path, format_marker(Utc::now())).unwrap();

    let store = Arc::new(MemoryStore::new());
    let coordinator =
        RunCoordinator::new(settings(dir.path()), scenario_registry()).with_store(store.clone());

    let outcome = coordinator.run(&RunOptions::default()).await.unwrap();

    assert_eq!(outcome, RunOutcome::Locked);
    assert!(store.is_empty());
    assert!(!dir.path().join("out").exists());
    // Someone else's lock is left alone.
    assert!(lock_path.exists());
}

#[tokio::test]
async fn expired_lock_is_treated_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path = dir.path().join("run.lock");
    std::fs::write(&lock_path, format_marker(Utc::now() - ChronoDuration::hours(2))).unwrap();

    let store = Arc::new(MemoryStore::new());
    let coordinator =
        RunCoordinator::new(settings(dir.path()), scenario_registry()).with_store(store.clone());

    let summary = completed(coordinator.run(&RunOptions::default()).await.unwrap());

    assert_eq!(store.len(), 3);
    assert_eq!(summary.feeds_written, vec!["A".to_string()]);
    assert!(!lock_path.exists());
}

#[tokio::test]
async fn single_source_run_skips_index() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = RunCoordinator::new(settings(dir.path()), scenario_registry())
        .with_store(Arc::new(MemoryStore::new()));

    let summary = completed(
        coordinator
            .run(&RunOptions {
                only_source: Some("A".into()),
                ..RunOptions::default()
            })
            .await
            .unwrap(),
    );

    assert_eq!(summary.reports.len(), 1);
    assert!(!summary.index_written);
    assert!(dir.path().join("out/A.xml").exists());
    assert!(!dir.path().join("out/index.html").exists());
}

#[tokio::test]
async fn unknown_single_source_means_no_sources() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = RunCoordinator::new(settings(dir.path()), scenario_registry())
        .with_store(Arc::new(MemoryStore::new()));

    let outcome = coordinator
        .run(&RunOptions {
            only_source: Some("Nope".into()),
            ..RunOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::NoSources);
    assert!(!dir.path().join("run.lock").exists());
}

#[tokio::test]
async fn hidden_sources_are_left_out_of_index() {
    let dir = tempfile::tempdir().unwrap();
    let mut reg = SourceRegistry::new();
    register(&mut reg, "Public", false, vec![cargo("p1")]);
    register(&mut reg, "Secret", true, vec![cargo("s1")]);
    let coordinator =
        RunCoordinator::new(settings(dir.path()), reg).with_store(Arc::new(MemoryStore::new()));

    let summary = completed(coordinator.run(&RunOptions::default()).await.unwrap());

    // Hidden sources still get their feed.
    assert_eq!(summary.feeds_written, vec!["Public".to_string(), "Secret".to_string()]);
    let index = std::fs::read_to_string(dir.path().join("out/index.html")).unwrap();
    assert!(index.contains("Public.xml"));
    assert!(!index.contains("Secret"));
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let mut s = settings(dir.path());
    s.dry_run = true;
    let coordinator = RunCoordinator::new(s, scenario_registry()).with_store(store.clone());

    let summary = completed(coordinator.run(&RunOptions::default()).await.unwrap());

    assert_eq!(summary.dirty_sources(), vec!["A"]);
    assert_eq!(summary.feeds_written, vec!["A".to_string()]);
    assert!(summary.index_written);
    assert!(store.is_empty());
    assert!(!dir.path().join("out").exists());
    assert!(!dir.path().join("run.lock").exists());
}

#[tokio::test]
async fn dry_run_counts_a_guid_shared_by_two_sources_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut reg = SourceRegistry::new();
    register(&mut reg, "A", false, vec![cargo("g1"), cargo("g1")]);
    register(&mut reg, "B", false, vec![cargo("g1"), cargo("g2")]);
    let mut s = settings(dir.path());
    s.dry_run = true;
    let coordinator = RunCoordinator::new(s, reg).with_store(Arc::new(MemoryStore::new()));

    let summary = completed(coordinator.run(&RunOptions::default()).await.unwrap());

    let counts: Vec<(usize, usize)> = summary.reports.iter().map(|r| (r.new_items, r.seen)).collect();
    assert_eq!(counts, vec![(1, 1), (1, 1)]);
}

struct Exploding(SourceInfo);

#[async_trait]
impl Source for Exploding {
    fn info(&self) -> &SourceInfo {
        &self.0
    }
    async fn cargo(&self) -> Result<Vec<Cargo>> {
        panic!("upstream parser blew up");
    }
}

#[tokio::test]
async fn panicking_source_does_not_abort_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut reg = SourceRegistry::new();
    reg.register("Boom", || {
        Ok(Box::new(Exploding(SourceInfo {
            class_name: "Boom".into(),
            name: "Boom".into(),
            link: "https://boom.test/".into(),
            description: "explodes".into(),
            hidden: false,
        })) as Box<dyn Source>)
    });
    register(&mut reg, "Good", false, vec![cargo("k1")]);
    let mut s = settings(dir.path());
    s.report_email = Some("ops@example.test".into());
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = RunCoordinator::new(s, reg)
        .with_store(store.clone())
        .with_notifier(notifier.clone());

    let summary = completed(coordinator.run(&RunOptions::default()).await.unwrap());

    assert_eq!(summary.dirty_sources(), vec!["Good"]);
    assert!(store.find_by_guid("k1").await.unwrap().is_some());
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].contains("Boom"));
    assert!(summary.errors[0].contains("upstream parser blew up"));
    assert!(dir.path().join("out/Good.xml").exists());
    assert!(!dir.path().join("run.lock").exists());
    assert_eq!(notifier.calls.lock().unwrap().len(), 1);
}

/// Removes the run's lock file while its cargo is being fetched.
struct LockThief {
    info: SourceInfo,
    lock_path: std::path::PathBuf,
}

#[async_trait]
impl Source for LockThief {
    fn info(&self) -> &SourceInfo {
        &self.info
    }
    async fn cargo(&self) -> Result<Vec<Cargo>> {
        std::fs::remove_file(&self.lock_path)?;
        Ok(vec![cargo("t1")])
    }
}

#[tokio::test]
async fn missing_lock_at_teardown_does_not_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let s = settings(dir.path());
    let lock_path = s.lock_path.clone();
    let mut reg = SourceRegistry::new();
    reg.register("Thief", move || {
        Ok(Box::new(LockThief {
            info: SourceInfo {
                class_name: "Thief".into(),
                name: "Thief".into(),
                link: "https://thief.test/".into(),
                description: "takes the lock".into(),
                hidden: false,
            },
            lock_path: lock_path.clone(),
        }) as Box<dyn Source>)
    });
    let coordinator = RunCoordinator::new(s, reg).with_store(Arc::new(MemoryStore::new()));

    let summary = completed(coordinator.run(&RunOptions::default()).await.unwrap());

    assert_eq!(summary.feeds_written, vec!["Thief".to_string()]);
    assert!(summary.errors.is_empty());
    assert!(!dir.path().join("run.lock").exists());
}

#[tokio::test]
async fn errors_are_reported_once_in_one_message() {
    let dir = tempfile::tempdir().unwrap();
    let mut reg = SourceRegistry::new();
    register(&mut reg, "B", false, vec![]);
    register(&mut reg, "C", false, vec![]);
    let mut s = settings(dir.path());
    s.report_email = Some("ops@example.test".into());
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = RunCoordinator::new(s, reg)
        .with_store(Arc::new(MemoryStore::new()))
        .with_notifier(notifier.clone());

    let summary = completed(coordinator.run(&RunOptions::default()).await.unwrap());
    assert_eq!(summary.errors.len(), 2);

    let calls = notifier.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (to, subject, body) = &calls[0];
    assert_eq!(to, "ops@example.test");
    assert_eq!(subject, "Critical freightfeed error(s)");
    assert_eq!(body, "no items from B\nno items from C\n");
}

#[tokio::test]
async fn no_report_without_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut reg = SourceRegistry::new();
    register(&mut reg, "A", false, vec![cargo("a1")]);
    let mut s = settings(dir.path());
    s.report_email = Some("ops@example.test".into());
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = RunCoordinator::new(s, reg)
        .with_store(Arc::new(MemoryStore::new()))
        .with_notifier(notifier.clone());

    completed(coordinator.run(&RunOptions::default()).await.unwrap());
    assert!(notifier.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn store_connect_failure_is_fatal_and_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path());
    s.store_url = "mongodb://localhost/items".into();
    let coordinator = RunCoordinator::new(s, scenario_registry());

    let err = coordinator.run(&RunOptions::default()).await.unwrap_err();

    assert!(matches!(err, RunError::Store(_)));
    assert!(!dir.path().join("run.lock").exists());
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn unusable_lock_path_is_fatal_before_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path());
    // A directory can be neither read nor written as a lock token.
    s.lock_path = dir.path().to_path_buf();
    let store = Arc::new(MemoryStore::new());
    let coordinator = RunCoordinator::new(s, scenario_registry()).with_store(store.clone());

    let err = coordinator.run(&RunOptions::default()).await.unwrap_err();

    assert!(matches!(err, RunError::Lock(_)));
    assert!(store.is_empty());
}
