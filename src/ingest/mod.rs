// src/ingest/mod.rs
pub mod providers;
pub mod registry;
pub mod types;

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;

use crate::error::SourceFetchError;
use crate::ingest::types::{Cargo, Source};
use crate::notify::ErrorLog;
use crate::store::ItemStore;

/// One-time metrics registration (so series show up in the export).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("freight_items_new_total", "Items persisted for the first time.");
        describe_counter!(
            "freight_items_seen_total",
            "Candidates skipped because their GUID was already stored."
        );
        describe_counter!(
            "freight_items_rejected_total",
            "Candidates missing title, link or guid."
        );
        describe_counter!(
            "freight_source_errors_total",
            "Cargo retrieval failures and timeouts."
        );
        describe_histogram!("freight_fetch_ms", "Cargo retrieval time in milliseconds.");
        describe_gauge!("freight_last_run_ts", "Unix ts when ingestion last ran.");
    });
}

/// Hands out seen timestamps (ms since epoch) that strictly increase, even
/// when several inserts land in the same millisecond.
#[derive(Debug, Default)]
pub struct SeenClock {
    last: i64,
}

impl SeenClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> i64 {
        self.next_after(chrono::Utc::now().timestamp_millis())
    }

    fn next_after(&mut self, now_ms: i64) -> i64 {
        let ts = now_ms.max(self.last + 1);
        self.last = ts;
        ts
    }
}

/// What ingesting one source produced in this run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub class_name: String,
    pub new_items: usize,
    pub seen: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl IngestReport {
    /// A source is dirty when at least one item was newly persisted.
    pub fn is_dirty(&self) -> bool {
        self.new_items > 0
    }
}

/// Retrieves, validates, dedups and persists cargo, one source at a time.
pub struct IngestionEngine<'a> {
    store: &'a dyn ItemStore,
    errors: &'a ErrorLog,
    clock: SeenClock,
    fetch_timeout: Duration,
    dry_run: bool,
    /// GUIDs a dry run would have stored so far.
    pending: HashSet<String>,
}

impl<'a> IngestionEngine<'a> {
    pub fn new(store: &'a dyn ItemStore, errors: &'a ErrorLog) -> Self {
        ensure_metrics_described();
        Self {
            store,
            errors,
            clock: SeenClock::new(),
            fetch_timeout: Duration::from_secs(60),
            dry_run: false,
            pending: HashSet::new(),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    async fn fetch(&self, source: &dyn Source) -> Result<Vec<Cargo>, SourceFetchError> {
        let class = source.class_name().to_string();
        let t0 = std::time::Instant::now();
        let guarded = AssertUnwindSafe(source.cargo()).catch_unwind();
        let res = tokio::time::timeout(self.fetch_timeout, guarded).await;
        histogram!("freight_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        match res {
            Ok(Ok(Ok(cargo))) => Ok(cargo),
            Ok(Ok(Err(error))) => Err(SourceFetchError::Fetch { class, error }),
            Ok(Err(payload)) => Err(SourceFetchError::Panicked {
                class,
                message: panic_message(payload.as_ref()),
            }),
            Err(_) => Err(SourceFetchError::Timeout {
                class,
                timeout: self.fetch_timeout,
            }),
        }
    }

    /// Ingest one source. Errors never escape: they are recorded in the
    /// error log and reflected in the report.
    pub async fn ingest(&mut self, source: &dyn Source) -> IngestReport {
        let class = source.class_name().to_string();
        let mut report = IngestReport {
            class_name: class.clone(),
            ..IngestReport::default()
        };
        gauge!("freight_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

        let cargo = match self.fetch(source).await {
            Ok(c) => c,
            Err(e) => {
                counter!("freight_source_errors_total").increment(1);
                self.errors.record(e.to_string());
                return report;
            }
        };
        if cargo.is_empty() {
            self.errors.record(format!("no items from {class}"));
            return report;
        }

        for candidate in cargo {
            let title = candidate.title.clone().unwrap_or_default();
            let candidate = match candidate.validate() {
                Ok(c) => c,
                Err(e) => {
                    tracing::info!(source = %class, title = %title, "item rejected: {e}");
                    counter!("freight_items_rejected_total").increment(1);
                    report.rejected += 1;
                    continue;
                }
            };

            match self.store.find_by_guid(&candidate.guid).await {
                Ok(Some(_)) => {
                    tracing::debug!(
                        source = %class,
                        guid = %candidate.guid,
                        "item already exists, skipping"
                    );
                    counter!("freight_items_seen_total").increment(1);
                    report.seen += 1;
                    continue;
                }
                Ok(None) if self.dry_run && self.pending.contains(&candidate.guid) => {
                    tracing::debug!(
                        dry_run = true,
                        source = %class,
                        guid = %candidate.guid,
                        "item already counted this run, skipping"
                    );
                    report.seen += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    self.errors
                        .record(format!("lookup of {} from {class} failed: {e}", candidate.guid));
                    report.failed += 1;
                    continue;
                }
            }

            let item = candidate.stamp(self.clock.next(), &class);
            if self.dry_run {
                tracing::info!(dry_run = true, source = %class, guid = %item.guid, "would save item");
                self.pending.insert(item.guid);
                report.new_items += 1;
                continue;
            }
            match self.store.insert(&item).await {
                Ok(()) => {
                    tracing::info!(source = %class, guid = %item.guid, "item found, saved");
                    counter!("freight_items_new_total").increment(1);
                    report.new_items += 1;
                }
                Err(e) => {
                    self.errors.record(format!("saving item from {class} failed: {e}"));
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            source = %class,
            new = report.new_items,
            seen = report.seen,
            rejected = report.rejected,
            failed = report.failed,
            "source ingested"
        );
        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
