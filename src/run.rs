//! # Run Coordinator
//! Owns one pipeline run from lock check to teardown:
//!
//! `Init -> LockCheck -> LockAcquire -> StoreConnect -> SourcesResolve ->
//! Ingest* -> SelectDirty -> RenderFeeds* -> RenderIndex? -> Teardown -> Done`
//!
//! Teardown runs on every exit path once `run` has started, including fatal
//! aborts. The lock guard also removes its file on drop, so a panic does not
//! leave a fresh token behind.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::Settings;
use crate::error::RunError;
use crate::ingest::registry::SourceRegistry;
use crate::ingest::types::Source;
use crate::ingest::{IngestReport, IngestionEngine};
use crate::lock::{LockGuard, RunLock};
use crate::metrics::Metrics;
use crate::notify::{compose_report, ErrorLog, ReportNotifier, REPORT_SUBJECT};
use crate::render::{feed_path, write_atomic, FeedRenderer, INDEX_FILE};
use crate::store::{self, ItemStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Restrict the run to one source class. Also skips the index.
    pub only_source: Option<String>,
    /// Regenerate every resolved source's feed, dirty or not.
    pub force_all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    LockCheck,
    LockAcquire,
    StoreConnect,
    SourcesResolve,
    Ingest,
    SelectDirty,
    RenderFeeds,
    RenderIndex,
    Teardown,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Init => "init",
            RunPhase::LockCheck => "lock_check",
            RunPhase::LockAcquire => "lock_acquire",
            RunPhase::StoreConnect => "store_connect",
            RunPhase::SourcesResolve => "sources_resolve",
            RunPhase::Ingest => "ingest",
            RunPhase::SelectDirty => "select_dirty",
            RunPhase::RenderFeeds => "render_feeds",
            RunPhase::RenderIndex => "render_index",
            RunPhase::Teardown => "teardown",
            RunPhase::Done => "done",
        };
        f.write_str(s)
    }
}

fn enter(phase: RunPhase) {
    tracing::debug!(%phase, "run phase");
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub reports: Vec<IngestReport>,
    /// Class identities whose feed file was written (or would be, in dry-run).
    pub feeds_written: Vec<String>,
    pub index_written: bool,
    /// Everything recorded in the error log, in order.
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn dirty_sources(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| r.is_dirty())
            .map(|r| r.class_name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// A fresh lock token was in place; nothing was done.
    Locked,
    /// No valid source resolved.
    NoSources,
}

pub struct RunCoordinator {
    settings: Settings,
    registry: SourceRegistry,
    store: Option<Arc<dyn ItemStore>>,
    notifier: Option<Arc<dyn ReportNotifier>>,
    metrics: Option<Metrics>,
}

impl RunCoordinator {
    pub fn new(settings: Settings, registry: SourceRegistry) -> Self {
        Self {
            settings,
            registry,
            store: None,
            notifier: None,
            metrics: None,
        }
    }

    /// Use this store instead of connecting to `settings.store_url`.
    pub fn with_store(mut self, store: Arc<dyn ItemStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ReportNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn run(&self, opts: &RunOptions) -> Result<RunOutcome, RunError> {
        enter(RunPhase::Init);
        let started = Instant::now();
        let errors = ErrorLog::new();
        let mut lock: Option<LockGuard> = None;

        let result = self.run_phases(opts, &errors, &mut lock).await;
        if let Err(e) = &result {
            tracing::error!("run aborted: {e}");
        }

        let flushed = self.teardown(lock, &errors, started.elapsed()).await;
        enter(RunPhase::Done);

        result.map(|outcome| match outcome {
            RunOutcome::Completed(mut summary) => {
                summary.errors = flushed;
                RunOutcome::Completed(summary)
            }
            other => other,
        })
    }

    async fn run_phases(
        &self,
        opts: &RunOptions,
        errors: &ErrorLog,
        lock: &mut Option<LockGuard>,
    ) -> Result<RunOutcome, RunError> {
        let dry_run = self.settings.dry_run;
        let run_lock = RunLock::new(&self.settings.lock_path, self.settings.lock_minutes);

        enter(RunPhase::LockCheck);
        if dry_run {
            tracing::info!(dry_run = true, "lock check skipped");
        } else if run_lock.is_locked(Utc::now())? {
            tracing::info!(path = %run_lock.path().display(), "Lock is in place.");
            return Ok(RunOutcome::Locked);
        }

        enter(RunPhase::LockAcquire);
        if dry_run {
            tracing::info!(dry_run = true, path = %run_lock.path().display(), "would create lockfile");
        } else {
            *lock = Some(run_lock.acquire(Utc::now())?);
        }

        enter(RunPhase::StoreConnect);
        let store = match &self.store {
            Some(s) => Arc::clone(s),
            None => store::connect(&self.settings.store_url).await?,
        };
        store.ensure_indexes().await?;

        enter(RunPhase::SourcesResolve);
        let sources = self.registry.resolve(opts.only_source.as_deref());
        if sources.is_empty() {
            tracing::info!("No sources found.");
            return Ok(RunOutcome::NoSources);
        }

        enter(RunPhase::Ingest);
        let mut engine = IngestionEngine::new(store.as_ref(), errors)
            .with_fetch_timeout(Duration::from_secs(self.settings.fetch_timeout_secs))
            .with_dry_run(dry_run);
        let mut reports = Vec::with_capacity(sources.len());
        for source in &sources {
            reports.push(engine.ingest(source.as_ref()).await);
        }

        enter(RunPhase::SelectDirty);
        let selected: Vec<(&dyn Source, &IngestReport)> = sources
            .iter()
            .zip(&reports)
            .filter(|(_, r)| opts.force_all || r.is_dirty())
            .map(|(s, r)| (s.as_ref(), r))
            .collect();

        enter(RunPhase::RenderFeeds);
        let renderer = FeedRenderer::new(&self.settings.feed_base_url);
        let mut feeds_written = Vec::new();
        for (source, report) in selected {
            if self
                .regenerate_feed(&renderer, store.as_ref(), source, report, errors)
                .await
            {
                feeds_written.push(source.class_name().to_string());
            }
        }

        let mut index_written = false;
        if opts.only_source.is_none() {
            enter(RunPhase::RenderIndex);
            index_written = self.regenerate_index(&renderer, &sources, errors).await;
        }

        Ok(RunOutcome::Completed(RunSummary {
            reports,
            feeds_written,
            index_written,
            errors: Vec::new(),
        }))
    }

    /// True when the feed file was written (or would be, in dry-run).
    ///
    /// A dry run stores nothing, so the items counted as new in `report`
    /// are added to what the store already holds.
    async fn regenerate_feed(
        &self,
        renderer: &FeedRenderer,
        store: &dyn ItemStore,
        source: &dyn Source,
        report: &IngestReport,
        errors: &ErrorLog,
    ) -> bool {
        let class = source.class_name();
        let items = match store.latest_by_source(class, self.settings.feed_limit).await {
            Ok(items) => items,
            Err(e) => {
                errors.record(format!("loading latest items of {class} failed: {e}"));
                return false;
            }
        };
        let pending = if self.settings.dry_run { report.new_items } else { 0 };
        if items.is_empty() && pending == 0 {
            tracing::debug!(source = class, "no stored items, feed not written");
            return false;
        }

        let doc = match renderer.render_feed(source.info(), &items) {
            Ok(doc) => doc,
            Err(e) => {
                errors.record(format!("rendering feed for {class} failed: {e:#}"));
                return false;
            }
        };

        let path = feed_path(&self.settings.output_dir, source.info());
        if self.settings.dry_run {
            let count = (items.len() + pending).min(self.settings.feed_limit);
            tracing::info!(dry_run = true, source = class, path = %path.display(), items = count, "would write feed");
            return true;
        }
        tracing::info!(source = class, items = items.len(), "Generating RSS feed");
        match write_atomic(&path, &doc).await {
            Ok(()) => true,
            Err(e) => {
                errors.record(format!("writing feed for {class} failed: {e:#}"));
                false
            }
        }
    }

    async fn regenerate_index(
        &self,
        renderer: &FeedRenderer,
        sources: &[Box<dyn Source>],
        errors: &ErrorLog,
    ) -> bool {
        let doc = renderer.render_index(sources.iter().map(|s| s.info()));
        let path = self.settings.output_dir.join(INDEX_FILE);
        if self.settings.dry_run {
            tracing::info!(dry_run = true, path = %path.display(), "would write index");
            return true;
        }
        match write_atomic(&path, &doc).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "index written");
                true
            }
            Err(e) => {
                errors.record(format!("writing index failed: {e:#}"));
                false
            }
        }
    }

    /// Release the lock, flush the error log, send one report, log timing.
    /// Returns the flushed errors.
    async fn teardown(
        &self,
        lock: Option<LockGuard>,
        errors: &ErrorLog,
        elapsed: Duration,
    ) -> Vec<String> {
        enter(RunPhase::Teardown);

        if let Some(guard) = lock {
            if let Err(e) = guard.release() {
                tracing::warn!("{e}");
            }
        }

        let flushed = errors.take();
        if !flushed.is_empty() {
            tracing::warn!("Encountered {} serious errors:", flushed.len());
            for e in &flushed {
                tracing::warn!("{e}");
            }
            self.send_report(&flushed).await;
        }

        if let (Some(metrics), Some(path)) = (&self.metrics, &self.settings.metrics_path) {
            if self.settings.dry_run {
                tracing::info!(dry_run = true, path = %path.display(), "would write metrics");
            } else if let Err(e) = metrics.write_textfile(path).await {
                tracing::warn!("writing metrics failed: {e:#}");
            }
        }

        tracing::info!("Process took {} seconds.", elapsed.as_secs_f64().round());
        tracing::info!("Bye!");
        flushed
    }

    async fn send_report(&self, flushed: &[String]) {
        let Some(to) = self.settings.report_email.as_deref() else {
            return;
        };
        if self.settings.dry_run {
            tracing::info!(dry_run = true, to, count = flushed.len(), "would mail error report");
            return;
        }
        let Some(notifier) = &self.notifier else {
            tracing::warn!(to, "report address set but no mail transport configured");
            return;
        };
        tracing::info!("Sending {} error(s) to {to}.", flushed.len());
        if let Err(e) = notifier
            .send_report(to, REPORT_SUBJECT, &compose_report(flushed))
            .await
        {
            tracing::warn!("sending error report failed: {e:#}");
        }
    }
}
