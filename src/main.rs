//! freightfeed — binary entrypoint.
//! Loads configuration, resolves the configured sources and performs one run.

use std::process::ExitCode;
use std::sync::Arc;

use freightfeed::cli::Cli;
use freightfeed::config::sources::load_source_defs;
use freightfeed::ingest::registry::SourceRegistry;
use freightfeed::metrics::Metrics;
use freightfeed::notify::EmailSender;
use freightfeed::{RunCoordinator, RunOutcome, Settings};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("freightfeed=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse first: `--help` exits here, before any side effect.
    let cli = Cli::parse_lenient(std::env::args());

    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("configuration error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let defs = match load_source_defs(&settings.sources_path) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("configuration error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let client = match reqwest::Client::builder()
        .user_agent(concat!("freightfeed/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("http client: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let registry = SourceRegistry::from_defs(&defs, client);

    let mut coordinator = RunCoordinator::new(settings.clone(), registry);
    if settings.report_email.is_some() {
        match EmailSender::from_env() {
            Ok(sender) => coordinator = coordinator.with_notifier(Arc::new(sender)),
            Err(e) => tracing::warn!("error reports won't be mailed: {e:#}"),
        }
    }
    if settings.metrics_path.is_some() {
        match Metrics::init() {
            Ok(m) => coordinator = coordinator.with_metrics(m),
            Err(e) => tracing::warn!("metrics disabled: {e:#}"),
        }
    }

    match coordinator.run(&cli.run_options()).await {
        Ok(RunOutcome::Completed(summary)) => {
            tracing::debug!(
                feeds = summary.feeds_written.len(),
                errors = summary.errors.len(),
                "run completed"
            );
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Locked) | Ok(RunOutcome::NoSources) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
