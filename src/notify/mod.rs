//! Aggregated error reporting.
//!
//! Recoverable failures are appended to an [`ErrorLog`] during the run and
//! reported once at teardown, as a single consolidated message.

pub mod email;

use std::sync::Mutex;

use anyhow::Result;

pub use email::EmailSender;

pub const REPORT_SUBJECT: &str = "Critical freightfeed error(s)";

/// Append-only list of human-readable error messages for one run.
#[derive(Debug, Default)]
pub struct ErrorLog {
    inner: Mutex<Vec<String>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log `msg` and keep it for the teardown report.
    pub fn record(&self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::warn!("{msg}");
        self.inner.lock().expect("error log mutex poisoned").push(msg);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("error log mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().expect("error log mutex poisoned").clone()
    }

    /// Drain the log, returning what was recorded.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.inner.lock().expect("error log mutex poisoned"))
    }
}

/// One message body, one line per recorded error.
pub fn compose_report(errors: &[String]) -> String {
    let mut body = String::new();
    for e in errors {
        body.push_str(e);
        body.push('\n');
    }
    body
}

#[async_trait::async_trait]
pub trait ReportNotifier: Send + Sync {
    async fn send_report(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}
