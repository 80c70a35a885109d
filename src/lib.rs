// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod lock;
pub mod metrics;
pub mod notify;
pub mod render;
pub mod run;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::Settings;
pub use crate::error::{RunError, StoreError};
pub use crate::ingest::types::{Cargo, Item, Source, SourceInfo};
pub use crate::run::{RunCoordinator, RunOptions, RunOutcome, RunSummary};
