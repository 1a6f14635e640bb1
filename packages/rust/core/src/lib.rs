//! Ingestion orchestration and domain logic for JobRadar.
//!
//! This crate ties sources, storage and notification together into one
//! run ([`pipeline::run_ingestion`]): dedup, relevance filtering, reporting.

pub mod dedup;
pub mod notify;
pub mod pipeline;
pub mod relevance;
pub mod report;

pub use dedup::deduplicate;
pub use notify::{Notifier, StdoutNotifier, WebhookNotifier, notifier_from_config};
pub use pipeline::{
    ProgressReporter, RunOptions, RunStats, RunSummary, SilentProgress, SourceTarget,
    TargetFailure, plan_targets, run_ingestion,
};
pub use relevance::RelevanceClassifier;
pub use report::{Report, ReportGroup, ReportItem, build_report};
