//! End-to-end ingestion run: sources → normalize → dedup → upsert →
//! new-row detection → relevance → report → notify.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use jobradar_crawler::{AdapterRegistry, NormalizeContext, normalize};
use jobradar_shared::{
    AppConfig, Company, Job, JobRadarError, PersistedJob, Politeness, Result, Source,
};
use jobradar_storage::JobStore;

use crate::dedup::deduplicate;
use crate::notify::Notifier;
use crate::relevance::RelevanceClassifier;
use crate::report::{Report, build_report};

// ---------------------------------------------------------------------------
// Options, results, progress
// ---------------------------------------------------------------------------

/// Per-invocation switches that are not part of the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip persistence and notification; every normalized job counts as new.
    pub dry_run: bool,
    /// Restrict the run to these sources, in this order. Empty means
    /// `pipeline.sources` from the config.
    pub sources: Vec<Source>,
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total_jobs: usize,
    pub new_jobs: usize,
    pub relevant_new: usize,
    pub sources_processed: usize,
    pub sources_failed: usize,
    pub malformed_dropped: usize,
    pub duplicates_dropped: usize,
}

/// A source target that failed to fetch or parse.
#[derive(Debug, Clone, Serialize)]
pub struct TargetFailure {
    pub target: String,
    pub error: String,
}

/// Result of [`run_ingestion`].
#[derive(Debug)]
pub struct RunSummary {
    pub stats: RunStats,
    /// Relevant new jobs, in target order.
    pub relevant: Vec<Job>,
    pub report: Option<Report>,
    /// Whether the notifier accepted the report.
    pub notified: bool,
    pub failures: Vec<TargetFailure>,
    pub dry_run: bool,
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the number of source targets is known.
    fn targets_planned(&self, total: usize);
    /// Called as each target's result is merged, in target order.
    fn target_finished(&self, target: &str, ok: bool);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn targets_planned(&self, _total: usize) {}
    fn target_finished(&self, _target: &str, _ok: bool) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// One unit of fetching: an ATS source for one company, or a keyword source.
#[derive(Debug, Clone)]
pub struct SourceTarget {
    pub source: Source,
    pub company: Option<Company>,
}

impl SourceTarget {
    pub fn label(&self) -> String {
        match &self.company {
            Some(company) => format!("{}:{}", self.source, company.ticker),
            None => self.source.to_string(),
        }
    }

    fn context(&self, track: Option<&str>) -> NormalizeContext {
        let board = self
            .company
            .as_ref()
            .and_then(|c| c.board_for(self.source).map(|url| (c, url)));
        match board {
            Some((company, board_url)) => NormalizeContext::for_company(company, board_url),
            None => NormalizeContext::for_track(track),
        }
    }
}

/// Expand `sources` into targets: one per eligible company for ATS
/// sources (in store order), one for each keyword source.
pub fn plan_targets(sources: &[Source], companies: &[Company]) -> Vec<SourceTarget> {
    let mut targets = Vec::new();
    for &source in sources {
        if source.is_company_scoped() {
            let before = targets.len();
            targets.extend(
                companies
                    .iter()
                    .filter(|c| c.board_for(source).is_some())
                    .map(|c| SourceTarget {
                        source,
                        company: Some(c.clone()),
                    }),
            );
            debug!(%source, companies = targets.len() - before, "planned ATS targets");
        } else {
            targets.push(SourceTarget {
                source,
                company: None,
            });
        }
    }
    targets
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run one ingestion pass.
///
/// Fetch and parse failures are isolated to their target. A store failure
/// aborts the run. Notifier failures are logged and leave `notified` false.
#[instrument(skip_all, fields(dry_run = options.dry_run))]
pub async fn run_ingestion(
    config: &AppConfig,
    options: &RunOptions,
    store: Arc<dyn JobStore>,
    registry: Arc<AdapterRegistry>,
    notifier: &dyn Notifier,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let start = Instant::now();
    let sources = if options.sources.is_empty() {
        config.pipeline.sources.clone()
    } else {
        options.sources.clone()
    };

    progress.phase("Loading companies");
    let companies = store.fetch_companies().await?;
    let targets = plan_targets(&sources, &companies);
    progress.targets_planned(targets.len());

    info!(
        sources = sources.len(),
        companies = companies.len(),
        targets = targets.len(),
        concurrency = config.pipeline.concurrency,
        "starting ingestion run"
    );

    // --- Fetch, normalize, persist ---
    progress.phase("Fetching sources");
    let politeness = Politeness::from(&config.http);
    let semaphore = Arc::new(Semaphore::new(config.pipeline.concurrency.max(1) as usize));
    let fatal = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(targets.len());

    for (i, target) in targets.into_iter().enumerate() {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        if fatal.load(Ordering::SeqCst) {
            break;
        }
        if i > 0 && !politeness.source_delay.is_zero() {
            tokio::time::sleep(politeness.source_delay).await;
        }

        let label = target.label();
        let store = store.clone();
        let registry = registry.clone();
        let fatal = fatal.clone();
        let dry_run = options.dry_run;

        handles.push((
            label,
            tokio::spawn(async move {
                let _permit = permit;
                let result = process_target(&target, &registry, store.as_ref(), dry_run).await;
                if result.is_err() {
                    fatal.store(true, Ordering::SeqCst);
                }
                result
            }),
        ));
    }

    // --- Merge in target order ---
    let classifier = RelevanceClassifier::from(&config.relevance);
    let mut stats = RunStats::default();
    let mut relevant = Vec::new();
    let mut failures = Vec::new();
    let mut handles = handles.into_iter();

    while let Some((label, handle)) = handles.next() {
        let failure = match handle.await {
            Ok(Ok(TargetOutcome::Completed(report))) => {
                stats.sources_processed += 1;
                stats.malformed_dropped += report.malformed;
                stats.duplicates_dropped += report.duplicates;
                let persisted = report.rows.len();
                stats.total_jobs += persisted;

                let mut new = 0;
                let mut matched = 0;
                for row in report.rows {
                    if !row.is_new() {
                        continue;
                    }
                    new += 1;
                    if classifier.is_relevant(&row.job) {
                        matched += 1;
                        relevant.push(row.job);
                    }
                }
                stats.new_jobs += new;

                info!(
                    label = %label,
                    fetched = report.fetched,
                    persisted,
                    new,
                    relevant = matched,
                    "target complete"
                );
                None
            }
            Ok(Ok(TargetOutcome::Failed(e))) => Some(e.to_string()),
            Ok(Err(e)) => {
                for (_, pending) in handles.by_ref() {
                    pending.abort();
                }
                error!(label = %label, error = %e, "store failure, aborting run");
                return Err(e);
            }
            Err(e) => Some(format!("task failed: {e}")),
        };

        let ok = failure.is_none();
        if let Some(error) = failure {
            warn!(label = %label, error = %error, "source target failed, continuing");
            stats.sources_failed += 1;
            failures.push(TargetFailure {
                target: label.clone(),
                error,
            });
        }
        progress.target_finished(&label, ok);
    }

    stats.relevant_new = relevant.len();

    // --- Report and notify ---
    let report = build_report(&relevant);
    let mut notified = false;
    match (&report, options.dry_run) {
        (None, _) => info!("no relevant new jobs; no notification sent"),
        (Some(_), true) => info!(relevant = relevant.len(), "dry run; notification skipped"),
        (Some(report), false) => {
            progress.phase("Sending notification");
            match notifier.send_report(report).await {
                Ok(()) => notified = true,
                Err(e) => warn!(error = %e, "notification failed"),
            }
        }
    }

    let summary = RunSummary {
        stats,
        relevant,
        report,
        notified,
        failures,
        dry_run: options.dry_run,
        elapsed: start.elapsed(),
    };

    info!(
        total = summary.stats.total_jobs,
        new = summary.stats.new_jobs,
        relevant = summary.stats.relevant_new,
        processed = summary.stats.sources_processed,
        failed = summary.stats.sources_failed,
        elapsed_ms = summary.elapsed.as_millis(),
        "ingestion run complete"
    );
    progress.done(&summary);

    Ok(summary)
}

// ---------------------------------------------------------------------------
// Per-target work
// ---------------------------------------------------------------------------

struct TargetReport {
    fetched: usize,
    malformed: usize,
    duplicates: usize,
    rows: Vec<PersistedJob>,
}

enum TargetOutcome {
    Completed(TargetReport),
    /// Fetch or parse failure; the run continues.
    Failed(JobRadarError),
}

/// Walk, normalize, dedup and persist one target. `Err` is reserved for
/// store failures.
#[instrument(skip_all, fields(label = %target.label()))]
async fn process_target(
    target: &SourceTarget,
    registry: &AdapterRegistry,
    store: &dyn JobStore,
    dry_run: bool,
) -> Result<TargetOutcome> {
    let Some(adapter) = registry.get(target.source) else {
        return Ok(TargetOutcome::Failed(JobRadarError::config(format!(
            "no adapter registered for {}",
            target.source
        ))));
    };

    let raw = match adapter.fetch(target.company.as_ref()).await {
        Ok(raw) => raw,
        Err(e) => return Ok(TargetOutcome::Failed(e)),
    };

    let fetched = raw.len();
    let mut jobs = Vec::with_capacity(fetched);
    let mut malformed = 0;
    for record in &raw {
        let ctx = target.context(record.track.as_deref());
        match normalize(target.source, &record.value, &ctx) {
            Some(job) => jobs.push(job),
            None => malformed += 1,
        }
    }
    if malformed > 0 {
        debug!(malformed, "dropped records without company, title or id");
    }

    let (jobs, duplicates) = deduplicate(jobs);

    let rows = if dry_run {
        let now = Utc::now();
        jobs.into_iter()
            .map(|job| PersistedJob {
                id: String::new(),
                job,
                created_at: now,
                updated_at: now,
            })
            .collect()
    } else {
        store.upsert_jobs(&jobs).await?
    };

    Ok(TargetOutcome::Completed(TargetReport {
        fetched,
        malformed,
        duplicates,
        rows,
    }))
}
