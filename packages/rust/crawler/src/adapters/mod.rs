//! Source adapter trait and the built-in job-board adapters.
//!
//! An adapter knows how to page through one job board and lift raw records
//! off it. Turning a raw record into a [`Job`] is done by [`normalize`],
//! dispatched on the source tag.

mod efinancialcareers;
mod greenhouse;
mod lever;
mod linkedin;
mod seek;
mod workday;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use jobradar_shared::{
    AppConfig, Company, Job, JobRadarError, PaginationLimits, Politeness, Result, SearchTrack,
    Source,
};

use crate::engine::Fetcher;
use crate::normalize::NormalizeContext;
use crate::paginator::{PageSource, PageWalker};

pub use efinancialcareers::EfinancialcareersAdapter;
pub use greenhouse::{GreenhouseAdapter, greenhouse_board_token};
pub use lever::{LeverAdapter, lever_slug};
pub use linkedin::LinkedinAdapter;
pub use seek::SeekAdapter;
pub use workday::{WorkdayAdapter, WorkdayBoard};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A raw record plus the search track it was found under, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub value: Value,
    pub track: Option<String>,
}

impl RawRecord {
    pub fn untracked(value: Value) -> Self {
        Self { value, track: None }
    }
}

/// Pages through one job board and returns its raw records.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// Fetch every raw record for one source target. Company-scoped sources
    /// require `company`; keyword sources ignore it.
    async fn fetch(&self, company: Option<&Company>) -> Result<Vec<RawRecord>>;
}

/// Normalize one raw record. `None` means the record was malformed.
pub fn normalize(source: Source, raw: &Value, ctx: &NormalizeContext) -> Option<Job> {
    match source {
        Source::Workday => workday::normalize(raw, ctx),
        Source::Greenhouse => greenhouse::normalize(raw, ctx),
        Source::Lever => lever::normalize(raw, ctx),
        Source::Linkedin => linkedin::normalize(raw, ctx),
        Source::Seek => seek::normalize(raw, ctx),
        Source::Efinancialcareers => efinancialcareers::normalize(raw, ctx),
    }
}

// ---------------------------------------------------------------------------
// Keyword search driver
// ---------------------------------------------------------------------------

/// Walks every term of every track for a keyword-search source, one
/// guarded walk per term, and merges the results dropping records already
/// seen under an earlier term.
///
/// A failing term ends only its own walk; pages it already returned are
/// kept. The target fails only when every term failed.
pub(crate) async fn walk_tracks<F, S>(
    source: Source,
    tracks: &[SearchTrack],
    limits: PaginationLimits,
    politeness: Politeness,
    mut page_source_for: F,
) -> Result<Vec<RawRecord>>
where
    F: FnMut(&str) -> S,
    S: PageSource,
{
    let mut merged = Vec::new();
    let mut seen = HashSet::new();
    let mut first = true;
    let mut attempted = 0usize;
    let mut failed = 0usize;
    let mut last_error: Option<JobRadarError> = None;

    for track in tracks {
        for term in &track.search_terms {
            if !first && !politeness.source_delay.is_zero() {
                tokio::time::sleep(politeness.source_delay).await;
            }
            first = false;

            attempted += 1;

            let page_source = page_source_for(term);
            let mut walker = PageWalker::new(&page_source, limits, politeness.page_delay);
            let before = merged.len();
            loop {
                let records = match walker.next_page().await {
                    Ok(Some(records)) => records,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(%source, track = %track.name, term = %term, error = %e, "search term failed, skipping");
                        failed += 1;
                        last_error = Some(e);
                        break;
                    }
                };
                for value in records {
                    if seen.insert(page_source.raw_identity(&value)) {
                        merged.push(RawRecord {
                            value,
                            track: Some(track.name.clone()),
                        });
                    }
                }
            }
            debug!(%source, track = %track.name, term = %term, new = merged.len() - before, "search term done");
        }
    }

    if attempted > 0 && failed == attempted {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    info!(%source, records = merged.len(), failed_terms = failed, "keyword search complete");
    Ok(merged)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds one adapter per source.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Create a registry with all built-in adapters, configured from `config`.
    pub fn new(config: &AppConfig, fetcher: Arc<Fetcher>) -> Self {
        let politeness = Politeness::from(&config.http);
        let settings = |source| config.sources.settings(source);

        Self {
            adapters: vec![
                Box::new(WorkdayAdapter::new(
                    fetcher.clone(),
                    settings(Source::Workday),
                    politeness,
                )),
                Box::new(GreenhouseAdapter::new(
                    fetcher.clone(),
                    settings(Source::Greenhouse),
                )),
                Box::new(LeverAdapter::new(
                    fetcher.clone(),
                    settings(Source::Lever),
                    politeness,
                )),
                Box::new(LinkedinAdapter::new(
                    fetcher.clone(),
                    settings(Source::Linkedin),
                    politeness,
                )),
                Box::new(SeekAdapter::new(
                    fetcher.clone(),
                    settings(Source::Seek),
                    politeness,
                )),
                Box::new(EfinancialcareersAdapter::new(
                    fetcher,
                    settings(Source::Efinancialcareers),
                    politeness,
                )),
            ],
        }
    }

    /// A registry holding exactly the given adapters.
    pub fn with_adapters(adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    /// The adapter for `source`, if one is registered.
    pub fn get(&self, source: Source) -> Option<&dyn SourceAdapter> {
        self.adapters
            .iter()
            .find(|a| a.source() == source)
            .map(|a| a.as_ref())
    }
}
