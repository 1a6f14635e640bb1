//! Guarded pagination over a single source listing.
//!
//! A [`PageWalker`] pulls one page per [`PageWalker::next_page`] call and
//! stops on the first guard that fires, in this order:
//!
//! 1. empty page
//! 2. stall: every record on the page was already seen in this walk
//! 3. (accumulate unseen records)
//! 4. short page (`records < limit`) or a page flagged `last`
//! 5. (advance the offset and token)
//! 6. hard cap: `offset > max_offset`

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use jobradar_shared::{PaginationLimits, Result};

/// Position of the page being requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page number.
    pub index: usize,
    /// Cumulative record offset (`index * limit` unless a source cursors by token).
    pub offset: usize,
    pub limit: usize,
    /// Continuation token from the previous page, for token-cursored sources.
    pub token: Option<String>,
}

/// One page of raw records.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Value>,
    pub next_token: Option<String>,
    /// The source signalled there is nothing after this page.
    pub last: bool,
}

impl Page {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn last(records: Vec<Value>) -> Self {
        Self {
            records,
            last: true,
            ..Self::default()
        }
    }
}

/// A listing that can be fetched one page at a time.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page>;

    /// Raw per-record identity used by the stall guard.
    fn raw_identity(&self, record: &Value) -> String {
        raw_identity(record, &["id"])
    }
}

/// First non-empty identity among `keys`, else the record's compact JSON.
pub fn raw_identity(record: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| record.to_string())
}

// ---------------------------------------------------------------------------
// PageWalker
// ---------------------------------------------------------------------------

/// Lazy, guarded walk over a [`PageSource`].
pub struct PageWalker<'a, S: PageSource + ?Sized> {
    source: &'a S,
    limits: PaginationLimits,
    page_delay: Duration,
    seen: HashSet<String>,
    index: usize,
    offset: usize,
    token: Option<String>,
    fetches: usize,
    done: bool,
}

impl<'a, S: PageSource + ?Sized> PageWalker<'a, S> {
    pub fn new(source: &'a S, limits: PaginationLimits, page_delay: Duration) -> Self {
        Self {
            source,
            limits: PaginationLimits {
                page_size: limits.page_size.max(1),
                max_offset: limits.max_offset,
            },
            page_delay,
            seen: HashSet::new(),
            index: 0,
            offset: 0,
            token: None,
            fetches: 0,
            done: false,
        }
    }

    /// Number of page fetches performed so far.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Fetch the next page and return its newly seen records, or `None` once
    /// a guard has fired. A fetch error ends the walk and is returned.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>> {
        if self.done {
            return Ok(None);
        }

        if self.index > 0 && !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }

        let request = PageRequest {
            index: self.index,
            offset: self.offset,
            limit: self.limits.page_size,
            token: self.token.clone(),
        };

        self.fetches += 1;
        let page = match self.source.fetch_page(&request).await {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        let fetched = page.records.len();
        debug!(offset = request.offset, records = fetched, "fetched page");

        if page.records.is_empty() {
            debug!(offset = request.offset, "empty page, stopping");
            self.done = true;
            return Ok(None);
        }

        let ids: Vec<String> = page
            .records
            .iter()
            .map(|r| self.source.raw_identity(r))
            .collect();

        if ids.iter().all(|id| self.seen.contains(id)) {
            debug!(offset = request.offset, "page repeats seen records, stopping");
            self.done = true;
            return Ok(None);
        }

        let mut fresh = Vec::with_capacity(fetched);
        for (record, id) in page.records.into_iter().zip(ids) {
            if self.seen.insert(id) {
                fresh.push(record);
            }
        }

        if fetched < self.limits.page_size || page.last {
            self.done = true;
            return Ok(Some(fresh));
        }

        self.index += 1;
        self.offset += self.limits.page_size;
        self.token = page.next_token;

        if self.offset > self.limits.max_offset {
            debug!(offset = self.offset, max_offset = self.limits.max_offset, "hard cap reached");
            self.done = true;
        }

        Ok(Some(fresh))
    }

    /// Drain the walk into a single batch.
    pub async fn collect(mut self) -> Result<Vec<Value>> {
        let mut all = Vec::new();
        while let Some(records) = self.next_page().await? {
            all.extend(records);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use jobradar_shared::JobRadarError;
    use serde_json::json;

    /// Serves pages from a closure keyed on the request and counts calls.
    struct ScriptedSource<F> {
        pages: F,
        calls: AtomicUsize,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl<F> ScriptedSource<F>
    where
        F: Fn(&PageRequest) -> Result<Page> + Send + Sync,
    {
        fn new(pages: F) -> Self {
            Self {
                pages,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<F> PageSource for ScriptedSource<F>
    where
        F: Fn(&PageRequest) -> Result<Page> + Send + Sync,
    {
        async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            (self.pages)(request)
        }
    }

    fn records(start: usize, count: usize) -> Vec<Value> {
        (start..start + count).map(|i| json!({ "id": i.to_string() })).collect()
    }

    fn limits(page_size: usize, max_offset: usize) -> PaginationLimits {
        PaginationLimits {
            page_size,
            max_offset,
        }
    }

    #[tokio::test]
    async fn repeated_page_stops_via_stall_guard() {
        let source = ScriptedSource::new(|_| Ok(Page::new(records(0, 20))));
        let walker = PageWalker::new(&source, limits(20, 10_000), Duration::ZERO);

        let all = walker.collect().await.unwrap();
        assert_eq!(all.len(), 20);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn distinct_full_pages_stop_at_hard_cap() {
        let source = ScriptedSource::new(|req| Ok(Page::new(records(req.offset, 10))));
        let walker = PageWalker::new(&source, limits(10, 50), Duration::ZERO);

        let all = walker.collect().await.unwrap();
        // Offsets 0, 10, 20, 30, 40, 50 are fetched; 60 > 50 stops.
        assert_eq!(source.calls(), 6);
        assert_eq!(all.len(), 60);
    }

    #[tokio::test]
    async fn short_page_stops_after_accumulating() {
        let source = ScriptedSource::new(|req| match req.index {
            0 => Ok(Page::new(records(0, 20))),
            1 => Ok(Page::new(records(20, 7))),
            _ => panic!("third page must not be fetched"),
        });
        let walker = PageWalker::new(&source, limits(20, 2_000), Duration::ZERO);

        let all = walker.collect().await.unwrap();
        assert_eq!(all.len(), 27);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn empty_first_page_yields_nothing() {
        let source = ScriptedSource::new(|_| Ok(Page::default()));
        let mut walker = PageWalker::new(&source, limits(20, 2_000), Duration::ZERO);

        assert!(walker.next_page().await.unwrap().is_none());
        assert!(walker.next_page().await.unwrap().is_none());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn partial_overlap_keeps_only_unseen() {
        let source = ScriptedSource::new(|req| match req.index {
            0 => Ok(Page::new(records(0, 4))),
            _ => Ok(Page::new(records(2, 3))),
        });
        let walker = PageWalker::new(&source, limits(4, 100), Duration::ZERO);

        let all = walker.collect().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn last_flag_and_token_are_honoured() {
        let source = ScriptedSource::new(|req| match req.token.as_deref() {
            None => Ok(Page {
                records: records(0, 2),
                next_token: Some("cursor-1".into()),
                last: false,
            }),
            Some("cursor-1") => Ok(Page::last(records(2, 2))),
            Some(other) => panic!("unexpected token {other}"),
        });
        let walker = PageWalker::new(&source, limits(2, 1_000), Duration::ZERO);

        let all = walker.collect().await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(source.calls(), 2);
        let offsets: Vec<usize> = source.requests.lock().unwrap().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 2]);
    }

    #[tokio::test]
    async fn fetch_error_ends_walk() {
        let source = ScriptedSource::new(|req| match req.index {
            0 => Ok(Page::new(records(0, 5))),
            _ => Err(JobRadarError::Http {
                url: "https://example.com".into(),
                status: 503,
            }),
        });
        let mut walker = PageWalker::new(&source, limits(5, 100), Duration::ZERO);

        assert_eq!(walker.next_page().await.unwrap().unwrap().len(), 5);
        assert!(walker.next_page().await.is_err());
        assert!(walker.next_page().await.unwrap().is_none());
        assert_eq!(walker.fetches(), 2);
    }

    #[test]
    fn raw_identity_fallbacks() {
        let rec = json!({"externalPath": "/job/1", "id": 9});
        assert_eq!(raw_identity(&rec, &["externalPath", "id"]), "/job/1");
        assert_eq!(raw_identity(&rec, &["missing", "id"]), "9");
        let bare = json!({"title": "CTO"});
        assert_eq!(raw_identity(&bare, &["id"]), bare.to_string());
    }
}
