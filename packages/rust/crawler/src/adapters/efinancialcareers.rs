//! eFinancialCareers adapter. The site reshuffles its markup often, so every
//! card field is read through an ordered list of candidate selectors.

use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};
use tracing::instrument;
use url::Url;

use jobradar_shared::{Company, Job, JobRadarError, Politeness, Result, Source, SourceSettings};

use super::{RawRecord, SourceAdapter, walk_tracks};
use crate::engine::Fetcher;
use crate::normalize::{
    JobFields, NormalizeContext, derive_source_job_id, element_text, parse_date_text, selector,
    text,
};
use crate::paginator::{Page, PageRequest, PageSource};

const CARD_SELECTORS: &[&str] = &[
    r#"[data-testid="job-result"]"#,
    "article.job-result",
    ".job-item",
    r#"[class*="JobCard"]"#,
    r#"[class*="job-card"]"#,
    r#"li[class*="job"]"#,
];
const TITLE_SELECTORS: &[&str] = &[
    "h2 a, h3 a",
    r#"[class*="title"] a"#,
    r#"[class*="JobTitle"] a"#,
    r#"a[class*="job"]"#,
];
const COMPANY_SELECTORS: &[&str] = &[
    r#"[class*="company"]"#,
    r#"[class*="employer"]"#,
    r#"[class*="Employer"]"#,
    r#"[class*="Organisation"]"#,
];
const LOCATION_SELECTORS: &[&str] = &[
    r#"[class*="location"]"#,
    r#"[class*="Location"]"#,
    r#"[class*="city"]"#,
];
const DATE_SELECTORS: &[&str] = &[
    "time",
    r#"[class*="date"]"#,
    r#"[class*="Date"]"#,
    r#"[class*="posted"]"#,
    r#"[class*="ago"]"#,
];
const SNIPPET_SELECTORS: &[&str] = &[
    r#"[class*="snippet"]"#,
    r#"[class*="summary"]"#,
    r#"[class*="description"]"#,
    r#"[class*="excerpt"]"#,
    "p",
];

/// Snippets are cut to this many characters.
const SNIPPET_CHARS: usize = 300;

static SLUG_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/([a-z0-9-]+-\d+)(?:\?|$)").expect("valid regex"));
static QUERY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"jobId=([^&]+)").expect("valid regex"));

pub struct EfinancialcareersAdapter {
    fetcher: Arc<Fetcher>,
    settings: SourceSettings,
    politeness: Politeness,
}

impl EfinancialcareersAdapter {
    pub fn new(fetcher: Arc<Fetcher>, settings: SourceSettings, politeness: Politeness) -> Self {
        Self {
            fetcher,
            settings,
            politeness,
        }
    }
}

#[async_trait]
impl SourceAdapter for EfinancialcareersAdapter {
    fn source(&self) -> Source {
        Source::Efinancialcareers
    }

    #[instrument(skip_all, fields(source = "efinancialcareers"))]
    async fn fetch(&self, _company: Option<&Company>) -> Result<Vec<RawRecord>> {
        let base = self.settings.endpoint.trim_end_matches('/');
        walk_tracks(
            Source::Efinancialcareers,
            &self.settings.tracks,
            self.settings.limits,
            self.politeness,
            |term| EfcSearch {
                fetcher: &self.fetcher,
                base,
                location: &self.settings.location,
                query: term.to_string(),
            },
        )
        .await
    }
}

struct EfcSearch<'a> {
    fetcher: &'a Fetcher,
    base: &'a str,
    location: &'a str,
    query: String,
}

#[async_trait]
impl PageSource for EfcSearch<'_> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let page = (request.index + 1).to_string();
        let url = Url::parse_with_params(
            &format!("{}/jobs", self.base),
            [
                ("q", self.query.as_str()),
                ("location", self.location),
                ("page", page.as_str()),
            ],
        )
        .map_err(|e| JobRadarError::config(format!("invalid eFinancialCareers base {}: {e}", self.base)))?;

        let body = self.fetcher.get_text(url.as_str()).await?;
        Ok(Page::new(parse_cards(&body, self.base)?))
    }
}

fn compile(list: &[&str]) -> Result<Vec<Selector>> {
    list.iter().map(|css| selector(css)).collect()
}

/// First element matched by the earliest selector in `candidates`.
fn first_match<'a>(card: ElementRef<'a>, candidates: &[Selector]) -> Option<ElementRef<'a>> {
    candidates.iter().find_map(|sel| card.select(sel).next())
}

/// The posting id: a `slug-123` path segment, a `jobId` query value, or the
/// last path segment.
fn id_from_url(url: &str) -> String {
    if let Some(caps) = SLUG_ID_RE.captures(url) {
        return caps[1].to_string();
    }
    if let Some(caps) = QUERY_ID_RE.captures(url) {
        return caps[1].to_string();
    }
    let path = url.split('?').next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or_default().to_string()
}

fn parse_cards(html: &str, base: &str) -> Result<Vec<Value>> {
    let doc = Html::parse_document(html);
    let titles = compile(TITLE_SELECTORS)?;
    let companies = compile(COMPANY_SELECTORS)?;
    let locations = compile(LOCATION_SELECTORS)?;
    let dates = compile(DATE_SELECTORS)?;
    let snippets = compile(SNIPPET_SELECTORS)?;

    let mut cards = Vec::new();
    for css in CARD_SELECTORS {
        let sel = selector(css)?;
        cards = doc.select(&sel).collect::<Vec<_>>();
        if !cards.is_empty() {
            break;
        }
    }

    let mut records = Vec::new();
    for card in cards {
        let Some(title_el) = first_match(card, &titles) else {
            continue;
        };
        let title = element_text(title_el);
        if title.is_empty() {
            continue;
        }

        let href = title_el.value().attr("href").unwrap_or_default();
        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{base}{href}")
        };

        let text_of = |candidates: &[Selector]| {
            first_match(card, candidates)
                .map(element_text)
                .unwrap_or_default()
        };
        let posted = first_match(card, &dates)
            .map(|el| {
                el.value()
                    .attr("datetime")
                    .map(String::from)
                    .unwrap_or_else(|| element_text(el))
            })
            .unwrap_or_default();
        let snippet: String = text_of(&snippets).chars().take(SNIPPET_CHARS).collect();

        records.push(json!({
            "id": id_from_url(&url),
            "title": title,
            "company": text_of(&companies),
            "location": text_of(&locations),
            "url": url,
            "posted_text": posted,
            "snippet": snippet,
        }));
    }
    Ok(records)
}

pub(crate) fn normalize(raw: &Value, ctx: &NormalizeContext) -> Option<Job> {
    let url = text(raw, "url", &[]);
    let track = ctx
        .track
        .clone()
        .unwrap_or_else(|| text(raw, "track", &[]))
        .trim()
        .to_string();
    let track = if track.is_empty() { "technology".to_string() } else { track };

    let snippet = text(raw, "snippet", &[]);
    let mut description = format!("eFinancialCareers job posting [{track}].");
    if !snippet.is_empty() {
        description.push_str("\n\n");
        description.push_str(&snippet);
    }
    description.push_str("\n\nView full details at the link.");

    let ctx = NormalizeContext {
        track: Some(track),
        ..ctx.clone()
    };

    JobFields {
        company: text(raw, "company", &[]),
        title: text(raw, "title", &[]),
        location: text(raw, "location", &[]),
        description,
        source_job_id: derive_source_job_id(&text(raw, "id", &[]), "", &url, raw),
        posted_at: parse_date_text(&text(raw, "posted_text", &["postedText"]), chrono::Utc::now()),
        url,
        ..JobFields::default()
    }
    .into_job(Source::Efinancialcareers, &ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support;
    use jobradar_shared::SearchTrack;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BASE: &str = "https://www.efinancialcareers.com.au";

    fn testid_card(slug: &str, title: &str) -> String {
        format!(
            r#"<div data-testid="job-result">
                <h3><a href="/jobs-Australia-Sydney-{slug}">{title}</a></h3>
                <span class="company-name">Macquarie Group</span>
                <span class="job-location">Sydney, Australia</span>
                <span class="posted-date">3 days ago</span>
                <p>Drive the regional growth agenda.</p>
            </div>"#
        )
    }

    #[test]
    fn ids_from_urls() {
        assert_eq!(id_from_url(&format!("{BASE}/jobs-Australia-Sydney-head-of-apac.id22150110")), "jobs-Australia-Sydney-head-of-apac.id22150110");
        assert_eq!(id_from_url(&format!("{BASE}/job/head-of-china-12345?src=x")), "head-of-china-12345");
        assert_eq!(id_from_url(&format!("{BASE}/apply?jobId=abc&x=1")), "abc");
    }

    #[test]
    fn parses_primary_card_layout() {
        let html = format!(
            "{}{}",
            testid_card("head-of-apac-1001", "Head of APAC"),
            testid_card("cio-1002", "Chief Information Officer")
        );
        let records = parse_cards(&html, BASE).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], "jobs-Australia-Sydney-head-of-apac-1001");
        assert_eq!(records[0]["company"], "Macquarie Group");
        assert_eq!(records[0]["location"], "Sydney, Australia");
        assert_eq!(records[0]["posted_text"], "3 days ago");
        assert_eq!(records[0]["snippet"], "Drive the regional growth agenda.");
        assert_eq!(records[0]["url"], format!("{BASE}/jobs-Australia-Sydney-head-of-apac-1001"));
    }

    #[test]
    fn falls_back_to_later_card_selectors() {
        let html = r#"<ul>
            <li class="job-row"><a class="job-link" href="https://www.efinancialcareers.com.au/jobs/cto-77">CTO</a>
            <time datetime="2026-03-01T00:00:00Z">1 week ago</time></li>
            <li class="job-row"><span>no title link</span></li>
        </ul>"#;
        let records = parse_cards(html, BASE).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], "cto-77");
        assert_eq!(records[0]["posted_text"], "2026-03-01T00:00:00Z");
    }

    #[test]
    fn normalizes_with_track_description() {
        let raw = json!({
            "id": "head-of-apac-1001",
            "title": "Head of APAC",
            "company": "Macquarie Group",
            "location": "Sydney",
            "url": "https://www.efinancialcareers.com.au/jobs/head-of-apac-1001",
            "posted_text": "2 weeks ago",
            "snippet": "Regional growth."
        });
        let job = normalize(&raw, &NormalizeContext::for_track(Some("apac_china"))).unwrap();
        assert_eq!(job.track.as_deref(), Some("apac_china"));
        assert_eq!(
            job.description,
            "eFinancialCareers job posting [apac_china].\n\nRegional growth.\n\nView full details at the link."
        );
        assert!(job.posted_at.is_some());

        let untracked = normalize(&raw, &NormalizeContext::default()).unwrap();
        assert_eq!(untracked.track.as_deref(), Some("technology"));
        assert!(untracked.description.starts_with("eFinancialCareers job posting [technology]."));
    }

    #[tokio::test]
    async fn walks_both_tracks() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/jobs"))
            .and(query_param("q", "CIO"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(testid_card("cio-1", "CIO")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .and(query_param("q", "Head of China"))
            .and(query_param("location", "Australia"))
            .respond_with(ResponseTemplate::new(200).set_body_string(testid_card("china-2", "Head of China")))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = SourceSettings::builtin(Source::Efinancialcareers);
        settings.endpoint = server.uri();
        settings.tracks = vec![
            SearchTrack {
                name: "technology".into(),
                search_terms: vec!["CIO".into()],
            },
            SearchTrack {
                name: "apac_china".into(),
                search_terms: vec!["Head of China".into()],
            },
        ];
        let adapter =
            EfinancialcareersAdapter::new(test_support::fetcher(), settings, test_support::politeness());

        let records = adapter.fetch(None).await.unwrap();
        let tracks: Vec<&str> = records.iter().filter_map(|r| r.track.as_deref()).collect();
        assert_eq!(tracks, vec!["technology", "apac_china"]);
    }
}
