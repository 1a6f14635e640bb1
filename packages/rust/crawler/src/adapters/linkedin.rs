//! LinkedIn guest job-search adapter.
//!
//! Pages through the `seeMoreJobPostings` HTML fragment once per search term
//! and lifts each `div.base-card` into a raw JSON record.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use jobradar_shared::{Company, Job, JobRadarError, Politeness, Result, Source, SourceSettings};

use super::{RawRecord, SourceAdapter, walk_tracks};
use crate::engine::Fetcher;
use crate::normalize::{
    JobFields, NormalizeContext, derive_source_job_id, element_text, parse_date_text, selector,
    text,
};
use crate::paginator::{Page, PageRequest, PageSource};

/// LinkedIn's geo id for Australia.
const GEO_ID: &str = "101452733";

pub struct LinkedinAdapter {
    fetcher: Arc<Fetcher>,
    settings: SourceSettings,
    politeness: Politeness,
}

impl LinkedinAdapter {
    pub fn new(fetcher: Arc<Fetcher>, settings: SourceSettings, politeness: Politeness) -> Self {
        Self {
            fetcher,
            settings,
            politeness,
        }
    }
}

#[async_trait]
impl SourceAdapter for LinkedinAdapter {
    fn source(&self) -> Source {
        Source::Linkedin
    }

    #[instrument(skip_all, fields(source = "linkedin"))]
    async fn fetch(&self, _company: Option<&Company>) -> Result<Vec<RawRecord>> {
        let mut records = walk_tracks(
            Source::Linkedin,
            &self.settings.tracks,
            self.settings.limits,
            self.politeness,
            |term| LinkedinSearch {
                fetcher: &self.fetcher,
                settings: &self.settings,
                keywords: term.to_string(),
            },
        )
        .await?;

        // Filtered after the walk so short-page detection sees whole pages.
        let fetched = records.len();
        records.retain(|r| {
            self.settings
                .location_allowed(r.value["location"].as_str().unwrap_or_default())
        });
        if records.len() < fetched {
            debug!(dropped = fetched - records.len(), "dropped cards outside the location allow-list");
        }
        Ok(records)
    }
}

struct LinkedinSearch<'a> {
    fetcher: &'a Fetcher,
    settings: &'a SourceSettings,
    keywords: String,
}

#[async_trait]
impl PageSource for LinkedinSearch<'_> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let start = request.offset.to_string();
        let endpoint = self.settings.endpoint.as_str();
        let url = Url::parse_with_params(
            endpoint,
            [
                ("keywords", self.keywords.as_str()),
                ("location", self.settings.location.as_str()),
                ("start", start.as_str()),
                ("geoId", GEO_ID),
            ],
        )
        .map_err(|e| JobRadarError::config(format!("invalid LinkedIn endpoint {endpoint}: {e}")))?;

        let body = self.fetcher.get_text(url.as_str()).await?;
        Ok(Page::new(parse_cards(&body)?))
    }
}

/// Lift job cards off a search-results fragment.
fn parse_cards(html: &str) -> Result<Vec<Value>> {
    let doc = Html::parse_document(html);
    let card_sel = selector("div.base-card")?;
    let title_sel = selector("h3.base-search-card__title")?;
    let company_sel = selector("h4.base-search-card__subtitle")?;
    let location_sel = selector("span.job-search-card__location")?;
    let time_sel = selector("time")?;
    let link_sel = selector("a.base-card__full-link")?;

    let mut records = Vec::new();
    for card in doc.select(&card_sel) {
        let id = card
            .value()
            .attr("data-entity-urn")
            .and_then(|urn| urn.rsplit(':').next())
            .unwrap_or_default()
            .trim()
            .to_string();
        if id.is_empty() {
            continue;
        }

        let first_text = |sel: &Selector| card.select(sel).next().map(element_text).unwrap_or_default();
        let posted = card
            .select(&time_sel)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .unwrap_or_default();
        let url = card
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| href.split('?').next().unwrap_or(href).to_string())
            .unwrap_or_else(|| format!("https://www.linkedin.com/jobs/view/{id}"));

        records.push(json!({
            "id": id,
            "title": first_text(&title_sel),
            "company": first_text(&company_sel),
            "location": first_text(&location_sel),
            "posted_date": posted,
            "url": url,
        }));
    }
    Ok(records)
}

pub(crate) fn normalize(raw: &Value, ctx: &NormalizeContext) -> Option<Job> {
    let url = text(raw, "url", &[]);
    let posted = text(raw, "posted_date", &["postedDate"]);
    let description = format!(
        "LinkedIn job posting. View full details at the link.\n\nPosted: {}",
        if posted.is_empty() { "Recently" } else { posted.as_str() }
    );

    JobFields {
        company: text(raw, "company", &["companyName"]),
        title: text(raw, "title", &[]),
        location: text(raw, "location", &[]),
        description,
        source_job_id: derive_source_job_id(&text(raw, "id", &[]), "", &url, raw),
        posted_at: parse_date_text(&posted, chrono::Utc::now()),
        url,
        ..JobFields::default()
    }
    .into_job(Source::Linkedin, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support;
    use jobradar_shared::SearchTrack;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn card(id: u64, title: &str, location: &str) -> String {
        format!(
            r#"<li><div class="base-card" data-entity-urn="urn:li:jobPosting:{id}">
                <a class="base-card__full-link" href="https://au.linkedin.com/jobs/view/{id}?refId=abc&trk=x"></a>
                <h3 class="base-search-card__title"> {title} </h3>
                <h4 class="base-search-card__subtitle"><a>Telstra</a></h4>
                <span class="job-search-card__location">{location}</span>
                <time datetime="2026-03-02">1 week ago</time>
            </div></li>"#
        )
    }

    #[test]
    fn parses_cards() {
        let html = format!(
            "{}{}<div class=\"base-card\">no urn</div>",
            card(111, "Chief Technology Officer", "Sydney, New South Wales, Australia"),
            card(222, "Head of IT", "Melbourne")
        );
        let records = parse_cards(&html).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], "111");
        assert_eq!(records[0]["title"], "Chief Technology Officer");
        assert_eq!(records[0]["company"], "Telstra");
        assert_eq!(records[0]["url"], "https://au.linkedin.com/jobs/view/111");
        assert_eq!(records[0]["posted_date"], "2026-03-02");
    }

    #[test]
    fn normalizes_record() {
        let raw = json!({
            "id": "111",
            "title": "CTO",
            "company": "Telstra",
            "location": "Sydney",
            "posted_date": "",
            "url": "https://au.linkedin.com/jobs/view/111"
        });
        let job = normalize(&raw, &NormalizeContext::for_track(Some("technology"))).unwrap();
        assert_eq!(job.source_job_id, "111");
        assert_eq!(job.track.as_deref(), Some("technology"));
        assert!(job.description.ends_with("Posted: Recently"));
        assert!(job.posted_at.is_none());
    }

    #[tokio::test]
    async fn walks_each_term_and_merges_repeats() {
        let server = MockServer::start().await;
        let full_page: String = (0..25).map(|i| card(1000 + i, "CTO", "Sydney")).collect();

        Mock::given(method("GET"))
            .and(query_param("keywords", "CTO"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(full_page))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("keywords", "CTO"))
            .and(query_param("start", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_string(card(2000, "CTO", "Perth")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("keywords", "CIO"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("{}{}", card(1000, "CTO", "Sydney"), card(3000, "CIO", ""))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = SourceSettings::builtin(Source::Linkedin);
        settings.endpoint = format!("{}/jobs-guest/jobs/api/seeMoreJobPostings/search", server.uri());
        settings.tracks = vec![SearchTrack {
            name: "technology".into(),
            search_terms: vec!["CTO".into(), "CIO".into()],
        }];
        let adapter = LinkedinAdapter::new(test_support::fetcher(), settings, test_support::politeness());

        let records = adapter.fetch(None).await.unwrap();
        assert_eq!(records.len(), 27);
        assert!(records.iter().all(|r| r.track.as_deref() == Some("technology")));
    }

    #[tokio::test]
    async fn drops_cards_outside_allowed_locations() {
        let server = MockServer::start().await;
        let mut page: String = (0..24).map(|i| card(1000 + i, "CTO", "Sydney NSW")).collect();
        page.push_str(&card(5000, "CTO", "London, England, United Kingdom"));

        Mock::given(method("GET"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("start", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_string(card(6000, "CIO", "")))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = SourceSettings::builtin(Source::Linkedin);
        settings.endpoint = format!("{}/jobs-guest/jobs/api/seeMoreJobPostings/search", server.uri());
        settings.tracks = vec![SearchTrack {
            name: "technology".into(),
            search_terms: vec!["CTO".into()],
        }];
        let adapter = LinkedinAdapter::new(test_support::fetcher(), settings, test_support::politeness());

        let records = adapter.fetch(None).await.unwrap();
        assert_eq!(records.len(), 25);
        assert!(records.iter().all(|r| r.value["id"] != "5000"));
        assert!(records.iter().any(|r| r.value["id"] == "6000"));
    }
}
