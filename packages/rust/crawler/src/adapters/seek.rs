//! Seek listing-page adapter. Search results are server-rendered
//! `article[data-job-id]` cards tagged with `data-automation` attributes.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};
use tracing::instrument;

use jobradar_shared::{Company, Job, Politeness, Result, Source, SourceSettings};

use super::{RawRecord, SourceAdapter, walk_tracks};
use crate::engine::Fetcher;
use crate::normalize::{
    JobFields, NormalizeContext, derive_source_job_id, element_text, parse_date_text, selector,
    text,
};
use crate::paginator::{Page, PageRequest, PageSource};

pub struct SeekAdapter {
    fetcher: Arc<Fetcher>,
    settings: SourceSettings,
    politeness: Politeness,
}

impl SeekAdapter {
    pub fn new(fetcher: Arc<Fetcher>, settings: SourceSettings, politeness: Politeness) -> Self {
        Self {
            fetcher,
            settings,
            politeness,
        }
    }
}

#[async_trait]
impl SourceAdapter for SeekAdapter {
    fn source(&self) -> Source {
        Source::Seek
    }

    #[instrument(skip_all, fields(source = "seek"))]
    async fn fetch(&self, _company: Option<&Company>) -> Result<Vec<RawRecord>> {
        let base = self.settings.endpoint.trim_end_matches('/');
        walk_tracks(
            Source::Seek,
            &self.settings.tracks,
            self.settings.limits,
            self.politeness,
            |term| SeekSearch {
                fetcher: &self.fetcher,
                base,
                listing: search_path(base, term, &self.settings.location),
            },
        )
        .await
    }
}

/// Lowercase, hyphen-joined words: `Head of IT` becomes `head-of-it`.
fn slug(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// `{base}/{keywords}-jobs[/in-{location}]`
fn search_path(base: &str, keywords: &str, location: &str) -> String {
    let mut path = format!("{base}/{}-jobs", slug(keywords));
    let location = location.split_whitespace().collect::<Vec<_>>().join("-");
    if !location.is_empty() {
        path.push_str("/in-");
        path.push_str(&location);
    }
    path
}

struct SeekSearch<'a> {
    fetcher: &'a Fetcher,
    base: &'a str,
    listing: String,
}

#[async_trait]
impl PageSource for SeekSearch<'_> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let url = if request.index == 0 {
            self.listing.clone()
        } else {
            format!("{}?page={}", self.listing, request.index + 1)
        };
        let body = self.fetcher.get_text(&url).await?;
        Ok(Page::new(parse_cards(&body, self.base)?))
    }
}

fn parse_cards(html: &str, base: &str) -> Result<Vec<Value>> {
    let doc = Html::parse_document(html);
    let card_sel = selector("article[data-job-id]")?;
    let auto = |name: &str| selector(&format!(r#"[data-automation="{name}"]"#));
    let title_sel = auto("jobTitle")?;
    let company_sel = auto("jobCompany")?;
    let location_sel = auto("jobLocation")?;
    let desc_sel = auto("jobShortDescription")?;
    let salary_sel = auto("jobSalary")?;
    let work_type_sel = auto("jobWorkType")?;
    let date_sel = auto("jobListingDate")?;

    let mut records = Vec::new();
    for card in doc.select(&card_sel) {
        let id = card.value().attr("data-job-id").unwrap_or_default().trim();
        if id.is_empty() {
            continue;
        }
        let salary = first_text(card, &salary_sel);
        let work_type = first_text(card, &work_type_sel);
        let mut description = first_text(card, &desc_sel);
        if !work_type.is_empty() {
            description.push_str(&format!("\n\nWork Type: {work_type}"));
        }
        if !salary.is_empty() {
            description.push_str(&format!("\nSalary: {salary}"));
        }

        records.push(json!({
            "id": id,
            "title": first_text(card, &title_sel),
            "company": first_text(card, &company_sel),
            "location": first_text(card, &location_sel),
            "description": description,
            "salary": salary,
            "work_type": work_type,
            "listing_date": first_text(card, &date_sel),
            "url": format!("{base}/job/{id}"),
        }));
    }
    Ok(records)
}

fn first_text(card: ElementRef<'_>, sel: &Selector) -> String {
    card.select(sel).next().map(element_text).unwrap_or_default()
}

pub(crate) fn normalize(raw: &Value, ctx: &NormalizeContext) -> Option<Job> {
    let id = text(raw, "id", &["jobId"]);
    let mut url = text(raw, "url", &[]);
    if url.is_empty() && !id.is_empty() {
        url = format!("https://www.seek.com.au/job/{id}");
    }

    JobFields {
        company: text(raw, "company", &["advertiser"]),
        title: text(raw, "title", &[]),
        location: text(raw, "location", &[]),
        description: text(raw, "description", &[]),
        source_job_id: derive_source_job_id(&id, "", &url, raw),
        posted_at: parse_date_text(&text(raw, "listing_date", &["listingDate"]), chrono::Utc::now()),
        url,
        ..JobFields::default()
    }
    .into_job(Source::Seek, ctx)
}
