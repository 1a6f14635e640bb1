//! Lever postings adapter (public `v0/postings` JSON API).

use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{info, instrument};

use jobradar_shared::{Company, Job, JobRadarError, Politeness, Result, Source, SourceSettings};

use super::{RawRecord, SourceAdapter};
use crate::engine::Fetcher;
use crate::normalize::{
    JobFields, NormalizeContext, derive_source_job_id, field, html_list_items, parse_posted_at,
    strip_html, text,
};
use crate::paginator::{Page, PageRequest, PageSource, PageWalker};

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)lever\.co/([a-z0-9_-]+)").expect("valid regex"));

/// Extract the company slug from a careers URL, e.g.
/// `https://jobs.lever.co/canva` gives `canva`.
pub fn lever_slug(board_url: &str) -> Result<String> {
    SLUG_RE
        .captures(board_url)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| JobRadarError::validation(format!("cannot extract Lever slug from {board_url}")))
}

pub struct LeverAdapter {
    fetcher: Arc<Fetcher>,
    settings: SourceSettings,
    politeness: Politeness,
}

impl LeverAdapter {
    pub fn new(fetcher: Arc<Fetcher>, settings: SourceSettings, politeness: Politeness) -> Self {
        Self {
            fetcher,
            settings,
            politeness,
        }
    }
}

#[async_trait]
impl SourceAdapter for LeverAdapter {
    fn source(&self) -> Source {
        Source::Lever
    }

    #[instrument(skip_all, fields(source = "lever", company = company.map(|c| c.name.as_str()).unwrap_or("")))]
    async fn fetch(&self, company: Option<&Company>) -> Result<Vec<RawRecord>> {
        let company =
            company.ok_or_else(|| JobRadarError::validation("lever source requires a company"))?;
        let board_url = company.board_for(Source::Lever).ok_or_else(|| {
            JobRadarError::validation(format!("{} has no Lever board URL", company.name))
        })?;
        let slug = lever_slug(board_url)?;

        let listing = LeverPostings {
            fetcher: &self.fetcher,
            base: format!("{}/{slug}", self.settings.endpoint.trim_end_matches('/')),
        };
        let records = PageWalker::new(&listing, self.settings.limits, self.politeness.page_delay)
            .collect()
            .await?;

        info!(slug = %slug, records = records.len(), "fetched Lever postings");
        Ok(records.into_iter().map(RawRecord::untracked).collect())
    }
}

struct LeverPostings<'a> {
    fetcher: &'a Fetcher,
    base: String,
}

#[async_trait]
impl PageSource for LeverPostings<'_> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let mut url = format!("{}?mode=json&limit={}", self.base, request.limit);
        if let Some(token) = &request.token {
            url.push_str("&offset=");
            url.push_str(token);
        }

        match self.fetcher.get_json(&url).await? {
            // A bare list is the whole board.
            Value::Array(records) => Ok(Page::last(records)),
            Value::Object(obj) => {
                let records = obj
                    .get("data")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let next_token = obj
                    .get("next")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from);
                let last = next_token.is_none();
                Ok(Page {
                    records,
                    next_token,
                    last,
                })
            }
            _ => Err(JobRadarError::parse(format!("{url}: unexpected Lever response shape"))),
        }
    }
}

/// Lever descriptions come as `lists[]` blocks of `{text, content}` where
/// `content` is an HTML list; each item becomes a `- item` bullet.
fn describe(raw: &Value) -> String {
    let mut parts = Vec::new();
    if let Some(lists) = field(raw, "lists", &[]).and_then(Value::as_array) {
        for section in lists {
            let heading = text(section, "text", &[]);
            if !heading.is_empty() {
                parts.push(heading);
            }
            for item in html_list_items(&text(section, "content", &[])) {
                parts.push(format!("- {item}"));
            }
        }
    }

    if parts.is_empty() {
        let plain = text(raw, "descriptionPlain", &[]);
        if plain.is_empty() {
            strip_html(&text(raw, "description", &[]))
        } else {
            plain
        }
    } else {
        parts.join("\n")
    }
}

pub(crate) fn normalize(raw: &Value, ctx: &NormalizeContext) -> Option<Job> {
    let company = ctx.company_name.clone().unwrap_or_default();
    let url = text(raw, "hostedUrl", &["applyUrl"]);
    let categories = raw.get("categories").cloned().unwrap_or(Value::Null);

    let posted_at = field(raw, "createdAt", &[]).and_then(|v| parse_posted_at(v, chrono::Utc::now()));

    JobFields {
        company,
        title: text(raw, "text", &["title"]),
        location: text(&categories, "location", &["allLocations"]),
        department: text(&categories, "department", &["team"]),
        description: describe(raw),
        source_job_id: derive_source_job_id(&text(raw, "id", &[]), "", &url, raw),
        posted_at,
        url,
        ..JobFields::default()
    }
    .into_job(Source::Lever, ctx)
}
