//! Workday careers-site adapter (`/wday/cxs` JSON search endpoint).

use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{info, instrument};
use url::Url;

use jobradar_shared::{Company, Job, JobRadarError, Politeness, Result, Source, SourceSettings};

use super::{RawRecord, SourceAdapter};
use crate::engine::Fetcher;
use crate::normalize::{
    JobFields, NormalizeContext, derive_source_job_id, field, parse_date_text, strip_html, text,
};
use crate::paginator::{Page, PageRequest, PageSource, PageWalker, raw_identity};

/// Keys Workday uses for the requisition id inside `bulletFields`.
const REQUISITION_KEYS: [&str; 3] = ["Requisition ID", "Job Requisition ID", "jobReqId"];

static LOCALE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}-[A-Za-z]{2}$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Board locator
// ---------------------------------------------------------------------------

/// The `(origin, tenant, site)` triple a Workday board URL encodes, e.g.
/// `https://acme.wd3.myworkdayjobs.com/en-US/External`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkdayBoard {
    pub origin: String,
    pub tenant: String,
    pub site: String,
}

impl WorkdayBoard {
    pub fn parse(board_url: &str) -> Result<Self> {
        let url = Url::parse(board_url.trim())
            .map_err(|e| JobRadarError::validation(format!("invalid Workday board URL {board_url}: {e}")))?;

        let host = url
            .host_str()
            .ok_or_else(|| JobRadarError::validation(format!("Workday board URL has no host: {board_url}")))?;
        let tenant = host.split('.').next().unwrap_or_default().to_string();

        let site = url
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|seg| !seg.is_empty())
            .find(|seg| !LOCALE_RE.is_match(seg))
            .map(String::from)
            .ok_or_else(|| JobRadarError::validation(format!("Workday board URL has no site path: {board_url}")))?;

        if tenant.is_empty() {
            return Err(JobRadarError::validation(format!(
                "cannot derive Workday tenant from {board_url}"
            )));
        }

        Ok(Self {
            origin: url.origin().ascii_serialization(),
            tenant,
            site,
        })
    }

    /// The job search endpoint for this board.
    pub fn jobs_endpoint(&self) -> String {
        format!("{}/wday/cxs/{}/{}/jobs", self.origin, self.tenant, self.site)
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct WorkdayAdapter {
    fetcher: Arc<Fetcher>,
    settings: SourceSettings,
    politeness: Politeness,
}

impl WorkdayAdapter {
    pub fn new(fetcher: Arc<Fetcher>, settings: SourceSettings, politeness: Politeness) -> Self {
        Self {
            fetcher,
            settings,
            politeness,
        }
    }
}

#[async_trait]
impl SourceAdapter for WorkdayAdapter {
    fn source(&self) -> Source {
        Source::Workday
    }

    #[instrument(skip_all, fields(source = "workday", company = company.map(|c| c.name.as_str()).unwrap_or("")))]
    async fn fetch(&self, company: Option<&Company>) -> Result<Vec<RawRecord>> {
        let company = company
            .ok_or_else(|| JobRadarError::validation("workday source requires a company"))?;
        let board_url = company.board_for(Source::Workday).ok_or_else(|| {
            JobRadarError::validation(format!("{} has no Workday board URL", company.name))
        })?;
        let board = WorkdayBoard::parse(board_url)?;

        let listing = WorkdayListing {
            fetcher: &self.fetcher,
            endpoint: board.jobs_endpoint(),
        };
        let records = PageWalker::new(&listing, self.settings.limits, self.politeness.page_delay)
            .collect()
            .await?;

        info!(records = records.len(), "fetched Workday postings");
        Ok(records.into_iter().map(RawRecord::untracked).collect())
    }
}

struct WorkdayListing<'a> {
    fetcher: &'a Fetcher,
    endpoint: String,
}

#[async_trait]
impl PageSource for WorkdayListing<'_> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let body = json!({
            "appliedFacets": {},
            "limit": request.limit,
            "offset": request.offset,
            "searchText": "",
        });
        let response = self.fetcher.post_json(&self.endpoint, &body).await?;
        if !response.is_object() {
            return Err(JobRadarError::parse(format!(
                "{}: expected a JSON object",
                self.endpoint
            )));
        }

        let records = field(&response, "jobPostings", &["items"])
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(Page::new(records))
    }

    fn raw_identity(&self, record: &Value) -> String {
        raw_identity(record, &["externalPath", "id"])
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// `bulletFields` arrives either as a map or as a list of
/// `{label|name, value}` entries; both become a map.
fn bullet_fields(raw: &Value) -> Value {
    match raw.get("bulletFields") {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(Value::Array(items)) => {
            let mut out = Map::new();
            for item in items {
                let label = text(item, "label", &["name"]);
                if let (false, Some(value)) = (label.is_empty(), item.get("value")) {
                    out.insert(label, value.clone());
                }
            }
            Value::Object(out)
        }
        _ => Value::Object(Map::new()),
    }
}

pub(crate) fn normalize(raw: &Value, ctx: &NormalizeContext) -> Option<Job> {
    let company = ctx
        .company_name
        .clone()
        .unwrap_or_else(|| text(raw, "company", &["companyName"]));

    let external_path = text(raw, "externalPath", &["path"]);
    let mut url = text(raw, "externalUrl", &[]);
    if url.is_empty() && !external_path.is_empty() {
        let board = ctx.board_url.as_deref().unwrap_or_default();
        url = format!("{}{}", board.trim_end_matches('/'), external_path);
    }

    let bullets = bullet_fields(raw);
    let mut requisition = text(&bullets, "Req ID", &REQUISITION_KEYS);
    if requisition.is_empty() {
        requisition = text(raw, "jobReqId", &[]);
    }

    let posted_text = text(raw, "postedOn", &["postedDate"]);

    JobFields {
        company,
        title: text(raw, "title", &["jobTitle"]),
        location: text(raw, "locationsText", &["location", "locations"]),
        description: strip_html(&text(raw, "description", &["jobDescription"])),
        source_job_id: derive_source_job_id(&text(raw, "id", &[]), &requisition, &url, raw),
        posted_at: parse_date_text(&posted_text, chrono::Utc::now()),
        url,
        ..JobFields::default()
    }
    .into_job(Source::Workday, ctx)
}
