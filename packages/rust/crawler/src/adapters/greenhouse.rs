//! Greenhouse board adapter (public `boards-api` JSON, one response per board).

use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{info, instrument};

use jobradar_shared::{Company, Job, JobRadarError, Result, Source, SourceSettings};

use super::{RawRecord, SourceAdapter};
use crate::engine::Fetcher;
use crate::normalize::{
    JobFields, NormalizeContext, derive_source_job_id, field, parse_posted_at, strip_html, text,
    value_text,
};
use crate::paginator::{Page, PageRequest, PageSource, PageWalker};

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)greenhouse\.io/([a-z0-9_-]+)").expect("valid regex"));

/// Extract the board token from a careers URL, e.g.
/// `https://boards.greenhouse.io/atlassian` gives `atlassian`.
pub fn greenhouse_board_token(board_url: &str) -> Result<String> {
    TOKEN_RE
        .captures(board_url)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            JobRadarError::validation(format!("cannot extract Greenhouse board token from {board_url}"))
        })
}

pub struct GreenhouseAdapter {
    fetcher: Arc<Fetcher>,
    settings: SourceSettings,
}

impl GreenhouseAdapter {
    pub fn new(fetcher: Arc<Fetcher>, settings: SourceSettings) -> Self {
        Self { fetcher, settings }
    }
}

#[async_trait]
impl SourceAdapter for GreenhouseAdapter {
    fn source(&self) -> Source {
        Source::Greenhouse
    }

    #[instrument(skip_all, fields(source = "greenhouse", company = company.map(|c| c.name.as_str()).unwrap_or("")))]
    async fn fetch(&self, company: Option<&Company>) -> Result<Vec<RawRecord>> {
        let company = company
            .ok_or_else(|| JobRadarError::validation("greenhouse source requires a company"))?;
        let board_url = company.board_for(Source::Greenhouse).ok_or_else(|| {
            JobRadarError::validation(format!("{} has no Greenhouse board URL", company.name))
        })?;
        let token = greenhouse_board_token(board_url)?;

        let listing = GreenhouseBoard {
            fetcher: &self.fetcher,
            url: format!(
                "{}/{token}/jobs?content=true",
                self.settings.endpoint.trim_end_matches('/')
            ),
        };
        let records = PageWalker::new(&listing, self.settings.limits, std::time::Duration::ZERO)
            .collect()
            .await?;

        info!(token = %token, records = records.len(), "fetched Greenhouse jobs");
        Ok(records.into_iter().map(RawRecord::untracked).collect())
    }
}

struct GreenhouseBoard<'a> {
    fetcher: &'a Fetcher,
    url: String,
}

#[async_trait]
impl PageSource for GreenhouseBoard<'_> {
    async fn fetch_page(&self, _request: &PageRequest) -> Result<Page> {
        let response = self.fetcher.get_json(&self.url).await?;
        if !response.is_object() {
            return Err(JobRadarError::parse(format!("{}: expected a JSON object", self.url)));
        }
        let jobs = response
            .get("jobs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(Page::last(jobs))
    }
}

pub(crate) fn normalize(raw: &Value, ctx: &NormalizeContext) -> Option<Job> {
    let company = ctx
        .company_name
        .clone()
        .unwrap_or_else(|| text(raw, "company_name", &[]));
    let url = text(raw, "absolute_url", &["url"]);

    let department = field(raw, "departments", &[])
        .and_then(Value::as_array)
        .and_then(|deps| deps.first())
        .and_then(value_text)
        .unwrap_or_default();

    // `content` is entity-escaped HTML: decode, then strip.
    let description = strip_html(&strip_html(&text(raw, "content", &[])));

    let posted_at = field(raw, "updated_at", &["created_at", "first_published"])
        .and_then(|v| parse_posted_at(v, chrono::Utc::now()));

    JobFields {
        company,
        title: text(raw, "title", &[]),
        location: text(raw, "location", &[]),
        description,
        department,
        source_job_id: derive_source_job_id(
            &text(raw, "id", &[]),
            &text(raw, "requisition_id", &["internal_job_id"]),
            &url,
            raw,
        ),
        posted_at,
        url,
        ..JobFields::default()
    }
    .into_job(Source::Greenhouse, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support;
    use jobradar_shared::AtsType;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn company() -> Company {
        Company {
            id: "c-rea".into(),
            ticker: "REA".into(),
            name: "REA Group".into(),
            website_url: Some("https://www.rea-group.com".into()),
            ats_type: AtsType::Greenhouse,
            ats_board_url: Some("https://boards.greenhouse.io/reagroup".into()),
        }
    }

    #[test]
    fn extracts_board_token() {
        assert_eq!(greenhouse_board_token("https://boards.greenhouse.io/atlassian").unwrap(), "atlassian");
        assert_eq!(
            greenhouse_board_token("https://job-boards.greenhouse.io/rea_group/jobs/1").unwrap(),
            "rea_group"
        );
        assert!(greenhouse_board_token("https://jobs.lever.co/acme").is_err());
    }

    #[test]
    fn normalizes_job() {
        let raw = json!({
            "id": 4012345,
            "title": "Head of Engineering",
            "absolute_url": "https://boards.greenhouse.io/reagroup/jobs/4012345",
            "location": {"name": "Melbourne, Australia"},
            "departments": [{"id": 1, "name": "Technology"}, {"id": 2, "name": "Other"}],
            "content": "&lt;p&gt;Lead &lt;strong&gt;platform&lt;/strong&gt; teams.&lt;/p&gt;",
            "updated_at": "2026-03-01T10:15:00-05:00"
        });
        let ctx = NormalizeContext::for_company(&company(), "https://boards.greenhouse.io/reagroup");
        let job = normalize(&raw, &ctx).unwrap();

        assert_eq!(job.company, "REA Group");
        assert_eq!(job.location, "Melbourne, Australia");
        assert_eq!(job.department, "Technology");
        assert_eq!(job.description, "Lead platform teams.");
        assert_eq!(job.source_job_id, "4012345");
        assert_eq!(job.posted_at.unwrap().to_rfc3339(), "2026-03-01T15:15:00+00:00");
    }

    #[tokio::test]
    async fn fetches_board_in_one_request() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/boards/reagroup/jobs"))
            .and(query_param("content", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobs": [
                    {"id": 1, "title": "CTO"},
                    {"id": 2, "title": "Head of Data"}
                ],
                "meta": {"total": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = SourceSettings::builtin(Source::Greenhouse);
        settings.endpoint = format!("{}/v1/boards", server.uri());
        let adapter = GreenhouseAdapter::new(test_support::fetcher(), settings);

        let records = adapter.fetch(Some(&company())).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn board_not_found_fails_the_target() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = SourceSettings::builtin(Source::Greenhouse);
        settings.endpoint = format!("{}/v1/boards", server.uri());
        let adapter = GreenhouseAdapter::new(test_support::fetcher(), settings);

        let err = adapter.fetch(Some(&company())).await.unwrap_err();
        assert!(matches!(err, JobRadarError::Http { status: 404, .. }));
    }
}
