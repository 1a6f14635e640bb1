//! Notification transports for run reports.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, instrument};

use jobradar_shared::{AppConfig, JobRadarError, NotifyKind, Result, webhook_url};

use crate::report::Report;

/// Delivers a run report somewhere a human will see it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_report(&self, report: &Report) -> Result<()>;
}

/// Build the notifier selected by `[notify]` in the config.
pub fn notifier_from_config(config: &AppConfig) -> Result<Box<dyn Notifier>> {
    match config.notify.kind {
        NotifyKind::Stdout => Ok(Box::new(StdoutNotifier)),
        NotifyKind::Webhook => {
            let url = webhook_url(&config.notify)?;
            Ok(Box::new(WebhookNotifier::new(
                url,
                Duration::from_secs(config.http.timeout_secs),
            )?))
        }
    }
}

// ---------------------------------------------------------------------------
// Stdout
// ---------------------------------------------------------------------------

/// Prints the plain-text rendering.
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn send_report(&self, report: &Report) -> Result<()> {
        println!("{}", report.to_text());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// POSTs `{subject, text, html, report}` as JSON.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| JobRadarError::Notify(format!("client build: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip_all, fields(total = report.total))]
    async fn send_report(&self, report: &Report) -> Result<()> {
        let body = json!({
            "subject": report.subject,
            "text": report.to_text(),
            "html": report.to_html(),
            "report": report,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| JobRadarError::Notify(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(JobRadarError::Notify(format!("webhook returned HTTP {status}")));
        }

        info!(status = status.as_u16(), "report delivered to webhook");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::build_report;
    use jobradar_shared::{Job, Source, content_hash};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn report() -> Report {
        let url = "https://boards.greenhouse.io/canva/jobs/1";
        let job = Job {
            company: "Canva".into(),
            title: "Head of Engineering".into(),
            location: "Sydney".into(),
            url: url.into(),
            description: String::new(),
            department: String::new(),
            track: None,
            source: Source::Greenhouse,
            source_job_id: "1".into(),
            posted_at: None,
            content_hash: content_hash(Source::Greenhouse, "Canva", "Head of Engineering", "Sydney", url),
            company_id: None,
            is_active: true,
        };
        build_report(&[job]).expect("one job gives a report")
    }

    #[tokio::test]
    async fn webhook_posts_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({
                "subject": "JobRadar — 1 new relevant roles",
                "report": {"total": 1}
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            WebhookNotifier::new(format!("{}/hook", server.uri()), Duration::from_secs(5)).unwrap();
        notifier.send_report(&report()).await.unwrap();
    }

    #[tokio::test]
    async fn webhook_error_status_is_notify_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = notifier.send_report(&report()).await.unwrap_err();
        assert!(matches!(err, JobRadarError::Notify(_)));
    }

    #[test]
    fn webhook_selection_requires_env_var() {
        let mut config = AppConfig::default();
        config.notify.kind = NotifyKind::Webhook;
        config.notify.webhook_url_env = "JOBRADAR_TEST_UNSET_WEBHOOK".into();
        assert!(notifier_from_config(&config).is_err());

        config.notify.kind = NotifyKind::Stdout;
        assert!(notifier_from_config(&config).is_ok());
    }
}
