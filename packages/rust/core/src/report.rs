//! Run report: the relevant new jobs of one run, grouped by source and
//! search track, with HTML and plain-text renderings.

use chrono::{DateTime, Utc};
use serde::Serialize;

use jobradar_shared::{Job, Source};

/// One job line in a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportItem {
    pub company: String,
    pub title: String,
    pub location: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
}

impl From<&Job> for ReportItem {
    fn from(job: &Job) -> Self {
        Self {
            company: job.company.clone(),
            title: job.title.clone(),
            location: job.location.clone(),
            url: job.url.clone(),
            posted_at: job.posted_at,
        }
    }
}

/// Jobs sharing a `(source, track)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportGroup {
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    pub jobs: Vec<ReportItem>,
}

impl ReportGroup {
    /// `greenhouse` or `efinancialcareers / apac_china`.
    pub fn heading(&self) -> String {
        match &self.track {
            Some(track) => format!("{} / {track}", self.source),
            None => self.source.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub subject: String,
    pub total: usize,
    pub generated_at: DateTime<Utc>,
    pub groups: Vec<ReportGroup>,
}

/// Build a report over `jobs`, or `None` when there is nothing to report.
///
/// Groups appear in the order their first job appears in `jobs`.
pub fn build_report(jobs: &[Job]) -> Option<Report> {
    if jobs.is_empty() {
        return None;
    }

    let mut groups: Vec<ReportGroup> = Vec::new();
    for job in jobs {
        let existing = groups
            .iter_mut()
            .find(|g| g.source == job.source && g.track == job.track);
        match existing {
            Some(group) => group.jobs.push(ReportItem::from(job)),
            None => groups.push(ReportGroup {
                source: job.source,
                track: job.track.clone(),
                jobs: vec![ReportItem::from(job)],
            }),
        }
    }

    Some(Report {
        subject: format!("JobRadar — {} new relevant roles", jobs.len()),
        total: jobs.len(),
        generated_at: Utc::now(),
        groups,
    })
}

impl Report {
    pub fn to_html(&self) -> String {
        let mut html = format!("<h3>New relevant roles found: {}</h3>\n", self.total);
        for group in &self.groups {
            html.push_str(&format!("<h4>{}</h4>\n<ul>\n", escape_html(&group.heading())));
            for item in &group.jobs {
                html.push_str(&format!(
                    "<li><a href=\"{}\">{} — {}</a> ({})</li>\n",
                    escape_html(&item.url),
                    escape_html(&item.company),
                    escape_html(&item.title),
                    escape_html(&item.location),
                ));
            }
            html.push_str("</ul>\n");
        }
        html
    }

    pub fn to_text(&self) -> String {
        let mut text = format!("{}\n", self.subject);
        for group in &self.groups {
            text.push_str(&format!("\n{} ({})\n", group.heading(), group.jobs.len()));
            for item in &group.jobs {
                if item.location.is_empty() {
                    text.push_str(&format!("  - {} — {}\n", item.company, item.title));
                } else {
                    text.push_str(&format!(
                        "  - {} — {} ({})\n",
                        item.company, item.title, item.location
                    ));
                }
                if !item.url.is_empty() {
                    text.push_str(&format!("    {}\n", item.url));
                }
            }
        }
        text
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobradar_shared::content_hash;

    fn job(source: Source, track: Option<&str>, company: &str, title: &str, location: &str) -> Job {
        let url = format!("https://example.com/{}", title.replace(' ', "-"));
        Job {
            company: company.into(),
            title: title.into(),
            location: location.into(),
            content_hash: content_hash(source, company, title, location, &url),
            url,
            description: String::new(),
            department: String::new(),
            track: track.map(String::from),
            source,
            source_job_id: title.into(),
            posted_at: None,
            company_id: None,
            is_active: true,
        }
    }

    #[test]
    fn empty_set_has_no_report() {
        assert!(build_report(&[]).is_none());
    }

    #[test]
    fn groups_by_source_and_track_in_first_appearance_order() {
        let jobs = vec![
            job(Source::Efinancialcareers, Some("apac_china"), "HSBC", "CTO", "Sydney"),
            job(Source::Greenhouse, None, "Canva", "Head of Data", "Sydney"),
            job(Source::Efinancialcareers, Some("technology"), "UBS", "CIO", "Sydney"),
            job(Source::Efinancialcareers, Some("apac_china"), "BOC", "Director", "Sydney"),
        ];
        let report = build_report(&jobs).unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.subject, "JobRadar — 4 new relevant roles");
        let headings: Vec<String> = report.groups.iter().map(ReportGroup::heading).collect();
        assert_eq!(
            headings,
            vec![
                "efinancialcareers / apac_china",
                "greenhouse",
                "efinancialcareers / technology"
            ]
        );
        assert_eq!(report.groups[0].jobs.len(), 2);
        assert_eq!(report.groups[0].jobs[1].company, "BOC");
    }

    #[test]
    fn html_is_escaped() {
        let jobs = vec![job(Source::Lever, None, "AT&T", "Head of <Data>", "")];
        let html = build_report(&jobs).unwrap().to_html();
        assert!(html.contains("<h3>New relevant roles found: 1</h3>"));
        assert!(html.contains("<h4>lever</h4>"));
        assert!(html.contains("AT&amp;T — Head of &lt;Data&gt;</a> ()"));
        assert!(!html.contains("<Data>"));
    }

    #[test]
    fn text_rendering() {
        let jobs = vec![
            job(Source::Seek, Some("technology"), "NAB", "CTO", "Melbourne VIC"),
            job(Source::Seek, Some("technology"), "ANZ", "CIO", ""),
        ];
        let text = build_report(&jobs).unwrap().to_text();
        assert!(text.starts_with("JobRadar — 2 new relevant roles\n"));
        assert!(text.contains("seek / technology (2)"));
        assert!(text.contains("  - NAB — CTO (Melbourne VIC)\n    https://example.com/CTO\n"));
        assert!(text.contains("  - ANZ — CIO\n"));
    }

    #[test]
    fn serializes_for_webhooks() {
        let jobs = vec![job(Source::Greenhouse, None, "Canva", "CTO", "Sydney")];
        let value = serde_json::to_value(build_report(&jobs).unwrap()).unwrap();
        assert_eq!(value["groups"][0]["source"], "greenhouse");
        assert!(value["groups"][0].get("track").is_none());
        assert_eq!(value["groups"][0]["jobs"][0]["title"], "CTO");
    }
}
