//! Core domain types for JobRadar: the canonical job record and the company
//! records that scope ATS sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::JobRadarError;

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// One tag per integrated job-board backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Workday,
    Greenhouse,
    Lever,
    Linkedin,
    Seek,
    Efinancialcareers,
}

impl Source {
    /// Every source, in the default run order.
    pub const ALL: [Source; 6] = [
        Source::Workday,
        Source::Greenhouse,
        Source::Lever,
        Source::Linkedin,
        Source::Seek,
        Source::Efinancialcareers,
    ];

    /// Stable lowercase tag, used in storage and in the content hash.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Workday => "workday",
            Source::Greenhouse => "greenhouse",
            Source::Lever => "lever",
            Source::Linkedin => "linkedin",
            Source::Seek => "seek",
            Source::Efinancialcareers => "efinancialcareers",
        }
    }

    /// ATS sources list one company's board and need a board URL.
    pub fn is_company_scoped(&self) -> bool {
        matches!(self, Source::Workday | Source::Greenhouse | Source::Lever)
    }

    /// The ATS type a company must carry to be walked by this source.
    pub fn ats_type(&self) -> Option<AtsType> {
        match self {
            Source::Workday => Some(AtsType::Workday),
            Source::Greenhouse => Some(AtsType::Greenhouse),
            Source::Lever => Some(AtsType::Lever),
            _ => None,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = JobRadarError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|src| src.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| JobRadarError::validation(format!("unknown source '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// AtsType
// ---------------------------------------------------------------------------

/// ATS backend a company's careers site runs on, as recorded by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtsType {
    Workday,
    Greenhouse,
    Lever,
    Smartrecruiters,
    Successfactors,
    Icims,
    Jobvite,
    #[default]
    #[serde(other)]
    Unknown,
}

impl AtsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtsType::Workday => "workday",
            AtsType::Greenhouse => "greenhouse",
            AtsType::Lever => "lever",
            AtsType::Smartrecruiters => "smartrecruiters",
            AtsType::Successfactors => "successfactors",
            AtsType::Icims => "icims",
            AtsType::Jobvite => "jobvite",
            AtsType::Unknown => "unknown",
        }
    }

    /// Parse a stored value; anything unrecognized (including empty) is `Unknown`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "workday" => AtsType::Workday,
            "greenhouse" => AtsType::Greenhouse,
            "lever" => AtsType::Lever,
            "smartrecruiters" => AtsType::Smartrecruiters,
            "successfactors" => AtsType::Successfactors,
            "icims" => AtsType::Icims,
            "jobvite" => AtsType::Jobvite,
            _ => AtsType::Unknown,
        }
    }

    /// The source that can walk boards of this ATS type, if one is integrated.
    pub fn source(&self) -> Option<Source> {
        match self {
            AtsType::Workday => Some(Source::Workday),
            AtsType::Greenhouse => Some(Source::Greenhouse),
            AtsType::Lever => Some(Source::Lever),
            _ => None,
        }
    }
}

impl std::fmt::Display for AtsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Company
// ---------------------------------------------------------------------------

/// A tracked employer. Owned by the store; the pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub ticker: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default)]
    pub ats_type: AtsType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ats_board_url: Option<String>,
}

impl Company {
    /// The board URL, when this company can be walked by `source`.
    pub fn board_for(&self, source: Source) -> Option<&str> {
        if source.ats_type() != Some(self.ats_type) {
            return None;
        }
        self.ats_board_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// The canonical job posting every source is normalized into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub company: String,
    pub title: String,
    /// Free-text location; empty when the source gives none.
    pub location: String,
    pub url: String,
    pub description: String,
    /// Department or team, when the source reports one.
    #[serde(default)]
    pub department: String,
    /// Search track a keyword-search record was found under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    pub source: Source,
    /// Source-local identifier; with `source` this is the upsert conflict key.
    pub source_job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
    /// SHA-256 over `(source, company, title, location, url)`.
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Key the store upserts on and the deduplicator collapses by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub source: Source,
    pub source_job_id: String,
}

impl Job {
    pub fn key(&self) -> JobKey {
        JobKey {
            source: self.source,
            source_job_id: self.source_job_id.clone(),
        }
    }

    /// Whether the identity fields the pipeline needs are all present.
    pub fn has_identity(&self) -> bool {
        !self.company.trim().is_empty()
            && !self.title.trim().is_empty()
            && !self.source_job_id.trim().is_empty()
    }
}

/// Fingerprint of a posting's identity fields.
///
/// The field order is fixed: reordering it changes every hash and breaks
/// continuity with rows written by earlier runs.
pub fn content_hash(source: Source, company: &str, title: &str, location: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{source}|{company}|{title}|{location}|{url}").as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// PersistedJob
// ---------------------------------------------------------------------------

/// A job row as returned by the store after an upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedJob {
    pub id: String,
    #[serde(flatten)]
    pub job: Job,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedJob {
    /// A row is new this run iff the store has never updated it since insert.
    ///
    /// This is the only signal an upsert response carries. An update landing
    /// in the same clock tick as the insert is indistinguishable from a fresh
    /// insert.
    pub fn is_new(&self) -> bool {
        self.created_at == self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job() -> Job {
        let hash = content_hash(
            Source::Greenhouse,
            "Atlassian",
            "Head of Engineering",
            "Sydney",
            "https://boards.greenhouse.io/atlassian/jobs/1",
        );
        Job {
            company: "Atlassian".into(),
            title: "Head of Engineering".into(),
            location: "Sydney".into(),
            url: "https://boards.greenhouse.io/atlassian/jobs/1".into(),
            description: String::new(),
            department: "Engineering".into(),
            track: None,
            source: Source::Greenhouse,
            source_job_id: "1".into(),
            posted_at: None,
            content_hash: hash,
            company_id: Some("c1".into()),
            is_active: true,
        }
    }

    #[test]
    fn source_roundtrip() {
        for src in Source::ALL {
            let parsed: Source = src.as_str().parse().expect("parse source");
            assert_eq!(parsed, src);
        }
        assert_eq!("LinkedIn".parse::<Source>().unwrap(), Source::Linkedin);
        assert!("indeed".parse::<Source>().is_err());
    }

    #[test]
    fn ats_type_unknown_fallback() {
        let parsed: AtsType = serde_json::from_str("\"taleo\"").expect("deserialize");
        assert_eq!(parsed, AtsType::Unknown);
        assert_eq!(AtsType::parse_lenient(" Workday "), AtsType::Workday);
        assert_eq!(AtsType::parse_lenient(""), AtsType::Unknown);
    }

    #[test]
    fn board_requires_matching_ats_and_url() {
        let mut company = Company {
            id: "c1".into(),
            ticker: "TEAM".into(),
            name: "Atlassian".into(),
            website_url: None,
            ats_type: AtsType::Greenhouse,
            ats_board_url: Some("https://boards.greenhouse.io/atlassian".into()),
        };
        assert!(company.board_for(Source::Greenhouse).is_some());
        assert!(company.board_for(Source::Lever).is_none());

        company.ats_board_url = Some("  ".into());
        assert!(company.board_for(Source::Greenhouse).is_none());
    }

    #[test]
    fn content_hash_is_order_sensitive() {
        let a = content_hash(Source::Seek, "Acme", "CTO", "Sydney", "https://x/1");
        let b = content_hash(Source::Seek, "Acme", "CTO", "Sydney", "https://x/1");
        let swapped = content_hash(Source::Seek, "CTO", "Acme", "Sydney", "https://x/1");
        assert_eq!(a, b);
        assert_ne!(a, swapped);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn identity_check() {
        let mut j = job();
        assert!(j.has_identity());
        j.title = "  ".into();
        assert!(!j.has_identity());
    }

    #[test]
    fn new_detection_uses_timestamp_equality() {
        let now = Utc::now();
        let fresh = PersistedJob {
            id: "r1".into(),
            job: job(),
            created_at: now,
            updated_at: now,
        };
        assert!(fresh.is_new());

        let touched = PersistedJob {
            updated_at: now + Duration::milliseconds(1),
            ..fresh
        };
        assert!(!touched.is_new());
    }

    #[test]
    fn job_serialization() {
        let j = job();
        let json = serde_json::to_string(&j).expect("serialize");
        assert!(json.contains("\"source\":\"greenhouse\""));
        let parsed: Job = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, j);
    }
}
