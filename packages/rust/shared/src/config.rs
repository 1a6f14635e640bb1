//! Application configuration for JobRadar.
//!
//! User config lives at `~/.jobradar/jobradar.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{JobRadarError, Result};
use crate::types::Source;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "jobradar.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".jobradar";

/// User-Agent sent to every source.
const DEFAULT_USER_AGENT: &str = concat!("JobRadar/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Config structs (matching jobradar.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub relevance: RelevanceConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub notify: NotifyConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. `~/` is expanded.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.jobradar/jobradar.db".into()
}

impl DatabaseConfig {
    /// The database path with a leading `~/` expanded to the home directory.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        expand_home(&self.path)
    }
}

/// `[http]` section: timeouts, retry/backoff, and politeness delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles on every further attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Delay between consecutive page fetches of one source.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Delay between search terms and between sources.
    #[serde(default = "default_source_delay_ms")]
    pub source_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            page_delay_ms: default_page_delay_ms(),
            source_delay_ms: default_source_delay_ms(),
        }
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    2_000
}
fn default_backoff_max_ms() -> u64 {
    10_000
}
fn default_page_delay_ms() -> u64 {
    2_000
}
fn default_source_delay_ms() -> u64 {
    2_000
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Sources to run, in order.
    #[serde(default = "default_sources")]
    pub sources: Vec<Source>,

    /// Source targets processed at once. 1 keeps the run sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_sources() -> Vec<Source> {
    Source::ALL.to_vec()
}
fn default_concurrency() -> u32 {
    1
}

/// `[relevance]` section: the role/location profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceConfig {
    /// A title matches if it contains any of these (case-insensitive).
    #[serde(default = "default_title_keywords")]
    pub title_keywords: Vec<String>,

    /// A location matches if it contains any of these (case-insensitive).
    /// Jobs with no location always match.
    #[serde(default = "default_locations")]
    pub locations: Vec<String>,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            title_keywords: default_title_keywords(),
            locations: default_locations(),
        }
    }
}

fn default_title_keywords() -> Vec<String> {
    [
        "chief",
        "cio",
        "cto",
        "cdo",
        "head",
        "director",
        "general manager",
        "gm",
        "transformation",
        "technology",
        "digital",
        "data",
        "information",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_locations() -> Vec<String> {
    [
        "australia",
        "melbourne",
        "sydney",
        "brisbane",
        "perth",
        "adelaide",
        "canberra",
        "remote",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[notify]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub kind: NotifyKind,

    /// Name of the env var holding the webhook URL (never store the URL itself).
    #[serde(default = "default_webhook_url_env")]
    pub webhook_url_env: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            kind: NotifyKind::default(),
            webhook_url_env: default_webhook_url_env(),
        }
    }
}

fn default_webhook_url_env() -> String {
    "JOBRADAR_WEBHOOK_URL".into()
}

/// How a run report is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    #[default]
    Stdout,
    Webhook,
}

// ---------------------------------------------------------------------------
// Per-source settings
// ---------------------------------------------------------------------------

/// A named group of search terms for a keyword-search source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTrack {
    pub name: String,
    pub search_terms: Vec<String>,
}

/// `[sources.<tag>]` section. Unset fields fall back to the built-in
/// settings for that source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceOverrides {
    /// API base (ATS sources) or site base URL (keyword sources).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Location filter sent with keyword searches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,

    /// Pagination stops once the offset passes this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_offset: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Vec<SearchTrack>>,

    /// Scraped cards whose location contains none of these (case-insensitive)
    /// are dropped at fetch time. Empty keeps everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_allow: Option<Vec<String>>,
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub workday: SourceOverrides,
    #[serde(default)]
    pub greenhouse: SourceOverrides,
    #[serde(default)]
    pub lever: SourceOverrides,
    #[serde(default)]
    pub linkedin: SourceOverrides,
    #[serde(default)]
    pub seek: SourceOverrides,
    #[serde(default)]
    pub efinancialcareers: SourceOverrides,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        let filled = |source| SourceSettings::builtin(source).into_overrides();
        Self {
            workday: filled(Source::Workday),
            greenhouse: filled(Source::Greenhouse),
            lever: filled(Source::Lever),
            linkedin: filled(Source::Linkedin),
            seek: filled(Source::Seek),
            efinancialcareers: filled(Source::Efinancialcareers),
        }
    }
}

impl SourcesConfig {
    pub fn overrides(&self, source: Source) -> &SourceOverrides {
        match source {
            Source::Workday => &self.workday,
            Source::Greenhouse => &self.greenhouse,
            Source::Lever => &self.lever,
            Source::Linkedin => &self.linkedin,
            Source::Seek => &self.seek,
            Source::Efinancialcareers => &self.efinancialcareers,
        }
    }

    /// Resolved settings for `source`: overrides merged over built-ins.
    pub fn settings(&self, source: Source) -> SourceSettings {
        SourceSettings::builtin(source).merge(self.overrides(source))
    }
}

/// Page size and hard cap for one pagination walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationLimits {
    pub page_size: usize,
    /// Absolute bound on the cumulative offset, regardless of other guards.
    pub max_offset: usize,
}

/// Fully resolved settings for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub source: Source,
    pub endpoint: String,
    pub location: String,
    pub limits: PaginationLimits,
    pub tracks: Vec<SearchTrack>,
    pub location_allow: Vec<String>,
}

impl SourceSettings {
    /// Built-in settings for each source.
    pub fn builtin(source: Source) -> Self {
        let (endpoint, location, page_size, max_offset, tracks) = match source {
            Source::Workday => ("", "", 20, 2_000, vec![]),
            Source::Greenhouse => ("https://boards-api.greenhouse.io/v1/boards", "", 500, 0, vec![]),
            Source::Lever => ("https://api.lever.co/v0/postings", "", 250, 5_000, vec![]),
            Source::Linkedin => (
                "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search",
                "Australia",
                25,
                75,
                vec![track("technology", LINKEDIN_TERMS)],
            ),
            Source::Seek => (
                "https://www.seek.com.au",
                "All Australia",
                22,
                22,
                vec![track("technology", SEEK_TERMS)],
            ),
            Source::Efinancialcareers => (
                "https://www.efinancialcareers.com.au",
                "Australia",
                20,
                20,
                vec![
                    track("technology", EFC_TECH_TERMS),
                    track("apac_china", EFC_APAC_CHINA_TERMS),
                ],
            ),
        };
        Self {
            source,
            endpoint: endpoint.into(),
            location: location.into(),
            limits: PaginationLimits {
                page_size,
                max_offset,
            },
            tracks,
            location_allow: match source {
                Source::Linkedin => LINKEDIN_LOCATIONS.iter().map(|l| l.to_string()).collect(),
                _ => Vec::new(),
            },
        }
    }

    /// Whether a scraped location passes `location_allow`. A blank location
    /// always passes.
    pub fn location_allowed(&self, location: &str) -> bool {
        let location = location.trim().to_lowercase();
        location.is_empty()
            || self.location_allow.is_empty()
            || self
                .location_allow
                .iter()
                .any(|l| location.contains(l.trim().to_lowercase().as_str()))
    }

    fn merge(mut self, overrides: &SourceOverrides) -> Self {
        if let Some(endpoint) = &overrides.endpoint {
            self.endpoint = endpoint.clone();
        }
        if let Some(location) = &overrides.location {
            self.location = location.clone();
        }
        if let Some(page_size) = overrides.page_size {
            self.limits.page_size = page_size.max(1);
        }
        if let Some(max_offset) = overrides.max_offset {
            self.limits.max_offset = max_offset;
        }
        if let Some(tracks) = &overrides.tracks {
            self.tracks = tracks.clone();
        }
        if let Some(allow) = &overrides.location_allow {
            self.location_allow = allow.clone();
        }
        self
    }

    fn into_overrides(self) -> SourceOverrides {
        let non_empty = |s: String| (!s.is_empty()).then_some(s);
        SourceOverrides {
            endpoint: non_empty(self.endpoint),
            location: non_empty(self.location),
            page_size: Some(self.limits.page_size),
            max_offset: Some(self.limits.max_offset),
            tracks: (!self.tracks.is_empty()).then_some(self.tracks),
            location_allow: (!self.location_allow.is_empty()).then_some(self.location_allow),
        }
    }
}

fn track(name: &str, terms: &[&str]) -> SearchTrack {
    SearchTrack {
        name: name.into(),
        search_terms: terms.iter().map(|t| t.to_string()).collect(),
    }
}

const LINKEDIN_TERMS: &[&str] = &[
    "Chief Information Officer",
    "Chief Technology Officer",
    "Chief Digital Officer",
    "Chief Innovation Officer",
    "CIO",
    "CTO",
    "CDO",
    "Technology Director",
    "IT Director",
    "Digital Director",
    "Engineering Director",
    "VP Technology",
    "VP Engineering",
    "Head of Technology",
    "Head of IT",
    "Head of Engineering",
    "Head of Digital",
    "General Manager Technology",
    "Senior Manager Technology",
    "Principal Engineer",
    "Principal Architect",
];

/// Australian place names and state codes. Short codes match as substrings.
const LINKEDIN_LOCATIONS: &[&str] = &[
    "australia",
    "sydney",
    "melbourne",
    "brisbane",
    "perth",
    "adelaide",
    "canberra",
    "nsw",
    "vic",
    "qld",
    "wa",
    "sa",
    "act",
    "tas",
];

const SEEK_TERMS: &[&str] = &[
    "chief information officer",
    "chief technology officer",
    "chief digital officer",
    "technology director",
    "it director",
    "head of technology",
    "head of it",
    "general manager technology",
    "program director",
    "transformation director",
];

const EFC_TECH_TERMS: &[&str] = &[
    "Chief Information Officer",
    "Chief Technology Officer",
    "Chief Digital Officer",
    "Chief Data Officer",
    "Technology Director",
    "IT Director",
    "Head of Technology",
    "Head of IT",
    "Head of Digital",
    "Head of Engineering",
    "Head of Transformation",
    "General Manager Technology",
    "VP Technology",
    "VP Engineering",
    "Director of Technology",
    "Director of IT",
];

const EFC_APAC_CHINA_TERMS: &[&str] = &[
    "Head of APAC",
    "APAC Director",
    "APAC General Manager",
    "Regional Director APAC",
    "Managing Director APAC",
    "Business Development Director APAC",
    "Head of Business Development APAC",
    "APAC Business Strategy",
    "Head of Strategy APAC",
    "Strategic Partnerships APAC",
    "Market Development APAC",
    "Greater China Director",
    "Head of China",
    "China Business Development",
    "China Strategy",
    "Greater China Strategy",
];

// ---------------------------------------------------------------------------
// Runtime policies (derived from config)
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let scaled = self.base_delay.saturating_mul(1u32 << exp);
        scaled.min(self.max_delay)
    }
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(http: &HttpConfig) -> Self {
        Self {
            max_attempts: http.max_attempts.max(1),
            base_delay: Duration::from_millis(http.backoff_base_ms),
            max_delay: Duration::from_millis(http.backoff_max_ms),
        }
    }
}

/// Mandatory waits between network calls to the same source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Politeness {
    pub page_delay: Duration,
    pub source_delay: Duration,
}

impl From<&HttpConfig> for Politeness {
    fn from(http: &HttpConfig) -> Self {
        Self {
            page_delay: Duration::from_millis(http.page_delay_ms),
            source_delay: Duration::from_millis(http.source_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.jobradar/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| JobRadarError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.jobradar/jobradar.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| JobRadarError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| JobRadarError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| JobRadarError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| JobRadarError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| JobRadarError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the webhook URL from the env var named in `[notify]`.
pub fn webhook_url(config: &NotifyConfig) -> Result<String> {
    let var_name = &config.webhook_url_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(JobRadarError::config(format!(
            "webhook notifier selected but {var_name} is not set"
        ))),
    }
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| JobRadarError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("title_keywords"));
        assert!(toml_str.contains("JOBRADAR_WEBHOOK_URL"));
        assert!(toml_str.contains("apac_china"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.http.max_attempts, 3);
        assert_eq!(parsed.pipeline.sources, Source::ALL.to_vec());
        assert_eq!(
            parsed.sources.settings(Source::Efinancialcareers).tracks.len(),
            2
        );
    }

    #[test]
    fn empty_file_uses_builtin_source_settings() {
        let config: AppConfig = toml::from_str("").expect("parse empty");
        let workday = config.sources.settings(Source::Workday);
        assert_eq!(workday.limits.page_size, 20);
        assert_eq!(workday.limits.max_offset, 2_000);
        let linkedin = config.sources.settings(Source::Linkedin);
        assert_eq!(linkedin.limits.page_size, 25);
        assert_eq!(linkedin.location, "Australia");
    }

    #[test]
    fn partial_source_override_keeps_other_builtins() {
        let toml_str = r#"
[pipeline]
sources = ["greenhouse", "workday"]

[sources.workday]
max_offset = 100

[relevance]
title_keywords = ["cto"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.pipeline.sources, vec![Source::Greenhouse, Source::Workday]);
        let workday = config.sources.settings(Source::Workday);
        assert_eq!(workday.limits.max_offset, 100);
        assert_eq!(workday.limits.page_size, 20);
        assert_eq!(config.relevance.title_keywords, vec!["cto".to_string()]);
        assert!(config.relevance.locations.contains(&"sydney".to_string()));
    }

    #[test]
    fn linkedin_location_allow_list() {
        let linkedin = SourceSettings::builtin(Source::Linkedin);
        assert!(linkedin.location_allowed("Sydney, New South Wales, Australia"));
        assert!(linkedin.location_allowed("Melbourne VIC"));
        assert!(linkedin.location_allowed(""));
        assert!(!linkedin.location_allowed("London, England, United Kingdom"));

        assert!(SourceSettings::builtin(Source::Seek).location_allowed("London"));

        let toml_str = r#"
[sources.linkedin]
location_allow = []
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert!(config.sources.settings(Source::Linkedin).location_allowed("London"));
    }

    #[test]
    fn retry_policy_from_http_config() {
        let policy = RetryPolicy::from(&HttpConfig::default());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(10_000));
    }

    #[test]
    fn webhook_url_requires_env() {
        let config = NotifyConfig {
            kind: NotifyKind::Webhook,
            webhook_url_env: "JR_TEST_NONEXISTENT_WEBHOOK_12345".into(),
        };
        let err = webhook_url(&config).unwrap_err();
        assert!(err.to_string().contains("JR_TEST_NONEXISTENT_WEBHOOK_12345"));
    }

    #[test]
    fn home_expansion() {
        let plain = expand_home("/tmp/jobradar.db").unwrap();
        assert_eq!(plain, PathBuf::from("/tmp/jobradar.db"));
        let expanded = expand_home("~/x.db").unwrap();
        assert!(expanded.ends_with("x.db"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
