//! Helpers shared by every source normalizer: tolerant field lookup,
//! identity derivation, date parsing, and HTML-to-text cleanup.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use jobradar_shared::{Company, Job, JobRadarError, Result, Source, content_hash};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// What a normalizer knows about where a raw record came from.
#[derive(Debug, Clone, Default)]
pub struct NormalizeContext {
    /// Company name for company-scoped sources.
    pub company_name: Option<String>,
    pub company_id: Option<String>,
    pub board_url: Option<String>,
    /// Search track for keyword-search sources.
    pub track: Option<String>,
}

impl NormalizeContext {
    pub fn for_company(company: &Company, board_url: &str) -> Self {
        Self {
            company_name: Some(company.name.clone()),
            company_id: Some(company.id.clone()),
            board_url: Some(board_url.to_string()),
            track: None,
        }
    }

    pub fn for_track(track: Option<&str>) -> Self {
        Self {
            track: track.map(String::from),
            ..Self::default()
        }
    }
}

/// Source-specific values lifted from a raw record, before identity checks.
#[derive(Debug, Clone, Default)]
pub struct JobFields {
    pub company: String,
    pub title: String,
    pub location: String,
    pub url: String,
    pub description: String,
    pub department: String,
    pub source_job_id: String,
    pub posted_at: Option<DateTime<Utc>>,
}

impl JobFields {
    /// Finish a record into a [`Job`]. Returns `None` when the record lacks
    /// a company, title, or any usable identity.
    pub fn into_job(self, source: Source, ctx: &NormalizeContext) -> Option<Job> {
        let company = collapse_ws(&self.company);
        let title = collapse_ws(&self.title);
        let location = collapse_ws(&self.location);
        let url = self.url.trim().to_string();
        let hash = content_hash(source, &company, &title, &location, &url);

        let job = Job {
            company,
            title,
            location,
            url,
            description: self.description.trim().to_string(),
            department: collapse_ws(&self.department),
            track: ctx.track.clone(),
            source,
            source_job_id: self.source_job_id.trim().to_string(),
            posted_at: self.posted_at,
            content_hash: hash,
            company_id: ctx.company_id.clone(),
            is_active: true,
        };
        job.has_identity().then_some(job)
    }
}

// ---------------------------------------------------------------------------
// Field lookup
// ---------------------------------------------------------------------------

/// Look up a field via the fallback chain: exact canonical key, then a
/// case-insensitive match of it, then each synonym (exact, then
/// case-insensitive). The first non-null, non-blank hit wins.
pub fn field<'a>(raw: &'a Value, canonical: &str, synonyms: &[&str]) -> Option<&'a Value> {
    let obj = raw.as_object()?;
    std::iter::once(canonical)
        .chain(synonyms.iter().copied())
        .find_map(|key| {
            let exact = obj.get(key).filter(|v| is_present(v));
            exact.or_else(|| {
                obj.iter()
                    .find(|(k, v)| k.eq_ignore_ascii_case(key) && is_present(v))
                    .map(|(_, v)| v)
            })
        })
}

/// [`field`] rendered as text, or an empty string.
pub fn text(raw: &Value, canonical: &str, synonyms: &[&str]) -> String {
    field(raw, canonical, synonyms)
        .and_then(value_text)
        .unwrap_or_default()
}

/// Render a JSON value as display text. Numbers are stringified, objects
/// are read through their `name`/`label`/`value` member, and arrays are
/// joined with `, `.
pub fn value_text(value: &Value) -> Option<String> {
    let out = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(_) => return field(value, "name", &["label", "value", "text"]).and_then(value_text),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
    };
    (!out.is_empty()).then_some(out)
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// First non-empty of: explicit id, requisition id, posting URL, and finally
/// the compact JSON of the raw record (unstable across schema changes, but
/// unique).
pub fn derive_source_job_id(explicit: &str, requisition: &str, url: &str, raw: &Value) -> String {
    [explicit, requisition, url]
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| raw.to_string())
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\+?\s*(minutes?|mins?|m|hours?|hrs?|h|days?|d|weeks?|w|months?|mo)\+?\s+ago")
        .expect("valid regex")
});

/// Parse a posting timestamp from a JSON value: epoch milliseconds (or
/// seconds) for numbers, [`parse_date_text`] for strings.
pub fn parse_posted_at(value: &Value, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Values this large are milliseconds.
            if raw.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        Value::String(s) => parse_date_text(s, now),
        _ => None,
    }
}

/// Parse the date formats job boards emit: RFC 3339, naive ISO timestamps,
/// `YYYY-MM-DD`, `28 Feb 2026`, and relative phrases like `3 days ago`.
pub fn parse_date_text(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    for fmt in ["%Y-%m-%d", "%d %b %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    let lower = text.to_lowercase();
    if lower.contains("just now") || lower.ends_with("today") {
        return Some(now);
    }
    if lower.ends_with("yesterday") {
        return Some(now - Duration::days(1));
    }

    let caps = RELATIVE_RE.captures(&lower)?;
    let amount: i64 = caps[1].parse().ok()?;
    let unit = &caps[2];
    let ago = if unit.starts_with("mo") {
        Duration::days(amount * 30)
    } else {
        match unit.as_bytes()[0] {
            b'm' | b'h' => Duration::zero(),
            b'd' => Duration::days(amount),
            b'w' => Duration::weeks(amount),
            _ => return None,
        }
    };
    Some(now - ago)
}

// ---------------------------------------------------------------------------
// Text cleanup
// ---------------------------------------------------------------------------

/// Parse a CSS selector, mapping a bad selector to a parse error.
pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| JobRadarError::parse(format!("invalid selector {css:?}: {e}")))
}

/// Whitespace-collapsed text content of an element.
pub fn element_text(el: ElementRef<'_>) -> String {
    collapse_ws(&el.text().collect::<Vec<_>>().join(" "))
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip tags from an HTML fragment, keeping its text. Entities are decoded,
/// so entity-escaped markup comes back as literal tags.
pub fn strip_html(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    collapse_ws(&doc.root_element().text().collect::<Vec<_>>().join(" "))
}

/// The text of every `<li>` in an HTML fragment, or the whole stripped
/// fragment as one item when it has no list items.
pub fn html_list_items(fragment: &str) -> Vec<String> {
    static LI: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("li").expect("valid selector"));

    let doc = Html::parse_fragment(fragment);
    let items: Vec<String> = doc
        .select(&LI)
        .map(|li| collapse_ws(&li.text().collect::<Vec<_>>().join(" ")))
        .filter(|s| !s.is_empty())
        .collect();

    if items.is_empty() {
        let whole = strip_html(fragment);
        if whole.is_empty() { vec![] } else { vec![whole] }
    } else {
        items
    }
}
