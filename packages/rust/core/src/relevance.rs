//! Title/location relevance predicate applied to newly-seen jobs.

use jobradar_shared::{Job, RelevanceConfig};

/// Case-insensitive substring matcher over job titles and locations.
#[derive(Debug, Clone)]
pub struct RelevanceClassifier {
    title_keywords: Vec<String>,
    locations: Vec<String>,
}

impl From<&RelevanceConfig> for RelevanceClassifier {
    fn from(config: &RelevanceConfig) -> Self {
        Self {
            title_keywords: lowered(&config.title_keywords),
            locations: lowered(&config.locations),
        }
    }
}

/// Lowercase and trim, dropping blank entries so they cannot match everything.
fn lowered(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

impl RelevanceClassifier {
    pub fn title_matches(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.title_keywords.iter().any(|k| title.contains(k.as_str()))
    }

    /// An empty location passes: many boards omit it for remote or
    /// multi-site roles.
    pub fn location_matches(&self, location: &str) -> bool {
        let location = location.trim().to_lowercase();
        location.is_empty() || self.locations.iter().any(|l| location.contains(l.as_str()))
    }

    pub fn is_relevant(&self, job: &Job) -> bool {
        self.title_matches(&job.title) && self.location_matches(&job.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobradar_shared::{Source, content_hash};

    fn job(title: &str, location: &str) -> Job {
        Job {
            company: "BHP".into(),
            title: title.into(),
            location: location.into(),
            url: "https://example.com/1".into(),
            description: String::new(),
            department: String::new(),
            track: None,
            source: Source::Workday,
            source_job_id: "1".into(),
            posted_at: None,
            content_hash: content_hash(Source::Workday, "BHP", title, location, "https://example.com/1"),
            company_id: None,
            is_active: true,
        }
    }

    fn classifier() -> RelevanceClassifier {
        RelevanceClassifier::from(&RelevanceConfig::default())
    }

    #[test]
    fn title_and_location_must_both_match() {
        let c = classifier();
        assert!(c.is_relevant(&job("Chief Information Officer", "Perth, WA")));
        assert!(c.is_relevant(&job("Head of Data Platforms", "Remote")));
        assert!(!c.is_relevant(&job("Chief Information Officer", "Singapore")));
        assert!(!c.is_relevant(&job("Graduate Accountant", "Sydney")));
    }

    #[test]
    fn default_profile_cases() {
        let c = classifier();
        assert!(c.is_relevant(&job("Chief Technology Officer", "Sydney")));
        assert!(c.is_relevant(&job("Head of Data", "Sydney")));
        assert!(!c.is_relevant(&job("Barista", "Sydney")));
        assert!(c.is_relevant(&job("Director of Technology", "")));
        assert!(!c.is_relevant(&job("Head of Data", "London, UK")));
    }

    #[test]
    fn empty_location_passes() {
        let c = classifier();
        assert!(c.is_relevant(&job("CTO", "")));
        assert!(c.is_relevant(&job("CTO", "   ")));
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let c = classifier();
        // "gm" hides inside other words too; substring semantics are kept.
        assert!(c.title_matches("REGIONAL GM - VICTORIA"));
        assert!(c.location_matches("MELBOURNE CBD"));
        assert!(c.title_matches("Senior Director, Engineering"));
    }

    #[test]
    fn blank_keywords_are_ignored() {
        let c = RelevanceClassifier::from(&RelevanceConfig {
            title_keywords: vec!["  ".into(), "cto".into()],
            locations: vec![String::new()],
        });
        assert!(!c.title_matches("Payroll Officer"));
        assert!(c.title_matches("Group CTO"));
        assert!(!c.location_matches("Sydney"));
    }
}
